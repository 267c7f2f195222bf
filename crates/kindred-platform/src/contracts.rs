use chrono::{DateTime, Utc};
use kindred_core::{Claim, Collaborator, KindnessPost, PostKind, PostStatus, Visibility};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub media_ref: Option<String>,
    pub visibility: Option<Visibility>,
    pub kind: PostKind,
    pub points_value: Option<u64>,
    pub allow_collaborators: Option<bool>,
    pub anonymous: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: String,
    pub media_ref: Option<String>,
    pub visibility: Visibility,
    pub kind: PostKind,
    pub status: PostStatus,
    pub points_value: u64,
    pub completed_at: Option<DateTime<Utc>>,
    pub allow_collaborators: bool,
    pub anonymous: bool,
    pub paid_forward: bool,
    pub created_at: DateTime<Utc>,
}

impl PostResponse {
    pub fn from_post(post: KindnessPost, paid_forward: bool) -> Self {
        Self {
            id: post.id,
            created_by: post.created_by,
            title: post.title,
            description: post.description,
            media_ref: post.media_ref,
            visibility: post.visibility,
            kind: post.kind,
            status: post.status,
            points_value: post.points_value,
            completed_at: post.completed_at,
            allow_collaborators: post.allow_collaborators,
            anonymous: post.anonymous,
            paid_forward,
            created_at: post.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub user_id: Uuid,
    pub comment: Option<String>,
    pub anonymous: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub claim_id: Uuid,
    pub post_id: Uuid,
    pub claimant: Uuid,
    pub claimed_at: DateTime<Utc>,
}

impl From<Claim> for ClaimResponse {
    fn from(claim: Claim) -> Self {
        Self {
            claim_id: claim.id,
            post_id: claim.post_id,
            claimant: claim.claimant,
            claimed_at: claim.claimed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborateResponse {
    pub collaborator_id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

impl From<Collaborator> for CollaborateResponse {
    fn from(collaborator: Collaborator) -> Self {
        Self {
            collaborator_id: collaborator.id,
            post_id: collaborator.post_id,
            user_id: collaborator.user_id,
            joined_at: collaborator.joined_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub user_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayItForwardRequest {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub media_ref: Option<String>,
    pub visibility: Option<Visibility>,
    /// Defaults to an offer: paying forward is a promise to help someone else.
    pub kind: Option<PostKind>,
    pub points_value: Option<u64>,
    pub allow_collaborators: Option<bool>,
    pub anonymous: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceBreakdown {
    pub from_claiming: u64,
    pub from_offers: u64,
    pub from_pay_it_forward: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuraProfileResponse {
    pub user_id: Uuid,
    pub points: u64,
    pub level: String,
    pub sub_level: String,
    pub color: String,
    pub percentage_to_next_level: u8,
    pub breakdown: ProvenanceBreakdown,
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub points: u64,
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Open,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    Offer,
    Request,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

/// A kindness post: an offer of help or a request for it.
///
/// Status moves only forward (`Open` -> `InProgress` -> `Completed`) and
/// `completed_at` is set exactly when the post reaches `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindnessPost {
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
    pub created_at: DateTime<Utc>,
}

/// A user's commitment to fulfill a post. One per (post, user).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub post_id: Uuid,
    pub claimant: Uuid,
    pub comment: String,
    pub anonymous: bool,
    pub claimed_at: DateTime<Utc>,
}

/// A user joining the creator's side of a post. Membership only; collaborators
/// take no share of the completion award.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub comment: String,
    pub anonymous: bool,
    pub joined_at: DateTime<Utc>,
}

/// Where an award came from, for the provenance counters on the profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PointSource {
    Claiming,
    Offering,
    PayItForward,
}

/// Per-user aura balance. Level, sub-level and color are derived from
/// `points` via the tier table and are never written independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuraProfile {
    pub user_id: Uuid,
    pub points: u64,
    pub level: String,
    pub sub_level: String,
    pub color: String,
    pub points_from_claiming: u64,
    pub points_from_offers: u64,
    pub points_from_pay_it_forward: u64,
}

impl AuraProfile {
    pub fn new(user_id: Uuid) -> Self {
        let tier = crate::levels::level_for(0);
        Self {
            user_id,
            points: 0,
            level: tier.level.to_string(),
            sub_level: tier.sub_level.to_string(),
            color: tier.color.to_string(),
            points_from_claiming: 0,
            points_from_offers: 0,
            points_from_pay_it_forward: 0,
        }
    }
}

/// Link from a completed post to the post it inspired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayItForward {
    pub id: Uuid,
    pub original_post_id: Uuid,
    pub new_post_id: Uuid,
    pub forwarded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// First-time badge grant. Unique per (user, badge), never revoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeAward {
    pub user_id: Uuid,
    pub badge: String,
    pub granted_at: DateTime<Utc>,
}

/// Outbound notification event. The core publishes these fire-and-forget;
/// delivery is a collaborator concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub recipient: Uuid,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::events::DomainEvent;
use crate::models::{
    AuraProfile, BadgeAward, Claim, Collaborator, KindnessPost, NotificationEvent, PayItForward,
};

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub sequence: i64,
    pub stream_id: Uuid,
    pub event: DomainEvent,
    pub stored_at: DateTime<Utc>,
}

/// Persistence seam for posts, claims, profiles, forwards and badges.
/// Implementations return plain storage errors; the services map missing
/// rows to the typed taxonomy.
#[async_trait]
pub trait KindnessStore: Send + Sync {
    async fn insert_post(&self, post: &KindnessPost) -> anyhow::Result<()>;
    async fn post(&self, id: Uuid) -> anyhow::Result<Option<KindnessPost>>;
    async fn update_post(&self, post: &KindnessPost) -> anyhow::Result<()>;

    async fn insert_claim(&self, claim: &Claim) -> anyhow::Result<()>;
    async fn claims_for_post(&self, post_id: Uuid) -> anyhow::Result<Vec<Claim>>;

    async fn insert_collaborator(&self, collaborator: &Collaborator) -> anyhow::Result<()>;
    async fn collaborators_for_post(&self, post_id: Uuid) -> anyhow::Result<Vec<Collaborator>>;

    async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<AuraProfile>>;
    async fn upsert_profile(&self, profile: &AuraProfile) -> anyhow::Result<()>;
    async fn leaderboard(&self, limit: usize) -> anyhow::Result<Vec<AuraProfile>>;

    async fn insert_forward(&self, forward: &PayItForward) -> anyhow::Result<()>;
    async fn forwards_for_original(&self, post_id: Uuid) -> anyhow::Result<Vec<PayItForward>>;

    /// Returns true when the badge was newly granted, false when the user
    /// already held it. Backed by a uniqueness constraint on (user, badge).
    async fn grant_badge_once(&self, user_id: Uuid, badge: &str) -> anyhow::Result<bool>;
    async fn badges_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<BadgeAward>>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> anyhow::Result<EventEnvelope>;
    async fn stream(&self, stream_id: Uuid) -> anyhow::Result<Vec<EventEnvelope>>;
}

/// Resolves user ids against the surrounding platform's user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: Uuid) -> anyhow::Result<bool>;
}

/// Fire-and-forget outbound notifications. Failures must never roll back
/// the core transaction; callers log and move on.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()>;
}

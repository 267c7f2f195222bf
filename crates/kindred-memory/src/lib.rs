//! In-memory implementations of the storage seams. Reference store for the
//! service crates and the backing for their tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use kindred_core::{
    AuraProfile, BadgeAward, Claim, Collaborator, DomainEvent, EventEnvelope, EventStore,
    KindnessPost, KindnessStore, NotificationEvent, NotificationSink, PayItForward, UserDirectory,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    posts: RwLock<HashMap<Uuid, KindnessPost>>,
    claims: RwLock<Vec<Claim>>,
    collaborators: RwLock<Vec<Collaborator>>,
    profiles: RwLock<HashMap<Uuid, AuraProfile>>,
    forwards: RwLock<Vec<PayItForward>>,
    badges: RwLock<Vec<BadgeAward>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KindnessStore for InMemoryStore {
    async fn insert_post(&self, post: &KindnessPost) -> anyhow::Result<()> {
        let mut posts = self.posts.write().await;
        posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn post(&self, id: Uuid) -> anyhow::Result<Option<KindnessPost>> {
        let posts = self.posts.read().await;
        Ok(posts.get(&id).cloned())
    }

    async fn update_post(&self, post: &KindnessPost) -> anyhow::Result<()> {
        let mut posts = self.posts.write().await;
        if !posts.contains_key(&post.id) {
            anyhow::bail!("post {} does not exist", post.id);
        }
        posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn insert_claim(&self, claim: &Claim) -> anyhow::Result<()> {
        let mut claims = self.claims.write().await;
        claims.push(claim.clone());
        Ok(())
    }

    async fn claims_for_post(&self, post_id: Uuid) -> anyhow::Result<Vec<Claim>> {
        let claims = self.claims.read().await;
        Ok(claims.iter().filter(|c| c.post_id == post_id).cloned().collect())
    }

    async fn insert_collaborator(&self, collaborator: &Collaborator) -> anyhow::Result<()> {
        let mut collaborators = self.collaborators.write().await;
        collaborators.push(collaborator.clone());
        Ok(())
    }

    async fn collaborators_for_post(&self, post_id: Uuid) -> anyhow::Result<Vec<Collaborator>> {
        let collaborators = self.collaborators.read().await;
        Ok(collaborators
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<AuraProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, profile: &AuraProfile) -> anyhow::Result<()> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn leaderboard(&self, limit: usize) -> anyhow::Result<Vec<AuraProfile>> {
        let profiles = self.profiles.read().await;
        let mut ranked: Vec<AuraProfile> = profiles.values().cloned().collect();
        ranked.sort_by(|a, b| b.points.cmp(&a.points).then(a.user_id.cmp(&b.user_id)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn insert_forward(&self, forward: &PayItForward) -> anyhow::Result<()> {
        let mut forwards = self.forwards.write().await;
        forwards.push(forward.clone());
        Ok(())
    }

    async fn forwards_for_original(&self, post_id: Uuid) -> anyhow::Result<Vec<PayItForward>> {
        let forwards = self.forwards.read().await;
        Ok(forwards
            .iter()
            .filter(|f| f.original_post_id == post_id)
            .cloned()
            .collect())
    }

    async fn grant_badge_once(&self, user_id: Uuid, badge: &str) -> anyhow::Result<bool> {
        let mut badges = self.badges.write().await;
        let held = badges.iter().any(|b| b.user_id == user_id && b.badge == badge);
        if held {
            return Ok(false);
        }
        badges.push(BadgeAward {
            user_id,
            badge: badge.to_string(),
            granted_at: Utc::now(),
        });
        Ok(true)
    }

    async fn badges_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<BadgeAward>> {
        let badges = self.badges.read().await;
        Ok(badges.iter().filter(|b| b.user_id == user_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<Uuid, Vec<EventEnvelope>>>,
    sequence: RwLock<i64>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> anyhow::Result<EventEnvelope> {
        let mut sequence_guard = self.sequence.write().await;
        *sequence_guard += 1;

        let envelope = EventEnvelope {
            sequence: *sequence_guard,
            stream_id,
            event,
            stored_at: Utc::now(),
        };

        let mut streams = self.streams.write().await;
        streams.entry(stream_id).or_default().push(envelope.clone());

        Ok(envelope)
    }

    async fn stream(&self, stream_id: Uuid) -> anyhow::Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        Ok(streams.get(&stream_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashSet<Uuid>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: Uuid) {
        let mut users = self.users.write().await;
        users.insert(user_id);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn exists(&self, user_id: Uuid) -> anyhow::Result<bool> {
        let users = self.users.read().await;
        Ok(users.contains(&user_id))
    }
}

/// Captures notifications instead of delivering them, for assertions.
#[derive(Default)]
pub struct RecordingSink {
    sent: RwLock<Vec<NotificationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<NotificationEvent> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()> {
        let mut sent = self.sent.write().await;
        sent.push(event);
        Ok(())
    }
}

/// Sink that always fails, for verifying that notification failures never
/// affect the core mutation.
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn notify(&self, _event: NotificationEvent) -> anyhow::Result<()> {
        anyhow::bail!("notification channel unavailable")
    }
}

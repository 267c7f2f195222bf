//! RAK lifecycle: post creation, claiming, collaboration, status
//! transitions, completion awarding and the pay-it-forward chain.
//!
//! Every mutation of a post happens under that post's lock, and the lock is
//! held across the completion side effects, so racing calls observe the
//! committed status instead of transitioning twice. Awarding is explicit
//! and synchronous; nothing fires implicitly on persistence.

use std::sync::Arc;

use chrono::Utc;
use kindred_core::{
    Claim, Collaborator, CoreError, CoreResult, DomainEvent, DomainEventKind, EntityLocks,
    EventStore, KindnessPost, KindnessStore, NotificationEvent, NotificationSink, PayItForward,
    PointSource, PostKind, PostStatus, UserDirectory, Visibility,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// Matches the original product default for a post's worth.
pub const DEFAULT_POINTS_VALUE: u64 = 10;

/// Fields supplied by the caller when creating a post. `points_value` of
/// zero falls back to [`DEFAULT_POINTS_VALUE`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub media_ref: Option<String>,
    pub visibility: Visibility,
    pub kind: PostKind,
    pub points_value: u64,
    pub allow_collaborators: bool,
    pub anonymous: bool,
}

pub struct LifecycleService {
    store: Arc<dyn KindnessStore>,
    events: Arc<dyn EventStore>,
    sink: Arc<dyn NotificationSink>,
    users: Arc<dyn UserDirectory>,
    ledger: Arc<kindred_ledger::AuraLedger>,
    post_locks: EntityLocks,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn KindnessStore>,
        events: Arc<dyn EventStore>,
        sink: Arc<dyn NotificationSink>,
        users: Arc<dyn UserDirectory>,
        ledger: Arc<kindred_ledger::AuraLedger>,
    ) -> Self {
        Self {
            store,
            events,
            sink,
            users,
            ledger,
            post_locks: EntityLocks::new(),
        }
    }

    pub async fn create_post(&self, creator: Uuid, input: NewPost) -> CoreResult<KindnessPost> {
        self.require_user(creator).await?;

        let points_value = if input.points_value == 0 {
            DEFAULT_POINTS_VALUE
        } else {
            input.points_value
        };

        let post = KindnessPost {
            id: Uuid::new_v4(),
            created_by: creator,
            title: input.title,
            description: input.description,
            media_ref: input.media_ref,
            visibility: input.visibility,
            kind: input.kind,
            status: PostStatus::Open,
            points_value,
            completed_at: None,
            allow_collaborators: input.allow_collaborators,
            anonymous: input.anonymous,
            created_at: Utc::now(),
        };
        self.store.insert_post(&post).await?;

        self.record_event(
            post.id,
            DomainEventKind::PostCreated,
            json!({ "post_id": post.id, "created_by": creator, "kind": post.kind }),
        )
        .await;

        Ok(post)
    }

    pub async fn post(&self, post_id: Uuid) -> CoreResult<KindnessPost> {
        self.store
            .post(post_id)
            .await?
            .ok_or(CoreError::NotFound("post"))
    }

    pub async fn claimants(&self, post_id: Uuid) -> CoreResult<Vec<Claim>> {
        self.post(post_id).await?;
        Ok(self.store.claims_for_post(post_id).await?)
    }

    pub async fn collaborators(&self, post_id: Uuid) -> CoreResult<Vec<Collaborator>> {
        self.post(post_id).await?;
        Ok(self.store.collaborators_for_post(post_id).await?)
    }

    /// True iff at least one pay-it-forward link names this post as its
    /// original.
    pub async fn paid_forward(&self, post_id: Uuid) -> CoreResult<bool> {
        self.post(post_id).await?;
        Ok(!self.store.forwards_for_original(post_id).await?.is_empty())
    }

    pub async fn claim(
        &self,
        post_id: Uuid,
        user: Uuid,
        comment: String,
        anonymous: bool,
    ) -> CoreResult<Claim> {
        self.require_user(user).await?;

        let lock = self.post_locks.lock_for(post_id);
        let _guard = lock.lock().await;

        let mut post = self.post(post_id).await?;
        if post.created_by == user {
            return Err(CoreError::SelfClaim);
        }

        // Status is checked before the duplicate lookup: a prior claimant
        // re-claiming a completed post gets InvalidTransition, not
        // DuplicateClaim.
        let claimable = post.status == PostStatus::Open
            || (post.status == PostStatus::InProgress && post.allow_collaborators);
        if !claimable {
            return Err(CoreError::InvalidTransition(
                "this post is not open for claims".to_string(),
            ));
        }

        let claims = self.store.claims_for_post(post_id).await?;
        if claims.iter().any(|c| c.claimant == user) {
            return Err(CoreError::DuplicateClaim);
        }

        let claim = Claim {
            id: Uuid::new_v4(),
            post_id,
            claimant: user,
            comment,
            anonymous,
            claimed_at: Utc::now(),
        };
        self.store.insert_claim(&claim).await?;

        if post.status != PostStatus::InProgress {
            post.status = PostStatus::InProgress;
            self.store.update_post(&post).await?;
        }

        self.record_event(
            post_id,
            DomainEventKind::PostClaimed,
            json!({ "post_id": post_id, "claimant": user }),
        )
        .await;
        self.notify(
            post.created_by,
            format!("Your post \"{}\" has been claimed.", post.title),
        )
        .await;

        Ok(claim)
    }

    /// Join the creator's side of a post. Collaborators share the work, not
    /// the completion award.
    pub async fn collaborate(
        &self,
        post_id: Uuid,
        user: Uuid,
        comment: String,
        anonymous: bool,
    ) -> CoreResult<Collaborator> {
        self.require_user(user).await?;

        let lock = self.post_locks.lock_for(post_id);
        let _guard = lock.lock().await;

        let mut post = self.post(post_id).await?;
        if post.created_by == user {
            return Err(CoreError::SelfClaim);
        }
        if post.status == PostStatus::Completed {
            return Err(CoreError::InvalidTransition(
                "completed posts cannot take collaborators".to_string(),
            ));
        }
        if !post.allow_collaborators {
            return Err(CoreError::InvalidTransition(
                "collaboration is not enabled for this post".to_string(),
            ));
        }

        let existing = self.store.collaborators_for_post(post_id).await?;
        if existing.iter().any(|c| c.user_id == user) {
            return Err(CoreError::DuplicateClaim);
        }

        let collaborator = Collaborator {
            id: Uuid::new_v4(),
            post_id,
            user_id: user,
            comment,
            anonymous,
            joined_at: Utc::now(),
        };
        self.store.insert_collaborator(&collaborator).await?;

        if post.status == PostStatus::Open {
            post.status = PostStatus::InProgress;
            self.store.update_post(&post).await?;
        }

        self.record_event(
            post_id,
            DomainEventKind::CollaboratorJoined,
            json!({ "post_id": post_id, "user_id": user }),
        )
        .await;
        self.notify(
            post.created_by,
            format!("Someone joined your post \"{}\" as a collaborator.", post.title),
        )
        .await;

        Ok(collaborator)
    }

    /// Creator-only, idempotent.
    pub async fn enable_collaborators(&self, post_id: Uuid, user: Uuid) -> CoreResult<()> {
        let lock = self.post_locks.lock_for(post_id);
        let _guard = lock.lock().await;

        let mut post = self.post(post_id).await?;
        if post.created_by != user {
            return Err(CoreError::Forbidden(
                "only the creator can enable collaborators".to_string(),
            ));
        }
        if post.allow_collaborators {
            return Ok(());
        }

        post.allow_collaborators = true;
        self.store.update_post(&post).await?;

        self.record_event(
            post_id,
            DomainEventKind::CollaborationEnabled,
            json!({ "post_id": post_id }),
        )
        .await;

        Ok(())
    }

    /// Creator-only move between `Open` and `InProgress`; `Completed`
    /// delegates to the completion path and a completed post never moves
    /// again.
    pub async fn update_status(
        &self,
        post_id: Uuid,
        user: Uuid,
        new_status: PostStatus,
    ) -> CoreResult<()> {
        let lock = self.post_locks.lock_for(post_id);
        let _guard = lock.lock().await;

        let mut post = self.post(post_id).await?;
        if post.created_by != user {
            return Err(CoreError::Forbidden(
                "only the creator can change the status of this post".to_string(),
            ));
        }

        if new_status == PostStatus::Completed {
            return self.complete_locked(&mut post).await;
        }

        if post.status == PostStatus::Completed {
            return Err(CoreError::InvalidTransition(
                "completed posts cannot change status".to_string(),
            ));
        }
        if post.status == new_status {
            return Ok(());
        }

        post.status = new_status;
        self.store.update_post(&post).await?;

        self.record_event(
            post_id,
            DomainEventKind::StatusChanged,
            json!({ "post_id": post_id, "status": new_status }),
        )
        .await;

        Ok(())
    }

    /// Creator-only. Idempotent: completing an already-completed post is a
    /// successful no-op and never re-awards.
    pub async fn complete(&self, post_id: Uuid, user: Uuid) -> CoreResult<()> {
        let lock = self.post_locks.lock_for(post_id);
        let _guard = lock.lock().await;

        let mut post = self.post(post_id).await?;
        if post.created_by != user {
            return Err(CoreError::Forbidden(
                "only the creator can complete this post".to_string(),
            ));
        }

        self.complete_locked(&mut post).await
    }

    async fn complete_locked(&self, post: &mut KindnessPost) -> CoreResult<()> {
        if post.status == PostStatus::Completed {
            return Ok(());
        }

        let claims = self.store.claims_for_post(post.id).await?;
        if post.kind == PostKind::Request && claims.is_empty() {
            return Err(CoreError::InvalidTransition(
                "a request needs at least one claim before it can be completed".to_string(),
            ));
        }

        post.status = PostStatus::Completed;
        post.completed_at = Some(Utc::now());
        self.store.update_post(post).await?;

        // Awards run after the status flip has been persisted. The post lock
        // is still held, and user locks are taken in ascending id order.
        let mut beneficiaries: Vec<Uuid> = claims.iter().map(|c| c.claimant).collect();
        beneficiaries.sort();
        beneficiaries.dedup();

        let source = match post.kind {
            PostKind::Request => PointSource::Claiming,
            PostKind::Offer => PointSource::Offering,
        };

        for user_id in beneficiaries {
            self.ledger.award(user_id, post.points_value, source).await?;
            self.notify(
                user_id,
                format!(
                    "The post \"{}\" you claimed is complete. You earned {} aura points!",
                    post.title, post.points_value
                ),
            )
            .await;
        }

        self.record_event(
            post.id,
            DomainEventKind::PostCompleted,
            json!({ "post_id": post.id, "points_value": post.points_value }),
        )
        .await;
        self.notify(
            post.created_by,
            format!("Your post \"{}\" has been completed.", post.title),
        )
        .await;

        Ok(())
    }

    /// Creates a new post inspired by a completed one and links the two.
    /// Each user may forward a given original once; different users may
    /// fan out from the same original. When the original was a request,
    /// its creator is credited with the original's points value.
    pub async fn pay_it_forward(
        &self,
        original_post_id: Uuid,
        user: Uuid,
        input: NewPost,
    ) -> CoreResult<KindnessPost> {
        self.require_user(user).await?;

        let lock = self.post_locks.lock_for(original_post_id);
        let _guard = lock.lock().await;

        let original = self.post(original_post_id).await?;
        if original.status != PostStatus::Completed {
            return Err(CoreError::NotCompleted);
        }

        let forwards = self.store.forwards_for_original(original_post_id).await?;
        if forwards.iter().any(|f| f.forwarded_by == user) {
            return Err(CoreError::AlreadyForwarded);
        }

        let points_value = if input.points_value == 0 {
            DEFAULT_POINTS_VALUE
        } else {
            input.points_value
        };
        let new_post = KindnessPost {
            id: Uuid::new_v4(),
            created_by: user,
            title: input.title,
            description: input.description,
            media_ref: input.media_ref,
            visibility: input.visibility,
            kind: input.kind,
            status: PostStatus::Open,
            points_value,
            completed_at: None,
            allow_collaborators: input.allow_collaborators,
            anonymous: input.anonymous,
            created_at: Utc::now(),
        };
        self.store.insert_post(&new_post).await?;

        let forward = PayItForward {
            id: Uuid::new_v4(),
            original_post_id,
            new_post_id: new_post.id,
            forwarded_by: user,
            created_at: Utc::now(),
        };
        self.store.insert_forward(&forward).await?;

        if original.kind == PostKind::Request {
            self.ledger
                .award(original.created_by, original.points_value, PointSource::PayItForward)
                .await?;
        }

        self.record_event(
            original_post_id,
            DomainEventKind::PaidForward,
            json!({
                "original_post_id": original_post_id,
                "new_post_id": new_post.id,
                "forwarded_by": user,
            }),
        )
        .await;
        self.record_event(
            new_post.id,
            DomainEventKind::PostCreated,
            json!({ "post_id": new_post.id, "created_by": user, "kind": new_post.kind }),
        )
        .await;
        self.notify(
            original.created_by,
            format!("Your post \"{}\" has been paid forward!", original.title),
        )
        .await;

        Ok(new_post)
    }

    async fn require_user(&self, user_id: Uuid) -> CoreResult<()> {
        if self.users.exists(user_id).await? {
            Ok(())
        } else {
            Err(CoreError::NotFound("user"))
        }
    }

    async fn record_event(&self, stream_id: Uuid, kind: DomainEventKind, payload: serde_json::Value) {
        let event = DomainEvent::new(stream_id, kind, payload);
        if let Err(err) = self.events.append(stream_id, event).await {
            warn!("failed to append lifecycle event: {err:#}");
        }
    }

    async fn notify(&self, recipient: Uuid, message: String) {
        let event = NotificationEvent {
            recipient,
            message,
            occurred_at: Utc::now(),
        };
        if let Err(err) = self.sink.notify(event).await {
            warn!("failed to publish notification: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests;

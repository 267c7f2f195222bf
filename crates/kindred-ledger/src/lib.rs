//! Aura ledger: per-user point balances, tier derivation and first-time
//! badge grants. Levels are never written directly; every mutation goes
//! through `award_points`, which recomputes the tier from the new total.

use std::sync::Arc;

use chrono::Utc;
use kindred_core::{
    AuraProfile, CoreResult, DomainEvent, DomainEventKind, EntityLocks, EventStore, KindnessStore,
    NotificationEvent, NotificationSink, PointSource, badge_for_level, level_for,
    percentage_to_next_level,
};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelChange {
    pub previous_level: String,
    pub new_level: String,
}

impl LevelChange {
    pub fn crossed(&self) -> bool {
        self.previous_level != self.new_level
    }
}

pub struct AuraLedger {
    store: Arc<dyn KindnessStore>,
    events: Arc<dyn EventStore>,
    sink: Arc<dyn NotificationSink>,
    user_locks: EntityLocks,
}

impl AuraLedger {
    pub fn new(
        store: Arc<dyn KindnessStore>,
        events: Arc<dyn EventStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            events,
            sink,
            user_locks: EntityLocks::new(),
        }
    }

    /// Adds `amount` to the user's balance under the per-user lock and
    /// recomputes the tier. A zero amount is a no-op that still reports the
    /// current level. Two posts completing at once may both award the same
    /// user; the lock makes the read-modify-write atomic.
    pub async fn award_points(
        &self,
        user_id: Uuid,
        amount: u64,
        source: PointSource,
    ) -> CoreResult<LevelChange> {
        let lock = self.user_locks.lock_for(user_id);
        let _guard = lock.lock().await;

        let mut profile = self
            .store
            .profile(user_id)
            .await?
            .unwrap_or_else(|| AuraProfile::new(user_id));
        let previous_level = profile.level.clone();

        if amount == 0 {
            return Ok(LevelChange {
                previous_level: previous_level.clone(),
                new_level: previous_level,
            });
        }

        profile.points += amount;
        match source {
            PointSource::Claiming => profile.points_from_claiming += amount,
            PointSource::Offering => profile.points_from_offers += amount,
            PointSource::PayItForward => profile.points_from_pay_it_forward += amount,
        }

        let tier = level_for(profile.points);
        profile.level = tier.level.to_string();
        profile.sub_level = tier.sub_level.to_string();
        profile.color = tier.color.to_string();

        self.store.upsert_profile(&profile).await?;

        self.record_event(
            user_id,
            DomainEventKind::PointsAwarded,
            json!({
                "user_id": user_id,
                "amount": amount,
                "source": source,
                "total": profile.points,
            }),
        )
        .await;

        Ok(LevelChange {
            previous_level,
            new_level: profile.level,
        })
    }

    /// Grants the new tier's first-time badge when a level boundary was
    /// crossed. Re-granting a held badge is a silent no-op. Returns the
    /// badge name when one was newly granted.
    pub async fn check_and_award_badge(
        &self,
        user_id: Uuid,
        change: &LevelChange,
    ) -> CoreResult<Option<String>> {
        if !change.crossed() {
            return Ok(None);
        }
        let Some(badge) = badge_for_level(&change.new_level) else {
            return Ok(None);
        };

        let granted = self.store.grant_badge_once(user_id, &badge).await?;
        if !granted {
            return Ok(None);
        }

        self.record_event(
            user_id,
            DomainEventKind::BadgeGranted,
            json!({ "user_id": user_id, "badge": badge }),
        )
        .await;

        let message = format!(
            "Congratulations on reaching {}! You've earned the {}.",
            change.new_level, badge
        );
        self.notify(user_id, message).await;

        Ok(Some(badge))
    }

    /// Award plus badge check in one call; what the lifecycle service uses
    /// per beneficiary on completion.
    pub async fn award(
        &self,
        user_id: Uuid,
        amount: u64,
        source: PointSource,
    ) -> CoreResult<LevelChange> {
        let change = self.award_points(user_id, amount, source).await?;
        self.check_and_award_badge(user_id, &change).await?;
        Ok(change)
    }

    /// Current profile; users that were never awarded read as a zero
    /// profile in the lowest tier.
    pub async fn profile(&self, user_id: Uuid) -> CoreResult<AuraProfile> {
        Ok(self
            .store
            .profile(user_id)
            .await?
            .unwrap_or_else(|| AuraProfile::new(user_id)))
    }

    pub async fn progress(&self, user_id: Uuid) -> CoreResult<u8> {
        let profile = self.profile(user_id).await?;
        Ok(percentage_to_next_level(profile.points))
    }

    /// Descending by points, ties broken by ascending user id.
    pub async fn leaderboard(&self, limit: usize) -> CoreResult<Vec<AuraProfile>> {
        Ok(self.store.leaderboard(limit).await?)
    }

    pub async fn badges(&self, user_id: Uuid) -> CoreResult<Vec<String>> {
        let held = self.store.badges_for_user(user_id).await?;
        Ok(held.into_iter().map(|b| b.badge).collect())
    }

    async fn record_event(&self, stream_id: Uuid, kind: DomainEventKind, payload: serde_json::Value) {
        let event = DomainEvent::new(stream_id, kind, payload);
        if let Err(err) = self.events.append(stream_id, event).await {
            warn!("failed to append ledger event: {err:#}");
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

//! Postgres-backed storage for the gateway. Runtime-bound queries; the
//! status flip on a post takes a `FOR UPDATE` row lock inside a transaction
//! so a racing writer observes the committed row.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use kindred_core::{
    AuraProfile, BadgeAward, Claim, Collaborator, DomainEvent, EventEnvelope, EventStore,
    KindnessPost, KindnessStore, PayItForward, PostKind, PostStatus, UserDirectory, Visibility,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub fn status_str(status: PostStatus) -> &'static str {
    match status {
        PostStatus::Open => "open",
        PostStatus::InProgress => "in_progress",
        PostStatus::Completed => "completed",
    }
}

pub fn parse_status(value: &str) -> Result<PostStatus> {
    match value.trim().to_ascii_lowercase().as_str() {
        "open" => Ok(PostStatus::Open),
        "in_progress" | "in progress" => Ok(PostStatus::InProgress),
        "completed" => Ok(PostStatus::Completed),
        other => anyhow::bail!("unsupported status: {other}"),
    }
}

fn kind_str(kind: PostKind) -> &'static str {
    match kind {
        PostKind::Offer => "offer",
        PostKind::Request => "request",
    }
}

fn parse_kind(value: &str) -> Result<PostKind> {
    match value {
        "offer" => Ok(PostKind::Offer),
        "request" => Ok(PostKind::Request),
        other => anyhow::bail!("unsupported kind: {other}"),
    }
}

fn visibility_str(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "public",
        Visibility::Private => "private",
    }
}

fn parse_visibility(value: &str) -> Result<Visibility> {
    match value {
        "public" => Ok(Visibility::Public),
        "private" => Ok(Visibility::Private),
        other => anyhow::bail!("unsupported visibility: {other}"),
    }
}

fn row_to_post(row: &PgRow) -> Result<KindnessPost> {
    Ok(KindnessPost {
        id: row.try_get("id")?,
        created_by: row.try_get("created_by")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        media_ref: row.try_get("media_ref")?,
        visibility: parse_visibility(&row.try_get::<String, _>("visibility")?)?,
        kind: parse_kind(&row.try_get::<String, _>("kind")?)?,
        status: parse_status(&row.try_get::<String, _>("status")?)?,
        points_value: row.try_get::<i64, _>("points_value")? as u64,
        completed_at: row.try_get("completed_at")?,
        allow_collaborators: row.try_get("allow_collaborators")?,
        anonymous: row.try_get("anonymous")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_claim(row: &PgRow) -> Result<Claim> {
    Ok(Claim {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        claimant: row.try_get("claimant")?,
        comment: row.try_get("comment")?,
        anonymous: row.try_get("anonymous")?,
        claimed_at: row.try_get("claimed_at")?,
    })
}

fn row_to_collaborator(row: &PgRow) -> Result<Collaborator> {
    Ok(Collaborator {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        user_id: row.try_get("user_id")?,
        comment: row.try_get("comment")?,
        anonymous: row.try_get("anonymous")?,
        joined_at: row.try_get("joined_at")?,
    })
}

fn row_to_profile(row: &PgRow) -> Result<AuraProfile> {
    Ok(AuraProfile {
        user_id: row.try_get("user_id")?,
        points: row.try_get::<i64, _>("points")? as u64,
        level: row.try_get("level")?,
        sub_level: row.try_get("sub_level")?,
        color: row.try_get("color")?,
        points_from_claiming: row.try_get::<i64, _>("points_from_claiming")? as u64,
        points_from_offers: row.try_get::<i64, _>("points_from_offers")? as u64,
        points_from_pay_it_forward: row.try_get::<i64, _>("points_from_pay_it_forward")? as u64,
    })
}

#[async_trait]
impl KindnessStore for PgStore {
    async fn insert_post(&self, post: &KindnessPost) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rak_posts (
                id, created_by, title, description, media_ref, visibility, kind,
                status, points_value, completed_at, allow_collaborators, anonymous, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(post.id)
        .bind(post.created_by)
        .bind(&post.title)
        .bind(&post.description)
        .bind(&post.media_ref)
        .bind(visibility_str(post.visibility))
        .bind(kind_str(post.kind))
        .bind(status_str(post.status))
        .bind(post.points_value as i64)
        .bind(post.completed_at)
        .bind(post.allow_collaborators)
        .bind(post.anonymous)
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn post(&self, id: Uuid) -> Result<Option<KindnessPost>> {
        let row = sqlx::query("SELECT * FROM rak_posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn update_post(&self, post: &KindnessPost) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM rak_posts WHERE id = $1 FOR UPDATE")
            .bind(post.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| anyhow::anyhow!("post {} does not exist", post.id))?;

        sqlx::query(
            r#"
            UPDATE rak_posts
            SET status = $2, completed_at = $3, allow_collaborators = $4,
                title = $5, description = $6, visibility = $7
            WHERE id = $1
            "#,
        )
        .bind(post.id)
        .bind(status_str(post.status))
        .bind(post.completed_at)
        .bind(post.allow_collaborators)
        .bind(&post.title)
        .bind(&post.description)
        .bind(visibility_str(post.visibility))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_claim(&self, claim: &Claim) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rak_claims (id, post_id, claimant, comment, anonymous, claimed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(claim.id)
        .bind(claim.post_id)
        .bind(claim.claimant)
        .bind(&claim.comment)
        .bind(claim.anonymous)
        .bind(claim.claimed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claims_for_post(&self, post_id: Uuid) -> Result<Vec<Claim>> {
        let rows =
            sqlx::query("SELECT * FROM rak_claims WHERE post_id = $1 ORDER BY claimed_at")
                .bind(post_id)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_claim).collect()
    }

    async fn insert_collaborator(&self, collaborator: &Collaborator) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rak_collaborators (id, post_id, user_id, comment, anonymous, joined_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(collaborator.id)
        .bind(collaborator.post_id)
        .bind(collaborator.user_id)
        .bind(&collaborator.comment)
        .bind(collaborator.anonymous)
        .bind(collaborator.joined_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn collaborators_for_post(&self, post_id: Uuid) -> Result<Vec<Collaborator>> {
        let rows =
            sqlx::query("SELECT * FROM rak_collaborators WHERE post_id = $1 ORDER BY joined_at")
                .bind(post_id)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_collaborator).collect()
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<AuraProfile>> {
        let row = sqlx::query("SELECT * FROM aura_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_profile).transpose()
    }

    async fn upsert_profile(&self, profile: &AuraProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO aura_profiles (
                user_id, points, level, sub_level, color,
                points_from_claiming, points_from_offers, points_from_pay_it_forward
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE
            SET points = EXCLUDED.points,
                level = EXCLUDED.level,
                sub_level = EXCLUDED.sub_level,
                color = EXCLUDED.color,
                points_from_claiming = EXCLUDED.points_from_claiming,
                points_from_offers = EXCLUDED.points_from_offers,
                points_from_pay_it_forward = EXCLUDED.points_from_pay_it_forward
            "#,
        )
        .bind(profile.user_id)
        .bind(profile.points as i64)
        .bind(&profile.level)
        .bind(&profile.sub_level)
        .bind(&profile.color)
        .bind(profile.points_from_claiming as i64)
        .bind(profile.points_from_offers as i64)
        .bind(profile.points_from_pay_it_forward as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<AuraProfile>> {
        let rows = sqlx::query(
            "SELECT * FROM aura_profiles ORDER BY points DESC, user_id ASC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_profile).collect()
    }

    async fn insert_forward(&self, forward: &PayItForward) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pay_it_forwards (id, original_post_id, new_post_id, forwarded_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(forward.id)
        .bind(forward.original_post_id)
        .bind(forward.new_post_id)
        .bind(forward.forwarded_by)
        .bind(forward.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn forwards_for_original(&self, post_id: Uuid) -> Result<Vec<PayItForward>> {
        let rows = sqlx::query(
            "SELECT * FROM pay_it_forwards WHERE original_post_id = $1 ORDER BY created_at",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PayItForward {
                    id: row.try_get("id")?,
                    original_post_id: row.try_get("original_post_id")?,
                    new_post_id: row.try_get("new_post_id")?,
                    forwarded_by: row.try_get("forwarded_by")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn grant_badge_once(&self, user_id: Uuid, badge: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_badges (user_id, badge, granted_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, badge) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(badge)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn badges_for_user(&self, user_id: Uuid) -> Result<Vec<BadgeAward>> {
        let rows =
            sqlx::query("SELECT * FROM user_badges WHERE user_id = $1 ORDER BY granted_at")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(|row| {
                Ok(BadgeAward {
                    user_id: row.try_get("user_id")?,
                    badge: row.try_get("badge")?,
                    granted_at: row.try_get("granted_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> Result<EventEnvelope> {
        let stored_at = Utc::now();
        let payload = serde_json::to_value(&event)?;

        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rak_events (stream_id, event, stored_at)
            VALUES ($1, $2, $3)
            RETURNING sequence
            "#,
        )
        .bind(stream_id)
        .bind(payload)
        .bind(stored_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(EventEnvelope {
            sequence,
            stream_id,
            event,
            stored_at,
        })
    }

    async fn stream(&self, stream_id: Uuid) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            "SELECT sequence, stream_id, event, stored_at FROM rak_events WHERE stream_id = $1 ORDER BY sequence",
        )
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let event: DomainEvent =
                    serde_json::from_value(row.try_get::<serde_json::Value, _>("event")?)?;
                Ok(EventEnvelope {
                    sequence: row.try_get("sequence")?,
                    stream_id: row.try_get("stream_id")?,
                    event,
                    stored_at: row.try_get("stored_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn exists(&self, user_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }
}

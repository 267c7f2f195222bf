use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use kindred_core::{CoreError, PostKind, Visibility, percentage_to_next_level};
use kindred_ledger::AuraLedger;
use kindred_lifecycle::{LifecycleService, NewPost};
use kindred_platform::{
    ActorRequest, AuraProfileResponse, ClaimRequest, ClaimResponse, CollaborateResponse,
    CreatePostRequest, LeaderboardEntry, LeaderboardResponse, PayItForwardRequest, PostResponse,
    RedisBus, ServiceConfig, UpdateStatusRequest, connect_database,
    contracts::ProvenanceBreakdown,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};
use uuid::Uuid;

mod pg;

use pg::PgStore;

const MAX_TITLE_LEN: usize = 30;
const MAX_DESCRIPTION_LEN: usize = 255;
const MAX_COMMENT_LEN: usize = 255;
// Points are stored as BIGINT; anything above this would wrap negative.
const MAX_POINTS_VALUE: u64 = i64::MAX as u64;

#[derive(Clone)]
struct AppState {
    service: Arc<LifecycleService>,
    ledger: Arc<AuraLedger>,
}

#[derive(Debug, Clone, Deserialize)]
struct LeaderboardQuery {
    limit: Option<i64>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "kindred_gateway=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8200")?;
    let pool = connect_database(&config.database_url).await?;
    let bus = Arc::new(RedisBus::connect(&config.redis_url)?);
    let store = Arc::new(PgStore::new(pool));

    let ledger = Arc::new(AuraLedger::new(store.clone(), store.clone(), bus.clone()));
    let service = Arc::new(LifecycleService::new(
        store.clone(),
        store.clone(),
        bus,
        store,
        ledger.clone(),
    ));

    let state = AppState { service, ledger };
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/raks", post(create_post))
        .route("/raks/{id}", get(get_post))
        .route("/raks/{id}/claim", post(claim))
        .route("/raks/{id}/collaborate", post(collaborate))
        .route("/raks/{id}/enable-collaborators", post(enable_collaborators))
        .route("/raks/{id}/status", post(update_status))
        .route("/raks/{id}/complete", post(complete))
        .route("/raks/{id}/pay-it-forward", post(pay_it_forward))
        .route("/raks/{id}/claimants", get(claimants))
        .route("/raks/{id}/collaborators", get(collaborators))
        .route("/users/{id}/aura", get(aura_profile))
        .route("/leaderboard", get(leaderboard))
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("kindred gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_post(
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), (StatusCode, String)> {
    validate_post_fields(&payload.title, &payload.description, payload.points_value)
        .map_err(invalid_request)?;

    let input = NewPost {
        title: payload.title.trim().to_string(),
        description: payload.description.trim().to_string(),
        media_ref: payload.media_ref,
        visibility: payload.visibility.unwrap_or(Visibility::Public),
        kind: payload.kind,
        points_value: payload.points_value.unwrap_or(0),
        allow_collaborators: payload.allow_collaborators.unwrap_or(false),
        anonymous: payload.anonymous.unwrap_or(false),
    };

    let post = state
        .service
        .create_post(payload.creator_id, input)
        .await
        .map_err(core_error)?;

    Ok((
        StatusCode::CREATED,
        Json(PostResponse::from_post(post, false)),
    ))
}

async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<PostResponse>, (StatusCode, String)> {
    let post = state.service.post(post_id).await.map_err(core_error)?;
    let paid_forward = state
        .service
        .paid_forward(post_id)
        .await
        .map_err(core_error)?;

    Ok(Json(PostResponse::from_post(post, paid_forward)))
}

async fn claim(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, (StatusCode, String)> {
    let comment = payload.comment.unwrap_or_default();
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(invalid_request(anyhow::anyhow!(
            "comment must be at most {MAX_COMMENT_LEN} characters"
        )));
    }

    let claim = state
        .service
        .claim(
            post_id,
            payload.user_id,
            comment.trim().to_string(),
            payload.anonymous.unwrap_or(false),
        )
        .await
        .map_err(core_error)?;

    Ok(Json(claim.into()))
}

async fn collaborate(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<ClaimRequest>,
) -> Result<Json<CollaborateResponse>, (StatusCode, String)> {
    let comment = payload.comment.unwrap_or_default();
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(invalid_request(anyhow::anyhow!(
            "comment must be at most {MAX_COMMENT_LEN} characters"
        )));
    }

    let collaborator = state
        .service
        .collaborate(
            post_id,
            payload.user_id,
            comment.trim().to_string(),
            payload.anonymous.unwrap_or(false),
        )
        .await
        .map_err(core_error)?;

    Ok(Json(collaborator.into()))
}

async fn enable_collaborators(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state
        .service
        .enable_collaborators(post_id, payload.user_id)
        .await
        .map_err(core_error)?;

    Ok(Json(json!({ "detail": "collaborators enabled" })))
}

async fn update_status(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let new_status = pg::parse_status(&payload.status).map_err(invalid_request)?;

    state
        .service
        .update_status(post_id, payload.user_id, new_status)
        .await
        .map_err(core_error)?;

    Ok(Json(json!({ "detail": "status updated" })))
}

async fn complete(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state
        .service
        .complete(post_id, payload.user_id)
        .await
        .map_err(core_error)?;

    Ok(Json(json!({ "detail": "post completed" })))
}

async fn pay_it_forward(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<PayItForwardRequest>,
) -> Result<(StatusCode, Json<PostResponse>), (StatusCode, String)> {
    validate_post_fields(&payload.title, &payload.description, payload.points_value)
        .map_err(invalid_request)?;

    let input = NewPost {
        title: payload.title.trim().to_string(),
        description: payload.description.trim().to_string(),
        media_ref: payload.media_ref,
        visibility: payload.visibility.unwrap_or(Visibility::Public),
        kind: payload.kind.unwrap_or(PostKind::Offer),
        points_value: payload.points_value.unwrap_or(0),
        allow_collaborators: payload.allow_collaborators.unwrap_or(false),
        anonymous: payload.anonymous.unwrap_or(false),
    };

    let new_post = state
        .service
        .pay_it_forward(post_id, payload.user_id, input)
        .await
        .map_err(core_error)?;

    Ok((
        StatusCode::CREATED,
        Json(PostResponse::from_post(new_post, false)),
    ))
}

async fn claimants(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<ClaimResponse>>, (StatusCode, String)> {
    let claims = state.service.claimants(post_id).await.map_err(core_error)?;
    Ok(Json(claims.into_iter().map(Into::into).collect()))
}

async fn collaborators(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<CollaborateResponse>>, (StatusCode, String)> {
    let members = state
        .service
        .collaborators(post_id)
        .await
        .map_err(core_error)?;
    Ok(Json(members.into_iter().map(Into::into).collect()))
}

async fn aura_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<AuraProfileResponse>, (StatusCode, String)> {
    let profile = state.ledger.profile(user_id).await.map_err(core_error)?;
    let badges = state.ledger.badges(user_id).await.map_err(core_error)?;

    Ok(Json(AuraProfileResponse {
        user_id: profile.user_id,
        points: profile.points,
        level: profile.level,
        sub_level: profile.sub_level,
        color: profile.color,
        percentage_to_next_level: percentage_to_next_level(profile.points),
        breakdown: ProvenanceBreakdown {
            from_claiming: profile.points_from_claiming,
            from_offers: profile.points_from_offers,
            from_pay_it_forward: profile.points_from_pay_it_forward,
        },
        badges,
    }))
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(10).clamp(1, 50) as usize;
    let ranked = state.ledger.leaderboard(limit).await.map_err(core_error)?;

    let entries = ranked
        .into_iter()
        .map(|profile| LeaderboardEntry {
            user_id: profile.user_id,
            points: profile.points,
            level: profile.level,
        })
        .collect();

    Ok(Json(LeaderboardResponse { entries }))
}

fn validate_post_fields(
    title: &str,
    description: &str,
    points_value: Option<u64>,
) -> AnyResult<()> {
    if title.trim().is_empty() {
        anyhow::bail!("title is required");
    }
    if title.trim().chars().count() > MAX_TITLE_LEN {
        anyhow::bail!("title must be at most {MAX_TITLE_LEN} characters");
    }
    if description.trim().is_empty() {
        anyhow::bail!("description is required");
    }
    if description.trim().chars().count() > MAX_DESCRIPTION_LEN {
        anyhow::bail!("description must be at most {MAX_DESCRIPTION_LEN} characters");
    }
    if points_value == Some(0) {
        anyhow::bail!("points_value must be at least 1");
    }
    if points_value.is_some_and(|v| v > MAX_POINTS_VALUE) {
        anyhow::bail!("points_value must be at most {MAX_POINTS_VALUE}");
    }

    Ok(())
}

fn core_error(err: CoreError) -> (StatusCode, String) {
    match err {
        CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, err.to_string()),
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CoreError::Storage(inner) => {
            error!("storage failure: {inner:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
        other => (StatusCode::BAD_REQUEST, other.to_string()),
    }
}

fn invalid_request(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::{MAX_POINTS_VALUE, MAX_TITLE_LEN, validate_post_fields};

    #[test]
    fn title_limit_counts_characters_not_bytes() {
        let title = "é".repeat(MAX_TITLE_LEN);
        assert!(validate_post_fields(&title, "help a neighbour", None).is_ok());

        let too_long = "é".repeat(MAX_TITLE_LEN + 1);
        assert!(validate_post_fields(&too_long, "help a neighbour", None).is_err());
    }

    #[test]
    fn points_value_must_fit_the_storage_range() {
        assert!(validate_post_fields("title", "desc", Some(MAX_POINTS_VALUE)).is_ok());
        assert!(validate_post_fields("title", "desc", Some(MAX_POINTS_VALUE + 1)).is_err());
        assert!(validate_post_fields("title", "desc", Some(0)).is_err());
    }
}

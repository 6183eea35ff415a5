// HTTP surface: liveness, health, metrics, ranked views and thin queue and
// challenge actions for front ends that speak HTTP.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::challenge::{ChallengeCoordinator, ChallengeError, Participant};
use crate::coordinator::RankedMatchCoordinator;
use crate::db::{Database, PlayerId};
use crate::error::RankedError;
use crate::metrics;
use crate::notify::NotifyHandle;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub ranked: Arc<RankedMatchCoordinator>,
    pub challenges: Arc<ChallengeCoordinator>,
}

#[derive(Deserialize)]
pub struct JoinQueueRequest {
    pub player_id: PlayerId,
    pub chat_id: i64,
}

#[derive(Deserialize)]
pub struct PlayerRequest {
    pub player_id: PlayerId,
}

#[derive(Deserialize)]
pub struct ChallengeRequest {
    pub challenger_id: PlayerId,
    pub target_id: PlayerId,
    pub challenger_chat: i64,
    pub target_chat: i64,
}

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn internal_error(e: sqlx::Error) -> impl IntoResponse {
    tracing::error!("Database error: {e}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn ranked_error(e: RankedError) -> axum::response::Response {
    let status = match &e {
        RankedError::Storage(e) => {
            tracing::error!("Database error: {e}");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                .into_response();
        }
        RankedError::Denied(_) => StatusCode::FORBIDDEN,
        RankedError::AlreadyQueued(_) | RankedError::InMatch(_) => StatusCode::CONFLICT,
        RankedError::UnknownPlayer(_) | RankedError::FlagNotReviewable(_) => StatusCode::NOT_FOUND,
    };
    json_error(status, &e.to_string()).into_response()
}

fn challenge_error(e: ChallengeError) -> axum::response::Response {
    let status = match &e {
        ChallengeError::Storage(e) => {
            tracing::error!("Database error: {e}");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                .into_response();
        }
        ChallengeError::Denied(_) | ChallengeError::NotParticipant(_) => StatusCode::FORBIDDEN,
        ChallengeError::NotFound(_) | ChallengeError::NoCareer(_) => StatusCode::NOT_FOUND,
        ChallengeError::Busy(_)
        | ChallengeError::NotPending(_)
        | ChallengeError::Cooldown
        | ChallengeError::TooFrequent { .. } => StatusCode::CONFLICT,
        ChallengeError::SelfChallenge
        | ChallengeError::ServiceAccount
        | ChallengeError::TierTooFar { .. } => StatusCode::BAD_REQUEST,
    };
    json_error(status, &e.to_string()).into_response()
}

pub fn router(ranked: Arc<RankedMatchCoordinator>, challenges: Arc<ChallengeCoordinator>) -> Router {
    let state = AppState {
        db: ranked.db().clone(),
        ranked,
        challenges,
    };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/queue/status", get(queue_status))
        .route("/api/careers/{id}", get(get_career))
        .route("/api/unsettled", get(list_unsettled))
        .route("/api/queue/join", post(join_queue))
        .route("/api/queue/leave", post(leave_queue))
        .route("/api/challenges", post(issue_challenge))
        .route("/api/challenges/{id}/accept", post(accept_challenge))
        .route("/api/challenges/{id}/decline", post(decline_challenge))
        .route("/api/challenges/{id}/cancel", post(cancel_challenge))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn index() -> &'static str {
    "ranked matchmaking is running"
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "ok" })),
        ),
        Err(e) => {
            tracing::warn!("health check: database unreachable: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "unreachable" })),
            )
        }
    }
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

async fn queue_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.ranked.queue().status();
    let active_matches = state.ranked.lobby().active_matches();
    (
        StatusCode::OK,
        Json(json!({ "queue": status, "active_matches": active_matches })),
    )
}

async fn get_career(State(state): State<AppState>, Path(id): Path<PlayerId>) -> impl IntoResponse {
    match state.db.get_career(id).await {
        Ok(Some(career)) => (StatusCode::OK, Json(json!(career))).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "Career not found").into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn list_unsettled(State(state): State<AppState>) -> impl IntoResponse {
    let unsettled: Vec<_> = state
        .ranked
        .unsettled()
        .into_iter()
        .map(|m| {
            json!({
                "match_id": m.match_id,
                "source": m.source,
                "played_at": m.played_at,
                "error": m.error,
            })
        })
        .collect();
    (StatusCode::OK, Json(json!(unsettled)))
}

// ── Queue actions ────────────────────────────────────────────────────

async fn join_queue(
    State(state): State<AppState>,
    Json(req): Json<JoinQueueRequest>,
) -> impl IntoResponse {
    let notify = NotifyHandle {
        chat_id: req.chat_id,
    };
    match state.ranked.join_queue(req.player_id, notify).await {
        Ok(entry) => (
            StatusCode::CREATED,
            Json(json!({
                "player_id": entry.player_id,
                "rating": entry.rating,
                "tier": entry.tier.to_string(),
            })),
        )
            .into_response(),
        Err(e) => ranked_error(e),
    }
}

async fn leave_queue(
    State(state): State<AppState>,
    Json(req): Json<PlayerRequest>,
) -> impl IntoResponse {
    if state.ranked.leave_queue(req.player_id).await {
        (StatusCode::OK, Json(json!({ "left": true }))).into_response()
    } else {
        json_error(StatusCode::NOT_FOUND, "Player is not queued").into_response()
    }
}

// ── Challenge actions ────────────────────────────────────────────────

async fn issue_challenge(
    State(state): State<AppState>,
    Json(req): Json<ChallengeRequest>,
) -> impl IntoResponse {
    let challenger = Participant::human(
        req.challenger_id,
        NotifyHandle {
            chat_id: req.challenger_chat,
        },
    );
    let target = Participant::human(
        req.target_id,
        NotifyHandle {
            chat_id: req.target_chat,
        },
    );
    match state.challenges.issue(challenger, target).await {
        Ok(challenge) => (StatusCode::CREATED, Json(json!(challenge))).into_response(),
        Err(e) => challenge_error(e),
    }
}

async fn accept_challenge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PlayerRequest>,
) -> impl IntoResponse {
    // The match plays out in the background; its result arrives as notices.
    match state.challenges.accept(&id, req.player_id).await {
        Ok(_) => (
            StatusCode::ACCEPTED,
            Json(json!({ "challenge_id": id, "status": "accepted" })),
        )
            .into_response(),
        Err(e) => challenge_error(e),
    }
}

async fn decline_challenge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PlayerRequest>,
) -> impl IntoResponse {
    match state.challenges.decline(&id, req.player_id).await {
        Ok(challenge) => (StatusCode::OK, Json(json!(challenge))).into_response(),
        Err(e) => challenge_error(e),
    }
}

async fn cancel_challenge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PlayerRequest>,
) -> impl IntoResponse {
    match state.challenges.cancel(&id, req.player_id).await {
        Ok(challenge) => (StatusCode::OK, Json(json!(challenge))).into_response(),
        Err(e) => challenge_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RankedPolicy;
    use crate::engine::Unattached;
    use crate::notify::TracingNotifier;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn app() -> (Router, Arc<Database>) {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let ranked = RankedMatchCoordinator::new(
            db.clone(),
            Arc::new(Unattached),
            Arc::new(TracingNotifier::default()),
            RankedPolicy::default(),
            None,
        );
        let challenges = ChallengeCoordinator::new(ranked.clone());
        (router(ranked, challenges), db)
    }

    async fn post_json(
        app: Router,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_database() {
        let (app, _) = app().await;
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn test_career_lookup() {
        let (app, db) = app().await;
        db.get_or_create_career(7, 0).await.unwrap();

        let (status, body) = get_json(app.clone(), "/api/careers/7").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rating"], 1000);
        assert_eq!(body["rank_tier"], "Gold I");

        let (status, _) = get_json(app, "/api/careers/8").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_queue_status_empty() {
        let (app, _) = app().await;
        let (status, body) = get_json(app, "/api/queue/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queue"]["depth"], 0);
        assert_eq!(body["active_matches"], 0);
    }

    #[tokio::test]
    async fn test_join_and_leave_queue() {
        let (app, _) = app().await;

        let (status, body) = post_json(
            app.clone(),
            "/api/queue/join",
            json!({ "player_id": 1, "chat_id": 10 }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["rating"], 1000);

        let (_, body) = get_json(app.clone(), "/api/queue/status").await;
        assert_eq!(body["queue"]["depth"], 1);

        let (status, _) = post_json(
            app.clone(),
            "/api/queue/join",
            json!({ "player_id": 1, "chat_id": 10 }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = post_json(app.clone(), "/api/queue/leave", json!({ "player_id": 1 })).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = post_json(app.clone(), "/api/queue/leave", json!({ "player_id": 1 })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = get_json(app, "/api/queue/status").await;
        assert_eq!(body["queue"]["depth"], 0);
    }

    #[tokio::test]
    async fn test_suspended_player_cannot_queue() {
        let (app, db) = app().await;
        db.get_or_create_career(3, 0).await.unwrap();
        db.set_rating_suspended(3, true).await.unwrap();

        let (status, _) = post_json(
            app,
            "/api/queue/join",
            json!({ "player_id": 3, "chat_id": 30 }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_challenge_issue_and_decline() {
        let (app, db) = app().await;
        db.get_or_create_career(1, 0).await.unwrap();
        db.get_or_create_career(2, 0).await.unwrap();

        let (status, challenge) = post_json(
            app.clone(),
            "/api/challenges",
            json!({ "challenger_id": 1, "target_id": 2, "challenger_chat": 10, "target_chat": 20 }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(challenge["status"], "pending");
        let id = challenge["challenge_id"].as_str().unwrap().to_string();

        // Only the target may decline.
        let (status, _) = post_json(
            app.clone(),
            &format!("/api/challenges/{id}/decline"),
            json!({ "player_id": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = post_json(
            app.clone(),
            &format!("/api/challenges/{id}/decline"),
            json!({ "player_id": 2 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "declined");

        let (status, body) = post_json(
            app.clone(),
            &format!("/api/challenges/{id}/accept"),
            json!({ "player_id": 2 }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "challenge is already declined");

        let (status, _) = post_json(
            app,
            "/api/challenges/nope/accept",
            json!({ "player_id": 2 }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_self_challenge_is_bad_request() {
        let (app, _) = app().await;
        let (status, _) = post_json(
            app,
            "/api/challenges",
            json!({ "challenger_id": 4, "target_id": 4, "challenger_chat": 40, "target_chat": 40 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

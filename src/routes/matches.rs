use crate::core::{ActionOutcome, MatchEngine};
use crate::error::MatchError;
use crate::models::{
    ActionResponse, ErrorResponse, FindCandidatesRequest, FindCandidatesResponse, HealthResponse,
    HistoryQuery, MatchAction, MutualMatchesQuery, PageResponse, RecordActionRequest, ScoreRequest,
    WithdrawActionRequest,
};
use crate::services::{CacheKey, CacheManager, MatchRepository};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchEngine<dyn MatchRepository>>,
    pub cache: Option<Arc<CacheManager>>,
}

/// Configure all match-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/matches/score", web::post().to(score_profile))
        .route("/matches/candidates", web::post().to(find_candidates))
        .route("/matches/action", web::post().to(record_action))
        .route("/matches/action", web::delete().to(withdraw_action))
        .route("/matches/history", web::get().to(match_history))
        .route("/matches/mutual", web::get().to(mutual_matches))
        .route("/ratings/{profile_id}", web::get().to(get_rating));
}

fn error_body(status: StatusCode, error: &str, message: String) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message,
        status_code: status.as_u16(),
    })
}

fn validation_failed(errors: validator::ValidationErrors) -> HttpResponse {
    error_body(StatusCode::BAD_REQUEST, "validation_failed", errors.to_string())
}

/// Map engine errors onto HTTP responses
pub fn match_error_response(err: &MatchError) -> HttpResponse {
    let (status, code) = match err {
        MatchError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        MatchError::SelfMatch(_) => (StatusCode::UNPROCESSABLE_ENTITY, "self_match"),
        MatchError::UnknownAction(_) => (StatusCode::UNPROCESSABLE_ENTITY, "unknown_action"),
        MatchError::DeadlineExceeded { .. } => (StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded"),
        MatchError::Conflict { .. } => (StatusCode::CONFLICT, "concurrent_update"),
        MatchError::InvalidConfig(_) => (StatusCode::INTERNAL_SERVER_ERROR, "invalid_config"),
        MatchError::Repository { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure"),
    };

    if status.is_server_error() {
        tracing::error!("{}", err);
    } else {
        tracing::debug!("Rejected request: {}", err);
    }

    error_body(status, code, err.to_string())
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let healthy = state.engine.health_check().await;
    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// POST /api/v1/matches/score
async fn score_profile(state: web::Data<AppState>, req: web::Json<ScoreRequest>) -> impl Responder {
    HttpResponse::Ok().json(state.engine.score(&req.profile, &req.preferences))
}

/// Rank candidates for a viewer
///
/// POST /api/v1/matches/candidates
///
/// ```json
/// {
///   "viewerId": "string",
///   "seekingBride": true,
///   "preferences": { "minAge": 24, "maxAge": 30, "communities": ["..."] },
///   "limit": 20,
///   "offset": 0,
///   "excludeIds": ["string"],
///   "deadlineMs": 500
/// }
/// ```
async fn find_candidates(
    state: web::Data<AppState>,
    req: web::Json<FindCandidatesRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for candidates request: {:?}", errors);
        return validation_failed(errors);
    }

    let req = req.into_inner();
    let cache_key = match (&state.cache, CacheKey::fingerprint(&req)) {
        (Some(_), Ok(fingerprint)) => Some(CacheKey::candidates(
            &req.viewer_id,
            req.offset,
            req.limit,
            fingerprint,
        )),
        _ => None,
    };

    if let (Some(cache), Some(key)) = (&state.cache, &cache_key) {
        if let Ok(cached) = cache.get::<FindCandidatesResponse>(key).await {
            tracing::debug!("Serving cached candidates for {}", req.viewer_id);
            return HttpResponse::Ok().json(cached);
        }
    }

    let deadline = req.deadline_ms.map(Duration::from_millis);
    let mut query = state
        .engine
        .candidate_query(req.viewer_id.clone(), req.preferences);
    query.seeking_bride = req.seeking_bride;
    query.exclude_ids = req.exclude_ids;
    query.limit = req.limit;
    query.offset = req.offset;

    let result = match state.engine.find_candidates(query, deadline).await {
        Ok(result) => result,
        Err(e) => return match_error_response(&e),
    };

    let response = FindCandidatesResponse {
        candidates: result.matches,
        total_candidates: result.total_candidates,
    };

    if let (Some(cache), Some(key)) = (&state.cache, &cache_key) {
        if let Err(e) = cache.set(key, &response).await {
            tracing::warn!("Failed to cache candidates for {}: {}", req.viewer_id, e);
        }
    }

    HttpResponse::Ok().json(response)
}

async fn invalidate_candidates(state: &AppState, viewer_id: &str) {
    if let Some(cache) = &state.cache {
        if let Err(e) = cache.invalidate_viewer(viewer_id).await {
            tracing::warn!("Failed to invalidate candidates of {}: {}", viewer_id, e);
        }
    }
}

fn action_response(outcome: ActionOutcome) -> HttpResponse {
    HttpResponse::Ok().json(ActionResponse {
        success: true,
        request_id: uuid::Uuid::new_v4().to_string(),
        outcome,
    })
}

/// Record a like, dislike or pass
///
/// POST /api/v1/matches/action
///
/// ```json
/// { "viewerId": "string", "targetId": "string", "action": "liked|disliked|passed" }
/// ```
async fn record_action(
    state: web::Data<AppState>,
    req: web::Json<RecordActionRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let action = match req.action.parse::<MatchAction>() {
        Ok(action) => action,
        Err(e) => return match_error_response(&e),
    };

    match state
        .engine
        .record_action(&req.viewer_id, &req.target_id, action)
        .await
    {
        Ok(outcome) => {
            if !outcome.duplicate {
                invalidate_candidates(&state, &req.viewer_id).await;
            }
            action_response(outcome)
        }
        Err(e) => match_error_response(&e),
    }
}

/// DELETE /api/v1/matches/action
async fn withdraw_action(
    state: web::Data<AppState>,
    req: web::Json<WithdrawActionRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    match state
        .engine
        .withdraw_action(&req.viewer_id, &req.target_id)
        .await
    {
        Ok(outcome) => {
            if !outcome.duplicate {
                invalidate_candidates(&state, &req.viewer_id).await;
            }
            action_response(outcome)
        }
        Err(e) => match_error_response(&e),
    }
}

/// GET /api/v1/matches/history?viewerId={id}&status={liked|disliked|passed}
async fn match_history(state: web::Data<AppState>, query: web::Query<HistoryQuery>) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_failed(errors);
    }

    let status = match query.status.as_deref().map(str::parse::<MatchAction>) {
        None => None,
        Some(Ok(action)) => Some(action),
        Some(Err(e)) => return match_error_response(&e),
    };

    let limit = state.engine.options().effective_limit(query.limit);
    match state
        .engine
        .match_history(&query.viewer_id, status, limit, query.offset)
        .await
    {
        Ok(page) => HttpResponse::Ok().json(PageResponse {
            items: page.items,
            total: page.total,
            limit,
            offset: query.offset,
        }),
        Err(e) => match_error_response(&e),
    }
}

/// GET /api/v1/matches/mutual?viewerId={id}
async fn mutual_matches(
    state: web::Data<AppState>,
    query: web::Query<MutualMatchesQuery>,
) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_failed(errors);
    }

    let limit = state.engine.options().effective_limit(query.limit);
    match state
        .engine
        .mutual_matches(&query.viewer_id, limit, query.offset)
        .await
    {
        Ok(page) => HttpResponse::Ok().json(PageResponse {
            items: page.items,
            total: page.total,
            limit,
            offset: query.offset,
        }),
        Err(e) => match_error_response(&e),
    }
}

/// GET /api/v1/ratings/{profile_id}
async fn get_rating(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.engine.rating(&path.into_inner()).await {
        Ok(rating) => HttpResponse::Ok().json(rating),
        Err(e) => match_error_response(&e),
    }
}

//! Operator endpoints under `/v1/admin`, guarded by a static bearer token.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::state::{OptionalSchedulerHandle, ServerState};
use super::ServerConfig;
use crate::background_jobs::JobError;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;
const DEFAULT_AUDIT_LIMIT: usize = 50;
const MAX_AUDIT_LIMIT: usize = 500;

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn scheduler_unavailable() -> Response {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "Job scheduler not available",
    )
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Compares without short-circuiting on the first differing byte.
fn tokens_match(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

async fn require_admin_token(
    State(config): State<ServerConfig>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = config.admin_token.as_deref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Admin API not available: no admin token configured",
        );
    };

    match bearer_token(&request) {
        Some(given) if tokens_match(given, expected) => next.run(request).await,
        Some(_) => {
            warn!("Rejected admin request with an invalid token");
            StatusCode::UNAUTHORIZED.into_response()
        }
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn list_jobs(State(scheduler): State<OptionalSchedulerHandle>) -> Response {
    let Some(scheduler) = scheduler else {
        return scheduler_unavailable();
    };
    match scheduler.list_jobs().await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => {
            error!("Failed to list jobs: {:?}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_job(
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(job_id): Path<String>,
) -> Response {
    let Some(scheduler) = scheduler else {
        return scheduler_unavailable();
    };
    match scheduler.get_job(&job_id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Job not found"),
        Err(err) => {
            error!("Failed to get job {}: {:?}", job_id, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn trigger_job(
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(job_id): Path<String>,
) -> Response {
    let Some(scheduler) = scheduler else {
        return scheduler_unavailable();
    };
    match scheduler.trigger_job(&job_id).await {
        Ok(()) => {
            info!("Job {} triggered through the admin API", job_id);
            (
                StatusCode::ACCEPTED,
                Json(json!({ "job_id": job_id, "status": "triggered" })),
            )
                .into_response()
        }
        Err(JobError::NotFound) => error_response(StatusCode::NOT_FOUND, "Job not found"),
        Err(JobError::AlreadyRunning) => {
            error_response(StatusCode::CONFLICT, "Job is already running")
        }
        Err(err) => {
            error!("Failed to trigger job {}: {}", job_id, err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

#[derive(Deserialize, Debug)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn get_job_history(
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(job_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let Some(scheduler) = scheduler else {
        return scheduler_unavailable();
    };
    if !scheduler.job_exists(&job_id).await {
        return error_response(StatusCode::NOT_FOUND, "Job not found");
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    match scheduler.get_job_history(&job_id, limit) {
        Ok(history) => Json(history).into_response(),
        Err(err) => {
            error!("Failed to read history of job {}: {:?}", job_id, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize, Debug)]
struct AuditQuery {
    job_id: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn get_job_audit_log(
    State(scheduler): State<OptionalSchedulerHandle>,
    Query(query): Query<AuditQuery>,
) -> Response {
    let Some(scheduler) = scheduler else {
        return scheduler_unavailable();
    };

    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).min(MAX_AUDIT_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let entries = match &query.job_id {
        Some(job_id) => scheduler.get_job_audit_log_by_job(job_id, limit, offset),
        None => scheduler.get_job_audit_log(limit, offset),
    };
    match entries {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => {
            error!("Failed to read job audit log: {:?}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn make_admin_routes(state: ServerState) -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/audit", get(get_job_audit_log))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/trigger", post(trigger_job))
        .route("/jobs/{id}/history", get(get_job_history))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret", "s3creT"));
        assert!(!tokens_match("s3cret", "s3cret-longer"));
        assert!(!tokens_match("", "s3cret"));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), Some("abc"));

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(bearer_token(&request), None);
    }
}

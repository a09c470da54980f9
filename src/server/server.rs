use anyhow::{Context, Result};
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::admin::make_admin_routes;
use super::metrics::metrics_handler;
use super::state::{GuardedRateLimiter, OptionalSchedulerHandle, ServerState};
use super::{log_requests, ServerConfig};
use crate::changelog::{ChangelogError, ChangelogSubscriptions};
use crate::entitlements::{
    check_entitlement, usage_level, usage_percentage, LimitKey, PlanSummary, PlanTier, UsageLevel,
};
use crate::rate_limit::RateLimitError;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    })
}

#[derive(Deserialize, Debug)]
struct SubscribeBody {
    pub email: String,
}

#[derive(Deserialize, Debug)]
struct UnsubscribeBody {
    pub token: String,
}

#[derive(Deserialize, Debug)]
struct SubscribedQuery {
    pub email: String,
}

async fn subscribe_to_changelog(
    State(changelog): State<ChangelogSubscriptions>,
    Json(body): Json<SubscribeBody>,
) -> Response {
    match changelog.subscribe(&body.email) {
        Ok(outcome) => Json(outcome.status()).into_response(),
        Err(err @ ChangelogError::InvalidEmail(_)) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        Err(ChangelogError::Store(err)) => {
            error!("Changelog subscribe failed: {:?}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn unsubscribe_from_changelog(
    State(changelog): State<ChangelogSubscriptions>,
    Json(body): Json<UnsubscribeBody>,
) -> Response {
    match changelog.unsubscribe(&body.token) {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => {
            error!("Changelog unsubscribe failed: {:?}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_changelog_subscribed(
    State(changelog): State<ChangelogSubscriptions>,
    Query(query): Query<SubscribedQuery>,
) -> Response {
    match changelog.is_subscribed(&query.email) {
        Ok(subscribed) => Json(json!({ "subscribed": subscribed })).into_response(),
        Err(err) => {
            error!("Changelog lookup failed: {:?}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_rate_limits(State(rate_limiter): State<GuardedRateLimiter>) -> impl IntoResponse {
    Json(rate_limiter.configured_policies().clone())
}

#[derive(Deserialize, Debug)]
struct RateLimitCheckQuery {
    pub actor: String,
}

async fn check_rate_limit(
    State(rate_limiter): State<GuardedRateLimiter>,
    Path(policy): Path<String>,
    Query(query): Query<RateLimitCheckQuery>,
) -> Response {
    match rate_limiter.check(&policy, &query.actor) {
        Ok(status) => Json(status).into_response(),
        Err(err @ RateLimitError::UnknownPolicy(_)) => {
            error_response(StatusCode::NOT_FOUND, &err.to_string())
        }
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn get_plans() -> impl IntoResponse {
    Json(
        PlanTier::ALL
            .into_iter()
            .map(PlanSummary::of)
            .collect::<Vec<_>>(),
    )
}

#[derive(Deserialize, Debug)]
struct PlanUsageQuery {
    pub key: String,
    pub current: u64,
}

#[derive(Serialize, Debug)]
struct PlanUsage {
    pub tier: PlanTier,
    pub key: LimitKey,
    pub current: u64,
    pub percentage: f64,
    pub level: UsageLevel,
    /// Whether one more unit would still fit in the plan.
    pub allowed: bool,
}

async fn get_plan_usage(Path(tier): Path<String>, Query(query): Query<PlanUsageQuery>) -> Response {
    let Some(tier) = PlanTier::ALL.into_iter().find(|t| t.as_str() == tier) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown plan tier");
    };
    let Some(key) = LimitKey::ALL.into_iter().find(|k| k.as_str() == query.key) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown limit key");
    };

    let percentage = usage_percentage(query.current, tier.limit(key));
    Json(PlanUsage {
        tier,
        key,
        current: query.current,
        percentage,
        level: usage_level(percentage),
        allowed: check_entitlement(tier, key, query.current).is_ok(),
    })
    .into_response()
}

impl ServerState {
    fn new(
        config: ServerConfig,
        rate_limiter: GuardedRateLimiter,
        changelog: ChangelogSubscriptions,
        scheduler_handle: OptionalSchedulerHandle,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            hash: env!("GIT_HASH").to_owned(),
            rate_limiter,
            changelog,
            scheduler_handle,
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    rate_limiter: GuardedRateLimiter,
    changelog: ChangelogSubscriptions,
    scheduler_handle: OptionalSchedulerHandle,
) -> Router {
    let state = ServerState::new(config, rate_limiter, changelog, scheduler_handle);

    let changelog_routes: Router = Router::new()
        .route("/subscribe", post(subscribe_to_changelog))
        .route("/unsubscribe", post(unsubscribe_from_changelog))
        .route("/subscribed", get(get_changelog_subscribed))
        .with_state(state.clone());

    let rate_limit_routes: Router = Router::new()
        .route("/", get(get_rate_limits))
        .route("/{policy}/check", get(check_rate_limit))
        .with_state(state.clone());

    let plan_routes: Router = Router::new()
        .route("/", get(get_plans))
        .route("/{tier}/usage", get(get_plan_usage));

    let home_router: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone());

    home_router
        .nest("/v1/changelog", changelog_routes)
        .nest("/v1/rate-limits", rate_limit_routes)
        .nest("/v1/plans", plan_routes)
        .nest("/v1/admin", make_admin_routes(state.clone()))
        .layer(middleware::from_fn_with_state(state, log_requests))
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serves the API on `config.port` and, unless `metrics_port` is 0, the
/// prometheus endpoint on `metrics_port`. Returns once `shutdown` is
/// cancelled and in-flight requests have drained.
pub async fn run_server(
    config: ServerConfig,
    rate_limiter: GuardedRateLimiter,
    changelog: ChangelogSubscriptions,
    scheduler_handle: OptionalSchedulerHandle,
    metrics_port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, rate_limiter, changelog, scheduler_handle);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;

    if metrics_port != 0 {
        let metrics_listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port))
            .await
            .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;
        let metrics_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = axum::serve(metrics_listener, make_metrics_app())
                .with_graceful_shutdown(metrics_shutdown.cancelled_owned())
                .await
            {
                error!("Metrics server stopped with error: {:?}", err);
            }
        });
        info!("Metrics available at port {}", metrics_port);
    }

    info!("Ready to serve at port {}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

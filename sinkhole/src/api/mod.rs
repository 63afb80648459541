use std::{path::Path, sync::Arc};

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::stats::{BlockedDomainCounter, StatsAggregator, StatsSnapshot};

/// Ranking size when the client gives none, or an unusable one.
const DEFAULT_TOP_LIMIT: usize = 10;

type SharedStats = Arc<StatsAggregator>;

/// Dashboard routes plus the static dashboard files.
pub fn router(stats: SharedStats, dashboard_dir: &Path) -> Router {
    let api = Router::new()
        .route("/stats", get(stats_handler))
        .route("/top-blocked", get(top_blocked_handler))
        .with_state(stats);

    Router::new()
        .nest("/api", api)
        .fallback_service(ServeDir::new(dashboard_dir))
        .layer(CorsLayer::permissive())
}

/// Serve the dashboard until `cancel` fires.
pub async fn serve_web(listener: TcpListener, app: Router, cancel: CancellationToken) -> anyhow::Result<()> {
    tracing::info!("HTTP listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await?;

    tracing::debug!("HTTP server stopped");
    Ok(())
}

async fn stats_handler(State(stats): State<SharedStats>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}

#[derive(Debug, Deserialize)]
struct TopBlockedParams {
    limit: Option<String>,
}

async fn top_blocked_handler(
    State(stats): State<SharedStats>,
    Query(params): Query<TopBlockedParams>,
) -> Json<Vec<BlockedDomainCounter>> {
    let limit = parse_limit(params.limit.as_deref());
    Json(stats.top_blocked(limit))
}

fn parse_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|&n| n > 0)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_TOP_LIMIT)
}

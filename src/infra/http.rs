//! HTTP surface: three routes over the counter state and asset source.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use bytes::Bytes;
use metrics::counter;
use tracing::{error, warn};

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        snapshot::SnapshotCell,
        stats::{CachedStats, DurableStats},
    },
    infra::assets::AssetSource,
    presentation::views::render_homepage,
};

/// Counter state as wired for the configured strategy.
#[derive(Clone)]
pub enum CounterRuntime {
    /// Stale-but-fast: cached snapshot served immediately, refresh and
    /// visit count applied in the background.
    Cached {
        stats: Arc<CachedStats>,
        snapshot: Arc<SnapshotCell>,
    },
    /// Every request reads and writes through the store.
    Durable { stats: Arc<DurableStats> },
}

#[derive(Clone)]
pub struct HttpState {
    pub counters: CounterRuntime,
    pub assets: Arc<AssetSource>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/like", post(like))
        .route("/public/{name}", get(serve_public))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
}

async fn index(State(state): State<HttpState>) -> Response {
    match &state.counters {
        CounterRuntime::Cached { stats, snapshot } => {
            let body = snapshot.current();
            spawn_snapshot_refresh(Arc::clone(stats), Arc::clone(snapshot));
            html_response(body)
        }
        CounterRuntime::Durable { stats } => match stats.record_visit().await {
            Ok(pair) => match render_homepage(pair) {
                Ok(body) => html_response(body),
                Err(err) => HttpError::from(err).into_response(),
            },
            Err(err) => err.into_response(),
        },
    }
}

fn html_response(body: Bytes) -> Response {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        Body::from(body),
    )
        .into_response()
}

async fn like(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    match &state.counters {
        CounterRuntime::Cached { stats, .. } => {
            stats.record_like();
        }
        CounterRuntime::Durable { stats } => {
            if let Err(err) = stats.record_like().await {
                return err.into_response();
            }
        }
    }
    redirect_back(&headers)
}

async fn serve_public(State(state): State<HttpState>, Path(name): Path<String>) -> Response {
    state.assets.serve(&name).await
}

/// Send the browser back where the like came from, or home.
fn redirect_back(headers: &HeaderMap) -> Response {
    let target = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("/");
    Redirect::to(target).into_response()
}

/// Hand the current snapshot's replacement off to a background task: count
/// the visit, render a fresh buffer, swap the reference. Fire-and-forget;
/// a render failure keeps the previous snapshot in place.
fn spawn_snapshot_refresh(stats: Arc<CachedStats>, snapshot: Arc<SnapshotCell>) {
    tokio::spawn(async move {
        let pair = stats.record_visit();
        match render_homepage(pair) {
            Ok(bytes) => {
                snapshot.replace(bytes);
                counter!("jairo_snapshot_refresh_total").increment(1);
            }
            Err(err) => {
                counter!("jairo_snapshot_refresh_error_total").increment(1);
                error!(
                    target_module = "infra::http::snapshot_refresh",
                    error = %err,
                    "failed to refresh homepage snapshot"
                );
            }
        }
    });
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target_module = "jairo::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                "request failed",
            );
        } else {
            warn!(
                target_module = "jairo::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                "client request error",
            );
        }
    }

    response
}

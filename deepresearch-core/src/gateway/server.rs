//! HTTP/SSE gateway server built on axum.

use super::GatewayConfig;
use super::auth::GatewayAuth;
use super::events::{ErrorResponse, HealthResponse, QueryRequest, QueryResponse};
use super::registry::{SubscriberGuard, TaskRegistry};
use crate::config::default_data_dir;
use crate::research::{ProgressEvent, ProgressSink, Researcher, TaskRecord};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::Utc;
use futures::{Stream, StreamExt, future, stream};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Thread-safe shared gateway reference for axum handlers.
pub type SharedGateway = Arc<Mutex<GatewayServer>>;

pub fn shared_gateway(server: GatewayServer) -> SharedGateway {
    Arc::new(Mutex::new(server))
}

/// The research gateway: one controller per submitted query.
pub struct GatewayServer {
    config: GatewayConfig,
    auth: GatewayAuth,
    registry: TaskRegistry,
    researcher: Researcher,
    started_at: chrono::DateTime<Utc>,
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("config", &self.config)
            .field("running", &self.registry.running_count())
            .field("total", &self.registry.total_count())
            .finish()
    }
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, researcher: Researcher) -> Self {
        let auth = GatewayAuth::from_config(&config);
        let registry = TaskRegistry::new(config.event_buffer);
        Self {
            config,
            auth,
            registry,
            researcher,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn auth(&self) -> &GatewayAuth {
        &self.auth
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Uptime in seconds since the server was created.
    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }

    /// Where finished task records are written.
    pub fn data_dir(&self) -> PathBuf {
        self.config
            .data_dir
            .clone()
            .unwrap_or_else(default_data_dir)
    }
}

/// Read a saved task record off the async runtime.
async fn load_saved(data_dir: PathBuf, request_id: Uuid) -> Option<TaskRecord> {
    let loaded = tokio::task::spawn_blocking(move || TaskRecord::load(&data_dir, &request_id)).await;
    match loaded {
        Ok(Ok(record)) => record,
        Ok(Err(e)) => {
            warn!(%request_id, error = %e, "Failed to read saved task");
            None
        }
        Err(e) => {
            warn!(%request_id, error = %e, "Saved task read did not complete");
            None
        }
    }
}

/// Build the axum router for the gateway.
pub fn router(shared: SharedGateway) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/query", post(submit_handler))
        .route("/api/v1/stream/{id}", get(stream_handler))
        .route("/api/v1/task/{id}", get(task_handler).delete(cancel_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "Missing or invalid bearer token")
}

fn not_found(request_id: &Uuid) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Unknown request id {request_id}"),
    )
}

/// Health check endpoint.
async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let gw = gw.lock().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        running: gw.registry.running_count(),
        total: gw.registry.total_count(),
        uptime_secs: gw.uptime_secs(),
    })
}

/// `POST /api/v1/query`: start a run in the background and return its id.
async fn submit_handler(
    State(shared): State<SharedGateway>,
    headers: HeaderMap,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let mut gw = shared.lock().await;
    if !gw.auth.authorize(&headers) {
        return unauthorized();
    }
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let query = request.q.trim().to_string();
    if query.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Query (q) is required");
    }
    let limit = gw.config.max_running_tasks;
    if limit > 0 && gw.registry.running_count() >= limit {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            format!("Too many running queries (limit {limit})"),
        );
    }

    let budget = request.budget.unwrap_or(gw.researcher.config().budget);
    let max_bad_attempts = request
        .max_bad_attempt
        .unwrap_or(gw.researcher.config().max_bad_attempts);
    if budget == 0 {
        return error_response(StatusCode::BAD_REQUEST, "budget must be at least 1");
    }
    if max_bad_attempts == 0 {
        return error_response(StatusCode::BAD_REQUEST, "maxBadAttempt must be at least 1");
    }
    let (request_id, channel, cancel) = gw.registry.create(&query, budget, max_bad_attempts);
    let sink: Arc<dyn ProgressSink> = channel;
    let controller = gw
        .researcher
        .controller()
        .with_sink(sink)
        .with_cancellation(cancel);
    drop(gw);

    info!(%request_id, query = %query, budget, max_bad_attempts, "Query accepted");
    let shared_bg = shared.clone();
    tokio::spawn(async move {
        let result = controller.run(&query, budget, max_bad_attempts).await;
        let (record, persist_dir) = {
            let mut gw = shared_bg.lock().await;
            let record = gw.registry.finish(&request_id, &result);
            let dir = gw.config.persist_tasks.then(|| gw.data_dir());
            (record, dir)
        };
        if let (Some(record), Some(dir)) = (record, persist_dir) {
            let saved = tokio::task::spawn_blocking(move || record.save(&dir)).await;
            match saved {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(%request_id, error = %e, "Failed to save task record"),
                Err(e) => warn!(%request_id, error = %e, "Task record save did not complete"),
            }
        }

        let mut gw = shared_bg.lock().await;
        let keep = gw.config.retain_finished_tasks;
        gw.registry.evict_finished(keep);
    });

    (StatusCode::ACCEPTED, Json(QueryResponse { request_id })).into_response()
}

fn sse_event(event: &ProgressEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .json_data(event)
        .unwrap_or_else(|_| Event::default().event(event.event_name()).data("{}"))
}

fn connected_event(request_id: Uuid) -> Event {
    Event::default()
        .event("connected")
        .json_data(QueryResponse { request_id })
        .unwrap_or_else(|_| Event::default().event("connected").data("{}"))
}

/// Replay `history`, then follow `live` until a terminal event.
fn event_stream(
    request_id: Uuid,
    history: Vec<ProgressEvent>,
    live: impl Stream<Item = ProgressEvent> + Send + 'static,
    guard: Option<SubscriberGuard>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let events = stream::iter(history)
        .chain(live)
        .scan((false, guard), |state, event| {
            if state.0 {
                return future::ready(None);
            }
            state.0 = event.is_terminal();
            future::ready(Some(event))
        })
        .map(|event| Ok(sse_event(&event)));

    stream::once(future::ready(Ok(connected_event(request_id)))).chain(events)
}

/// `GET /api/v1/stream/{id}`: server-sent progress events.
async fn stream_handler(
    State(shared): State<SharedGateway>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
) -> Response {
    let gw = shared.lock().await;
    if !gw.auth.authorize(&headers) {
        return unauthorized();
    }
    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(gw.config.keep_alive_secs.max(1)))
        .text("keepalive");

    let subscription = gw.registry.get(&request_id).map(|entry| {
        let (history, rx) = entry.channel.subscribe();
        let guard = SubscriberGuard::new(
            request_id,
            entry.channel.clone(),
            entry.cancel.clone(),
            gw.config.cancel_on_disconnect,
        );
        (history, rx, guard)
    });
    if let Some((history, rx, guard)) = subscription {
        drop(gw);
        // Lagged receivers skip ahead rather than failing the stream.
        let live = BroadcastStream::new(rx).filter_map(|item| future::ready(item.ok()));
        let events = event_stream(request_id, history, live, Some(guard));
        return Sse::new(events).keep_alive(keep_alive).into_response();
    }

    // Evicted or finished in an earlier process: replay from disk.
    let data_dir = gw.data_dir();
    drop(gw);
    match load_saved(data_dir, request_id).await {
        Some(record) => {
            let events = event_stream(request_id, record.events, stream::empty::<ProgressEvent>(), None);
            Sse::new(events).keep_alive(keep_alive).into_response()
        }
        None => not_found(&request_id),
    }
}

/// `GET /api/v1/task/{id}`: the task record with its event history.
async fn task_handler(
    State(shared): State<SharedGateway>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
) -> Response {
    let gw = shared.lock().await;
    if !gw.auth.authorize(&headers) {
        return unauthorized();
    }
    let snapshot = gw.registry.snapshot(&request_id);
    let record = match snapshot {
        Some(record) => Some(record),
        None => {
            let data_dir = gw.data_dir();
            drop(gw);
            load_saved(data_dir, request_id).await
        }
    };
    match record {
        Some(record) => Json(record).into_response(),
        None => not_found(&request_id),
    }
}

/// `DELETE /api/v1/task/{id}`: cancel a running task.
async fn cancel_handler(
    State(shared): State<SharedGateway>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
) -> Response {
    let gw = shared.lock().await;
    if !gw.auth.authorize(&headers) {
        return unauthorized();
    }
    if gw.registry.cancel(&request_id) {
        info!(%request_id, "Task cancelled by client");
        return StatusCode::NO_CONTENT.into_response();
    }
    if gw.registry.get(&request_id).is_some() {
        return error_response(StatusCode::CONFLICT, "Task already finished");
    }
    let data_dir = gw.data_dir();
    drop(gw);
    match load_saved(data_dir, request_id).await {
        Some(_) => error_response(StatusCode::CONFLICT, "Task already finished"),
        None => not_found(&request_id),
    }
}

/// Start the gateway server on the configured address.
///
/// This is an async function that runs until cancelled.
pub async fn run(gw: SharedGateway) -> Result<(), std::io::Error> {
    let (host, port) = {
        let gw = gw.lock().await;
        (gw.config().host.clone(), gw.config().port)
    };
    let app = router(gw);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

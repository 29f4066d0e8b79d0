//! logfold-api - HTTP ingest and subscription server for logfold

mod auth;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Sse};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logfold_core::defaults;
use logfold_core::{FieldFilter, Level, LogFilter, LogRecord, LogStore};
use logfold_db::{PgLogStore, SqliteLogStore};
use logfold_store::LogManager;

use auth::Credentials;

/// logfold - centralized log aggregation server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Username every client must present (non-empty)
    #[arg(long, value_parser = clap::builder::NonEmptyStringValueParser::new())]
    username: String,

    /// Password every client must present (non-empty)
    #[arg(long, value_parser = clap::builder::NonEmptyStringValueParser::new())]
    password: String,

    /// Listen address
    #[arg(long, default_value = defaults::LISTEN_ADDR)]
    listen: String,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL", default_value = defaults::DATABASE_URL)]
    database_url: String,

    /// Persistence backend
    #[arg(long, env = "LOG_BACKEND", value_enum, default_value = "postgres")]
    backend: Backend,

    /// Directory served under /static/
    #[arg(long, default_value = defaults::STATIC_DIR)]
    static_dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Backend {
    Postgres,
    Sqlite,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) manager: Arc<LogManager>,
    pub(crate) credentials: Arc<Credentials>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| defaults::DEFAULT_ENV_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting logfold server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn LogStore> = match args.backend {
        Backend::Postgres => Arc::new(PgLogStore::connect(&args.database_url).await?),
        Backend::Sqlite => Arc::new(SqliteLogStore::connect(&args.database_url).await?),
    };
    store.init().await?;
    info!(backend = ?args.backend, "Persistence backend initialized");

    let manager = LogManager::with_defaults(store);
    info!(capacity = manager.capacity(), "Retention window ready");

    let state = AppState {
        manager,
        credentials: Arc::new(Credentials::new(&args.username, &args.password)),
    };

    let app = Router::new()
        .route("/api/v1/logs", post(ingest_log).get(snapshot_logs))
        .route("/api/v1/logs/stream", get(stream_logs))
        .nest_service("/static", ServeDir::new(&args.static_dir))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_basic_auth,
        ))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = args.listen.parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// FILTER QUERY PARAMETERS
// =============================================================================

/// Query parameters shared by the snapshot and stream endpoints.
#[derive(Debug, Default, Deserialize)]
struct FilterQuery {
    level: Option<Level>,
    source: Option<String>,
    group: Option<String>,
    /// Regular expression matched against the message text.
    message: Option<String>,
    /// Only records at or before this instant.
    before: Option<DateTime<Utc>>,
    /// Only records at or after this instant.
    after: Option<DateTime<Utc>>,
    /// Chunk sequence number for snapshot paging.
    chunk: Option<u64>,
}

impl FilterQuery {
    fn into_filter(self) -> LogFilter {
        let mut filter = LogFilter::new();
        if let Some(level) = self.level {
            filter = filter.with_level(level);
        }
        if let Some(source) = self.source {
            filter = filter.with_source(source);
        }
        if let Some(group) = self.group {
            filter = filter.with_group(group);
        }
        if let Some(message) = self.message {
            filter = filter.with_message(message);
        }
        filter = match (self.after, self.before) {
            (Some(after), Some(before)) => {
                filter.with_received_at(FieldFilter::between(after, before))
            }
            (Some(after), None) => filter.with_received_at(FieldFilter::at_least(after)),
            (None, Some(before)) => filter.with_received_at(FieldFilter::at_most(before)),
            (None, None) => filter,
        };
        filter
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Ingest one record.
async fn ingest_log(
    State(state): State<AppState>,
    Json(record): Json<LogRecord>,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.write(record).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Snapshot endpoint: returns the requested chunk of records matching the
/// filter, paging backwards from the newest.
async fn snapshot_logs(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let chunk = query.chunk.unwrap_or(0);
    let reader = state.manager.get_reader(query.into_filter());

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let mut rx = reader.open_stream(cancel)?;

    let mut page = Vec::new();
    'chunks: for current in 0..=chunk {
        if reader.request_chunk(current).await.is_err() {
            break;
        }
        page.clear();
        for _ in 0..defaults::CHUNK_SIZE {
            match rx.recv().await {
                Some(record) => page.push(record.as_ref().clone()),
                None => break 'chunks,
            }
        }
    }

    Ok(Json(page))
}

/// Live stream endpoint: Server-Sent Events carrying every subsequent
/// record matching the filter. The subscription ends with the request.
async fn stream_logs(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Sse<impl futures::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let filter = query.into_filter();
    let cancel = CancellationToken::new();
    let (_, rx) = state.manager.subscribe(cancel.clone());
    let guard = cancel.drop_guard();

    let stream = ReceiverStream::new(rx).filter_map(move |record| {
        // dropping the stream drops the guard, which fires the cancellation
        let _ = &guard;
        if !filter.matches(&record).unwrap_or(false) {
            return None;
        }
        match serde_json::to_string(record.as_ref()) {
            Ok(json) => Some(Ok(Event::default().event("log").data(json))),
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(defaults::SSE_KEEPALIVE_SECS))
            .text("keepalive"),
    )
}

/// Liveness probe with buffer occupancy.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "buffer": {
            "written": state.manager.written(),
            "capacity": state.manager.capacity(),
        },
    }))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Internal(logfold_core::Error),
}

impl From<logfold_core::Error> for ApiError {
    fn from(err: logfold_core::Error) -> Self {
        match err {
            logfold_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            logfold_core::Error::Lifecycle(msg) => ApiError::BadRequest(msg),
            logfold_core::Error::Filter(msg) => ApiError::BadRequest(msg),
            logfold_core::Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

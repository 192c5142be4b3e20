// http server - the stillmind api and static front-end

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, Request, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::{Local, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{info, warn};

use crate::core::{ChatChunk, ChatTurn, validate_message};
use crate::{Claude, Db, Error, Progress, RateLimiter};

// tells buffering proxies to pass sse chunks through as they arrive
const ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

pub struct Config {
    pub db_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

pub struct AppState {
    pub db: Option<Db>,
    pub claude: Option<Claude>,
    pub limiter: RateLimiter,
    pub static_dir: PathBuf,
}

impl AppState {
    fn db(&self) -> Result<&Db, Error> {
        self.db.as_ref().ok_or(Error::StorageNotConfigured)
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
    #[serde(default)]
    system_prompt: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RegisterRequest {
    id: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct SessionRequest {
    user_id: Option<String>,
    meditation_id: Option<String>,
    duration_seconds: Option<i64>,
}

pub struct Server;

impl Server {
    pub async fn run(config: Config) -> Result<(), Error> {
        // missing pieces switch features off instead of refusing to start
        let db = match &config.db_url {
            Some(url) => match Db::connect(url).await {
                Ok(db) => Some(db),
                Err(e) => {
                    warn!("database unavailable, progress tracking is off: {e}");
                    None
                }
            },
            None => {
                info!("no database configured, progress tracking is off");
                None
            }
        };

        let claude = match Claude::new(config.api_key.clone(), config.model.clone()) {
            Ok(c) => Some(c),
            Err(_) => {
                warn!("no api key configured, chat is off");
                None
            }
        };

        let state = Arc::new(AppState {
            db,
            claude,
            limiter: RateLimiter::default(),
            static_dir: config.static_dir.clone(),
        });

        let app = router(state);

        let addr = format!("{}:{}", config.host, config.port);
        info!("server running at http://{addr}");

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| Error::Server(e.to_string()))?;

        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let spa = ServeDir::new(&state.static_dir)
        .not_found_service(ServeFile::new(state.static_dir.join("index.html")));

    // health stays reachable even when a client has burned its quota
    let limited = Router::new()
        .route("/api/chat", post(chat))
        .route("/api/users", post(register_user))
        .route("/api/sessions", post(record_session))
        .route("/api/sessions/{userId}", get(recent_sessions))
        .route("/api/progress/{userId}", get(get_progress))
        .route("/api/subscription/{userId}", get(get_subscription))
        .route("/api/products", get(products))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    let api = Router::new()
        .route("/api/health", get(health))
        .merge(limited)
        .layer(middleware::from_fn(api_headers));

    Router::new()
        .merge(api)
        .fallback_service(spa)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !state.limiter.admit(addr.ip()).await {
        return Error::RateLimited.into_response();
    }
    next.run(request).await
}

// api responses must never be served from a cache
async fn api_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, Error> {
    // bad input and missing credentials fail before any stream starts
    validate_message(&req.message)?;
    let claude = state.claude.clone().ok_or(Error::MissingApiKey)?;

    let (tx, rx) = mpsc::channel::<ChatChunk>(32);
    tokio::spawn(async move {
        let system = req.system_prompt.as_deref();
        if let Err(e) = claude
            .stream_chat(system, &req.history, &req.message, tx.clone())
            .await
        {
            warn!("chat relay failed: {e}");
            let _ = tx.send(ChatChunk::Error(e.to_string())).await;
        }
    });

    // the sentinel is chained after the channel, so it goes out no matter
    // how the producer stopped
    let events = ReceiverStream::new(rx)
        .map(|chunk| {
            let payload = match chunk {
                ChatChunk::Text(text) => json!({ "text": text }),
                ChatChunk::Error(detail) => json!({ "error": detail }),
            };
            Ok::<Event, Infallible>(Event::default().data(payload.to_string()))
        })
        .chain(tokio_stream::once(Ok(Event::default().data("[DONE]"))));

    let sse = Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    );

    Ok(([(ACCEL_BUFFERING, HeaderValue::from_static("no"))], sse))
}

async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, Error> {
    let db = state.db()?;
    let (user, created) = db.register_user(req.id, req.email).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "user": user }))))
}

async fn record_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<serde_json::Value>, Error> {
    let db = state.db()?;
    let (Some(user_id), Some(meditation_id), Some(duration_seconds)) =
        (req.user_id, req.meditation_id, req.duration_seconds)
    else {
        return Err(Error::validation(
            "userId, meditationId, and durationSeconds are required",
        ));
    };

    let today = Local::now().date_naive();
    let session_id = db
        .record_session(&user_id, &meditation_id, duration_seconds, today)
        .await?;

    Ok(Json(json!({ "success": true, "sessionId": session_id })))
}

async fn recent_sessions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, Error> {
    let sessions = match &state.db {
        Some(db) => db.recent_sessions(&user_id, 10).await?,
        None => Vec::new(),
    };
    Ok(Json(json!({ "sessions": sessions })))
}

async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Progress>, Error> {
    // without storage everyone reads as a fresh start
    let progress = match &state.db {
        Some(db) => db.get_progress(&user_id).await?,
        None => Progress::zero(),
    };
    Ok(Json(progress))
}

async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, Error> {
    let user = match &state.db {
        Some(db) => db.get_user(&user_id).await?,
        None => None,
    };
    let premium = user.is_some_and(|u| u.is_premium);
    Ok(Json(json!({
        "isSubscribed": premium,
        "plan": if premium { "premium" } else { "free" },
    })))
}

// fixed plan catalog; billing itself lives elsewhere
async fn products() -> Json<serde_json::Value> {
    Json(json!({
        "data": [
            {
                "id": "free",
                "name": "Stillmind Free",
                "description": "Core meditations and progress tracking to start a daily practice.",
                "tier": "free",
                "features": [
                    "5 guided meditations",
                    "Progress and streak tracking",
                    "Daily reminders",
                ],
                "prices": [],
            },
            {
                "id": "premium-monthly",
                "name": "Stillmind Premium Monthly",
                "description": "The full library plus personalized coaching, billed monthly.",
                "tier": "premium",
                "features": [
                    "Unlimited meditations",
                    "Personalized coaching chat",
                    "Sleep stories and soundscapes",
                    "Offline access",
                ],
                "prices": [
                    {
                        "unitAmount": 999,
                        "currency": "usd",
                        "interval": "month",
                        "displayName": "$9.99/month",
                    },
                ],
            },
            {
                "id": "premium-annual",
                "name": "Stillmind Premium Annual",
                "description": "Everything in Premium at a lower yearly rate.",
                "tier": "premium",
                "features": [
                    "Everything in Premium Monthly",
                    "Save 33% with annual billing",
                    "Early access to new content",
                ],
                "prices": [
                    {
                        "unitAmount": 7999,
                        "currency": "usd",
                        "interval": "year",
                        "displayName": "$79.99/year",
                    },
                ],
            },
        ],
    }))
}

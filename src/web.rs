use crate::config::RemoteSyncConfig;
use crate::quiz::Scoreboard;
use crate::remote::{RemoteError, RemoteStore, WordStore};
use crate::session::{LOOKUP_FAILED_MESSAGE, QuizError, SearchOutcome, Session, SettingsError};
use crate::sync::SaveOutcome;
use crate::tutor::{GeminiClient, Tutor};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

type SharedState<S, T> = Arc<AppState<S, T>>;
type Connect<S> = Box<dyn Fn(RemoteSyncConfig) -> Result<S, RemoteError> + Send + Sync>;

/// One session per server; requests touching it are applied one at a time.
pub struct AppState<S, T> {
    session: Mutex<Session<S, T>>,
    connect: Connect<S>,
}

impl<S, T> AppState<S, T> {
    pub fn new<F>(session: Session<S, T>, connect: F) -> Self
    where
        F: Fn(RemoteSyncConfig) -> Result<S, RemoteError> + Send + Sync + 'static,
    {
        Self {
            session: Mutex::new(session),
            connect: Box::new(connect),
        }
    }
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(
    config: WebConfig,
    session: Session<RemoteStore, GeminiClient>,
) -> Result<(), WebError> {
    let state = Arc::new(AppState::new(session, RemoteStore::new));
    let router = build_router(state);
    info!(%config.addr, "Binding HTTP listener");
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

impl From<QuizError> for ApiError {
    fn from(err: QuizError) -> Self {
        let message = err.to_string();
        match err {
            QuizError::Tutor(_) => ApiError::bad_gateway(message),
            QuizError::Locked { .. } | QuizError::NoQuestion | QuizError::AlreadyAnswered => {
                ApiError::conflict(message)
            }
        }
    }
}

pub fn build_router<S, T>(state: SharedState<S, T>) -> Router
where
    S: WordStore + 'static,
    T: Tutor + 'static,
{
    Router::new()
        .route("/healthz", get(health))
        .route("/api/words", get(list_words::<S, T>))
        .route("/api/words/:id", delete(delete_word::<S, T>))
        .route("/api/words/:id/open", post(open_word::<S, T>))
        .route("/api/search", post(search::<S, T>))
        .route("/api/history", get(history::<S, T>))
        .route(
            "/api/settings",
            get(settings::<S, T>).put(update_settings::<S, T>),
        )
        .route("/api/sync/upload", post(upload::<S, T>))
        .route("/api/quiz", post(next_question::<S, T>))
        .route("/api/quiz/answer", post(answer::<S, T>))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "lexiai" }))
}

async fn list_words<S: WordStore, T: Tutor>(
    State(state): State<SharedState<S, T>>,
) -> impl IntoResponse {
    let session = state.session.lock().await;
    let lexicon = session.lexicon();
    Json(json!({
        "mode": lexicon.mode(),
        "authority": lexicon.authority(),
        "words": lexicon.words(),
    }))
}

async fn delete_word<S: WordStore, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = state.session.lock().await;
    let removed = session
        .remove_word(&id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("no saved word with id {id}")))?;
    Ok(Json(json!({ "deleted": removed })))
}

async fn open_word<S: WordStore, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = state.session.lock().await;
    let opened = session
        .open_word(&id)
        .ok_or_else(|| ApiError::not_found(format!("no saved word with id {id}")))?;
    Ok(Json(opened))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    word: crate::model::WordDetail,
    saved: Option<crate::model::SavedWord>,
    storage: &'static str,
}

async fn search<S: WordStore, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let mut session = state.session.lock().await;
    match session.search(&request.query).await {
        None => Err(ApiError::bad_request("query cannot be empty")),
        Some(SearchOutcome::Failed(_)) => Err(ApiError::bad_gateway(LOOKUP_FAILED_MESSAGE)),
        Some(SearchOutcome::Found { detail, save }) => {
            let storage = match save {
                SaveOutcome::Remote(_) => "remote",
                SaveOutcome::Local(_) => "local",
                SaveOutcome::Duplicate => "duplicate",
            };
            Ok(Json(SearchResponse {
                word: detail,
                saved: save.saved().cloned(),
                storage,
            }))
        }
    }
}

async fn history<S: WordStore, T: Tutor>(
    State(state): State<SharedState<S, T>>,
) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(session.history().to_vec())
}

#[derive(Debug, Deserialize)]
struct SettingsPayload {
    endpoint_url: String,
    api_key: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    upload_local: bool,
}

async fn settings<S: WordStore, T: Tutor>(
    State(state): State<SharedState<S, T>>,
) -> impl IntoResponse {
    let session = state.session.lock().await;
    let config = session.remote_config();
    Json(json!({
        "endpoint_url": config.endpoint_url,
        "api_key": config.masked_key(),
        "user_id": config.user_id,
        "configured": config.is_configured(),
        "mode": session.lexicon().mode(),
    }))
}

async fn update_settings<S: WordStore, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Json(payload): Json<SettingsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let config = RemoteSyncConfig::new(payload.endpoint_url, payload.api_key, payload.user_id);
    if !config.is_configured() {
        return Err(ApiError::bad_request(
            "endpoint_url must be an http(s) URL and api_key a full key",
        ));
    }
    let candidate = (state.connect)(config).map_err(|err| ApiError::internal(err.to_string()))?;

    let mut session = state.session.lock().await;
    let outcome = session
        .apply_settings(candidate, payload.upload_local)
        .await
        .map_err(|err| match err {
            SettingsError::Unreachable => {
                ApiError::bad_gateway(SettingsError::Unreachable.to_string())
            }
            SettingsError::Cache(inner) => {
                warn!(error = %inner, "failed to save remote settings");
                ApiError::internal(inner.to_string())
            }
        })?;
    Ok(Json(json!({
        "mode": session.lexicon().mode(),
        "upload": outcome.upload,
    })))
}

async fn upload<S: WordStore, T: Tutor>(
    State(state): State<SharedState<S, T>>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = state.session.lock().await;
    if !session.is_configured() {
        return Err(ApiError::conflict("remote sync is not configured"));
    }
    Ok(Json(session.upload_local_words().await))
}

#[derive(Debug, Serialize)]
struct QuestionPayload {
    sentence: String,
    options: Vec<String>,
}

async fn next_question<S: WordStore, T: Tutor>(
    State(state): State<SharedState<S, T>>,
) -> Result<Json<QuestionPayload>, ApiError> {
    let mut session = state.session.lock().await;
    let round = session.next_question().await?;
    Ok(Json(QuestionPayload {
        sentence: round.question.sentence.clone(),
        options: round.question.options.clone(),
    }))
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    option: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnswerResponse {
    correct: bool,
    correct_word: String,
    score: Scoreboard,
}

async fn answer<S: WordStore, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let correct = session.answer(&request.option)?;
    let correct_word = session
        .current_round()
        .map(|round| round.question.correct_word.clone())
        .unwrap_or_default();
    Ok(Json(AnswerResponse {
        correct,
        correct_word,
        score: session.score(),
    }))
}

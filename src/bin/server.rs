//! Lingua Memory Server
//!
//! HTTP API over the learner memory engine.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lingua_memory::{
    completion::HttpCompletionClient,
    config::Config,
    error::Error,
    memory::{MemoryStore, TurnRequest},
    quiz::Answer,
};

/// Application state shared across handlers
struct AppState {
    store: MemoryStore,
    completion: HttpCompletionClient,
}

type SharedState = Arc<RwLock<AppState>>;

/// Error payload plus status, in the shape the frontend renders
type ApiError = (StatusCode, Json<Value>);

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) | Error::InsufficientData(_) | Error::QuizCompleted(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::Completion(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = match err {
        // idempotency rejection still carries the original grading so the
        // caller can render the prior outcome
        Error::QuizCompleted(results) => json!({
            "error": "This quiz has already been evaluated.",
            "results": *results,
        }),
        other => json!({ "error": other.to_string() }),
    };

    (status, Json(body))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::default();
    tracing::info!("Starting Lingua Memory Server on port {}", config.server_port);
    tracing::info!("Data directory: {:?}", config.data_dir);

    let completion = HttpCompletionClient::new(&config);
    if !completion.is_configured() {
        tracing::warn!("NVIDIA_API_KEY not set; quiz generation and speaking grading will fail");
    }
    let store = MemoryStore::new(config.clone())?;

    let state = Arc::new(RwLock::new(AppState { store, completion }));

    let app = Router::new()
        // Health check
        .route("/health", get(health))
        // Turns and recall
        .route("/turns", post(record_turn))
        .route("/recall", get(recall))
        // Sessions
        .route("/sessions", get(list_sessions).delete(delete_all_sessions))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        // Knowledge and profile
        .route("/knowledge", get(get_knowledge))
        .route("/profile/:language", get(get_profile))
        // Quiz lifecycle
        .route("/quiz/generate", post(generate_quiz))
        .route("/quiz/evaluate", post(evaluate_quiz))
        .route("/quiz/history", get(quiz_history))
        // Progression and streak
        .route("/progress", get(get_progress))
        .route("/streak", get(get_streak))
        // Reset
        .route("/reset", post(reset))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state);

    let port = config.server_port;
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

// === Handlers ===

async fn health() -> &'static str {
    "ok"
}

// --- Turn handlers ---

async fn record_turn(
    State(state): State<SharedState>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<Value>, ApiError> {
    let state = state.write().await;
    let outcome = state.store.record_turn(request).map_err(api_error)?;
    Ok(Json(json!({ "success": true, "turn": outcome })))
}

#[derive(Debug, Deserialize)]
struct RecallQuery {
    message: String,
    language: String,
}

async fn recall(
    State(state): State<SharedState>,
    Query(query): Query<RecallQuery>,
) -> Result<Json<Value>, ApiError> {
    let state = state.read().await;
    let context = state
        .store
        .build_context(&query.message, &query.language)
        .map_err(api_error)?;
    Ok(Json(json!({ "recalled": context.is_some(), "context": context })))
}

// --- Session handlers ---

async fn list_sessions(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let state = state.read().await;
    let sessions = state.store.list_sessions().map_err(api_error)?;
    Ok(Json(json!({ "count": sessions.len(), "sessions": sessions })))
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let state = state.read().await;
    let session = state.store.session(&id).map_err(api_error)?;
    Ok(Json(serde_json::to_value(session).map_err(|e| api_error(e.into()))?))
}

async fn delete_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let state = state.write().await;
    let deleted = state.store.sessions().delete(&id).map_err(api_error)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(Error::not_found(format!("session \"{id}\""))))
    }
}

async fn delete_all_sessions(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let state = state.write().await;
    let count = state.store.sessions().delete_all().map_err(api_error)?;
    Ok(Json(json!({ "success": true, "deleted": count })))
}

// --- Knowledge and profile handlers ---

async fn get_knowledge(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let state = state.read().await;
    let book = state.store.knowledge().map_err(api_error)?;
    Ok(Json(serde_json::to_value(book).map_err(|e| api_error(e.into()))?))
}

async fn get_profile(
    State(state): State<SharedState>,
    Path(language): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let state = state.read().await;
    let profile = state.store.learner_profile(&language).map_err(api_error)?;
    Ok(Json(serde_json::to_value(profile).map_err(|e| api_error(e.into()))?))
}

// --- Quiz handlers ---

#[derive(Debug, Deserialize)]
struct GenerateQuizRequest {
    language: String,
    num_questions: Option<u32>,
}

async fn generate_quiz(
    State(state): State<SharedState>,
    Json(request): Json<GenerateQuizRequest>,
) -> Result<Json<Value>, ApiError> {
    let state = state.write().await;
    let quiz = state
        .store
        .generate_quiz(&request.language, request.num_questions, &state.completion)
        .await
        .map_err(api_error)?;

    Ok(Json(json!({
        "success": true,
        "quiz_id": quiz.quiz_id,
        "language": quiz.language,
        "level": quiz.level,
        "difficulty": quiz.difficulty,
        "quiz_metadata": quiz.quiz_metadata,
        "num_questions": quiz.num_questions,
        "questions": quiz.questions,
    })))
}

#[derive(Debug, Deserialize)]
struct EvaluateQuizRequest {
    #[serde(alias = "quizId")]
    quiz_id: String,
    answers: Vec<Answer>,
}

async fn evaluate_quiz(
    State(state): State<SharedState>,
    Json(request): Json<EvaluateQuizRequest>,
) -> Result<Json<Value>, ApiError> {
    let state = state.write().await;
    let outcome = state
        .store
        .evaluate_quiz(&request.quiz_id, request.answers, &state.completion)
        .await
        .map_err(api_error)?;

    Ok(Json(json!({
        "success": true,
        "quiz_id": outcome.quiz_id,
        "results": outcome.results,
        "progression": outcome.progression,
    })))
}

#[derive(Debug, Deserialize)]
struct QuizHistoryQuery {
    quiz_id: Option<String>,
}

async fn quiz_history(
    State(state): State<SharedState>,
    Query(query): Query<QuizHistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let state = state.read().await;

    if let Some(quiz_id) = query.quiz_id {
        let quiz = state.store.quiz(&quiz_id).map_err(api_error)?;
        return Ok(Json(serde_json::to_value(quiz).map_err(|e| api_error(e.into()))?));
    }

    let quizzes = state.store.quiz_history().map_err(api_error)?;
    Ok(Json(json!({ "count": quizzes.len(), "quizzes": quizzes })))
}

// --- Progression and streak handlers ---

async fn get_progress(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let state = state.read().await;
    let progression = state.store.progression().map_err(api_error)?;
    Ok(Json(serde_json::to_value(progression).map_err(|e| api_error(e.into()))?))
}

#[derive(Debug, Deserialize)]
struct StreakQuery {
    days: Option<usize>,
}

async fn get_streak(
    State(state): State<SharedState>,
    Query(query): Query<StreakQuery>,
) -> Result<Json<Value>, ApiError> {
    let state = state.read().await;
    let (stats, calendar) = state.store.streak(query.days.unwrap_or(14)).map_err(api_error)?;
    Ok(Json(json!({ "streak": stats, "calendar": calendar })))
}

// --- Reset handler ---

async fn reset(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let state = state.write().await;
    state.store.reset_all().map_err(api_error)?;
    Ok(Json(json!({ "success": true, "message": "All progress has been reset." })))
}

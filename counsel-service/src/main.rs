use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use counsel_flow::{
    CounselConfig, CounselSession, ModelTiers, OpenRouterModel, PgVectorRetriever, Retriever,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Demo patient record used when no record is supplied via the environment.
const DEMO_PATIENT_DETAILS: &str = "Name: Helen Lee\n\
NRIC: S1099999F\n\
Date of Birth: 9 August 1945\n\
Gender: Female\n\
Allergy: Paracetamol (Panadol)\n\
Past medical history: Type 2 diabetes, high cholesterol\n\
Labs: HbA1c 9.0, LDL 2.2, eGFR 60";

const DEMO_PRESCRIPTION_DETAILS: &str = "1. ATORVASTATIN 20mg tablets - 1 tablet once in the morning - NO CHANGE\n\
2. EMPAGLIFLOZIN 25mg tablets - 1 tablet once in the morning - NEWLY PRESCRIBED DRUG";

#[derive(Clone)]
struct AppState {
    sessions: Arc<DashMap<String, Arc<Mutex<CounselSession>>>>,
    models: ModelTiers,
    retriever: Arc<dyn Retriever>,
    config: CounselConfig,
    patient_details: String,
    prescription_details: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    session_id: Option<String>,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    session_id: String,
    response: String,
    verified: bool,
    turn_number: u32,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn not_found_error(session_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("session not found: {session_id}"),
        }),
    )
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Medication Counselling Service",
        "greeting": CounselSession::greeting(),
        "endpoints": {
            "POST /chat": "Process one conversational turn",
            "POST /session/{id}/reset": "Reset a session to unverified with a fresh history",
            "GET /session/{id}/report": "Generate a take-home session report",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(%session_id, "chat request");

    let session = match state.sessions.get(&session_id) {
        Some(existing) => existing.clone(),
        None => {
            let created = CounselSession::new(
                state.patient_details.clone(),
                state.prescription_details.clone(),
                state.models.clone(),
                state.retriever.clone(),
                state.config.clone(),
            )
            .map_err(|e| {
                error!(error = %e, "failed to create session");
                internal_error("failed to create session")
            })?;
            let created = Arc::new(Mutex::new(created));
            state.sessions.insert(session_id.clone(), created.clone());
            created
        }
    };

    // One in-flight turn per session; the lock serializes callers.
    let mut session = session.lock().await;
    let response = session.process_message(&request.content).await.map_err(|e| {
        error!(error = %e, "turn processing failed");
        internal_error(&format!("turn processing failed: {e}"))
    })?;

    // Responses are delivered whole, so the turn text is the final text.
    session.finalize_response(&response);

    Ok(Json(ChatResponse {
        verified: session.verified(),
        turn_number: session.turn_number(),
        session_id,
        response,
    }))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .map(|s| s.clone())
        .ok_or_else(|| not_found_error(&session_id))?;

    let mut session = session.lock().await;
    session.reset();

    Ok(Json(json!({
        "session_id": session_id,
        "conversation_number": session.conversation_number(),
        "verified": session.verified(),
    })))
}

async fn session_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .map(|s| s.clone())
        .ok_or_else(|| not_found_error(&session_id))?;

    let session = session.lock().await;
    let report = session.generate_session_report().await.map_err(|e| {
        error!(error = %e, "report generation failed");
        internal_error(&format!("report generation failed: {e}"))
    })?;

    Ok(Json(json!({
        "session_id": session_id,
        "report": report,
    })))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "counsel_service=debug,counsel_flow=debug,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting medication counselling service");

    let models = ModelTiers::new(
        Arc::new(OpenRouterModel::new(env_or(
            "VERIFY_MODEL",
            "openai/gpt-4o-mini",
        ))?),
        Arc::new(OpenRouterModel::new(env_or("COUNSEL_MODEL", "openai/gpt-4o"))?),
        Arc::new(OpenRouterModel::new(env_or(
            "SUMMARY_MODEL",
            "openai/o3-mini",
        ))?),
    );

    let database_url = std::env::var("KNOWLEDGE_BASE_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("KNOWLEDGE_BASE_DATABASE_URL environment variable not set"))?;
    let retriever: Arc<dyn Retriever> = Arc::new(PgVectorRetriever::connect(&database_url).await?);

    let state = AppState {
        sessions: Arc::new(DashMap::new()),
        models,
        retriever,
        config: CounselConfig::from_env(),
        patient_details: env_or("PATIENT_DETAILS", DEMO_PATIENT_DETAILS),
        prescription_details: env_or("PRESCRIPTION_DETAILS", DEMO_PRESCRIPTION_DETAILS),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .route("/session/{id}/reset", post(reset_session))
        .route("/session/{id}/report", get(session_report))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Server running on http://0.0.0.0:3000");
    info!("Available endpoints:");
    info!("  GET  /                       - Service info and greeting");
    info!("  GET  /health                 - Health check");
    info!("  POST /chat                   - Process one conversational turn");
    info!("  POST /session/{{id}}/reset    - Reset a session");
    info!("  GET  /session/{{id}}/report   - Take-home session report");

    axum::serve(listener, app).await?;

    Ok(())
}

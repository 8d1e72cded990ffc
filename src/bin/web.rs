//! OmniSense HTTP 接口
//!
//! 启动: cargo run --bin omnisense-web --features web
//! 默认监听 127.0.0.1:8080，可用 OMNI_WEB_PORT 覆盖端口

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use omnisense::agent::{AgentRuntime, GoalRequest};
use omnisense::core::builder::create_agent_builder;
use omnisense::core::{AgentError, Observation};
use omnisense::memory::Rating;
use omnisense::policy::{PolicyDraft, PrivacyMode};
use omnisense::react::{StepInput, StepOutput};
use omnisense::tools::ToolResult;

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, error: &str) -> ApiError {
    (status, Json(json!({ "error": error })))
}

/// AgentError → HTTP 状态码与错误体
fn agent_error(e: AgentError) -> ApiError {
    match e {
        AgentError::PrivacyOff => api_error(StatusCode::FORBIDDEN, "privacy_off"),
        AgentError::MissingGoal => api_error(StatusCode::BAD_REQUEST, "missing_goal"),
        AgentError::PolicyRejected(rejection) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": rejection.to_string() })),
        ),
        other => {
            tracing::error!(error = %other, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed", "detail": other.to_string() })),
            )
        }
    }
}

struct AppState {
    runtime: AgentRuntime,
}

async fn api_act(
    State(state): State<Arc<AppState>>,
    Json(input): Json<StepInput>,
) -> ApiResult<StepOutput> {
    state.runtime.act(input).await.map(Json).map_err(agent_error)
}

async fn api_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GoalRequest>,
) -> ApiResult<Value> {
    let report = state.runtime.run_goal(req).await.map_err(agent_error)?;
    Ok(Json(json!(report)))
}

async fn api_start(State(state): State<Arc<AppState>>) -> Json<Value> {
    let session = state.runtime.sessions().start().await;
    Json(json!({ "ok": true, "session": session }))
}

async fn api_stop(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    match state.runtime.sessions().stop().await {
        Some(session) => Ok(Json(json!({ "ok": true, "session": session }))),
        None => Err(api_error(StatusCode::BAD_REQUEST, "no_active_session")),
    }
}

async fn api_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let session = state.runtime.sessions().status().await;
    let active = session.as_ref().is_some_and(|s| s.is_active());
    Json(json!({ "active": active, "session": session }))
}

async fn api_policies_list(State(state): State<Arc<AppState>>) -> Json<Value> {
    let policies = state.runtime.policies().list().await;
    Json(json!({ "policies": policies }))
}

async fn api_policies_activate(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<PolicyDraft>,
) -> ApiResult<Value> {
    let policy = state.runtime.activate_policy(draft).await.map_err(agent_error)?;
    Ok(Json(json!({ "ok": true, "policy": policy })))
}

#[derive(Deserialize)]
struct EvaluateRequest {
    #[serde(default)]
    observation: Observation,
    #[serde(default)]
    preferences: Map<String, Value>,
}

async fn api_evaluate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EvaluateRequest>,
) -> Json<Value> {
    let privacy = PrivacyMode::from_preferences(&req.preferences);
    state.runtime.policies().evaluate(&req.observation, privacy).await;
    Json(json!({ "ok": true }))
}

#[derive(Deserialize)]
struct DispatchRequest {
    name: String,
    #[serde(default)]
    args: Value,
}

async fn api_dispatch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DispatchRequest>,
) -> Json<ToolResult> {
    Json(state.runtime.dispatcher().dispatch(&req.name, req.args).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackRequest {
    action_id: String,
    #[serde(default)]
    action_type: String,
    rating: Rating,
    correction: Option<String>,
}

async fn api_feedback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FeedbackRequest>,
) -> ApiResult<Value> {
    if req.action_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing_fields"));
    }
    let entry = state
        .runtime
        .record_feedback(&req.action_id, &req.action_type, req.rating, req.correction)
        .await
        .map_err(agent_error)?;
    Ok(Json(json!({ "ok": true, "entry": entry })))
}

async fn api_feedback_stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!(state.runtime.feedback_stats().await))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    omnisense::observability::init();

    let runtime = create_agent_builder(None).build().await;
    let state = Arc::new(AppState { runtime });

    let app = Router::new()
        .route("/api/agent/act", post(api_act))
        .route("/api/agent/run", post(api_run))
        .route("/api/agent/start", post(api_start))
        .route("/api/agent/stop", post(api_stop))
        .route("/api/agent/status", get(api_status))
        .route("/api/brain/policies", get(api_policies_list))
        .route("/api/brain/policies/activate", post(api_policies_activate))
        .route("/api/brain/evaluate", post(api_evaluate))
        .route("/api/tools/dispatch", post(api_dispatch))
        .route("/api/feedback", post(api_feedback))
        .route("/api/feedback/stats", get(api_feedback_stats))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(Arc::clone(&state));

    let port = std::env::var("OMNI_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("OmniSense web listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

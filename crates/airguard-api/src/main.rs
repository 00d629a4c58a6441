//! AirGuard - building air-quality and fire-safety automation server

use automation_engine::{
    AutomationEngine, AutomationError, CreateRuleRequest, CreateTaskRequest, DeleteOutcome,
    SystemClock, TickConfig,
};
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use sensor_core::{SensorSimulator, SimEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod websocket;

use config::Config;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AutomationEngine>,
    pub sensors: Arc<SensorSimulator>,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn failure(e: &AutomationError) -> ApiResult {
    let status = match e {
        AutomationError::Validation(_) => StatusCode::BAD_REQUEST,
        AutomationError::PolicyViolation(_) => StatusCode::FORBIDDEN,
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Request failed: {}", e);
    }
    (status, Json(ApiResponse::error(e.to_string())))
}

fn respond<T: Serialize>(result: Result<T, AutomationError>) -> ApiResult {
    match result {
        Ok(data) => ok(data),
        Err(e) => failure(&e),
    }
}

#[derive(Deserialize)]
struct EnabledRequest {
    enabled: bool,
}

#[derive(Deserialize)]
struct ActiveRequest {
    active: bool,
}

/// Simulated clock skip
#[derive(Deserialize)]
struct AdvanceRequest {
    #[serde(default = "default_advance_millis")]
    millis: u64,
}

fn default_advance_millis() -> u64 {
    3_600_000
}

/// Engine status
#[derive(Serialize)]
struct Status {
    automation_enabled: bool,
    scheduler_active: bool,
    simulated_time: String,
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let engine = &state.engine;
    ok(Status {
        automation_enabled: engine.is_automation_enabled().await,
        scheduler_active: engine.is_scheduler_active().await,
        simulated_time: engine.simulated_now().await.format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}

// --- Rules ---

async fn list_rules(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.engine.rules().await)
}

async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateRuleRequest>,
) -> impl IntoResponse {
    match state.engine.add_rule(req).await {
        Ok(rule) => (StatusCode::CREATED, Json(ApiResponse::success(rule))),
        Err(e) => failure(&e),
    }
}

async fn delete_rule(State(state): State<AppState>, Path(index): Path<usize>) -> impl IntoResponse {
    respond(state.engine.delete_rule(index).await)
}

async fn load_preset(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.engine.load_preset(&name).await {
        Ok(preset) => ok(serde_json::json!({
            "preset": preset,
            "rules": state.engine.rules().await,
        })),
        Err(e) => failure(&e),
    }
}

async fn reset_rules(State(state): State<AppState>) -> impl IntoResponse {
    respond(state.engine.reset_rules().await)
}

/// Run a rule tick now and report every rule's outcome
async fn evaluate_rules(State(state): State<AppState>) -> impl IntoResponse {
    let fired = state.engine.run_rule_tick().await;
    let snapshot = state.sensors.current();
    let results: Vec<serde_json::Value> = state
        .engine
        .evaluate(&snapshot)
        .await
        .into_iter()
        .map(|(rule, triggered)| serde_json::json!({ "rule": rule, "triggered": triggered }))
        .collect();
    ok(serde_json::json!({ "fired": fired, "results": results }))
}

async fn set_automation(
    State(state): State<AppState>,
    Json(req): Json<EnabledRequest>,
) -> impl IntoResponse {
    state.engine.set_automation_enabled(req.enabled).await;
    ok(serde_json::json!({ "enabled": req.enabled }))
}

// --- Tasks ---

async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.engine.tasks().await)
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> impl IntoResponse {
    match state.engine.add_task(req).await {
        Ok(task) => (StatusCode::CREATED, Json(ApiResponse::success(task))),
        Err(e) => failure(&e),
    }
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.engine.request_delete_task(&id).await {
        Ok(DeleteOutcome::Deleted(task)) => ok(task),
        Ok(DeleteOutcome::ConfirmationRequired { token, task_id }) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(serde_json::json!({
                "confirmation_required": true,
                "confirmation_token": token,
                "task_id": task_id,
            }))),
        ),
        Err(e) => failure(&e),
    }
}

async fn confirm_delete_task(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    respond(state.engine.confirm_delete_task(&token).await)
}

async fn cancel_delete_task(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    respond(
        state
            .engine
            .cancel_delete_task(&token)
            .await
            .map(|()| serde_json::json!({ "cancelled": token })),
    )
}

async fn set_scheduler(
    State(state): State<AppState>,
    Json(req): Json<ActiveRequest>,
) -> impl IntoResponse {
    state.engine.set_scheduler_active(req.active).await;
    ok(serde_json::json!({ "active": req.active }))
}

async fn advance_clock(
    State(state): State<AppState>,
    req: Option<Json<AdvanceRequest>>,
) -> impl IntoResponse {
    let millis = req.map_or_else(default_advance_millis, |Json(req)| req.millis);
    let now = state.engine.advance_clock(millis).await;
    ok(serde_json::json!({
        "advanced_ms": millis,
        "simulated_time": now.format("%Y-%m-%d %H:%M:%S").to_string(),
    }))
}

// --- Sensors ---

async fn get_sensors(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.sensors.current())
}

/// Inject a simulated event, then evaluate the rules immediately
async fn simulate(State(state): State<AppState>, Path(event): Path<String>) -> impl IntoResponse {
    let event: SimEvent = match event.parse() {
        Ok(event) => event,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string()))),
    };
    state.sensors.inject(event);
    let fired = state.engine.run_rule_tick().await;
    ok(serde_json::json!({
        "event": event,
        "sensors": state.sensors.current(),
        "fired": fired,
    }))
}

/// WebSocket feed of engine activity
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/status", get(status))
        // Rules
        .route("/api/v1/rules", get(list_rules).post(create_rule))
        .route("/api/v1/rules/:index", delete(delete_rule))
        .route("/api/v1/rules/presets/:name", post(load_preset))
        .route("/api/v1/rules/reset", post(reset_rules))
        .route("/api/v1/rules/evaluate", post(evaluate_rules))
        .route("/api/v1/automation", put(set_automation))
        // Tasks
        .route("/api/v1/tasks", get(list_tasks).post(create_task))
        .route("/api/v1/tasks/:id", delete(delete_task))
        .route(
            "/api/v1/tasks/confirm/:token",
            post(confirm_delete_task).delete(cancel_delete_task),
        )
        .route("/api/v1/scheduler", put(set_scheduler))
        .route("/api/v1/scheduler/advance", post(advance_clock))
        // Sensors
        .route("/api/v1/sensors", get(get_sensors))
        .route("/api/v1/sensors/simulate/:event", post(simulate))
        // WebSocket
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airguard_api=debug,automation_engine=debug,info".into()),
        )
        .init();

    tracing::info!("Starting AirGuard automation server");

    let config = Config::from_env()?;
    tracing::info!("Data directory: {:?}", config.data_dir);

    let sensors = Arc::new(SensorSimulator::new());
    let engine = Arc::new(
        AutomationEngine::new(sensors.clone(), Arc::new(SystemClock), &config.data_dir).await?,
    );
    engine.start(TickConfig {
        rule_interval: config.rule_tick,
        schedule_interval: config.schedule_tick,
    });

    let app = router(AppState { engine, sensors });

    tracing::info!("Listening on http://{}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    async fn app(dir: &std::path::Path) -> Router {
        let sensors = Arc::new(SensorSimulator::seeded(5));
        let engine = AutomationEngine::new(sensors.clone(), Arc::new(SystemClock), dir)
            .await
            .unwrap();
        router(AppState {
            engine: Arc::new(engine),
            sensors,
        })
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_alarm_off_task_is_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/tasks",
            Some(serde_json::json!({
                "name": "x", "device": "alarm", "action": "off",
                "time": "09:00", "repeat": "once", "priority": "low"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);

        let (_, body) = call(&app, Method::GET, "/api/v1/tasks", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_critical_task_delete_needs_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let (status, body) = call(&app, Method::DELETE, "/api/v1/tasks/t2", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let token = body["data"]["confirmation_token"].as_str().unwrap().to_string();

        let (_, body) = call(&app, Method::GET, "/api/v1/tasks", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let uri = format!("/api/v1/tasks/confirm/{token}");
        let (status, body) = call(&app, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], "t2");

        let (status, _) = call(&app, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rules_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let (status, _) = call(&app, Method::POST, "/api/v1/rules/presets/turbo", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/rules",
            Some(serde_json::json!({ "condition": "aqi", "operator": ">", "action": "purifier_on" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("threshold"));

        let (status, _) = call(&app, Method::DELETE, "/api/v1/rules/9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/rules",
            Some(serde_json::json!({ "condition": "smoke", "action": "alarm_on" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["threshold"], "detected");
        assert_eq!(body["data"]["operator"], "=");
    }

    #[tokio::test]
    async fn test_simulated_fire_triggers_alarm_rules() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let (status, body) = call(&app, Method::POST, "/api/v1/rules/presets/fire-safety", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["rules"].as_array().unwrap().len(), 2);

        let (status, body) = call(&app, Method::POST, "/api/v1/sensors/simulate/fire", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["sensors"]["smoke"], true);
        assert_eq!(body["data"]["fired"].as_array().unwrap().len(), 2);

        let (status, _) = call(&app, Method::POST, "/api/v1/sensors/simulate/flood", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_advance_clock_defaults_to_one_hour() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let (status, body) = call(&app, Method::POST, "/api/v1/scheduler/advance", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["advanced_ms"], 3_600_000);
    }
}

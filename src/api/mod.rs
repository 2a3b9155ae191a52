use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Json, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::net::TcpListener;

use crate::core::{
    CalculationSelection, ConstantsTable, EngineContext, EngineError, normalize, simulate,
    simulate_facts,
};
use crate::report::{SessionId, dashboard_view, render_report};

#[derive(Clone)]
pub struct AppState {
    constants: Arc<ConstantsTable>,
}

impl AppState {
    pub fn new(constants: ConstantsTable) -> Self {
        Self {
            constants: Arc::new(constants),
        }
    }

    fn context(&self) -> EngineContext<'_> {
        EngineContext::today(&self.constants)
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/dashboard", post(dashboard_handler))
        .route("/api/report", post(report_handler))
        .route("/api/constants", get(constants_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(addr: SocketAddr, constants: ConstantsTable) -> std::io::Result<()> {
    let version = constants.version.clone();
    let app = router(AppState::new(constants));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, constants_version = %version, "divorce-sim HTTP API listening");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

/// The table in its TOML key shape (snake_case), unlike the camelCase bodies.
async fn constants_handler(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, state.constants.as_ref())
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

/// Query parameters are treated as a flat facts record with every
/// calculation enabled.
async fn simulate_get_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let facts: Map<String, Value> = params
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    simulate_response(&state, &Value::Object(facts))
}

async fn simulate_post_handler(State(state): State<AppState>, body: Bytes) -> Response {
    match parse_body(&body) {
        Ok(body) => simulate_response(&state, &body),
        Err(response) => response,
    }
}

async fn dashboard_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let (facts, selection) = split_request(&body);
    match simulate(facts, selection, &state.context()) {
        Ok(result) => json_response(StatusCode::OK, dashboard_view(&result)),
        Err(err) => engine_error_response(&err),
    }
}

async fn report_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    report_response(&state, &body)
}

fn simulate_response(state: &AppState, body: &Value) -> Response {
    let (facts, selection) = split_request(body);
    match simulate(facts, selection, &state.context()) {
        Ok(result) => {
            tracing::info!(
                headline = result.compensatory.as_ref().map(|c| c.headline),
                "simulation served"
            );
            json_response(StatusCode::OK, result)
        }
        Err(err) => engine_error_response(&err),
    }
}

fn report_response(state: &AppState, body: &Value) -> Response {
    let (raw_facts, raw_selection) = split_request(body);
    let facts = match normalize(raw_facts) {
        Ok(facts) => facts,
        Err(err) => return engine_error_response(&err),
    };
    let selection = match CalculationSelection::from_value(raw_selection) {
        Ok(selection) => selection,
        Err(err) => return engine_error_response(&err),
    };
    let ctx = state.context();
    let result = simulate_facts(&facts, selection, &ctx);

    match render_report(&facts, &result, SessionId::random(), &ctx) {
        Ok(report) => {
            tracing::info!(file = %report.file_name, "report rendered");
            let disposition = format!("attachment; filename=\"{}\"", report.file_name);
            let mut response = (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                report.body,
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&disposition) {
                response
                    .headers_mut()
                    .insert(header::CONTENT_DISPOSITION, value);
            }
            with_cache_control(response)
        }
        Err(err) => {
            tracing::error!(error = %err, "report rendering failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.user_message())
        }
    }
}

fn parse_body(body: &Bytes) -> Result<Value, Response> {
    serde_json::from_slice(body).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            &format!("Invalid API JSON payload: {e}"),
        )
    })
}

/// `{ "facts": {...}, "selection": {...} }`, or a bare facts record.
fn split_request(body: &Value) -> (&Value, Option<&Value>) {
    match body.get("facts") {
        Some(facts) => (facts, body.get("selection")),
        None => (body, None),
    }
}

fn engine_error_response(err: &EngineError) -> Response {
    tracing::warn!(error = %err, "rejected simulation request");
    error_response(StatusCode::BAD_REQUEST, &err.to_string())
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

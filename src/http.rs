//! Optional HTTP control surface (spec.md §6): inspect and drive the node
//! registry and the scheduler's time scale from outside the process. Mirrors
//! the teacher's `cli/modbus/master.rs` axum surface — a cloned `State`,
//! handlers returning `(StatusCode, Json<T>)` on success and
//! `(StatusCode, String)` on error — generalized from "Modbus station
//! snapshot" to "PLC node registry".

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use sdplc_core::{Plc, PlcError, Value};

#[derive(Clone)]
pub struct HttpServerState {
    pub plc: Arc<Plc>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    node_count: usize,
}

#[derive(Serialize)]
struct TimeScaleResponse {
    scale: f64,
}

#[derive(Serialize)]
struct VariablesResponse {
    names: Vec<String>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum VariableValue {
    Bool { value: bool },
    Int { value: i64 },
    Float { value: f64 },
}

impl From<Value> for VariableValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Bool(b) => VariableValue::Bool { value: b },
            Value::Int(i) => VariableValue::Int { value: i },
            Value::Float(f) => VariableValue::Float { value: f },
        }
    }
}

pub fn router(plc: Arc<Plc>) -> Router {
    Router::new()
        .route("/healthz", get(handle_healthz))
        .route("/time/scale", get(handle_time_scale_get))
        .route("/variables", get(handle_variables_list))
        .route("/variables/read", get(handle_variable_read))
        .route("/variables/write", post(handle_variable_write))
        .with_state(HttpServerState { plc })
}

async fn handle_healthz(State(state): State<HttpServerState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", node_count: state.plc.node_count() })
}

async fn handle_time_scale_get(
    State(state): State<HttpServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<(StatusCode, Json<TimeScaleResponse>), (StatusCode, String)> {
    if let Some(raw) = params.get("scale") {
        let scale: f64 = raw
            .parse()
            .map_err(|_| (StatusCode::BAD_REQUEST, format!("scale '{raw}' is not a number")))?;
        if !(scale.is_finite() && scale > 0.0) {
            return Err((StatusCode::BAD_REQUEST, "scale must be a positive finite number".to_string()));
        }
        state.plc.set_time_scale(scale);
    }
    Ok((StatusCode::OK, Json(TimeScaleResponse { scale: state.plc.time_scale() })))
}

async fn handle_variables_list(State(state): State<HttpServerState>) -> Json<VariablesResponse> {
    Json(VariablesResponse { names: state.plc.node_names() })
}

async fn handle_variable_read(
    State(state): State<HttpServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<(StatusCode, Json<VariableValue>), (StatusCode, String)> {
    let qualified_name = params
        .get("qualified_name")
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "missing qualified_name".to_string()))?;
    let value = state
        .plc
        .read_node_value(qualified_name)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no such node '{qualified_name}'")))?;
    Ok((StatusCode::OK, Json(value.into())))
}

async fn handle_variable_write(
    State(state): State<HttpServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<(StatusCode, Json<VariableValue>), (StatusCode, String)> {
    let qualified_name = params
        .get("qualified_name")
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "missing qualified_name".to_string()))?;
    let raw_value = params
        .get("value")
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "missing value".to_string()))?;

    let current = state
        .plc
        .read_node_value(qualified_name)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no such node '{qualified_name}'")))?;
    let parsed = parse_like(current, raw_value)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("value '{raw_value}' does not match node's type")))?;

    state.plc.write_node(qualified_name, parsed).await.map_err(plc_error_status)?;

    let value = state.plc.read_node_value(qualified_name).unwrap_or(parsed);
    Ok((StatusCode::OK, Json(value.into())))
}

/// Spec.md §7's REST status-code contract: `MisconfiguredNode` is 404,
/// `ConfigInvalid` is 400, everything from C1-C3 is a 502.
fn plc_error_status(e: PlcError) -> (StatusCode, String) {
    match &e {
        PlcError::MisconfiguredNode { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        PlcError::ConfigInvalid { .. } => (StatusCode::BAD_REQUEST, e.to_string()),
        PlcError::Protocol(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

/// Parse `raw` into the same `Value` variant as `like`, so a write through
/// the query string round-trips without a separate JSON body.
fn parse_like(like: Value, raw: &str) -> Result<Value, ()> {
    match like {
        Value::Bool(_) => raw.parse::<bool>().map(Value::Bool).map_err(|_| ()),
        Value::Int(_) => raw.parse::<i64>().map(Value::Int).map_err(|_| ()),
        Value::Float(_) => raw.parse::<f64>().map(Value::Float).map_err(|_| ()),
    }
}

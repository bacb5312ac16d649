use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app::{health_status, AppState};

/// `GET /health` — `{status, database, components}` per `spec.md` §6.
/// `status` is `healthy` unless the database round-trip fails
/// (`unhealthy`) or the cost guard's kill-switch has tripped (`degraded`).
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let (status, database_ok, cost_guard_ok) = health_status(&state);

    Json(json!({
        "status": status,
        "database": if database_ok { "ok" } else { "unreachable" },
        "components": {
            "cost_guard": if cost_guard_ok { "ok" } else { "kill_switch_tripped" },
        },
    }))
}

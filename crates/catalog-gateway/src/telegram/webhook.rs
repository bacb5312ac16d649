use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use teloxide::prelude::*;
use teloxide::types::{Update, UpdateKind};
use tracing::warn;

use crate::app::AppState;
use crate::telegram::handler::handle_text_message;

/// POST `<TelegramConfig::webhook_path>` — the only ingress this deployment
/// needs when `DISABLE_TELEGRAM_BOT=true` (`spec.md` §6). Parses a raw
/// `teloxide::types::Update`, extracts the message text, and runs the same
/// turn pipeline the long-polling dispatcher uses.
///
/// The `Bot` used to reply is built fresh for this request and dropped on
/// every exit path, per the scoped-session contract in `spec.md` §5.
pub async fn telegram_webhook_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let update: Update = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "telegram webhook: invalid Update JSON");
        (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid update payload"})))
    })?;

    let UpdateKind::Message(message) = update.kind else {
        return Ok(Json(json!({"ok": true, "ignored": true})));
    };
    if message.from.as_ref().map(|u| u.is_bot).unwrap_or(false) {
        return Ok(Json(json!({"ok": true, "ignored": true})));
    }
    let text = message.text().or_else(|| message.caption()).unwrap_or("").to_string();

    let bot = Bot::new(&state.config.telegram.bot_token);
    handle_text_message(&bot, message.chat.id, &text, &state).await;

    Ok(Json(json!({"ok": true})))
}

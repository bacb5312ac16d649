use std::sync::Arc;

use catalog_notify::format::{escape_markdown_v2, split_chunks_smart};
use catalog_orchestrator::process_turn;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::warn;

use crate::app::AppState;

/// Platform tag recorded on every conversation/lead row for this transport.
pub const PLATFORM: &str = "telegram";

/// Runs one turn for an already-extracted `(chat_id, text)` pair and sends
/// the reply back, independent of whether the message arrived via webhook
/// or the long-polling dispatcher.
pub async fn handle_text_message(bot: &Bot, chat_id: ChatId, text: &str, state: &Arc<AppState>) {
    if text.is_empty() {
        return;
    }

    let reply = process_turn(state.as_ref(), &chat_id.0.to_string(), PLATFORM, text).await;
    send_response(bot, chat_id, &reply.text).await;
}

/// Split long replies into Telegram-sized chunks, preferring escaped
/// MarkdownV2 and falling back to plain text per chunk when the escaped
/// form is rejected — the same shape as `catalog-notify`'s outbound sends,
/// so a Telegram formatting quirk in one transport never silently drops a
/// reply in the other.
async fn send_response(bot: &Bot, chat_id: ChatId, text: &str) {
    for (i, chunk) in split_chunks_smart(text).into_iter().enumerate() {
        let escaped = escape_markdown_v2(&chunk);
        let sent = bot.send_message(chat_id, &escaped).parse_mode(ParseMode::MarkdownV2).await;
        if sent.is_err() {
            if let Err(e) = bot.send_message(chat_id, &chunk).await {
                warn!(error = %e, chunk_index = i, "telegram: fallback send failed");
            }
        }
    }
}

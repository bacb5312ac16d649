use std::sync::Arc;

use teloxide::dptree;
use teloxide::prelude::*;
use tracing::info;

use crate::app::AppState;
use crate::telegram::handler::handle_text_message;

/// Drives the Telegram long-polling dispatcher until the process exits.
/// Mounted only when `DISABLE_TELEGRAM_BOT=false` (`spec.md` §6); the
/// webhook route stays registered regardless, since both transports share
/// the same turn pipeline and nothing here assumes it is the only ingress.
///
/// Grounded on `skynet-telegram::adapter::TelegramAdapter::run`, trimmed to
/// this system's shape: no allowlist, DM guard, mention guard, or slash
/// commands, since `spec.md` names none of those for this bot.
pub async fn run(state: Arc<AppState>) {
    let bot = Bot::new(&state.config.telegram.bot_token);
    info!("telegram: starting long-polling dispatcher");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_upd| async {})
        .build()
        .dispatch()
        .await;
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if msg.from.as_ref().map(|u| u.is_bot).unwrap_or(false) {
        return Ok(());
    }
    let text = msg.text().or_else(|| msg.caption()).unwrap_or("").to_string();
    if text.is_empty() {
        return Ok(());
    }

    let chat_id = msg.chat.id;
    tokio::spawn(async move {
        handle_text_message(&bot, chat_id, &text, &state).await;
    });

    Ok(())
}

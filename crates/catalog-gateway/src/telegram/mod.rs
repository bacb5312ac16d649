//! Telegram transport — a webhook receiver (always mounted) plus an
//! optional in-process long-polling dispatcher, gated by
//! `TelegramConfig::disable_bot` (`spec.md` §6).

pub mod handler;
pub mod longpoll;
pub mod webhook;

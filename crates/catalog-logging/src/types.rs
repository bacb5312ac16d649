use serde::{Deserialize, Serialize};
use std::fmt;

/// The four sinks named in `spec.md` §4.11. `Business` is a target, not a
/// `tracing` level — events are routed to it by checking the event's
/// target string rather than its verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSeverity {
    Warning,
    Error,
    Critical,
    Business,
}

impl std::str::FromStr for LogSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WARNING" => Ok(LogSeverity::Warning),
            "ERROR" => Ok(LogSeverity::Error),
            "CRITICAL" => Ok(LogSeverity::Critical),
            "BUSINESS" => Ok(LogSeverity::Business),
            other => Err(format!("unknown log severity: {other}")),
        }
    }
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogSeverity::Warning => "WARNING",
            LogSeverity::Error => "ERROR",
            LogSeverity::Critical => "CRITICAL",
            LogSeverity::Business => "BUSINESS",
        };
        f.write_str(s)
    }
}

/// One durable row in `system_logs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub severity: LogSeverity,
    pub target: String,
    pub message: String,
    /// Remaining structured fields on the event, JSON-encoded.
    pub fields: Option<String>,
    pub created_at: String,
}

/// Fire-and-forget payload handed to the CRITICAL alert dispatcher.
#[derive(Debug, Clone)]
pub struct CriticalAlert {
    pub target: String,
    pub message: String,
    pub occurred_at: String,
}

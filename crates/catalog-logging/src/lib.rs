pub mod db;
pub mod dispatcher;
pub mod error;
pub mod init;
pub mod layer;
pub mod types;

pub use dispatcher::{run_alert_dispatcher, AlertSink};
pub use error::LoggingError;
pub use init::init;
pub use layer::{HybridLayer, BUSINESS_TARGET};
pub use types::{CriticalAlert, LogRecord, LogSeverity};

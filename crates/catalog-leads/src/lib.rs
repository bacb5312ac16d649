pub mod db;
pub mod error;
pub mod manager;
pub mod types;
pub mod validate;

pub use error::{LeadError, LeadValidationError};
pub use manager::{LeadNotifier, LeadStore, MAX_SYNC_ATTEMPTS};
pub use types::{Lead, LeadDraft, LeadStatus};

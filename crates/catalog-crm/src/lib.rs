pub mod client;
pub mod error;
pub mod worker;

pub use client::{CrmClient, HttpCrmClient, LeadPayload};
pub use error::CrmError;
pub use worker::CrmWorker;

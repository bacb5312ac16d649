use serde::{Deserialize, Serialize};

/// A company-offered service (`spec.md` §3 CompanyService).
/// Looked up by keyword/category — never vectorized, unlike `Product`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyService {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub active: bool,
}

/// The single "company info" document surfaced for general questions
/// (hours, location, policies) that aren't about a product or service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub content: String,
    pub updated_at: String,
}

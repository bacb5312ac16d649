use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use catalog_core::config::CrmConfig;
use catalog_leads::Lead;

use crate::error::{CrmError, Result};

/// Outbound payload shape required by the CRM (`spec.md` §6's wire contract).
/// The CRM's own data model is out of scope; this is only what we send it.
#[derive(Debug, Clone, Serialize)]
pub struct LeadPayload {
    pub last_name: String,
    pub lead_first_communication_channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
}

impl From<&Lead> for LeadPayload {
    fn from(lead: &Lead) -> Self {
        Self {
            last_name: lead.last_name.clone(),
            lead_first_communication_channel: lead.source.clone(),
            phone: lead.phone.clone(),
            email: lead.email.clone(),
            whatsapp: lead.whatsapp.clone(),
            company: lead.company.clone(),
            telegram: Some(lead.chat_id.clone()),
        }
    }
}

/// `spec.md` §6 CRM wire contract: `search(phone|email)`, `create_lead(payload)`,
/// `add_note(lead_id, text)`. Defined here (not baked into the worker) so C9
/// stays testable against a fake and the CRM's own data model stays external.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Returns the existing CRM record id if one matches `phone` or `email`.
    async fn search(&self, phone: Option<&str>, email: Option<&str>) -> Result<Option<String>>;

    /// Creates a new CRM record, returning its id.
    async fn create_lead(&self, payload: &LeadPayload) -> Result<String>;

    /// Attaches a free-text note to an existing CRM record.
    async fn add_note(&self, crm_id: &str, text: &str) -> Result<()>;
}

/// Generic REST implementation of [`CrmClient`], following the same scoped
/// `reqwest::Client` + bearer-auth shape as `catalog-llm`'s
/// `OpenAiCompatProvider` — the CRM is just another JSON HTTP collaborator.
pub struct HttpCrmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCrmClient {
    pub fn from_config(config: &CrmConfig) -> Result<Self> {
        let base_url = config.api_url.clone().ok_or(CrmError::NotConfigured)?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }
}

#[async_trait]
impl CrmClient for HttpCrmClient {
    async fn search(&self, phone: Option<&str>, email: Option<&str>) -> Result<Option<String>> {
        debug!(phone, email, "searching CRM for a duplicate lead");
        let resp = self
            .request(reqwest::Method::GET, "/api/leads/search")
            .query(&[("phone", phone.unwrap_or_default()), ("email", email.unwrap_or_default())])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            warn!(status, body = %message, "CRM search returned an error");
            return Err(CrmError::Api { status, message });
        }

        let found: SearchResponse = resp.json().await.map_err(|e| CrmError::Parse(e.to_string()))?;
        Ok(found.id)
    }

    async fn create_lead(&self, payload: &LeadPayload) -> Result<String> {
        let resp = self
            .request(reqwest::Method::POST, "/api/leads")
            .json(payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            warn!(status, body = %message, "CRM create_lead returned an error");
            return Err(CrmError::Api { status, message });
        }

        let created: CreateResponse = resp.json().await.map_err(|e| CrmError::Parse(e.to_string()))?;
        Ok(created.id)
    }

    async fn add_note(&self, crm_id: &str, text: &str) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/api/leads/{crm_id}/notes"))
            .json(&NotePayload { text: text.to_string() })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            warn!(status, body = %message, "CRM add_note returned an error");
            return Err(CrmError::Api { status, message });
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    id: Option<String>,
}

#[derive(Deserialize)]
struct CreateResponse {
    id: String,
}

#[derive(Serialize)]
struct NotePayload {
    text: String,
}

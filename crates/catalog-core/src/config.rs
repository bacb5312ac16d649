use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default per-turn soft deadline (`spec.md` §5).
pub const DEFAULT_TURN_DEADLINE_SECS: u64 = 10;
/// Default per-attempt LLM call timeout (`spec.md` §5).
pub const DEFAULT_LLM_CALL_TIMEOUT_SECS: u64 = 30;
/// Default graceful-shutdown drain budget (`spec.md` §5).
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;
/// Messages kept in the LLM-visible context window (`spec.md` §4.5).
pub const CONTEXT_WINDOW_SIZE: usize = 20;
/// Max sync attempts per lead before it is marked `failed` (`spec.md` §4.9, Open Question 1).
pub const MAX_LEAD_SYNC_ATTEMPTS: u32 = 2;
/// Delay between CRM retry attempts (`spec.md` §4.9).
pub const CRM_RETRY_DELAY_SECS: u64 = 30 * 60;
/// Inactivity monitor scan cadence (`spec.md` §4.10).
pub const INACTIVITY_SCAN_INTERVAL_SECS: u64 = 10 * 60;

/// Top-level application config: `catalog.toml` plus environment overrides.
///
/// Every key enumerated in `spec.md` §6 is a field here (possibly nested).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub catalog: CatalogSearchConfig,
    #[serde(default)]
    pub cost_guard: CostGuardConfig,
    #[serde(default)]
    pub leads: LeadsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub crm: CrmConfig,
}

impl CatalogConfig {
    /// Load config from a TOML file with environment variable overrides
    /// (`spec.md` §6 names every key verbatim — no prefix).
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(|| "catalog.toml".to_string());

        let config: CatalogConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::raw().only(&[
                "BOT_TOKEN",
                "DATABASE_URL",
                "DEFAULT_LLM_PROVIDER",
                "OPENAI_API_KEY",
                "YANDEX_API_KEY",
                "YANDEX_FOLDER_ID",
                "OPENAI_DEFAULT_MODEL",
                "YANDEX_DEFAULT_MODEL",
                "CHROMA_PERSIST_DIR",
                "UPLOAD_DIR",
                "EMBEDDING_MODEL",
                "SEARCH_MIN_SCORE",
                "SEARCH_NAME_BOOST",
                "SEARCH_ARTICLE_BOOST",
                "SEARCH_MAX_RESULTS",
                "MONTHLY_TOKEN_LIMIT",
                "MONTHLY_COST_LIMIT_USD",
                "COST_ALERT_THRESHOLD",
                "AUTO_DISABLE_ON_LIMIT",
                "COST_ALERT_ENABLED",
                "WEEKLY_USAGE_REPORT",
                "LEAD_INACTIVITY_THRESHOLD",
                "MANAGER_TELEGRAM_CHAT_ID",
                "ADMIN_TELEGRAM_IDS",
                "MANAGER_EMAILS",
                "SMTP_HOST",
                "SMTP_USER",
                "SMTP_PASSWORD",
                "BASE_URL",
                "DISABLE_TELEGRAM_BOT",
                "CRM_API_URL",
                "CRM_API_KEY",
            ]))
            .extract()
            .map_err(|e| crate::error::CatalogError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `DATABASE_URL` — a filesystem path to the SQLite database file.
    #[serde(default = "default_database_url", alias = "DATABASE_URL")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "./data/catalog.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// `BOT_TOKEN`
    #[serde(alias = "BOT_TOKEN")]
    pub bot_token: String,
    /// `DISABLE_TELEGRAM_BOT` — when true the process exposes the API only.
    #[serde(default, alias = "DISABLE_TELEGRAM_BOT")]
    pub disable_bot: bool,
    /// Path the Telegram webhook is mounted at.
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

fn default_webhook_path() -> String {
    "/webhook/telegram".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    /// `DEFAULT_LLM_PROVIDER` — fallback provider when none is active in storage.
    #[serde(default = "default_llm_provider", alias = "DEFAULT_LLM_PROVIDER")]
    pub default_provider: String,
    #[serde(alias = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,
    #[serde(alias = "OPENAI_DEFAULT_MODEL")]
    pub openai_default_model: Option<String>,
    #[serde(alias = "YANDEX_API_KEY")]
    pub yandex_api_key: Option<String>,
    #[serde(alias = "YANDEX_FOLDER_ID")]
    pub yandex_folder_id: Option<String>,
    #[serde(alias = "YANDEX_DEFAULT_MODEL")]
    pub yandex_default_model: Option<String>,
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

/// Vector Catalog Engine tunables (`spec.md` §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSearchConfig {
    /// `CHROMA_PERSIST_DIR`
    #[serde(default = "default_chroma_dir", alias = "CHROMA_PERSIST_DIR")]
    pub persist_dir: String,
    /// `UPLOAD_DIR`
    #[serde(default = "default_upload_dir", alias = "UPLOAD_DIR")]
    pub upload_dir: String,
    /// `EMBEDDING_MODEL` — qualified identifier, `org/name`.
    #[serde(default = "default_embedding_model", alias = "EMBEDDING_MODEL")]
    pub embedding_model: String,
    #[serde(default = "default_min_score", alias = "SEARCH_MIN_SCORE")]
    pub min_score: f32,
    #[serde(default = "default_name_boost", alias = "SEARCH_NAME_BOOST")]
    pub name_boost: f32,
    #[serde(default = "default_article_boost", alias = "SEARCH_ARTICLE_BOOST")]
    pub article_boost: f32,
    #[serde(default = "default_max_results", alias = "SEARCH_MAX_RESULTS")]
    pub max_results: usize,
}

impl Default for CatalogSearchConfig {
    fn default() -> Self {
        Self {
            persist_dir: default_chroma_dir(),
            upload_dir: default_upload_dir(),
            embedding_model: default_embedding_model(),
            min_score: default_min_score(),
            name_boost: default_name_boost(),
            article_boost: default_article_boost(),
            max_results: default_max_results(),
        }
    }
}

fn default_chroma_dir() -> String {
    "./data/chroma".to_string()
}
fn default_upload_dir() -> String {
    "./data/uploads".to_string()
}
fn default_embedding_model() -> String {
    "sentence-transformers/paraphrase-multilingual-mpnet-base-v2".to_string()
}
fn default_min_score() -> f32 {
    0.45
}
fn default_name_boost() -> f32 {
    0.20
}
fn default_article_boost() -> f32 {
    0.30
}
fn default_max_results() -> usize {
    10
}

impl CatalogSearchConfig {
    /// Reject configuration values outside the ranges fixed by `spec.md` §4.3.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(crate::error::CatalogError::Config(format!(
                "SEARCH_MIN_SCORE must be in [0,1], got {}",
                self.min_score
            )));
        }
        if !(0.0..=0.5).contains(&self.name_boost) || !(0.0..=0.5).contains(&self.article_boost) {
            return Err(crate::error::CatalogError::Config(
                "SEARCH_NAME_BOOST/SEARCH_ARTICLE_BOOST must be in [0, 0.5]".to_string(),
            ));
        }
        if self.article_boost <= self.name_boost {
            return Err(crate::error::CatalogError::Config(
                "SEARCH_ARTICLE_BOOST must exceed SEARCH_NAME_BOOST".to_string(),
            ));
        }
        if !(1..=20).contains(&self.max_results) {
            return Err(crate::error::CatalogError::Config(
                "SEARCH_MAX_RESULTS must be in [1,20]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cost Guard tunables (`spec.md` §4.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostGuardConfig {
    #[serde(default, alias = "MONTHLY_TOKEN_LIMIT")]
    pub monthly_token_limit: Option<u64>,
    #[serde(default = "default_cost_limit", alias = "MONTHLY_COST_LIMIT_USD")]
    pub monthly_cost_limit_usd: f64,
    #[serde(default = "default_alert_threshold", alias = "COST_ALERT_THRESHOLD")]
    pub alert_threshold: f64,
    #[serde(default, alias = "AUTO_DISABLE_ON_LIMIT")]
    pub auto_disable_on_limit: bool,
    #[serde(default = "bool_true", alias = "COST_ALERT_ENABLED")]
    pub alert_enabled: bool,
    #[serde(default, alias = "WEEKLY_USAGE_REPORT")]
    pub weekly_usage_report: bool,
}

impl Default for CostGuardConfig {
    fn default() -> Self {
        Self {
            monthly_token_limit: None,
            monthly_cost_limit_usd: default_cost_limit(),
            alert_threshold: default_alert_threshold(),
            auto_disable_on_limit: false,
            alert_enabled: true,
            weekly_usage_report: false,
        }
    }
}

fn default_cost_limit() -> f64 {
    100.0
}
fn default_alert_threshold() -> f64 {
    0.8
}
fn bool_true() -> bool {
    true
}

/// Lead Pipeline tunables (`spec.md` §4.8, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadsConfig {
    /// `LEAD_INACTIVITY_THRESHOLD` — minutes idle before triggering lead capture.
    #[serde(
        default = "default_inactivity_threshold",
        alias = "LEAD_INACTIVITY_THRESHOLD"
    )]
    pub inactivity_threshold_minutes: u64,
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_minutes: default_inactivity_threshold(),
        }
    }
}

fn default_inactivity_threshold() -> u64 {
    30
}

/// Notification targets (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationsConfig {
    #[serde(alias = "MANAGER_TELEGRAM_CHAT_ID")]
    pub manager_telegram_chat_id: Option<String>,
    /// `ADMIN_TELEGRAM_IDS` — comma-separated in the env var, split on load.
    #[serde(default, alias = "ADMIN_TELEGRAM_IDS")]
    pub admin_telegram_ids: CommaSeparated,
    /// `MANAGER_EMAILS` — comma-separated in the env var, split on load.
    #[serde(default, alias = "MANAGER_EMAILS")]
    pub manager_emails: CommaSeparated,
}

/// A `Vec<String>` that also deserializes from a single comma-separated string,
/// the shape these values arrive in as environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(from = "CommaSeparatedRepr")]
pub struct CommaSeparated(pub Vec<String>);

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CommaSeparatedRepr {
    List(Vec<String>),
    Joined(String),
}

impl From<CommaSeparatedRepr> for CommaSeparated {
    fn from(repr: CommaSeparatedRepr) -> Self {
        match repr {
            CommaSeparatedRepr::List(v) => CommaSeparated(v),
            CommaSeparatedRepr::Joined(s) => CommaSeparated(
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            ),
        }
    }
}

/// `spec.md` §6 SMTP keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SmtpConfig {
    #[serde(alias = "SMTP_HOST")]
    pub host: Option<String>,
    #[serde(alias = "SMTP_USER")]
    pub user: Option<String>,
    #[serde(alias = "SMTP_PASSWORD")]
    pub password: Option<String>,
    #[serde(alias = "BASE_URL")]
    pub base_url: Option<String>,
}

/// CRM endpoint the Lead Pipeline's delivery worker talks to (`spec.md`
/// §6's wire contract: `search`, `create_lead`, `add_note`). The CRM's own
/// data model is out of scope; this is only the reachability config.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrmConfig {
    #[serde(alias = "CRM_API_URL")]
    pub api_url: Option<String>,
    #[serde(alias = "CRM_API_KEY")]
    pub api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_config_defaults_are_valid() {
        CatalogSearchConfig::default().validate().unwrap();
    }

    #[test]
    fn article_boost_must_exceed_name_boost() {
        let cfg = CatalogSearchConfig {
            article_boost: 0.1,
            name_boost: 0.2,
            ..CatalogSearchConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn comma_separated_splits_env_style_string() {
        let parsed: CommaSeparated =
            serde_json::from_value(serde_json::json!("111, 222 ,333")).unwrap();
        assert_eq!(parsed.0, vec!["111", "222", "333"]);
    }
}

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection};
use tracing::{error, warn};

use catalog_core::config::CostGuardConfig;

use crate::db::{row_to_usage_record, USAGE_SELECT_SQL};
use crate::error::Result;
use crate::pricing::lookup_price;
use crate::types::UsageRecord;

/// Rolls completion token usage into monthly totals and trips a kill-switch
/// when spend crosses `MONTHLY_COST_LIMIT_USD` (`spec.md` §4.12 C12).
pub struct CostGuard {
    db: Arc<Mutex<Connection>>,
    config: CostGuardConfig,
    kill_switch: Arc<AtomicBool>,
    /// `"{year}-{month}"` periods that have already fired the threshold
    /// alert, so it is raised once per period rather than on every call.
    alerted_periods: Mutex<HashSet<String>>,
}

impl CostGuard {
    pub fn new(db: Arc<Mutex<Connection>>, config: CostGuardConfig) -> Result<Self> {
        {
            let conn = db.lock().unwrap();
            crate::db::init_db(&conn)?;
        }
        Ok(Self {
            db,
            config,
            kill_switch: Arc::new(AtomicBool::new(false)),
            alerted_periods: Mutex::new(HashSet::new()),
        })
    }

    /// The flag `catalog-llm`'s `ProviderRouter` should check before every
    /// call. Shared, not cloned-and-synced — there is exactly one guard per
    /// process.
    pub fn kill_switch(&self) -> Arc<AtomicBool> {
        self.kill_switch.clone()
    }

    /// Explicit operator action; never cleared automatically.
    pub fn clear_kill_switch(&self) {
        self.kill_switch.store(false, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.kill_switch.load(Ordering::SeqCst)
    }

    /// Roll one completion's tokens into the current month's record for
    /// `(provider, model)`, then evaluate alert/kill-switch thresholds.
    pub fn record_usage(&self, provider: &str, model: &str, tokens_in: u32, tokens_out: u32) -> Result<UsageRecord> {
        let now = Utc::now();
        let (year, month) = (now.year(), now.month());
        let tokens = (tokens_in + tokens_out) as i64;
        let price = lookup_price(provider, model);

        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO usage_statistics (provider, model, year, month, total_tokens, price_per_1k, currency)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'USD')
             ON CONFLICT(provider, model, year, month)
             DO UPDATE SET total_tokens = total_tokens + excluded.total_tokens",
            params![provider, model, year, month, tokens, price],
        )?;

        let record = conn.query_row(
            &format!(
                "{USAGE_SELECT_SQL} WHERE provider = ?1 AND model = ?2 AND year = ?3 AND month = ?4"
            ),
            params![provider, model, year, month],
            row_to_usage_record,
        )?;
        drop(conn);

        self.evaluate_thresholds(&record, year, month);
        Ok(record)
    }

    /// Every usage record for a given period, across all providers/models.
    pub fn monthly_summary(&self, year: i32, month: u32) -> Result<Vec<UsageRecord>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{USAGE_SELECT_SQL} WHERE year = ?1 AND month = ?2"))?;
        let rows = stmt
            .query_map(params![year, month], row_to_usage_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Project this period's total spend across every provider/model to a
    /// full month, scaling by how much of the month has elapsed so far.
    pub fn projected_monthly_cost(&self, year: i32, month: u32) -> Result<f64> {
        let records = self.monthly_summary(year, month)?;
        let spent: f64 = records.iter().map(UsageRecord::cost_so_far).sum();
        Ok(project_to_full_month(spent, year, month))
    }

    fn evaluate_thresholds(&self, _record: &UsageRecord, year: i32, month: u32) {
        let projected = match self.projected_monthly_cost(year, month) {
            Ok(p) => p,
            Err(e) => {
                warn!(err = %e, "failed to compute projected monthly cost");
                return;
            }
        };
        let limit = self.config.monthly_cost_limit_usd;
        if limit <= 0.0 {
            return;
        }

        if projected >= limit {
            if self.config.auto_disable_on_limit && !self.kill_switch.swap(true, Ordering::SeqCst) {
                error!(projected, limit, "monthly cost limit exceeded, LLM calls disabled");
            }
        }

        if self.config.alert_enabled && projected >= self.config.alert_threshold * limit {
            let period = format!("{year}-{month:02}");
            let mut alerted = self.alerted_periods.lock().unwrap();
            if alerted.insert(period) {
                error!(projected, limit, threshold = self.config.alert_threshold, "cost alert threshold crossed");
            }
        }
    }
}

fn project_to_full_month(spent_so_far: f64, year: i32, month: u32) -> f64 {
    let today = Utc::now().day();
    let days_in_month = days_in_month(year, month).max(1);
    let elapsed = today.max(1) as f64;
    spent_so_far * (days_in_month as f64 / elapsed)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("valid calendar month");
    let first_of_this = NaiveDate::from_ymd_opt(year, month, 1).expect("valid calendar month");
    (first_of_next - first_of_this).num_days() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_guard(config: CostGuardConfig) -> CostGuard {
        let conn = Connection::open_in_memory().unwrap();
        CostGuard::new(Arc::new(Mutex::new(conn)), config).unwrap()
    }

    fn permissive_config() -> CostGuardConfig {
        CostGuardConfig {
            monthly_token_limit: None,
            monthly_cost_limit_usd: 1000.0,
            alert_threshold: 0.8,
            auto_disable_on_limit: true,
            alert_enabled: true,
            weekly_usage_report: false,
        }
    }

    #[test]
    fn record_usage_accumulates_tokens_across_calls() {
        let guard = test_guard(permissive_config());
        guard.record_usage("openai", "gpt-4o-mini", 100, 50).unwrap();
        let record = guard.record_usage("openai", "gpt-4o-mini", 200, 100).unwrap();
        assert_eq!(record.total_tokens, 450);
    }

    #[test]
    fn separate_models_get_separate_rollups() {
        let guard = test_guard(permissive_config());
        guard.record_usage("openai", "gpt-4o-mini", 100, 50).unwrap();
        guard.record_usage("yandex", "yandexgpt-lite", 10, 10).unwrap();
        let now = Utc::now();
        let summary = guard.monthly_summary(now.year(), now.month()).unwrap();
        assert_eq!(summary.len(), 2);
    }

    #[test]
    fn kill_switch_trips_once_limit_is_crossed() {
        let mut config = permissive_config();
        config.monthly_cost_limit_usd = 0.0001;
        let guard = test_guard(config);
        assert!(!guard.is_tripped());
        guard.record_usage("openai", "gpt-4o-mini", 100_000, 100_000).unwrap();
        assert!(guard.is_tripped());
    }

    #[test]
    fn kill_switch_stays_tripped_until_explicitly_cleared() {
        let mut config = permissive_config();
        config.monthly_cost_limit_usd = 0.0001;
        let guard = test_guard(config);
        guard.record_usage("openai", "gpt-4o-mini", 100_000, 100_000).unwrap();
        assert!(guard.is_tripped());
        guard.clear_kill_switch();
        assert!(!guard.is_tripped());
    }

    #[test]
    fn auto_disable_false_never_trips_kill_switch() {
        let mut config = permissive_config();
        config.monthly_cost_limit_usd = 0.0001;
        config.auto_disable_on_limit = false;
        let guard = test_guard(config);
        guard.record_usage("openai", "gpt-4o-mini", 100_000, 100_000).unwrap();
        assert!(!guard.is_tripped());
    }
}

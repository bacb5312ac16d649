use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, instrument};

use crate::db::{row_to_service, SERVICE_SELECT_SQL};
use crate::error::Result;
use crate::types::{CompanyInfo, CompanyService};

/// Keyword/category lookup over `CompanyService`, plus the single
/// "company info" blob (`spec.md` §4.4 C4). Pure lookup — no LLM calls.
pub struct ServiceStore {
    db: Arc<Mutex<Connection>>,
}

impl ServiceStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let conn = db.lock().unwrap();
            crate::db::init_db(&conn)?;
        }
        Ok(Self { db })
    }

    /// Add (or re-seed) a service and index it for keyword search.
    pub fn add_service(
        &self,
        title: &str,
        description: &str,
        category: &str,
        keywords: &[String],
        active: bool,
    ) -> Result<CompanyService> {
        let conn = self.db.lock().unwrap();
        let keywords_json = serde_json::to_string(keywords)?;
        conn.execute(
            "INSERT INTO company_services (title, description, category, keywords_json, active)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![title, description, category, keywords_json, active as i32],
        )?;
        let id = conn.last_insert_rowid();

        let service = CompanyService {
            id,
            title: title.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            keywords: keywords.to_vec(),
            active,
        };
        crate::db::sync_fts(&conn, &service)?;
        Ok(service)
    }

    /// Permanently remove a service and its search index entry.
    pub fn remove_service(&self, id: i64) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute("DELETE FROM company_services WHERE id = ?1", params![id])?;
        crate::db::remove_fts(&conn, id)?;
        Ok(())
    }

    /// Keyword/category search across active services, ranked by FTS5
    /// relevance (bm25, best match first).
    #[instrument(skip(self), fields(query))]
    pub fn find_services(&self, query: &str) -> Result<Vec<CompanyService>> {
        if query.trim().is_empty() {
            return self.active_services();
        }

        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SERVICE_SELECT_SQL} WHERE id IN (
                SELECT rowid FROM company_services_fts WHERE company_services_fts MATCH ?1
                ORDER BY bm25(company_services_fts)
            ) AND active = 1"
        ))?;
        // FTS5 treats bare punctuation/short terms as syntax; fall back to a
        // plain substring match rather than erroring out the whole query.
        let fts_query = format!("{}*", sanitize_fts_query(query));
        let rows = stmt.query_map(params![fts_query], row_to_service);
        match rows {
            Ok(rows) => Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?),
            Err(_) => {
                debug!(query, "fts query failed to parse, falling back to substring match");
                self.substring_fallback(query)
            }
        }
    }

    fn active_services(&self) -> Result<Vec<CompanyService>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{SERVICE_SELECT_SQL} WHERE active = 1"))?;
        let rows = stmt
            .query_map([], row_to_service)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn substring_fallback(&self, query: &str) -> Result<Vec<CompanyService>> {
        let conn = self.db.lock().unwrap();
        let pattern = format!("%{}%", query.to_lowercase());
        let mut stmt = conn.prepare(&format!(
            "{SERVICE_SELECT_SQL} WHERE active = 1 AND (
                lower(title) LIKE ?1 OR lower(description) LIKE ?1
                OR lower(category) LIKE ?1 OR lower(keywords_json) LIKE ?1
            )"
        ))?;
        let rows = stmt
            .query_map(params![pattern], row_to_service)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The current "company info" blob, if one has been uploaded.
    pub fn company_info(&self) -> Result<Option<CompanyInfo>> {
        let conn = self.db.lock().unwrap();
        match conn.query_row(
            "SELECT content, updated_at FROM company_info WHERE id = 1",
            [],
            |row| {
                Ok(CompanyInfo {
                    content: row.get(0)?,
                    updated_at: row.get(1)?,
                })
            },
        ) {
            Ok(info) => Ok(Some(info)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the company info blob (single row, upserted).
    pub fn set_company_info(&self, content: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO company_info (id, content, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at",
            params![content, now],
        )?;
        Ok(())
    }
}

/// FTS5 MATCH syntax treats `: " ( ) *` etc. as operators; strip anything
/// that isn't alphanumeric or whitespace so free-text user queries never
/// produce a syntax error.
fn sanitize_fts_query(query: &str) -> String {
    query
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> ServiceStore {
        let conn = Connection::open_in_memory().unwrap();
        ServiceStore::new(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn find_services_matches_by_keyword() {
        let store = test_store();
        store
            .add_service(
                "Installation",
                "On-site installation of heavy equipment",
                "logistics",
                &["install".to_string(), "setup".to_string()],
                true,
            )
            .unwrap();
        store
            .add_service("Warranty repair", "Covered repairs", "support", &[], true)
            .unwrap();

        let found = store.find_services("install").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Installation");
    }

    #[test]
    fn find_services_excludes_inactive() {
        let store = test_store();
        store
            .add_service("Old service", "no longer offered", "misc", &[], false)
            .unwrap();
        assert!(store.find_services("service").unwrap().is_empty());
    }

    #[test]
    fn empty_query_returns_all_active_services() {
        let store = test_store();
        store.add_service("A", "desc a", "cat", &[], true).unwrap();
        store.add_service("B", "desc b", "cat", &[], true).unwrap();
        assert_eq!(store.find_services("").unwrap().len(), 2);
    }

    #[test]
    fn remove_service_drops_it_from_search() {
        let store = test_store();
        let service = store.add_service("A", "desc a", "cat", &[], true).unwrap();
        store.remove_service(service.id).unwrap();
        assert!(store.find_services("desc").unwrap().is_empty());
    }

    #[test]
    fn company_info_round_trips() {
        let store = test_store();
        assert!(store.company_info().unwrap().is_none());
        store.set_company_info("We are open 9-5 on weekdays.").unwrap();
        let info = store.company_info().unwrap().unwrap();
        assert_eq!(info.content, "We are open 9-5 on weekdays.");
    }

    #[test]
    fn set_company_info_twice_overwrites_single_row() {
        let store = test_store();
        store.set_company_info("first").unwrap();
        store.set_company_info("second").unwrap();
        assert_eq!(store.company_info().unwrap().unwrap().content, "second");
    }

    #[test]
    fn punctuation_in_query_falls_back_instead_of_erroring() {
        let store = test_store();
        store
            .add_service("Support", "24/7 support line", "support", &[], true)
            .unwrap();
        let found = store.find_services("24/7 (support)").unwrap();
        assert_eq!(found.len(), 1);
    }
}

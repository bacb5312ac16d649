use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{params, Connection};
use tracing::info;

use crate::error::{PromptError, Result};
use crate::types::{Prompt, SEED_PROMPTS};

/// In-process prompt cache backed by SQLite (`spec.md` §4.1 C1).
///
/// `get()` never touches SQLite — it serves the `DashMap` cache populated on
/// construction and refreshed by `reload()`, the same concurrent-map idiom
/// the gateway uses for its client tables.
pub struct PromptRegistry {
    db: Arc<Mutex<Connection>>,
    cache: DashMap<String, Prompt>,
}

impl PromptRegistry {
    /// Open the registry, seeding defaults into an empty table and loading
    /// every active prompt into the cache.
    pub fn new(db: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let conn = db.lock().unwrap();
            crate::db::init_db(&conn)?;
            seed_if_empty(&conn)?;
        }
        let registry = Self {
            db,
            cache: DashMap::new(),
        };
        registry.reload()?;
        Ok(registry)
    }

    /// Fetch the active content for `name`. Fails with `PromptNotFound` if
    /// unknown.
    pub fn get(&self, name: &str) -> Result<Prompt> {
        self.cache
            .get(name)
            .map(|p| p.clone())
            .ok_or_else(|| PromptError::NotFound(name.to_string()))
    }

    /// Insert a new version of `name` and make it active, atomically
    /// superseding the previous active version.
    pub fn put(&self, name: &str, content: &str, role: &str) -> Result<Prompt> {
        let conn = self.db.lock().unwrap();
        let next_version: u32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM prompts WHERE name = ?1",
                params![name],
                |r| r.get(0),
            )
            .unwrap_or(1);

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE prompts SET active = 0 WHERE name = ?1 AND active = 1",
            params![name],
        )?;
        conn.execute(
            "INSERT INTO prompts (name, content, version, active, role, created_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5)",
            params![name, content, next_version, role, now],
        )?;

        let prompt = Prompt {
            name: name.to_string(),
            content: content.to_string(),
            version: next_version,
            active: true,
            role: role.to_string(),
            created_at: now,
        };
        self.cache.insert(name.to_string(), prompt.clone());
        info!(name, version = next_version, "prompt activated");
        Ok(prompt)
    }

    /// Re-read every `active = true` row from SQLite into the cache.
    pub fn reload(&self) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name, content, version, active, role, created_at
             FROM prompts WHERE active = 1",
        )?;
        let rows = stmt
            .query_map([], crate::db::row_to_prompt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        self.cache.clear();
        for prompt in rows {
            self.cache.insert(prompt.name.clone(), prompt);
        }
        Ok(())
    }
}

fn seed_if_empty(conn: &Connection) -> Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM prompts", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }

    let now = Utc::now().to_rfc3339();
    for (name, content) in SEED_PROMPTS {
        conn.execute(
            "INSERT INTO prompts (name, content, version, active, role, created_at)
             VALUES (?1, ?2, 1, 1, 'system', ?3)",
            params![name, content, now],
        )?;
    }
    info!(count = SEED_PROMPTS.len(), "seeded default prompts");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> PromptRegistry {
        let conn = Connection::open_in_memory().unwrap();
        PromptRegistry::new(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn seeds_defaults_on_empty_db() {
        let registry = test_registry();
        assert!(registry.get("product_search").is_ok());
        assert!(registry.get("general_conversation").is_ok());
    }

    #[test]
    fn unknown_name_is_not_found() {
        let registry = test_registry();
        assert!(matches!(
            registry.get("does_not_exist"),
            Err(PromptError::NotFound(_))
        ));
    }

    #[test]
    fn put_supersedes_previous_active_version() {
        let registry = test_registry();
        let first = registry.get("product_search").unwrap();
        let updated = registry.put("product_search", "new content", "system").unwrap();
        assert_eq!(updated.version, first.version + 1);

        let fetched = registry.get("product_search").unwrap();
        assert_eq!(fetched.content, "new content");
        assert_eq!(fetched.version, updated.version);
    }

    #[test]
    fn reload_picks_up_external_writes() {
        let registry = test_registry();
        registry.put("product_search", "v2", "system").unwrap();
        registry.reload().unwrap();
        assert_eq!(registry.get("product_search").unwrap().content, "v2");
    }
}

use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::Result;
use crate::types::{CatalogVersion, CatalogVersionStatus};

fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogVersion> {
    let status: String = row.get(1)?;
    Ok(CatalogVersion {
        version_name: row.get(0)?,
        status: status.parse().unwrap_or(CatalogVersionStatus::Failed),
        total_rows: row.get::<_, i64>(2)? as u64,
        indexed_rows: row.get::<_, i64>(3)? as u64,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

const VERSION_SELECT_SQL: &str =
    "SELECT version_name, status, total_rows, indexed_rows, created_at, updated_at FROM catalog_versions";

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS catalog_versions (
            version_name  TEXT PRIMARY KEY,
            status        TEXT NOT NULL DEFAULT 'building',
            total_rows    INTEGER NOT NULL DEFAULT 0,
            indexed_rows  INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );",
    )?;
    Ok(())
}

/// Tracks catalog build lifecycle across versions (`spec.md` §3
/// CatalogVersion, §4.3 blue-green build). At most one row is ever
/// `active`; `activate()` enforces that atomically.
pub struct VersionStore {
    db: Mutex<Connection>,
}

impl VersionStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn create_building(&self, version_name: &str, total_rows: u64) -> Result<CatalogVersion> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO catalog_versions (version_name, status, total_rows, indexed_rows)
             VALUES (?1, 'building', ?2, 0)",
            rusqlite::params![version_name, total_rows as i64],
        )?;
        let version = db.query_row(
            &format!("{VERSION_SELECT_SQL} WHERE version_name = ?1"),
            [version_name],
            row_to_version,
        )?;
        Ok(version)
    }

    pub fn update_progress(&self, version_name: &str, indexed_rows: u64) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE catalog_versions
             SET indexed_rows = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
             WHERE version_name = ?1",
            rusqlite::params![version_name, indexed_rows as i64],
        )?;
        Ok(())
    }

    pub fn mark_failed(&self, version_name: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE catalog_versions
             SET status = 'failed', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
             WHERE version_name = ?1",
            [version_name],
        )?;
        Ok(())
    }

    /// Promotes `version_name` from `building` to `active`, demoting the
    /// previously active row (if any) to `superseded`, in one transaction —
    /// the invariant is "at most one active version", never "zero, briefly".
    pub fn activate(&self, version_name: &str) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "UPDATE catalog_versions
             SET status = 'superseded', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
             WHERE status = 'active'",
            [],
        )?;
        tx.execute(
            "UPDATE catalog_versions
             SET status = 'active', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
             WHERE version_name = ?1",
            [version_name],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn active_version(&self) -> Result<Option<CatalogVersion>> {
        let db = self.db.lock().unwrap();
        let result = db.query_row(
            &format!("{VERSION_SELECT_SQL} WHERE status = 'active'"),
            [],
            row_to_version,
        );
        match result {
            Ok(version) => Ok(Some(version)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list(&self) -> Result<Vec<CatalogVersion>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!("{VERSION_SELECT_SQL} ORDER BY created_at DESC"))?;
        let rows = stmt.query_map([], row_to_version)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Versions eligible for garbage collection: `superseded` or `failed`,
    /// excluding the current active one by construction.
    pub fn collectible(&self) -> Result<Vec<CatalogVersion>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{VERSION_SELECT_SQL} WHERE status IN ('superseded', 'failed') ORDER BY updated_at ASC"
        ))?;
        let rows = stmt.query_map([], row_to_version)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn remove(&self, version_name: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM catalog_versions WHERE version_name = ?1", [version_name])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VersionStore {
        VersionStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn activate_promotes_building_to_active() {
        let store = store();
        store.create_building("v1", 100).unwrap();
        store.activate("v1").unwrap();
        let active = store.active_version().unwrap().unwrap();
        assert_eq!(active.version_name, "v1");
        assert_eq!(active.status, CatalogVersionStatus::Active);
    }

    #[test]
    fn activating_new_version_supersedes_previous_active() {
        let store = store();
        store.create_building("v1", 100).unwrap();
        store.activate("v1").unwrap();
        store.create_building("v2", 200).unwrap();
        store.activate("v2").unwrap();

        let active = store.active_version().unwrap().unwrap();
        assert_eq!(active.version_name, "v2");

        let all = store.list().unwrap();
        let v1 = all.iter().find(|v| v.version_name == "v1").unwrap();
        assert_eq!(v1.status, CatalogVersionStatus::Superseded);
    }

    #[test]
    fn at_most_one_active_version_ever() {
        let store = store();
        store.create_building("v1", 10).unwrap();
        store.activate("v1").unwrap();
        store.create_building("v2", 10).unwrap();
        store.activate("v2").unwrap();
        store.create_building("v3", 10).unwrap();
        store.activate("v3").unwrap();

        let active_count = store.list().unwrap().iter().filter(|v| v.status == CatalogVersionStatus::Active).count();
        assert_eq!(active_count, 1);
    }

    #[test]
    fn collectible_excludes_active_and_building() {
        let store = store();
        store.create_building("v1", 10).unwrap();
        store.activate("v1").unwrap();
        store.create_building("v2", 10).unwrap();
        store.activate("v2").unwrap();
        store.create_building("v3", 10).unwrap();

        let collectible = store.collectible().unwrap();
        let names: Vec<_> = collectible.iter().map(|v| v.version_name.as_str()).collect();
        assert_eq!(names, vec!["v1"]);
    }

    #[test]
    fn update_progress_tracks_indexed_rows() {
        let store = store();
        store.create_building("v1", 500).unwrap();
        store.update_progress("v1", 250).unwrap();
        let v = store.list().unwrap().into_iter().find(|v| v.version_name == "v1").unwrap();
        assert_eq!(v.indexed_rows, 250);
    }
}

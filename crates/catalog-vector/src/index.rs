use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::Result;
use crate::types::Product;

fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        product_name: row.get(1)?,
        category_1: row.get(2)?,
        category_2: row.get(3)?,
        category_3: row.get(4)?,
        article: row.get(5)?,
        description: row.get(6)?,
        photo_url: row.get(7)?,
        page_url: row.get(8)?,
    })
}

const PRODUCT_SELECT_SQL: &str =
    "SELECT id, product_name, category_1, category_2, category_3, article, description, photo_url, page_url FROM products";

/// One `CatalogVersion`'s on-disk index: a `vec0` virtual table of
/// embeddings plus a side table of product rows, in its own SQLite file
/// (`spec.md` §4.3's blue-green build isolates a new version from the one
/// currently serving).
pub struct CatalogIndex {
    conn: Connection,
    pub version_name: String,
    pub dimension: usize,
}

impl CatalogIndex {
    /// Open (creating if absent) the SQLite file for `version_name` under
    /// `persist_dir`, with the `sqlite-vec` extension registered and a
    /// `vec0` table sized for `dimension`.
    pub fn open(persist_dir: &Path, version_name: &str, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(persist_dir.join(version_name))?;
        let path = db_path(persist_dir, version_name);

        unsafe {
            // sqlite-vec registers vec0/vec_distance_cosine as an auto
            // extension — every Connection opened after this call gets it.
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
        let conn = Connection::open(&path)?;
        init_schema(&conn, dimension)?;

        Ok(Self {
            conn,
            version_name: version_name.to_string(),
            dimension,
        })
    }

    /// Insert one batch of products with their embeddings, in a single
    /// transaction. `products.len()` must equal `embeddings.len()`.
    pub fn insert_batch(&mut self, products: &[Product], embeddings: &[Vec<f32>]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (product, embedding) in products.iter().zip(embeddings) {
            tx.execute(
                "INSERT OR REPLACE INTO products
                 (id, product_name, category_1, category_2, category_3, article, description, photo_url, page_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    product.id,
                    product.product_name,
                    product.category_1,
                    product.category_2,
                    product.category_3,
                    product.article,
                    product.description,
                    product.photo_url,
                    product.page_url,
                ],
            )?;

            let bytes: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
            tx.execute(
                "INSERT OR REPLACE INTO vec_products (product_id, embedding) VALUES (?1, ?2)",
                rusqlite::params![product.id, bytes],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn row_count(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    pub fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
        let result = self.conn.query_row(
            &format!("{PRODUCT_SELECT_SQL} WHERE id = ?1"),
            [product_id],
            row_to_product,
        );
        match result {
            Ok(product) => Ok(Some(product)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Top `k_raw` candidates by cosine similarity (`1 - cosine_distance`),
    /// joined with their product row.
    pub fn search_raw(&self, query_embedding: &[f32], k_raw: usize) -> Result<Vec<(Product, f64)>> {
        let bytes: Vec<u8> = query_embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.product_name, p.category_1, p.category_2, p.category_3,
                    p.article, p.description, p.photo_url, p.page_url,
                    vec_distance_cosine(v.embedding, ?1) AS distance
             FROM vec_products v JOIN products p ON p.id = v.product_id
             ORDER BY distance ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![bytes, k_raw as i64], |row| {
            let distance: f64 = row.get(9)?;
            Ok((row_to_product(row)?, 1.0 - distance))
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

fn init_schema(conn: &Connection, dimension: usize) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS products (
            id            TEXT PRIMARY KEY,
            product_name  TEXT NOT NULL,
            category_1    TEXT NOT NULL,
            category_2    TEXT NOT NULL DEFAULT '',
            category_3    TEXT NOT NULL DEFAULT '',
            article       TEXT NOT NULL,
            description   TEXT NOT NULL DEFAULT '',
            photo_url     TEXT NOT NULL DEFAULT '',
            page_url      TEXT NOT NULL DEFAULT ''
        );
        CREATE VIRTUAL TABLE IF NOT EXISTS vec_products USING vec0(
            product_id TEXT PRIMARY KEY,
            embedding float[{dimension}]
        );"
    ))?;
    Ok(())
}

pub(crate) fn db_path(persist_dir: &Path, version_name: &str) -> PathBuf {
    persist_dir.join(version_name).join("catalog.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, name: &str, article: &str) -> Product {
        Product {
            id: id.to_string(),
            product_name: name.to_string(),
            category_1: "tools".to_string(),
            category_2: String::new(),
            category_3: String::new(),
            article: article.to_string(),
            description: String::new(),
            photo_url: String::new(),
            page_url: String::new(),
        }
    }

    fn fake_embedding(dim: usize, lead: f32) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[0] = lead;
        v
    }

    #[test]
    fn insert_batch_then_row_count_reflects_inserted_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = CatalogIndex::open(dir.path(), "v1", 4).unwrap();
        let products = vec![product("p1", "Hammer", "A-1"), product("p2", "Wrench", "A-2")];
        let embeddings = vec![fake_embedding(4, 1.0), fake_embedding(4, 0.5)];
        index.insert_batch(&products, &embeddings).unwrap();
        assert_eq!(index.row_count().unwrap(), 2);
    }

    #[test]
    fn search_raw_orders_by_cosine_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = CatalogIndex::open(dir.path(), "v1", 4).unwrap();
        let products = vec![product("p1", "Hammer", "A-1"), product("p2", "Wrench", "A-2")];
        let embeddings = vec![fake_embedding(4, 1.0), fake_embedding(4, 0.9)];
        index.insert_batch(&products, &embeddings).unwrap();

        let hits = index.search_raw(&fake_embedding(4, 1.0), 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, "p1");
    }

    #[test]
    fn insert_batch_upserts_existing_product_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = CatalogIndex::open(dir.path(), "v1", 4).unwrap();
        index.insert_batch(&[product("p1", "Hammer", "A-1")], &[fake_embedding(4, 1.0)]).unwrap();
        index.insert_batch(&[product("p1", "Rubber Hammer", "A-1")], &[fake_embedding(4, 0.8)]).unwrap();

        assert_eq!(index.row_count().unwrap(), 1);
        let fetched = index.get_product("p1").unwrap().unwrap();
        assert_eq!(fetched.product_name, "Rubber Hammer");
    }

    #[test]
    fn get_product_returns_none_for_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let index = CatalogIndex::open(dir.path(), "v1", 4).unwrap();
        assert!(index.get_product("missing").unwrap().is_none());
    }
}

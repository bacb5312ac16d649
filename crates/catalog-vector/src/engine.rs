use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use catalog_core::config::CatalogSearchConfig;

use crate::embedder::LazyEmbedder;
use crate::error::{Result, VectorError};
use crate::index::CatalogIndex;
use crate::types::{Product, SearchHit};
use crate::versions::VersionStore;

/// Top-level catalog search engine: a lazily-loaded embedder, a version
/// store, and an `ArcSwap` pointer to whichever `CatalogIndex` is currently
/// active. Readers never block on a build; `build_version` swaps the
/// pointer only once the new index is fully populated (`spec.md` §4.3).
pub struct CatalogEngine {
    persist_dir: PathBuf,
    embedder: LazyEmbedder,
    versions: VersionStore,
    active: ArcSwapOption<CatalogIndex>,
}

const EMBEDDING_DIMENSION: usize = 384;
const BUILD_BATCH_SIZE: usize = 64;

impl CatalogEngine {
    pub fn new(persist_dir: impl Into<PathBuf>, version_store_conn: rusqlite::Connection) -> Result<Self> {
        Ok(Self {
            persist_dir: persist_dir.into(),
            embedder: LazyEmbedder::new(),
            versions: VersionStore::new(version_store_conn)?,
            active: ArcSwapOption::empty(),
        })
    }

    /// Reopens the currently-`active` `CatalogVersion`'s index file, if one
    /// exists, so search works immediately after process restart without
    /// waiting for a fresh build.
    pub fn load_active_from_disk(&self) -> Result<()> {
        let Some(version) = self.versions.active_version()? else {
            return Ok(());
        };
        let index = CatalogIndex::open(&self.persist_dir, &version.version_name, EMBEDDING_DIMENSION)?;
        self.active.store(Some(Arc::new(index)));
        Ok(())
    }

    /// Builds a brand-new version from `products`, embedding each in
    /// batches, then atomically activates it and supersedes the previous
    /// active version. Never mutates the index currently serving traffic.
    pub async fn build_version(&self, version_name: &str, products: &[Product]) -> Result<()> {
        let embedder = self.embedder.get().await?;
        self.versions.create_building(version_name, products.len() as u64)?;

        let build_result = self.build_version_inner(version_name, products, &embedder).await;
        if build_result.is_err() {
            self.versions.mark_failed(version_name)?;
        }
        let index = build_result?;

        self.versions.activate(version_name)?;
        self.active.store(Some(Arc::new(index)));
        Ok(())
    }

    async fn build_version_inner(
        &self,
        version_name: &str,
        products: &[Product],
        embedder: &Arc<dyn crate::embedder::CatalogEmbedder>,
    ) -> Result<CatalogIndex> {
        let mut index = CatalogIndex::open(&self.persist_dir, version_name, embedder.dimension())?;
        let mut indexed = 0u64;
        for chunk in products.chunks(BUILD_BATCH_SIZE) {
            let texts: Vec<String> = chunk.iter().map(Product::embed_text).collect();
            let embedder = Arc::clone(embedder);
            let embeddings = tokio::task::spawn_blocking(move || {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                embedder.embed_batch(&refs)
            })
            .await
            .map_err(|e| VectorError::Embed(e.to_string()))??;

            index.insert_batch(chunk, &embeddings)?;
            indexed += chunk.len() as u64;
            self.versions.update_progress(version_name, indexed)?;
        }
        Ok(index)
    }

    /// Deletes on-disk files for any `superseded`/`failed` version, keeping
    /// the active one untouched (`spec.md` §4.3 index GC, driven from the
    /// inactivity monitor's tick).
    pub fn garbage_collect(&self) -> Result<u64> {
        let mut removed = 0u64;
        for version in self.versions.collectible()? {
            let dir = self.persist_dir.join(&version.version_name);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
            self.versions.remove(&version.version_name)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Ranked product search per `spec.md` §4.3: embed the query, fetch
    /// `max(k, config.max_results)` raw candidates, add name/article
    /// substring boosts, drop anything below `min_score`, sort by
    /// post-boost score desc then original score desc then product id
    /// ascending, truncate to `config.max_results`.
    pub async fn search(&self, query: &str, k: usize, config: &CatalogSearchConfig) -> Result<Vec<SearchHit>> {
        let Some(index) = self.active.load_full() else {
            tracing::warn!("catalog search requested with no active index built yet");
            return Ok(Vec::new());
        };

        let embedder = self.embedder.get().await?;
        let query_owned = query.to_string();
        let embedder_for_embed = Arc::clone(&embedder);
        let query_embedding = tokio::task::spawn_blocking(move || embedder_for_embed.embed(&query_owned))
            .await
            .map_err(|e| VectorError::Embed(e.to_string()))??;

        let k_raw = k.max(config.max_results);
        let raw_hits = index.search_raw(&query_embedding, k_raw)?;

        let query_lower = query.to_lowercase();
        let mut hits: Vec<SearchHit> = raw_hits
            .into_iter()
            .map(|(product, raw_score)| {
                let mut score = raw_score;
                if !query_lower.is_empty() {
                    if product.product_name.to_lowercase().contains(&query_lower) {
                        score += config.name_boost as f64;
                    }
                    if product.article.to_lowercase().contains(&query_lower) {
                        score += config.article_boost as f64;
                    }
                }
                SearchHit {
                    product,
                    raw_score,
                    score: score.min(1.0),
                }
            })
            .collect();

        hits.retain(|hit| hit.score >= config.min_score as f64);
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.raw_score.partial_cmp(&a.raw_score).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.product.id.cmp(&b.product.id))
        });
        hits.truncate(config.max_results);
        Ok(hits)
    }
}

pub fn persist_dir_from_config(config: &CatalogSearchConfig) -> PathBuf {
    Path::new(&config.persist_dir).to_path_buf()
}

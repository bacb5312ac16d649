use std::sync::Mutex;

use crate::error::{Result, VectorError};

/// Text embedding, CPU-bound and synchronous (`spec.md` §4.3 indexing).
pub trait CatalogEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

/// Local multilingual embedder via fastembed/ONNX.
///
/// Loaded lazily (see `LazyEmbedder`) on first indexing or first query —
/// construction downloads and loads the model (a few seconds), so it must
/// never run on the startup path. `fastembed::TextEmbedding::embed`
/// requires `&mut self`, hence the `Mutex`.
pub struct FastEmbedEmbedder {
    model: Mutex<fastembed::TextEmbedding>,
    dimension: usize,
}

impl FastEmbedEmbedder {
    pub fn new() -> Result<Self> {
        let model = fastembed::TextEmbedding::try_new(fastembed::InitOptions::new(
            fastembed::EmbeddingModel::MultilingualE5Small,
        ))
        .map_err(|e| VectorError::ModelUnavailable(e.to_string()))?;
        Ok(Self {
            model: Mutex::new(model),
            dimension: 384,
        })
    }
}

impl CatalogEmbedder for FastEmbedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| VectorError::Embed("embedder lock poisoned".to_string()))?;
        model
            .embed(vec![text], None)
            .map_err(|e| VectorError::Embed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| VectorError::Embed("embedder returned no vector".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let mut model = self
            .model
            .lock()
            .map_err(|_| VectorError::Embed("embedder lock poisoned".to_string()))?;
        model
            .embed(owned, None)
            .map_err(|e| VectorError::Embed(e.to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Lazily constructs and caches a `CatalogEmbedder` behind a `OnceCell`, so
/// model load only happens on first indexing or first query and a
/// `ModelUnavailable` failure never crashes startup (`spec.md` §4.3).
pub struct LazyEmbedder {
    cell: tokio::sync::OnceCell<std::sync::Arc<dyn CatalogEmbedder>>,
}

impl LazyEmbedder {
    pub fn new() -> Self {
        Self {
            cell: tokio::sync::OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<std::sync::Arc<dyn CatalogEmbedder>> {
        self.cell
            .get_or_try_init(|| async {
                tracing::info!("loading catalog embedding model");
                let start = std::time::Instant::now();
                let embedder = tokio::task::spawn_blocking(FastEmbedEmbedder::new)
                    .await
                    .map_err(|e| VectorError::ModelUnavailable(e.to_string()))??;
                tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "catalog embedding model loaded");
                Ok::<std::sync::Arc<dyn CatalogEmbedder>, VectorError>(std::sync::Arc::new(embedder))
            })
            .await
            .cloned()
    }
}

impl Default for LazyEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

//! Query embedding.
//!
//! The index was built with `all-MiniLM-L6-v2`, so queries must be embedded
//! with the same model for the similarity scores to mean anything.

use std::{
    ops::Deref,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::base::types::Res;

/// Output dimensions of `all-MiniLM-L6-v2`.
pub const EMBEDDING_DIMENSIONS: usize = 384;

// Traits.

/// Generic embedder trait that clients must implement.
#[async_trait]
pub trait GenericEmbedder: Send + Sync + 'static {
    /// Embed a single piece of text.
    async fn embed(&self, text: &str) -> Res<Vec<f32>>;
}

// Structs.

/// Embedder for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Embedder {
    inner: Arc<dyn GenericEmbedder>,
}

impl Deref for Embedder {
    type Target = dyn GenericEmbedder;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl Embedder {
    pub fn new(inner: Arc<dyn GenericEmbedder>) -> Self {
        Self { inner }
    }

    /// Load the local `all-MiniLM-L6-v2` model.
    pub async fn mini_lm() -> Res<Self> {
        let embedder = MiniLmEmbedder::load().await?;
        Ok(Self { inner: Arc::new(embedder) })
    }
}

// Specific implementations.

/// Local `all-MiniLM-L6-v2` embedder backed by fastembed.
pub struct MiniLmEmbedder {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
}

impl MiniLmEmbedder {
    /// Load (downloading on first use) the model.
    #[instrument(name = "MiniLmEmbedder::load", skip_all)]
    pub async fn load() -> Res<Self> {
        let model = tokio::task::spawn_blocking(|| {
            let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
            fastembed::TextEmbedding::try_new(options).map_err(|e| anyhow!("Failed to load embedding model: {e}"))
        })
        .await??;

        info!("Loaded all-MiniLM-L6-v2 embedding model.");

        Ok(Self { model: Arc::new(Mutex::new(model)) })
    }
}

#[async_trait]
impl GenericEmbedder for MiniLmEmbedder {
    #[instrument(name = "MiniLmEmbedder::embed", skip_all)]
    async fn embed(&self, text: &str) -> Res<Vec<f32>> {
        let model = self.model.clone();
        let texts = vec![text.to_string()];

        // ONNX inference is CPU bound.
        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|e| anyhow!("Failed to lock embedding model: {e}"))?;
            model.embed(texts, None).map_err(|e| anyhow!("Embedding failed: {e}"))
        })
        .await??;

        let embedding = embeddings.into_iter().next().ok_or_else(|| anyhow!("Embedding model returned no vectors."))?;

        if embedding.len() != EMBEDDING_DIMENSIONS {
            return Err(anyhow!("Expected a {EMBEDDING_DIMENSIONS}-dimensional embedding, got {}.", embedding.len()));
        }

        Ok(embedding)
    }
}

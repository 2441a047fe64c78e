pub mod embedding;
pub mod pinecone;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Res, RetrievedDocument};

// Traits.

/// Generic document retriever trait that clients must implement.
///
/// This trait wraps a similarity search against a pre-populated index.
/// Implementing this trait allows different vector databases to be used
/// with the support-bot.
#[async_trait]
pub trait GenericRetriever: Send + Sync + 'static {
    /// Find the documents most relevant to a free-text query.
    ///
    /// Documents are returned most relevant first. Index errors are
    /// propagated as-is.
    async fn retrieve(&self, query: &str) -> Res<Vec<RetrievedDocument>>;
}

// Structs.

/// Document retriever for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Retriever {
    inner: Arc<dyn GenericRetriever>,
}

impl Deref for Retriever {
    type Target = dyn GenericRetriever;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl Retriever {
    pub fn new(inner: Arc<dyn GenericRetriever>) -> Self {
        Self { inner }
    }
}

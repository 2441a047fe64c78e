pub mod huggingface;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::InferenceResult;

// Traits.

/// Generic LLM client trait that clients must implement.
///
/// This trait defines the single text-generation call the response assembler
/// relies on. Implementing this trait allows different inference providers
/// to be used with the support-bot.
#[async_trait]
pub trait GenericLlmClient: Send + Sync + 'static {
    /// Generate a continuation for a fully rendered prompt.
    ///
    /// Never errors: every problem is reported as an `InferenceFailure` so the
    /// assembler always receives a result.
    async fn infer(&self, prompt: &str) -> InferenceResult;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    pub fn new(inner: Arc<dyn GenericLlmClient>) -> Self {
        Self { inner }
    }
}

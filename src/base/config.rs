//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use crate::base::prompts;

use super::types::Res;

/// Default Pinecone index name.
fn default_pinecone_index() -> String {
    "saatva-bot".to_string()
}

/// Default metadata field that holds the document text.
fn default_pinecone_text_key() -> String {
    "text".to_string()
}

/// Default number of documents requested from the index.
fn default_retrieval_top_k() -> usize {
    4
}

/// Default listen port for the Slack events endpoint.
fn default_port() -> u16 {
    3000
}

/// Default maximum number of inference rounds per message.
fn default_max_iterations() -> u32 {
    8
}

/// Default timeout for a single network call, in seconds.
fn default_request_timeout_secs() -> u64 {
    60
}

/// Default support prompt template.
fn default_prompt_template() -> String {
    prompts::SUPPORT_PROMPT_TEMPLATE.to_string()
}

/// Configuration for the support-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// Slack signing secret (`SLACK_SIGNING_SECRET`).
    pub slack_signing_secret: String,
    /// Slack app token (`SLACK_APP_TOKEN`).
    /// When set, events arrive over Socket Mode instead of the HTTP endpoint.
    #[serde(default)]
    pub slack_app_token: Option<String>,
    /// Pinecone API key (`PINECONE_API_KEY`).
    pub pinecone_api_key: String,
    /// Pinecone environment, e.g. `us-west1-gcp` (`PINECONE_ENV`).
    pub pinecone_env: String,
    /// Pinecone index holding the support documents (`PINECONE_INDEX`).
    #[serde(default = "default_pinecone_index")]
    pub pinecone_index: String,
    /// Explicit index host (`PINECONE_INDEX_HOST`).
    /// When unset, the host is resolved from the environment and index name.
    #[serde(default)]
    pub pinecone_index_host: Option<String>,
    /// Metadata field holding each document's page content (`PINECONE_TEXT_KEY`).
    #[serde(default = "default_pinecone_text_key")]
    pub pinecone_text_key: String,
    /// Number of documents requested per query (`RETRIEVAL_TOP_K`).
    /// Only the first three are placed in the prompt.
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    /// Bearer token for the inference endpoint (`HUGGINGFACE_TOKEN`).
    pub huggingface_token: String,
    /// Inference endpoint URL (`HUGGINGFACE_ENDPOINT`).
    pub huggingface_endpoint: String,
    /// Port for the Slack events endpoint (`PORT`).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum inference rounds per message (`MAX_ITERATIONS`).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Timeout applied to each network call, in seconds (`REQUEST_TIMEOUT_SECS`).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional custom prompt template to override the default (`PROMPT_TEMPLATE`).
    /// Must contain `{context}`, `{query}` and `{response}`.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    /// Truncate at the first `===` instead of the first `==` (`SPLIT_ON_SENTINEL`).
    #[serde(default)]
    pub split_on_sentinel: bool,
    /// Always reply in a thread under the inbound message (`REPLY_IN_THREAD`).
    #[serde(default)]
    pub reply_in_thread: bool,
}

impl ConfigInner {
    /// The per-call network timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Treat blank optional values (`SLACK_APP_TOKEN=` in a `.env` template) as unset.
    fn without_blank_options(mut self) -> Self {
        for value in [&mut self.slack_app_token, &mut self.pinecone_index_host] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }

        self
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().ignore_empty(true));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let inner: ConfigInner = cfg.build()?.try_deserialize()?;
        let result = Config {
            inner: Arc::new(inner.without_blank_options()),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check the loaded values, failing fast with a clear message.
    pub fn validate(&self) -> Res<()> {
        let required = [
            ("SLACK_BOT_TOKEN", &self.slack_bot_token),
            ("SLACK_SIGNING_SECRET", &self.slack_signing_secret),
            ("PINECONE_API_KEY", &self.pinecone_api_key),
            ("PINECONE_ENV", &self.pinecone_env),
            ("HUGGINGFACE_TOKEN", &self.huggingface_token),
            ("HUGGINGFACE_ENDPOINT", &self.huggingface_endpoint),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("`{name}` must be set."));
            }
        }

        if self.max_iterations < 1 || self.max_iterations > 64 {
            return Err(anyhow::anyhow!("Max iterations must be between 1 and 64."));
        }

        if self.request_timeout_secs < 1 || self.request_timeout_secs > 600 {
            return Err(anyhow::anyhow!("Request timeout must be between 1 and 600 seconds."));
        }

        if self.retrieval_top_k < 1 || self.retrieval_top_k > 100 {
            return Err(anyhow::anyhow!("Retrieval top-k must be between 1 and 100."));
        }

        prompts::validate_template(&self.prompt_template)?;

        Ok(())
    }
}

// Tests.

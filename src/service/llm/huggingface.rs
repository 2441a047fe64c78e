//! Hugging Face Inference Endpoint client.
//!
//! Sends `{"inputs": <prompt>}` with bearer auth and reads the
//! `generated_text` of the first element of the returned JSON array.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::base::{
    config::Config,
    types::{InferenceFailure, InferenceResult, Res},
};

use super::{GenericLlmClient, LlmClient};

// Extra methods on `LlmClient` applied by the huggingface implementation.

impl LlmClient {
    pub fn huggingface(config: &Config) -> Res<Self> {
        let client = HuggingFaceLlmClient::new(&config.huggingface_endpoint, &config.huggingface_token, config.request_timeout())?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Wire types.

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

#[derive(Deserialize)]
struct Generation {
    generated_text: String,
}

// Specific implementations.

/// Hugging Face Inference Endpoint client implementation.
#[derive(Clone)]
pub struct HuggingFaceLlmClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    timeout: Duration,
}

impl HuggingFaceLlmClient {
    /// Create a new Hugging Face client for a single endpoint.
    #[instrument(name = "HuggingFaceLlmClient::new", skip_all)]
    pub fn new(endpoint: &str, token: &str, timeout: Duration) -> Res<Self> {
        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            token: token.to_string(),
            timeout,
        })
    }

    /// Send the request and read the body, without any time bound.
    async fn round_trip(&self, prompt: &str) -> InferenceResult {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&InferenceRequest { inputs: prompt })
            .send()
            .await
            .map_err(|e| InferenceFailure::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(InferenceFailure::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| InferenceFailure::Transport(e.to_string()))?;

        parse_generated_text(&body)
    }
}

#[async_trait]
impl GenericLlmClient for HuggingFaceLlmClient {
    #[instrument(name = "HuggingFaceLlmClient::infer", skip_all)]
    async fn infer(&self, prompt: &str) -> InferenceResult {
        debug!("Sending prompt of {} bytes to the inference endpoint.", prompt.len());

        let result = match timeout(self.timeout, self.round_trip(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceFailure::Timeout(self.timeout)),
        };

        match &result {
            Ok(text) => debug!("Inference endpoint generated: {text:?}"),
            Err(failure) => warn!("Inference request failed: {failure}"),
        }

        result
    }
}

/// Extract `body[0].generated_text` from a successful response body.
pub fn parse_generated_text(body: &str) -> InferenceResult {
    let generations: Vec<Generation> = serde_json::from_str(body).map_err(|e| InferenceFailure::MalformedBody(e.to_string()))?;

    generations
        .into_iter()
        .next()
        .map(|g| g.generated_text)
        .ok_or_else(|| InferenceFailure::MalformedBody("empty generation array".to_string()))
}

// Tests.

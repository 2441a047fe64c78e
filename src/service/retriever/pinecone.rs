//! Pinecone similarity search over the REST data plane.
//!
//! The index is populated elsewhere; this module only embeds the query and
//! calls `POST /query`.

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{Res, RetrievedDocument},
};

use super::{GenericRetriever, Retriever, embedding::Embedder};

// Extra methods on `Retriever` applied by the pinecone implementation.

impl Retriever {
    /// Creates a Pinecone retriever, resolving the index host if it was not configured.
    pub async fn pinecone(config: &Config, embedder: Embedder) -> Res<Self> {
        let retriever = PineconeRetriever::from_config(config, embedder).await?;
        Ok(Self { inner: Arc::new(retriever) })
    }
}

// Wire types.

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct WhoAmI {
    project_name: String,
}

// Specific implementations.

/// Pinecone retriever implementation.
#[derive(Clone)]
pub struct PineconeRetriever {
    client: reqwest::Client,
    host: String,
    api_key: String,
    text_key: String,
    top_k: usize,
    embedder: Embedder,
}

impl PineconeRetriever {
    /// Create a retriever for an already resolved index host.
    pub fn new(host: &str, api_key: &str, text_key: &str, top_k: usize, timeout: Duration, embedder: Embedder) -> Res<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            host: normalize_host(host),
            api_key: api_key.to_string(),
            text_key: text_key.to_string(),
            top_k,
            embedder,
        })
    }

    /// Create a retriever from the application configuration.
    #[instrument(name = "PineconeRetriever::from_config", skip_all)]
    pub async fn from_config(config: &Config, embedder: Embedder) -> Res<Self> {
        let host = match &config.pinecone_index_host {
            Some(host) => host.clone(),
            None => {
                let client = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
                let controller = format!("https://controller.{}.pinecone.io", config.pinecone_env);
                resolve_index_host(&client, &controller, &config.pinecone_api_key, &config.pinecone_index, &config.pinecone_env).await?
            }
        };

        info!("Using Pinecone index host: {}", host);

        Self::new(&host, &config.pinecone_api_key, &config.pinecone_text_key, config.retrieval_top_k, config.request_timeout(), embedder)
    }

    /// Query the index with an embedding vector.
    async fn query(&self, vector: &[f32]) -> Res<Vec<RetrievedDocument>> {
        let request = QueryRequest {
            vector,
            top_k: self.top_k,
            include_metadata: true,
            include_values: false,
        };

        let response = self
            .client
            .post(format!("{}/query", self.host))
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Pinecone query failed with status {status}: {body}"));
        }

        let response = response.json::<QueryResponse>().await?;

        Ok(documents_from_matches(response.matches, &self.text_key))
    }
}

#[async_trait]
impl GenericRetriever for PineconeRetriever {
    #[instrument(name = "PineconeRetriever::retrieve", skip_all)]
    async fn retrieve(&self, query: &str) -> Res<Vec<RetrievedDocument>> {
        let vector = self.embedder.embed(query).await?;
        let documents = self.query(&vector).await?;

        debug!("Pinecone returned {} documents.", documents.len());

        Ok(documents)
    }
}

// Helpers.

/// Resolve a legacy pod-based index host from the project name.
pub async fn resolve_index_host(client: &reqwest::Client, controller: &str, api_key: &str, index: &str, environment: &str) -> Res<String> {
    let response = client.get(format!("{controller}/actions/whoami")).header("Api-Key", api_key).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("Pinecone whoami failed with status {status}."));
    }

    let WhoAmI { project_name } = response.json().await?;

    Ok(format!("https://{index}-{project_name}.svc.{environment}.pinecone.io"))
}

/// Ensure the host has a scheme and no trailing slash.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');

    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// Keep match order, skipping matches with no text under `text_key`.
fn documents_from_matches(matches: Vec<QueryMatch>, text_key: &str) -> Vec<RetrievedDocument> {
    matches
        .into_iter()
        .filter_map(|m| {
            let text = m.metadata.as_ref()?.get(text_key)?.as_str()?.to_string();
            Some(RetrievedDocument { text, score: m.score })
        })
        .collect()
}

// Tests.

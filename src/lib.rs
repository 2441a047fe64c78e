//! Library root for `support-bot`.
//!
//! Support-bot answers customer questions in Slack:
//! - Looks up the most relevant support documents in a Pinecone index
//! - Asks a hosted model to answer from those documents in a fixed house style
//! - Keeps asking the model to continue until the answer is complete
//! - Replies in the conversation the question came from
//!
//! The bot integrates with Slack for chat, Pinecone for retrieval, and a
//! Hugging Face Inference Endpoint for generation. Each service sits behind a
//! trait so that different implementations (and test doubles) can be used.

pub mod base;
pub mod interaction;
pub mod prelude;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::{info, warn};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the support-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with retriever, LLM, and chat clients
/// - Starts listening for chat events
pub async fn start(config: Config) -> Void {
    info!("Starting support-bot ...");

    // Start the crypto provider.
    if crypto::aws_lc_rs::default_provider().install_default().is_err() {
        warn!("A crypto provider was already installed.");
    }

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}

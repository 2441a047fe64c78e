//! Runtime services and shared state for the support-bot.

use tracing::instrument;

use crate::{
    base::{config::Config, types::{Res, Void}},
    interaction::{assembler::AssemblyOptions, chat_event},
    service::{
        chat::ChatClient,
        llm::LlmClient,
        retriever::{Retriever, embedding::Embedder},
    },
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the retriever, LLM client, chat client, and configuration.
/// Every client is built once here and handed to each message explicitly.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The document retriever instance.
    pub retriever: Retriever,
    /// The LLM client instance.
    pub llm: LlmClient,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the query embedder and the retriever.
        let embedder = Embedder::mini_lm().await?;
        let retriever = Retriever::pinecone(&config, embedder).await?;

        // Initialize the LLM client.
        let llm = LlmClient::huggingface(&config)?;

        // Initialize the slack client.
        let chat = ChatClient::slack(&config, retriever.clone(), llm.clone()).await?;

        Ok(Self { config, retriever, llm, chat })
    }

    /// Listen for chat events until shutdown.
    pub async fn start(&self) -> Void {
        self.chat.start().await
    }

    /// Produce the reply text for a message without posting it.
    pub async fn answer(&self, message: &str) -> String {
        let options = AssemblyOptions::from_config(&self.config);
        chat_event::handle_message(message, &self.retriever, &self.llm, &options).await
    }
}

//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by the support-bot:
//! - Chat services (e.g., Slack)
//! - Document retrieval (e.g., Pinecone, with a local query embedder)
//! - LLM services (e.g., Hugging Face Inference Endpoints)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod llm;
pub mod retriever;

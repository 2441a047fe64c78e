//! Items used across most of the crate.

pub use crate::{
    base::{
        config::Config,
        types::{Err, InboundMessage, Res, RetrievedDocument, Void},
    },
    service::{chat::ChatClient, llm::LlmClient, retriever::Retriever},
};
pub use anyhow::anyhow;
pub use tracing::{debug, error, info, instrument, warn};

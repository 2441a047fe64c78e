use tracing::Instrument;

use crate::{
    base::prompts::RETRIEVAL_FAILED_REPLY,
    interaction::assembler::{AssemblyOptions, assemble_reply},
    prelude::*,
};

/// Answer one inbound message in the background.
///
/// The chat platform expects its event callback to return quickly, so the
/// work is spawned and any error is logged.
#[instrument(skip_all)]
pub fn handle_chat_event(message: InboundMessage, retriever: Retriever, llm: LlmClient, chat: ChatClient, config: Config) {
    tokio::spawn(async move {
        // Process the event.
        let result = reply_to_message(&message, &retriever, &llm, &chat, &config).in_current_span().await;

        // Log any errors.
        if let Err(err) = &result {
            error!("Error while handling: {}", err);
        }
    });
}

/// Produce the reply for `message` and post it exactly once.
#[instrument(skip_all, fields(channel = %message.channel_id, ts = %message.ts))]
pub async fn reply_to_message(message: &InboundMessage, retriever: &Retriever, llm: &LlmClient, chat: &ChatClient, config: &Config) -> Void {
    let options = AssemblyOptions::from_config(config);
    let reply = handle_message(&message.text, retriever, llm, &options).await;

    let thread_ts = reply_thread_ts(message, config.reply_in_thread);
    chat.send_message(&message.channel_id, thread_ts, &reply).await?;

    info!("Replied to message.");

    Ok(())
}

/// Turn a user's message into the reply text.
///
/// Never fails: a retrieval error yields a fixed apology and inference
/// problems yield the assembler's fallback text.
#[instrument(skip_all)]
pub async fn handle_message(message: &str, retriever: &Retriever, llm: &LlmClient, options: &AssemblyOptions) -> String {
    debug!("Handling message: {message:?}");

    let documents = match retriever.retrieve(message).await {
        Ok(documents) => documents,
        Err(err) => {
            error!("Document retrieval failed: {err:#}");
            return RETRIEVAL_FAILED_REPLY.to_string();
        }
    };

    info!("Retrieved {} documents.", documents.len());

    let reply = assemble_reply(llm, &documents, message, options).await;

    info!("Assembled reply after {} iterations ({:?}).", reply.iterations, reply.termination);

    reply.text
}

/// The thread the reply belongs in; empty means top-level in the channel.
pub fn reply_thread_ts(message: &InboundMessage, reply_in_thread: bool) -> &str {
    match &message.thread_ts {
        Some(thread_ts) => thread_ts,
        None if reply_in_thread => &message.ts,
        None => "",
    }
}

// Tests.

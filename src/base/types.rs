use std::time::Duration;

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// A document returned by the vector index, in relevance order.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    /// The page content of the document.
    pub text: String,
    /// The similarity score reported by the index (higher is closer).
    pub score: f32,
}

impl RetrievedDocument {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self { text: text.into(), score }
    }
}

/// Why a single inference round (or the whole loop) failed.
///
/// Every variant resolves to the same user-visible fallback text; the
/// distinction only exists for logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceFailure {
    /// The endpoint answered with a non-200 status.
    #[error("inference endpoint returned status {0}")]
    Status(u16),
    /// The request never produced a response (connect, TLS, body read).
    #[error("inference transport error: {0}")]
    Transport(String),
    /// The request did not complete within the configured timeout.
    #[error("inference request timed out after {0:?}")]
    Timeout(Duration),
    /// A 200 response whose body was not `[{"generated_text": ...}, ...]`.
    #[error("malformed inference response: {0}")]
    MalformedBody(String),
    /// The assembler hit its iteration cap before any other exit condition.
    #[error("no terminating output after {0} iterations")]
    IterationLimit(u32),
}

/// Outcome of one inference round trip.
pub type InferenceResult = Result<String, InferenceFailure>;

/// The condition that ended the response-assembly loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The sentinel appeared in the accumulated text, which was truncated.
    Sentinel,
    /// The model returned a whitespace-only generation.
    EmptyGeneration,
    /// A round failed (or the iteration cap was reached).
    Failure(InferenceFailure),
}

/// The finalized reply produced for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledReply {
    /// The text to post back to the conversation.
    pub text: String,
    /// Number of inference rounds performed.
    pub iterations: u32,
    /// Which exit condition ended the loop.
    pub termination: Termination,
}

/// A chat message the bot should answer, stripped of platform types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The channel the message was posted in.
    pub channel_id: String,
    /// The message timestamp (its id within the channel).
    pub ts: String,
    /// The parent thread timestamp, if the message was posted in a thread.
    pub thread_ts: Option<String>,
    /// The free-text body of the message.
    pub text: String,
}

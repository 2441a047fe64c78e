//! Response assembly.
//!
//! The model is asked to continue its own partial answer until it runs into
//! the example separator, stops producing text, or fails.

use crate::{
    base::{
        prompts::{FAILED_TO_REACH_MODEL, build_prompt},
        types::{AssembledReply, InferenceFailure, Termination},
    },
    prelude::*,
};

/// Marker whose appearance in the accumulated text ends the loop.
pub const SENTINEL: &str = "===";

/// Marker the accumulated text is cut at once the sentinel is seen.
pub const TRUNCATION_MARKER: &str = "==";

/// Knobs for one assembly run.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Prompt template with `{context}`, `{query}` and `{response}` placeholders.
    pub template: String,
    /// Hard cap on inference rounds.
    pub max_iterations: u32,
    /// Cut at the sentinel itself rather than at the first `==`.
    pub split_on_sentinel: bool,
}

impl AssemblyOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            template: config.prompt_template.clone(),
            max_iterations: config.max_iterations,
            split_on_sentinel: config.split_on_sentinel,
        }
    }
}

/// Drive the model until one of the exit conditions is met.
///
/// Every round re-renders the prompt with everything generated so far as the
/// partial response. Failures (including hitting the iteration cap) replace
/// the accumulated text with [`FAILED_TO_REACH_MODEL`].
#[instrument(skip_all)]
pub async fn assemble_reply(llm: &LlmClient, documents: &[RetrievedDocument], query: &str, options: &AssemblyOptions) -> AssembledReply {
    let mut final_text = String::new();
    let mut iterations = 0;

    loop {
        if iterations >= options.max_iterations {
            warn!("Model did not finish within {} iterations.", options.max_iterations);
            return failed(iterations, InferenceFailure::IterationLimit(iterations));
        }

        iterations += 1;

        let prompt = build_prompt(&options.template, documents, query, &final_text);

        let text = match llm.infer(&prompt).await {
            Ok(text) => text,
            Err(failure) => {
                warn!("Inference round {iterations} failed: {failure}");
                return failed(iterations, failure);
            }
        };

        final_text.push_str(&text);

        if final_text.contains(SENTINEL) {
            let marker = if options.split_on_sentinel { SENTINEL } else { TRUNCATION_MARKER };
            truncate_at(&mut final_text, marker);

            debug!("Sentinel found after {iterations} iterations.");
            return AssembledReply {
                text: final_text,
                iterations,
                termination: Termination::Sentinel,
            };
        }

        if text.trim().is_empty() {
            debug!("Empty generation after {iterations} iterations.");
            return AssembledReply {
                text: final_text,
                iterations,
                termination: Termination::EmptyGeneration,
            };
        }

        debug!("Round {iterations} generated {} bytes; continuing.", text.len());
    }
}

fn failed(iterations: u32, failure: InferenceFailure) -> AssembledReply {
    AssembledReply {
        text: FAILED_TO_REACH_MODEL.to_string(),
        iterations,
        termination: Termination::Failure(failure),
    }
}

/// Drop everything from the first occurrence of `marker` onwards.
fn truncate_at(text: &mut String, marker: &str) {
    if let Some(index) = text.find(marker) {
        text.truncate(index);
    }
}

// Tests.

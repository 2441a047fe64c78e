//! The support prompt template and its renderer.

use crate::base::types::{Res, RetrievedDocument};

/// Number of retrieved documents that are joined into the prompt context.
pub const CONTEXT_DOCUMENTS: usize = 3;

/// Reply posted when the model cannot be reached (or never stops).
pub const FAILED_TO_REACH_MODEL: &str = "Failed to reach model.";

/// Reply posted when the document lookup fails.
pub const RETRIEVAL_FAILED_REPLY: &str = "Sorry, I couldn't look that up right now. Please try again in a moment.";

/// Placeholder for the joined document text.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";
/// Placeholder for the user's message.
pub const QUERY_PLACEHOLDER: &str = "{query}";
/// Placeholder for the partial response the model should continue.
pub const RESPONSE_PLACEHOLDER: &str = "{response}";

/// Support prompt.
///
/// The worked examples are separated by `===`, which is also the marker the
/// response assembler watches for in the generated text.
pub const SUPPORT_PROMPT_TEMPLATE: &str = r#####"You are a helpful assistant working for an online mattress company called Saatva. Your role is to answer any questions the customer may have. Be as concise as possible. Limit your answers to a few sentences. Use the context below, and if the question cannot be answered with the provided information, respond with "I don't know. Answer in the style of these examples:
===
User: What sizes and colors does the Saatva Dog Bed come in?
AI: The Saatva Dog Bed comes in Small, Medium, and Large sizes. It is available in Natural Linen, Taupe Boucle, and Slate Boucle.
===
User: Does the Saatva Classic mattress provide good support?
AI: Yes, it provides extra support where you need it most with our patented Lumbar Zone® Technology. You can enjoy healthy spinal alignment in any sleep position!
===
User: What is white glove delivery?
AI: White glove delivery is the Saatva service standard and comes free with every mattress, bedroom furniture, and rug order. While our teams don't actually wear white gloves, we do all the work for you. We hand-deliver your mattress and set it up in the room of your choice.
===
Context: {context}
===
User: {query}
AI: {response}"#####;

/// Ensure a (possibly user supplied) template carries every placeholder.
pub fn validate_template(template: &str) -> Res<()> {
    for placeholder in [CONTEXT_PLACEHOLDER, QUERY_PLACEHOLDER, RESPONSE_PLACEHOLDER] {
        if !template.contains(placeholder) {
            return Err(anyhow::anyhow!("Prompt template is missing the `{placeholder}` placeholder."));
        }
    }

    Ok(())
}

/// Join the page content of the first [`CONTEXT_DOCUMENTS`] documents with single spaces.
pub fn join_context(documents: &[RetrievedDocument]) -> String {
    documents.iter().take(CONTEXT_DOCUMENTS).map(|d| d.text.as_str()).collect::<Vec<_>>().join(" ")
}

/// Build the prompt for one inference round.
///
/// `partial` is everything the model has generated so far for this message;
/// it seeds the `AI:` line so the model continues instead of restarting.
pub fn build_prompt(template: &str, documents: &[RetrievedDocument], query: &str, partial: &str) -> String {
    let context = join_context(documents);
    render_template(template, &context, query, partial)
}

/// Substitute the three placeholders in a single pass over the template.
///
/// Substituted values are never rescanned, so a query that happens to contain
/// `{response}` is inserted verbatim.
pub fn render_template(template: &str, context: &str, query: &str, response: &str) -> String {
    let substitutions = [(CONTEXT_PLACEHOLDER, context), (QUERY_PLACEHOLDER, query), (RESPONSE_PLACEHOLDER, response)];

    let mut rendered = String::with_capacity(template.len() + context.len() + query.len() + response.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        rest = &rest[start..];

        match substitutions.iter().find(|(placeholder, _)| rest.starts_with(placeholder)) {
            Some((placeholder, value)) => {
                rendered.push_str(value);
                rest = &rest[placeholder.len()..];
            }
            None => {
                rendered.push('{');
                rest = &rest[1..];
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

// Tests.

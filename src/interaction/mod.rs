//! Event handling and user interactions for support-bot.
//!
//! This module provides functionality for answering chat messages:
//! - Looking up support documents for the message
//! - Assembling the model's answer across continuation rounds
//! - Posting the reply back to the conversation

pub mod assembler;
pub mod chat_event;

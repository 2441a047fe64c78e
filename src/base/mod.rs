//! Core components, types, and utilities for the support-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - The support prompt template and its renderer.
//! - Common types and result handling.

pub mod config;
pub mod prompts;
pub mod types;

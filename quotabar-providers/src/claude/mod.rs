//! Claude provider: OAuth usage API with a claude.ai web fallback.

pub mod api;
pub mod oauth;
pub mod strategies;
pub mod web;

pub use strategies::{ClaudeOAuthStrategy, ClaudeWebStrategy};

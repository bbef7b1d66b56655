//! Copilot provider: usage via the GitHub API with a stored token.

pub mod api;
pub mod strategies;

pub use strategies::CopilotApiStrategy;

//! Codex provider: usage from local CLI session logs.

pub mod session_log;
pub mod strategies;

pub use session_log::SessionLogReader;
pub use strategies::CodexCliStrategy;

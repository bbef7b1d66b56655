//! MiniMax provider: browser session with storage-token fallback.

pub mod strategies;
pub mod web;

pub use strategies::MiniMaxWebStrategy;

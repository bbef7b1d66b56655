//! JetBrains AI provider: quota from the IDE's local options XML.

pub mod quota_xml;
pub mod strategies;

pub use strategies::JetBrainsQuotaStrategy;

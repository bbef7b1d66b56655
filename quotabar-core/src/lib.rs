// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `QuotaBar` Core
//!
//! Core types and decoding helpers for the `QuotaBar` usage-fetch pipeline.
//!
//! This crate is the leaf of the workspace: it has no knowledge of HTTP,
//! browsers, or credential stores. It provides:
//!
//! - Domain models ([`UsageSnapshot`], [`RateWindow`], [`Credits`],
//!   [`ProviderIdentity`], [`OAuthCredentials`])
//! - The provider enumeration ([`ProviderKind`])
//! - Flexible timestamp / rate-window decoding ([`decode`]) for the
//!   heterogeneous upstream payloads the fetch layer has to reconcile
//!
//! All model types represent one point-in-time read and are created fresh
//! per fetch attempt; nothing in this crate caches or mutates shared state.

pub mod decode;
pub mod error;
pub mod models;

pub use error::CoreError;

pub use models::{
    Credits, LoginMethod, OAuthCredentials, ProviderIdentity, ProviderKind, RateWindow,
    UsageSnapshot,
};

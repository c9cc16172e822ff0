//! Lullwave client library.
//!
//! The client-side engines behind the Lullwave app. Each engine owns its own
//! in-memory state and talks to the hosted backend through a small trait, so
//! the UI layer (or a test) constructs exactly the collaborators it needs.
//!
//! # Engines
//!
//! - [`analytics`] - Consent-gated telemetry buffering with timed flushes
//! - [`vault`] - PIN-gated scratch notes that never leave the device
//! - [`merch`] - Catalog aggregation, cart, and storefront checkout
//! - [`voice`] - Keyword-based voice command parsing
//! - [`support`] - Support tickets with a live message channel
//! - [`challenges`] - Challenge participation and progress
//! - [`sounds`] - Sound library search with debounced input
//!
//! # Plumbing
//!
//! - [`backend`] - Table/storage/function client for the hosted backend
//! - [`storage`] - Small persisted key-value store for device-local state
//! - [`config`] - Environment-driven configuration

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod analytics;
pub mod backend;
pub mod challenges;
pub mod config;
pub mod debounce;
pub mod merch;
pub mod sounds;
pub mod storage;
pub mod support;
pub mod vault;
pub mod voice;

//! Lullwave Core - Shared types library.
//!
//! This crate provides common types used across all Lullwave components:
//! - `client` - Client-side engines (analytics, vault, merch, support, voice)
//! - `functions` - Serverless-style HTTP endpoints (landing subscribe, unsubscribe)
//! - `cli` - Command-line tools for migrations and settings
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

//! # taintbox-common
//!
//! Shared case schema, carrier types, error definitions, configuration
//! models, and constants used across the entire taintbox workspace.
//!
//! This crate is the leaf of the dependency graph — it depends on no other
//! internal crate. Both the ingestion pipeline and the build pipeline agree
//! on the [`types::Case`] shape defined here.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

//! # taintbox-mutate
//!
//! Pure transformation stages between a suite file and a build request.
//!
//! Handles:
//! - **Suite**: Loading case collections and merging them without id clashes.
//! - **Expand**: Pairing each case with one carrier or every configured carrier.
//! - **Render**: Turning a (case, carrier) pair into a mutation artifact.
//! - **Tag**: Deterministic, grammar-valid image tags.
//! - **Reference**: `<registry>/<repo>/<image>:<tag>` image references.
//!
//! Nothing in this crate touches the container tool; artifacts go in and
//! artifacts come out.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod expand;
pub mod reference;
pub mod render;
pub mod suite;
pub mod tag;

//! # taintbox-build
//!
//! Turns expanded cases into built (and optionally pushed) images.
//!
//! Handles:
//! - **Tool**: The container CLI (`docker`/`nerdctl`) behind the `ContainerTool` trait.
//! - **Clock**: UTC time source for tags and runlist names.
//! - **Orchestrator**: Sequential render → tag → build → push, recording every attempt.
//! - **Runlist**: The run manifest, written once per run.
//! - **Pipeline**: `build_push`, wiring suite loading through runlist output.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod clock;
pub mod orchestrator;
pub mod pipeline;
pub mod runlist;
pub mod tool;

pub use pipeline::{BuildPushReport, build_push};

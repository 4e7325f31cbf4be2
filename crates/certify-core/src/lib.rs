//! Core types and trait definitions for the Certify Intel evidence pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The store backend and the pipeline both depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod allowlist;
pub mod claim;
pub mod entity;
pub mod error;
pub mod event;
pub mod evidence;
pub mod review;
pub mod run;
pub mod severity;
pub mod store;
pub mod view;

pub use error::{Error, Result};

//! The Certify Intel evidence pipeline.
//!
//! Each stage is a plain async function over an [`IntelStore`] and, where it
//! touches the network, a [`Fetcher`]. [`Pipeline`] wires them together into
//! a single logged run.
//!
//! [`IntelStore`]: certify_core::store::IntelStore
//! [`Fetcher`]: fetch::Fetcher

pub mod alerts;
pub mod config;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod evidence;
pub mod extract;
pub mod fetch;
pub mod hash;
pub mod orchestrator;
pub mod promote;
pub mod review;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use orchestrator::{Pipeline, RunContext, RunSummary};

#[cfg(test)]
mod testing;

//! Core library for the session runner
//!
//! This crate contains the domain model shared by the runner, including:
//! - Runs, their lifecycle state machine and artifacts
//! - Run storage (repository trait and the JSON file store)
//! - Correlation of pull-request webhooks with in-flight runs

pub mod correlation;
pub mod error;
pub mod run;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

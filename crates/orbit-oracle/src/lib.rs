//! Detection oracle for perception propositions.
//!
//! This crate provides:
//! - The `DetectionOracle` trait scoring a proposition against a frame sequence
//! - `VlmClient`, an adapter for OpenAI-compatible vision-language model servers
//! - `GuardedOracle`, a timeout and circuit-breaker wrapper for any oracle
//!
//! Retry and backoff live here, at the adapter boundary; the search core
//! treats any oracle error as fatal for the current run.

pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod guard;
pub mod oracle;
pub mod types;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::{calibrate, VlmClient, VlmClientConfig};
pub use error::{OracleError, OracleResult};
pub use guard::{GuardConfig, GuardedOracle};
pub use oracle::DetectionOracle;

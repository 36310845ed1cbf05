//! Temporal specifications over perception propositions and the online
//! monitor that checks them against a stream of fused video frames.
//!
//! This crate provides:
//! - Parsing of infix `AND`/`OR`/`NOT`/`UNTIL` formulas into a checked AST
//! - Split membership of propositions around the top-level `UNTIL`
//! - `VideoAutomaton`, an incremental monitor with accept/reset semantics

pub mod automaton;
pub mod error;
pub mod spec;

pub use automaton::{AutomatonConfig, VideoAutomaton};
pub use error::{AutomatonError, AutomatonResult, FormatError, FormatResult};
pub use spec::{Formula, Specification};

//! Request and chain execution for yapi.
//!
//! This crate handles:
//! - Running a compiled request through a transport
//! - Chains: ordered steps whose later requests reference earlier responses
//! - Response filters and `expect` checks

pub mod context;
pub mod error;
pub mod expect;
pub mod filter;
pub mod interpolate;
pub mod runner;

pub use context::{ChainContext, StepResult};
pub use error::{RunError, RunnerResult};
pub use expect::{AssertionResult, ExpectationResult, check_expectations};
pub use filter::{FilterError, JqFilter, ResponseFilter};
pub use interpolate::interpolate_step;
pub use runner::{ChainEvent, ChainResult, RequestOutcome, Runner, StepOutcome};

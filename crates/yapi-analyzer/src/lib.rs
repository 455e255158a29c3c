//! Diagnostics for yapi request documents.
//!
//! One [`Analyzer`] serves both the CLI and the language server. It accepts
//! any input, including half-typed or non-UTF-8 text, and always returns an
//! [`Analysis`]; problems become positioned [`Diagnostic`]s instead of errors.

pub mod analyzer;
pub mod chain;
pub mod diagnostic;
pub mod env_vars;
pub mod format;
pub mod position;
pub mod rules;
pub mod syntax;

pub use analyzer::{Analyzer, ProjectScope};
pub use chain::validate_chain;
pub use diagnostic::{Analysis, Diagnostic, JsonDiagnostic, JsonOutput, Severity, StepAnalysis};
pub use env_vars::{
    EnvVarRef, EnvironmentRequirement, check_environment_requirement, find_env_var_refs,
    redact_value, validate_env_vars, validate_project_vars,
};
pub use format::{ValidationError, format_diagnostic, format_warning, write_errors, write_warnings};
pub use rules::validate_request;
pub use syntax::{GraphqlChecker, JqChecker, SyntaxChecker, SyntaxError};

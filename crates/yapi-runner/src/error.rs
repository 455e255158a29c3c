//! Runner error types.

use thiserror::Error;
use yapi_analyzer::ValidationError;
use yapi_config::{CompileError, ConfigError};
use yapi_core::TransportKind;

use crate::filter::FilterError;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid chain: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Interpolation(#[from] ConfigError),

    #[error("{}", join_errors(.0))]
    Compile(Vec<CompileError>),

    #[error("invalid delay '{delay}': {message}")]
    InvalidDelay { delay: String, message: String },

    #[error("no transport available for {0}")]
    NoTransport(TransportKind),

    #[error(transparent)]
    Transport(yapi_core::Error),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("cancelled")]
    Cancelled,

    #[error("step '{step}': {source}")]
    Step {
        step: String,
        #[source]
        source: Box<RunError>,
    },

    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<RunError>,
    },
}

impl RunError {
    /// Attribute this error to a chain step. Transport failures read
    /// `step 'x' failed: ...`, everything else `step 'x': ...`.
    pub fn in_step(self, step: &str) -> Self {
        match self {
            RunError::Cancelled => RunError::Cancelled,
            e @ RunError::Transport(_) => RunError::StepFailed {
                step: step.to_string(),
                source: Box::new(e),
            },
            e => RunError::Step {
                step: step.to_string(),
                source: Box::new(e),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            RunError::Cancelled | RunError::Transport(yapi_core::Error::Cancelled) => true,
            RunError::Step { source, .. } | RunError::StepFailed { source, .. } => {
                source.is_cancelled()
            }
            _ => false,
        }
    }
}

impl From<yapi_core::Error> for RunError {
    fn from(e: yapi_core::Error) -> Self {
        match e {
            yapi_core::Error::Cancelled => RunError::Cancelled,
            e => RunError::Transport(e),
        }
    }
}

fn join_errors(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type RunnerResult<T> = std::result::Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_attribution() {
        let err = RunError::from(yapi_core::Error::Transport("connection refused".into()))
            .in_step("login");
        assert_eq!(
            err.to_string(),
            "step 'login' failed: transport failed: connection refused"
        );

        let err = RunError::Compile(vec![
            CompileError::new("url", "missing required field `url`"),
            CompileError::new("body", "conflict"),
        ])
        .in_step("b");
        assert_eq!(err.to_string(), "step 'b': missing required field `url`; conflict");

        assert!(RunError::Cancelled.in_step("x").is_cancelled());
        assert!(RunError::from(yapi_core::Error::Cancelled).is_cancelled());
    }
}

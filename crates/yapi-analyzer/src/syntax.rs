//! Syntax checks for embedded GraphQL queries and jq filters.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// `Parse error at 2:14` in graphql-parser messages.
static GRAPHQL_POSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"at (\d+):(\d+)").unwrap());

/// A syntax problem in embedded source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    /// 0-based line within the embedded source, when known.
    pub line: Option<usize>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Checks the syntax of an embedded language.
pub trait SyntaxChecker: Send + Sync {
    fn check(&self, source: &str) -> Result<(), SyntaxError>;
}

/// GraphQL executable documents, parsed with graphql-parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphqlChecker;

impl SyntaxChecker for GraphqlChecker {
    fn check(&self, source: &str) -> Result<(), SyntaxError> {
        let err = match graphql_parser::parse_query::<&str>(source) {
            Ok(_) => return Ok(()),
            Err(err) => err.to_string(),
        };
        let message = err.strip_prefix("query parse error: ").unwrap_or(&err);
        let line = GRAPHQL_POSITION
            .captures(message)
            .and_then(|caps| caps[1].parse::<usize>().ok())
            .map(|line| line.saturating_sub(1));
        let message = message
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        Err(SyntaxError::new(message).at_line(line))
    }
}

/// jq filters and assertions, parsed with the engine that runs them.
#[derive(Debug, Clone, Copy, Default)]
pub struct JqChecker;

impl SyntaxChecker for JqChecker {
    fn check(&self, source: &str) -> Result<(), SyntaxError> {
        if source.trim().is_empty() {
            return Ok(());
        }
        yapi_config::jq::check(source)
            .map_err(|e| SyntaxError::new(e.to_string()).at_line(e.line_in(source)))
    }
}

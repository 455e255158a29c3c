//! jq programs for `jq_filter` and `expect.assert`.
//!
//! Programs are parsed and run by jaq with the jq standard library, so a
//! filter that passes [`check`] is one [`run`] can execute.

use jaq_core::load::{self, Arena, File, Loader};
use jaq_core::{Compiler, Ctx, FilterT, RcIter};
use jaq_json::Val;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JqError {
    /// `offset` is the byte offset of the offending token in the program.
    #[error("{message}")]
    Syntax { message: String, offset: usize },

    #[error("{0}")]
    Runtime(String),
}

impl JqError {
    /// 0-based line of a syntax error within `program`.
    pub fn line_in(&self, program: &str) -> Option<usize> {
        match self {
            JqError::Syntax { offset, .. } => program
                .get(..*offset)
                .map(|before| before.matches('\n').count()),
            JqError::Runtime(_) => None,
        }
    }
}

/// Parse and compile `program` without running it.
pub fn check(program: &str) -> Result<(), JqError> {
    execute(program, None).map(|_| ())
}

/// Run `program` on `input`, returning every output in order.
pub fn run(program: &str, input: Value) -> Result<Vec<Value>, JqError> {
    execute(program, Some(input))
}

fn execute(program: &str, input: Option<Value>) -> Result<Vec<Value>, JqError> {
    let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
    let arena = Arena::default();
    let file = File {
        code: program,
        path: (),
    };

    let modules = loader.load(&arena, file).map_err(|errs| {
        let first = errs.into_iter().next().map(|(_, err)| match err {
            load::Error::Lex(errs) => errs
                .into_iter()
                .next()
                .map(|(expected, found)| syntax(program, expected.as_str(), found)),
            load::Error::Parse(errs) => errs
                .into_iter()
                .next()
                .map(|(expected, found)| syntax(program, expected.as_str(), found)),
            load::Error::Io(errs) => errs.into_iter().next().map(|(path, message)| {
                JqError::Syntax {
                    message: format!("cannot load module '{path}': {message}"),
                    offset: 0,
                }
            }),
        });
        first.flatten().unwrap_or_else(|| JqError::Syntax {
            message: "invalid jq program".to_string(),
            offset: 0,
        })
    })?;

    let filter = Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .compile(modules)
        .map_err(|errs| {
            errs.into_iter()
                .flat_map(|(_, errs)| errs)
                .next()
                .map(|(name, undefined)| JqError::Syntax {
                    message: format!("undefined {} `{name}`", undefined.as_str()),
                    offset: offset_of(program, name),
                })
                .unwrap_or_else(|| JqError::Syntax {
                    message: "invalid jq program".to_string(),
                    offset: 0,
                })
        })?;

    let Some(input) = input else {
        return Ok(Vec::new());
    };

    let inputs = RcIter::new(core::iter::empty());
    filter
        .run((Ctx::new([], &inputs), Val::from(input)))
        .map(|out| {
            let val = out.map_err(|e| JqError::Runtime(e.to_string()))?;
            to_json(&val)
        })
        .collect()
}

fn syntax(program: &str, expected: &str, found: &str) -> JqError {
    let message = match found.chars().next() {
        None => format!("expected {expected}, found end of input"),
        Some(c) => format!("expected {expected}, found `{c}`"),
    };
    JqError::Syntax {
        message,
        offset: offset_of(program, found),
    }
}

/// Byte offset of `part` when it is a slice of `program`, else 0.
fn offset_of(program: &str, part: &str) -> usize {
    (part.as_ptr() as usize)
        .checked_sub(program.as_ptr() as usize)
        .filter(|offset| *offset <= program.len())
        .unwrap_or(0)
}

/// jaq renders values as JSON text.
fn to_json(val: &Val) -> Result<Value, JqError> {
    serde_json::from_str(&val.to_string())
        .map_err(|e| JqError::Runtime(format!("unrepresentable jq output: {e}")))
}

//! Request document handling for yapi.
//!
//! This crate handles:
//! - Loading request documents (`yapi: v1`)
//! - Variable tokenization and interpolation
//! - jq programs used for response filters and assertions
//! - Project configuration (`yapi.config.yml`) and environments
//! - Compiling a document into a canonical request

pub mod compiler;
pub mod error;
pub mod jq;
pub mod loader;
pub mod project;
pub mod variables;

pub use compiler::{CompileError, Compiled, compile};
pub use error::{ConfigError, ConfigResult};
pub use jq::JqError;
pub use loader::{ParsedDocument, find_unknown_keys, load_document, parse_document};
pub use project::{EnvCache, Environment, Project, ProjectConfig};
pub use variables::{
    EnvResolver, EnvSource, MapResolver, PlaceholderResolver, ResolveError, Resolver, VarRef,
};

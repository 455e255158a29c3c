//! Core domain types and traits for yapi.
//!
//! This crate contains:
//! - The v1 request document (`ConfigV1`, `ChainStep`, `Expectation`)
//! - The canonical, transport-ready `Request`
//! - The `Transport` trait and `Response` type
//! - Duration parsing shared by delays and timeouts

pub mod config;
pub mod duration;
pub mod error;
pub mod request;
pub mod transport;

pub use config::{AssertionSet, ChainStep, ConfigV1, Expectation, StatusExpectation};
pub use error::{Error, Result};
pub use request::{BodySource, Request, TransportExtras, TransportKind};
pub use transport::{Response, Transport, TransportProvider};

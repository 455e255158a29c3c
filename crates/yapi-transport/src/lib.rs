//! Transports for yapi.
//!
//! Provides transport implementations for executing canonical requests:
//! - HTTP (reqwest)
//! - GraphQL over HTTP
//! - Raw TCP

pub mod graphql;
pub mod http;
pub mod registry;
pub mod tcp;

pub use graphql::GraphqlTransport;
pub use http::HttpTransport;
pub use registry::{Timed, TransportRegistry};
pub use tcp::TcpTransport;
pub use yapi_core::{Transport, TransportProvider};

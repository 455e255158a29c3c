//! Transport trait and response type.
//!
//! Transports execute a canonical [`Request`] (HTTP, gRPC, TCP, GraphQL).

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::request::{Request, TransportKind};

/// What a transport returns.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// 0 for transports without a status (TCP).
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub duration: Duration,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Trait for request transports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Name of this transport.
    fn name(&self) -> &'static str;

    /// Execute a request. Implementations must return promptly with
    /// [`crate::Error::Cancelled`] once `cancel` fires.
    async fn execute(&self, cancel: &CancellationToken, request: &Request) -> Result<Response>;
}

/// Looks up the transport for a request's transport tag.
pub trait TransportProvider: Send + Sync {
    fn transport(&self, kind: TransportKind) -> Option<Arc<dyn Transport>>;
}

//! Transport selection by kind.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use yapi_core::{Request, Response, Result, Transport, TransportKind, TransportProvider};

use crate::graphql::GraphqlTransport;
use crate::http::HttpTransport;
use crate::tcp::TcpTransport;

/// Wraps a transport and records how long each call took in
/// [`Response::duration`].
pub struct Timed<T> {
    inner: T,
}

impl<T: Transport> Timed<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: Transport> Transport for Timed<T> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn execute(&self, cancel: &CancellationToken, request: &Request) -> Result<Response> {
        let start = Instant::now();
        let mut response = self.inner.execute(cancel, request).await?;
        response.duration = start.elapsed();
        debug!(
            transport = self.inner.name(),
            elapsed_ms = response.duration.as_millis() as u64,
            "Request finished"
        );
        Ok(response)
    }
}

/// Transports keyed by [`TransportKind`].
#[derive(Default, Clone)]
pub struct TransportRegistry {
    transports: HashMap<TransportKind, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP, GraphQL and TCP, each timed. gRPC has no built-in transport.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(TransportKind::Http, Arc::new(Timed::new(HttpTransport::new()?)));
        registry.register(
            TransportKind::Graphql,
            Arc::new(Timed::new(GraphqlTransport::new(HttpTransport::new()?))),
        );
        registry.register(TransportKind::Tcp, Arc::new(Timed::new(TcpTransport)));
        Ok(registry)
    }

    /// Add or replace the transport for `kind`.
    pub fn register(&mut self, kind: TransportKind, transport: Arc<dyn Transport>) {
        self.transports.insert(kind, transport);
    }

    pub fn kinds(&self) -> Vec<TransportKind> {
        let mut kinds: Vec<_> = self.transports.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl TransportProvider for TransportRegistry {
    fn transport(&self, kind: TransportKind) -> Option<Arc<dyn Transport>> {
        self.transports.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Slow;

    #[async_trait]
    impl Transport for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn execute(&self, _cancel: &CancellationToken, _request: &Request) -> Result<Response> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Response {
                status_code: 204,
                ..Default::default()
            })
        }
    }

    fn request() -> Request {
        Request {
            url: "http://x".into(),
            method: "GET".into(),
            headers: Default::default(),
            body: None,
            body_source: None,
            extras: yapi_core::TransportExtras::Http,
            insecure: false,
            jq_filter: None,
            timeout: None,
            output_file: None,
        }
    }

    #[tokio::test]
    async fn test_timed_sets_duration() {
        let timed = Timed::new(Slow);
        let response = timed
            .execute(&CancellationToken::new(), &request())
            .await
            .unwrap();
        assert_eq!(response.status_code, 204);
        assert!(response.duration >= Duration::from_millis(20));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = TransportRegistry::new();
        registry.register(TransportKind::Tcp, Arc::new(Timed::new(Slow)));
        assert!(registry.transport(TransportKind::Tcp).is_some());
        assert!(registry.transport(TransportKind::Grpc).is_none());
        assert_eq!(registry.kinds(), vec![TransportKind::Tcp]);
    }
}

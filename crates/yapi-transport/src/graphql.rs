//! GraphQL over HTTP.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use yapi_core::{Error, Request, Response, Result, Transport, TransportExtras};

use crate::http::HttpTransport;

/// Posts `{"query": ..., "variables": ...}` through an [`HttpTransport`].
pub struct GraphqlTransport {
    http: HttpTransport,
}

impl GraphqlTransport {
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for GraphqlTransport {
    fn name(&self) -> &'static str {
        "graphql"
    }

    async fn execute(&self, cancel: &CancellationToken, request: &Request) -> Result<Response> {
        let http_request = to_http_request(request)?;
        self.http.execute(cancel, &http_request).await
    }
}

/// The HTTP request carrying a GraphQL operation.
pub fn to_http_request(request: &Request) -> Result<Request> {
    let TransportExtras::Graphql(graphql) = &request.extras else {
        return Err(Error::InvalidRequest(
            "GraphQL transport requires a graphql query".to_string(),
        ));
    };

    let mut payload = Map::new();
    payload.insert("query".to_string(), json!(graphql.query));
    if let Some(variables) = graphql.variables.as_deref().filter(|v| !v.is_empty()) {
        let variables: Value = serde_json::from_str(variables).map_err(|e| {
            Error::InvalidRequest(format!("failed to unmarshal graphql variables: {e}"))
        })?;
        payload.insert("variables".to_string(), variables);
    }
    let body = serde_json::to_vec(&payload)
        .map_err(|e| Error::InvalidRequest(format!("failed to marshal graphql payload: {e}")))?;

    let mut headers = request.headers.clone();
    headers.retain(|k, _| !k.eq_ignore_ascii_case("Content-Type"));
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    Ok(Request {
        method: "POST".to_string(),
        headers,
        body: Some(Bytes::from(body)),
        body_source: None,
        extras: TransportExtras::Http,
        ..request.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yapi_core::request::GraphqlExtras;

    fn request(variables: Option<&str>) -> Request {
        Request {
            url: "https://api.example/graphql".into(),
            method: "GET".into(),
            headers: [("content-type".to_string(), "text/plain".to_string())].into(),
            body: None,
            body_source: None,
            extras: TransportExtras::Graphql(GraphqlExtras {
                query: "query($id: ID!) { user(id: $id) { name } }".into(),
                variables: variables.map(str::to_string),
            }),
            insecure: false,
            jq_filter: None,
            timeout: None,
            output_file: None,
        }
    }

    #[test]
    fn test_envelope() {
        let http = to_http_request(&request(Some(r#"{"id":"7"}"#))).unwrap();
        assert_eq!(http.method, "POST");
        assert_eq!(http.headers.len(), 1);
        assert_eq!(http.header("Content-Type"), Some("application/json"));
        let body: Value = serde_json::from_slice(http.body.as_ref().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({"query": "query($id: ID!) { user(id: $id) { name } }", "variables": {"id": "7"}})
        );
    }

    #[test]
    fn test_variables_omitted_when_absent() {
        let http = to_http_request(&request(None)).unwrap();
        let body: Value = serde_json::from_slice(http.body.as_ref().unwrap()).unwrap();
        assert!(body.get("variables").is_none());
    }

    #[test]
    fn test_rejects_non_graphql() {
        let mut req = request(None);
        req.extras = TransportExtras::Http;
        assert!(matches!(to_http_request(&req), Err(Error::InvalidRequest(_))));
    }
}

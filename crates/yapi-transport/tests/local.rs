use bytes::Bytes;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use yapi_core::request::{GraphqlExtras, TcpExtras};
use yapi_core::{Error, Request, Transport, TransportExtras, TransportKind, TransportProvider};
use yapi_transport::{GraphqlTransport, HttpTransport, TcpTransport, TransportRegistry};

fn request(url: String, extras: TransportExtras) -> Request {
    Request {
        url,
        method: "GET".into(),
        headers: Default::default(),
        body: None,
        body_source: None,
        extras,
        insecure: false,
        jq_filter: None,
        timeout: None,
        output_file: None,
    }
}

/// Answers one HTTP request by echoing its body back as JSON, along with the
/// request line in `X-Request-Line`.
async fn http_echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut chunk = [0u8; 1024];
        let (head_end, content_length) = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            raw.extend_from_slice(&chunk[..n]);
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&raw[..pos]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .map(|v| v.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                break (pos + 4, length);
            }
        };
        while raw.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            raw.extend_from_slice(&chunk[..n]);
        }
        let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
        let request_line = head.lines().next().unwrap_or_default().to_string();
        let body = raw[head_end..head_end + content_length].to_vec();
        let reply = format!(
            "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nX-Request-Line: {request_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(reply.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_http_round_trip() {
    let base = http_echo_server().await;
    let mut req = request(format!("{base}/items?x=1"), TransportExtras::Http);
    req.method = "POST".into();
    req.headers.insert("Content-Type".into(), "application/json".into());
    req.body = Some(Bytes::from_static(br#"{"a":1}"#));

    let http = HttpTransport::new().unwrap();
    let response = http.execute(&CancellationToken::new(), &req).await.unwrap();
    assert_eq!(response.status_code, 201);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(
        response.header("X-Request-Line"),
        Some("POST /items?x=1 HTTP/1.1")
    );
    assert_eq!(response.body_text(), r#"{"a":1}"#);
}

#[tokio::test]
async fn test_graphql_posts_envelope() {
    let base = http_echo_server().await;
    let req = request(
        format!("{base}/graphql"),
        TransportExtras::Graphql(GraphqlExtras {
            query: "{ viewer { id } }".into(),
            variables: Some(r#"{"first":2}"#.into()),
        }),
    );

    let graphql = GraphqlTransport::new(HttpTransport::new().unwrap());
    let response = graphql
        .execute(&CancellationToken::new(), &req)
        .await
        .unwrap();
    assert_eq!(
        response.header("X-Request-Line"),
        Some("POST /graphql HTTP/1.1")
    );
    let echoed: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(echoed["query"], "{ viewer { id } }");
    assert_eq!(echoed["variables"]["first"], 2);
}

#[tokio::test]
async fn test_tcp_exchange() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        socket.read_to_end(&mut received).await.unwrap();
        let mut reply = b"ECHO:".to_vec();
        reply.extend_from_slice(&received);
        socket.write_all(&reply).await.unwrap();
    });

    let req = request(
        format!("tcp://{addr}"),
        TransportExtras::Tcp(TcpExtras {
            data: "50494e47".into(),
            encoding: "hex".into(),
            close_after_send: true,
            idle_timeout: 500,
            ..Default::default()
        }),
    );
    let response = TcpTransport
        .execute(&CancellationToken::new(), &req)
        .await
        .unwrap();
    assert_eq!(response.status_code, 0);
    assert_eq!(response.body_text(), "ECHO:PING");
}

#[tokio::test]
async fn test_cancelled_request_returns_promptly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Accept and never answer.
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    });

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let req = request(
        format!("tcp://{addr}"),
        TransportExtras::Tcp(TcpExtras {
            data: "hello".into(),
            read_timeout: 30,
            ..Default::default()
        }),
    );
    let err = TcpTransport.execute(&cancel, &req).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn test_default_registry_has_no_grpc() {
    let registry = TransportRegistry::with_defaults().unwrap();
    for kind in [TransportKind::Http, TransportKind::Graphql, TransportKind::Tcp] {
        assert!(registry.transport(kind).is_some(), "{kind}");
    }
    assert!(registry.transport(TransportKind::Grpc).is_none());
}

//! Raw TCP transport.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use yapi_core::request::TcpExtras;
use yapi_core::{Error, Request, Response, Result, Transport, TransportExtras};

/// Sends the payload, then reads until the peer closes or a read deadline passes.
///
/// `read_timeout` (seconds) bounds the whole read; otherwise `idle_timeout`
/// (milliseconds, default 2s) bounds each wait for more data. The status code
/// is always 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
impl Transport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn execute(&self, cancel: &CancellationToken, request: &Request) -> Result<Response> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = exchange(request) => result,
        }
    }
}

async fn exchange(request: &Request) -> Result<Response> {
    let default_extras = TcpExtras::default();
    let extras = match &request.extras {
        TransportExtras::Tcp(tcp) => tcp,
        _ => &default_extras,
    };
    let addr = address(&request.url)?;
    let payload = payload(request, extras)?;

    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::Transport(format!("failed to dial TCP target {addr}: {e}")))?;
    debug!(addr, bytes = payload.len(), "TCP connected");

    if !payload.is_empty() {
        stream
            .write_all(&payload)
            .await
            .map_err(|e| Error::Transport(format!("failed to write data to TCP connection: {e}")))?;
        if extras.close_after_send {
            stream.shutdown().await?;
        }
    }

    let body = if extras.read_timeout > 0 {
        let mut buf = Vec::new();
        let deadline = Duration::from_secs(extras.read_timeout);
        match tokio::time::timeout(deadline, read_all(&mut stream, &mut buf)).await {
            Ok(result) => result?,
            Err(_) => debug!(addr, "TCP read deadline reached"),
        }
        buf
    } else {
        let idle = match extras.idle_timeout {
            0 => DEFAULT_IDLE_TIMEOUT,
            ms => Duration::from_millis(ms),
        };
        read_until_idle(&mut stream, idle).await?
    };

    Ok(Response {
        status_code: 0,
        body: Bytes::from(body),
        ..Default::default()
    })
}

/// `host:port` from a `tcp://host:port` URL.
fn address(url: &str) -> Result<&str> {
    let addr = url.strip_prefix("tcp://").unwrap_or(url);
    if !addr.contains(':') {
        return Err(Error::InvalidRequest(format!(
            "TCP URL must be in format tcp://host:port, got {url}"
        )));
    }
    Ok(addr.trim_end_matches('/'))
}

/// `data` if set, else the request body, decoded per `encoding`.
fn payload(request: &Request, extras: &TcpExtras) -> Result<Vec<u8>> {
    let raw: Vec<u8> = if !extras.data.is_empty() {
        extras.data.as_bytes().to_vec()
    } else {
        request.body.as_ref().map(|b| b.to_vec()).unwrap_or_default()
    };

    match extras.encoding.as_str() {
        "" | "text" => Ok(raw),
        "hex" => {
            let text = String::from_utf8_lossy(&raw);
            hex::decode(text.trim())
                .map_err(|e| Error::InvalidRequest(format!("failed to decode hex data: {e}")))
        }
        "base64" => {
            let text = String::from_utf8_lossy(&raw);
            STANDARD
                .decode(text.trim())
                .map_err(|e| Error::InvalidRequest(format!("failed to decode base64 data: {e}")))
        }
        other => Err(Error::InvalidRequest(format!(
            "unsupported TCP encoding: {other}"
        ))),
    }
}

async fn read_all(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| Error::Transport(format!("failed to read from TCP connection: {e}")))?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn read_until_idle(stream: &mut TcpStream, idle: Duration) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match tokio::time::timeout(idle, stream.read(&mut chunk)).await {
            Err(_) => return Ok(buf),
            Ok(Ok(0)) => return Ok(buf),
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => {
                return Err(Error::Transport(format!(
                    "failed to read from TCP connection: {e}"
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(data: &str, encoding: &str, body: Option<&str>) -> Request {
        Request {
            url: "tcp://localhost:9000".into(),
            method: "GET".into(),
            headers: Default::default(),
            body: body.map(|b| Bytes::from(b.to_string())),
            body_source: None,
            extras: TransportExtras::Tcp(TcpExtras {
                data: data.into(),
                encoding: encoding.into(),
                ..Default::default()
            }),
            insecure: false,
            jq_filter: None,
            timeout: None,
            output_file: None,
        }
    }

    fn decoded(req: &Request) -> Result<Vec<u8>> {
        match &req.extras {
            TransportExtras::Tcp(tcp) => payload(req, tcp),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_address() {
        assert_eq!(address("tcp://localhost:9000").unwrap(), "localhost:9000");
        assert!(matches!(address("tcp://localhost"), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_payload_encodings() {
        assert_eq!(decoded(&request("PING\n", "", None)).unwrap(), b"PING\n");
        assert_eq!(decoded(&request("48690a", "hex", None)).unwrap(), b"Hi\n");
        assert_eq!(decoded(&request("SGkK", "base64", None)).unwrap(), b"Hi\n");
        assert_eq!(decoded(&request("", "text", Some("from body"))).unwrap(), b"from body");
        assert!(decoded(&request("zz", "hex", None)).is_err());
        assert!(decoded(&request("x", "utf16", None)).is_err());
    }
}

//! Minimal HTTP/1.x listener feeding [`crate::api::dispatch`]
//!
//! Connections are served one at a time, to completion, each closed after a single response.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::{debug, info, warn};

use crate::api::{Request, Response, dispatch};
use crate::config::ServerOptions;
use crate::device::DeviceProvider;
use crate::error::{Error, Result};

/// Upper bound for the request line plus headers.
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

const MSG_MALFORMED: &str = "Malformed request.";
const MSG_TOO_LARGE: &str = "Request body too large.";

/// HTTP front end bound to a listening socket.
pub struct Server {
    listener: TcpListener,
    provider: Arc<dyn DeviceProvider>,
    max_body_bytes: usize,
    request_timeout: Duration,
}

impl Server {
    /// Bind to the configured address.
    pub async fn bind(options: &ServerOptions, provider: Arc<dyn DeviceProvider>) -> Result<Self> {
        let addr = options.socket_addr()?;
        let listener = TcpListener::bind(addr).await.map_err(Error::Io)?;
        Ok(Self::from_listener(listener, provider, options))
    }

    /// Serve on an already bound listener.
    pub fn from_listener(
        listener: TcpListener,
        provider: Arc<dyn DeviceProvider>,
        options: &ServerOptions,
    ) -> Self {
        Self {
            listener,
            provider,
            max_body_bytes: options.max_body_bytes,
            request_timeout: options.request_timeout(),
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::Io)
    }

    /// Accept and serve connections until the task is dropped.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    time::sleep(Duration::from_millis(250)).await;
                    continue;
                }
            };

            if let Err(err) = self.handle_connection(stream, peer).await {
                debug!(peer = %peer, error = %err, "connection closed");
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let outcome = match time::timeout(
            self.request_timeout,
            read_request(&mut stream, self.max_body_bytes),
        )
        .await
        {
            Ok(outcome) => outcome?,
            Err(_) => {
                debug!(peer = %peer, "request read timed out");
                return Ok(());
            }
        };

        let rejected = matches!(outcome, ReadOutcome::Rejected(_));
        let response = match outcome {
            ReadOutcome::Request(request) => {
                info!(
                    peer = %peer,
                    method = %request.method,
                    uri = %request.uri,
                    body_len = request.body.len(),
                    "request"
                );
                dispatch(&request, self.provider.as_ref())
            }
            ReadOutcome::Rejected(response) => {
                warn!(peer = %peer, status = response.status, "rejected request");
                response
            }
        };

        stream
            .write_all(&encode_response(&response))
            .await
            .map_err(Error::Io)?;
        stream.shutdown().await.map_err(Error::Io)?;
        if rejected {
            discard_input(&mut stream, self.request_timeout).await;
        }

        Ok(())
    }
}

/// Drop whatever the client still sends; closing with unread input would reset the
/// connection before the client reads the response.
async fn discard_input(stream: &mut TcpStream, limit: Duration) {
    let mut sink = [0u8; 1024];
    let _ = time::timeout(limit, async {
        while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
    })
    .await;
}

/// Result of reading one request off the wire.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Complete request
    Request(Request),
    /// Request refused before dispatch; send this response
    Rejected(Response),
}

/// Request line and the headers this server cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Method token
    pub method: String,
    /// Request target
    pub uri: String,
    /// Declared body length
    pub content_length: usize,
}

impl RequestHead {
    /// Parse everything before the blank line. `None` when the head is malformed.
    pub fn parse(head: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(head).ok()?;
        let mut lines = text.split("\r\n");

        let mut parts = lines.next()?.split(' ');
        let method = parts.next().filter(|m| !m.is_empty())?;
        let uri = parts.next().filter(|u| u.starts_with('/'))?;
        let version = parts.next()?;
        if !version.starts_with("HTTP/1.") || parts.next().is_some() {
            return None;
        }

        let mut content_length = 0;
        for line in lines {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok()?;
            }
        }

        Some(Self {
            method: method.to_string(),
            uri: uri.to_string(),
            content_length,
        })
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Read one request: head, then exactly `Content-Length` body bytes.
pub async fn read_request<R>(reader: &mut R, max_body_bytes: usize) -> Result<ReadOutcome>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Ok(ReadOutcome::Rejected(Response::text(400, MSG_MALFORMED)));
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Http("connection closed before end of headers".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let Some(head) = RequestHead::parse(&buf[..head_end]) else {
        return Ok(ReadOutcome::Rejected(Response::text(400, MSG_MALFORMED)));
    };
    if head.content_length > max_body_bytes {
        return Ok(ReadOutcome::Rejected(Response::text(413, MSG_TOO_LARGE)));
    }

    let mut body = buf.split_off(head_end + 4);
    while body.len() < head.content_length {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Http("connection closed mid-body".into()));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(head.content_length);

    Ok(ReadOutcome::Request(Request {
        method: head.method,
        uri: head.uri,
        body,
    }))
}

/// Serialize a response with `Connection: close` and an explicit length.
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut out = Vec::with_capacity(128 + response.body.len());
    out.extend_from_slice(
        format!("HTTP/1.1 {} {}\r\n", response.status, response.reason()).as_bytes(),
    );
    out.extend_from_slice(b"Connection: close\r\n");
    if let Some(content_type) = response.content_type {
        out.extend_from_slice(b"Content-Type: ");
        out.extend_from_slice(content_type.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", response.body.len()).as_bytes());
    out.extend_from_slice(&response.body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read(raw: &[u8], limit: usize) -> Result<ReadOutcome> {
        let mut reader = raw;
        read_request(&mut reader, limit).await
    }

    #[test]
    fn test_parse_head() {
        let head = RequestHead::parse(
            b"POST /device/control/video0?x=1 HTTP/1.1\r\nHost: a\r\ncontent-length: 17",
        )
        .unwrap();
        assert_eq!(head.method, "POST");
        assert_eq!(head.uri, "/device/control/video0?x=1");
        assert_eq!(head.content_length, 17);

        assert!(RequestHead::parse(b"GET /devices").is_none());
        assert!(RequestHead::parse(b"GET devices HTTP/1.1").is_none());
        assert!(RequestHead::parse(b"GET /devices HTTP/1.1\r\nbroken header").is_none());
        assert!(RequestHead::parse(b"GET /devices HTTP/1.1\r\nContent-Length: ten").is_none());
    }

    #[tokio::test]
    async fn test_read_request_with_body() {
        let raw = b"POST /device/control/video0 HTTP/1.1\r\nContent-Length: 17\r\n\r\n{\"brightness\":50}";
        match read(raw, 1024).await.unwrap() {
            ReadOutcome::Request(request) => {
                assert_eq!(request.method, "POST");
                assert_eq!(request.body, br#"{"brightness":50}"#);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let raw = b"POST /device/control/video0 HTTP/1.1\r\nContent-Length: 100\r\n\r\n";
        assert_eq!(
            read(raw, 10).await.unwrap(),
            ReadOutcome::Rejected(Response::text(413, "Request body too large."))
        );
    }

    #[tokio::test]
    async fn test_malformed_and_truncated_requests() {
        assert_eq!(
            read(b"NONSENSE\r\n\r\n", 1024).await.unwrap(),
            ReadOutcome::Rejected(Response::text(400, "Malformed request."))
        );
        assert!(matches!(
            read(b"GET /devices HTTP/1.1\r\n", 1024).await,
            Err(Error::Http(_))
        ));
        assert!(matches!(
            read(b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nab", 1024).await,
            Err(Error::Http(_))
        ));
    }

    #[test]
    fn test_encode_response() {
        let encoded = encode_response(&Response::json(b"{}\n".to_vec()));
        assert_eq!(
            encoded,
            b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: 3\r\n\r\n{}\n"
        );
        let empty = encode_response(&Response::empty(404));
        assert!(empty.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
        assert!(empty.ends_with(b"Content-Length: 0\r\n\r\n"));
    }
}

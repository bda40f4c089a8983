use core::fmt::Write as _;

use embedded_io_async::{Read, Write};
use heapless::String;

use crate::constants::{HTTP_RESPONSE_BUFFER_SIZE, USER_AGENT};
use crate::endpoint::Scheme;

/// Failure below the HTTP layer. Always worth a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    Dns,
    Connect,
    Tls,
    Write,
    Read,
    /// No answer within the attempt deadline
    Timeout,
    /// Connection closed before a status line arrived
    Closed,
    /// Response head did not start with a valid status line
    MalformedResponse,
}

/// A single POST request. Borrowed so retries resend the exact same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub scheme: Scheme,
    pub host: &'a str,
    pub port: u16,
    /// Path and query string
    pub target: &'a str,
    pub authorization: &'a str,
    pub content_type: &'a str,
    pub body: &'a [u8],
}

/// Sends a request and returns the HTTP status code.
pub trait HttpClient {
    async fn send(&mut self, request: &Request<'_>) -> Result<u16, TransportError>;
}

/// Write the request head and body to an open session.
pub async fn write_request<T: Write>(
    session: &mut T,
    request: &Request<'_>,
) -> Result<(), TransportError> {
    let mut content_length: String<20> = String::new();
    write!(content_length, "{}", request.body.len()).map_err(|_| TransportError::Write)?;

    // Host carries the port only when it is not the scheme default
    let mut port: String<6> = String::new();
    if request.port != request.scheme.default_port() {
        write!(port, ":{}", request.port).map_err(|_| TransportError::Write)?;
    }

    // Write request in chunks to avoid dynamic allocation
    let parts: [&[u8]; 17] = [
        b"POST ",
        request.target.as_bytes(),
        b" HTTP/1.1\r\nHost: ",
        request.host.as_bytes(),
        port.as_bytes(),
        b"\r\nUser-Agent: ",
        USER_AGENT.as_bytes(),
        b"\r\nAuthorization: ",
        request.authorization.as_bytes(),
        b"\r\nContent-Type: ",
        request.content_type.as_bytes(),
        b"\r\nContent-Length: ",
        content_length.as_bytes(),
        b"\r\nAccept: */*",
        b"\r\nConnection: close",
        b"\r\n\r\n",
        request.body,
    ];

    for part in parts.iter().filter(|p| !p.is_empty()) {
        session
            .write_all(part)
            .await
            .map_err(|_| TransportError::Write)?;
    }
    session.flush().await.map_err(|_| TransportError::Write)?;
    Ok(())
}

/// Read until the status line is complete and parse its code.
pub async fn read_status<T: Read>(session: &mut T) -> Result<u16, TransportError> {
    let mut buf = [0u8; HTTP_RESPONSE_BUFFER_SIZE];
    let mut total_read = 0;

    loop {
        let n = session
            .read(&mut buf[total_read..])
            .await
            .map_err(|_| TransportError::Read)?;

        if n == 0 {
            return Err(TransportError::Closed);
        }

        total_read += n;
        if let Some(end) = find_line_end(&buf[..total_read]) {
            return parse_status_line(&buf[..end]);
        }

        if total_read == buf.len() {
            return Err(TransportError::MalformedResponse);
        }
    }
}

/// One request/response exchange over an already connected session.
pub async fn exchange<T: Read + Write>(
    session: &mut T,
    request: &Request<'_>,
) -> Result<u16, TransportError> {
    write_request(session, request).await?;
    let status = read_status(session).await?;
    log::debug!("POST {} -> {}", request.target, status);
    Ok(status)
}

fn find_line_end(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == b"\r\n")
}

// "HTTP/1.1 204 No Content"
fn parse_status_line(line: &[u8]) -> Result<u16, TransportError> {
    let line = core::str::from_utf8(line).map_err(|_| TransportError::MalformedResponse)?;
    let mut parts = line.split(' ');

    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(TransportError::MalformedResponse);
    }

    let code = parts.next().unwrap_or_default();
    if code.len() != 3 {
        return Err(TransportError::MalformedResponse);
    }
    code.parse::<u16>()
        .map_err(|_| TransportError::MalformedResponse)
}

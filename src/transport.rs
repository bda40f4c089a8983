use embassy_net::{
    dns::DnsQueryType,
    tcp::TcpSocket,
    IpAddress, Stack,
};
use embassy_time::Duration;
use embedded_tls::{Aes128GcmSha256, TlsConfig, TlsConnection, TlsContext, UnsecureProvider};
use log::{debug, error, warn};
use rand_chacha::ChaCha8Rng;

use env_telemetry::constants::{
    RX_BUFFER_SIZE, TLS_READ_BUFFER_SIZE, TLS_WRITE_BUFFER_SIZE, TX_BUFFER_SIZE,
};
use env_telemetry::endpoint::Scheme;
use env_telemetry::http::{self, HttpClient, Request, TransportError};

/// Socket timeout, the uploader bounds whole attempts on top of this
const SOCKET_TIMEOUT_SECS: u64 = 30;

/// Socket and TLS record buffers, reused by every connection.
pub struct Buffers {
    pub rx: [u8; RX_BUFFER_SIZE],
    pub tx: [u8; TX_BUFFER_SIZE],
    pub tls_read: [u8; TLS_READ_BUFFER_SIZE],
    pub tls_write: [u8; TLS_WRITE_BUFFER_SIZE],
}

impl Buffers {
    pub const fn new() -> Self {
        Self {
            rx: [0; RX_BUFFER_SIZE],
            tx: [0; TX_BUFFER_SIZE],
            tls_read: [0; TLS_READ_BUFFER_SIZE],
            tls_write: [0; TLS_WRITE_BUFFER_SIZE],
        }
    }
}

/// HTTP client over the embassy-net stack. One connection per request,
/// TLS 1.3 for https:// endpoints.
///
/// The handshake uses embedded-tls' `UnsecureProvider`: traffic is encrypted
/// but the server certificate is not verified.
pub struct NetClient {
    stack: Stack<'static>,
    rng: ChaCha8Rng,
    buffers: &'static mut Buffers,
}

impl NetClient {
    pub fn new(stack: Stack<'static>, rng: ChaCha8Rng, buffers: &'static mut Buffers) -> Self {
        if cfg!(feature = "tls") {
            warn!("TLS server certificates are not verified");
        }
        Self {
            stack,
            rng,
            buffers,
        }
    }

    async fn resolve(&self, host: &str) -> Result<IpAddress, TransportError> {
        self.stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|e| {
                warn!("DNS query for {} failed: {:?}", host, e);
                TransportError::Dns
            })?
            .first()
            .copied()
            .ok_or(TransportError::Dns)
    }
}

impl HttpClient for NetClient {
    async fn send(&mut self, request: &Request<'_>) -> Result<u16, TransportError> {
        let addr = self.resolve(request.host).await?;

        let Buffers {
            rx,
            tx,
            tls_read,
            tls_write,
        } = &mut *self.buffers;

        let mut socket = TcpSocket::new(self.stack, rx, tx);
        socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));

        debug!("Connecting TCP socket to {}:{}", request.host, request.port);
        socket
            .connect((addr, request.port))
            .await
            .map_err(|e| {
                warn!("TCP connect to {} failed: {:?}", request.host, e);
                TransportError::Connect
            })?;

        match request.scheme {
            Scheme::Http => {
                let status = http::exchange(&mut socket, request).await;
                socket.close();
                status
            }
            Scheme::Https if cfg!(feature = "tls") => {
                let config = TlsConfig::new().with_server_name(request.host);

                let mut tls: TlsConnection<TcpSocket, Aes128GcmSha256> =
                    TlsConnection::new(socket, tls_read, tls_write);

                debug!("Starting TLS handshake with {}", request.host);
                let provider = UnsecureProvider::new::<Aes128GcmSha256>(&mut self.rng);
                tls.open(TlsContext::new(&config, provider))
                    .await
                    .map_err(|e| {
                        error!("TLS handshake with {} failed: {:?}", request.host, e);
                        TransportError::Tls
                    })?;

                let status = http::exchange(&mut tls, request).await;
                match tls.close().await {
                    Ok(mut socket) => socket.close(),
                    Err((mut socket, e)) => {
                        debug!("TLS close: {:?}", e);
                        socket.close();
                    }
                }
                status
            }
            Scheme::Https => {
                error!("https:// endpoint but TLS support is disabled");
                Err(TransportError::Tls)
            }
        }
    }
}

use embassy_net::{
    dns::DnsQueryType,
    udp::{PacketMetadata, UdpSocket},
    Stack,
};
use embassy_time::{with_timeout, Duration, Instant};
use log::{info, warn};

use env_telemetry::clock::WallClock;
use env_telemetry::constants::NTP_PORT;
use env_telemetry::ntp;

const RESPONSE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug)]
pub enum Error {
    DnsLookupFailed,
    Bind,
    Send,
    Receive,
    Timeout,
    #[allow(dead_code)]
    InvalidResponse(ntp::Error),
}

/// Ask an SNTP server for the time and anchor it to the monotonic clock.
pub async fn sync(stack: Stack<'static>, server: &str) -> Result<WallClock, Error> {
    let addr = stack
        .dns_query(server, DnsQueryType::A)
        .await
        .map_err(|_| Error::DnsLookupFailed)?
        .first()
        .copied()
        .ok_or(Error::DnsLookupFailed)?;

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; ntp::PACKET_SIZE * 2];
    let mut tx_buffer = [0u8; ntp::PACKET_SIZE * 2];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket.bind(0).map_err(|_| Error::Bind)?;

    socket
        .send_to(&ntp::request(), (addr, NTP_PORT))
        .await
        .map_err(|_| Error::Send)?;

    let mut packet = [0u8; ntp::PACKET_SIZE];
    let (n, _) = with_timeout(
        Duration::from_secs(RESPONSE_TIMEOUT_SECS),
        socket.recv_from(&mut packet),
    )
    .await
    .map_err(|_| Error::Timeout)?
    .map_err(|_| Error::Receive)?;

    let received = Instant::now();
    let unix_secs = ntp::parse_response(&packet[..n]).map_err(|e| {
        warn!("SNTP response from {} rejected: {:?}", server, e);
        Error::InvalidResponse(e)
    })?;

    info!("Wall clock synced: {} s since epoch", unix_secs);
    Ok(WallClock::new(received, unix_secs))
}

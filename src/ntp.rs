//! Minimal SNTP (RFC 4330) client packets.

/// Size of an SNTP packet without extensions
pub const PACKET_SIZE: usize = 48;

/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ShortPacket,
    NotServerMode,
    /// Kiss-o'-death or unsynchronised server
    Unsynchronised,
    ZeroTimestamp,
}

/// Client request: LI 0, version 4, mode 3 (client).
pub fn request() -> [u8; PACKET_SIZE] {
    let mut packet = [0u8; PACKET_SIZE];
    packet[0] = (4 << 3) | 3;
    packet
}

/// Unix seconds from the server's transmit timestamp.
pub fn parse_response(packet: &[u8]) -> Result<u64, Error> {
    if packet.len() < PACKET_SIZE {
        return Err(Error::ShortPacket);
    }

    let mode = packet[0] & 0x07;
    if mode != 4 {
        return Err(Error::NotServerMode);
    }

    let leap = packet[0] >> 6;
    let stratum = packet[1];
    if leap == 3 || stratum == 0 || stratum > 15 {
        return Err(Error::Unsynchronised);
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    if seconds == 0 {
        return Err(Error::ZeroTimestamp);
    }

    // Era 1 starts in 2036; timestamps below the Unix epoch belong to it
    let seconds = u64::from(seconds);
    let unix = if seconds >= NTP_UNIX_OFFSET {
        seconds - NTP_UNIX_OFFSET
    } else {
        seconds + (1u64 << 32) - NTP_UNIX_OFFSET
    };

    Ok(unix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(stratum: u8, transmit: u32) -> [u8; PACKET_SIZE] {
        let mut packet = [0u8; PACKET_SIZE];
        packet[0] = (4 << 3) | 4;
        packet[1] = stratum;
        packet[40..44].copy_from_slice(&transmit.to_be_bytes());
        packet
    }

    #[test]
    fn request_is_a_v4_client_packet() {
        let packet = request();
        assert_eq!(packet[0], 0x23);
        assert!(packet[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn parses_transmit_timestamp() {
        let ntp = (1_700_000_000u64 + NTP_UNIX_OFFSET) as u32;
        assert_eq!(parse_response(&response(2, ntp)), Ok(1_700_000_000));
    }

    #[test]
    fn handles_era_rollover() {
        // 2036-02-07T06:28:16Z is NTP second 0 of era 1
        assert_eq!(parse_response(&response(2, 10)), Ok(2_085_978_506));
    }

    #[test]
    fn rejects_bad_packets() {
        assert_eq!(parse_response(&[0u8; 10]), Err(Error::ShortPacket));
        assert_eq!(parse_response(&request()), Err(Error::NotServerMode));
        assert_eq!(
            parse_response(&response(0, 12345)),
            Err(Error::Unsynchronised)
        );
        assert_eq!(parse_response(&response(1, 0)), Err(Error::ZeroTimestamp));
    }
}

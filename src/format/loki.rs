use core::fmt::Write;

use crate::constants::LOG_APP_LABEL;
use crate::sampler::Snapshot;

use super::{write_json_fmt, write_json_str, Device, Error};

/// Loki push request with one stream for the device.
///
/// Valid readings go into a single `level=info` line. Each invalid reading
/// gets its own `level=warn` line naming the sensor and the fault, so a gap
/// in the metrics always has a matching log entry.
pub fn encode<W: Write>(out: &mut W, device: &Device, snapshot: &Snapshot) -> Result<(), Error> {
    if snapshot.readings.is_empty() {
        return Err(Error::NothingToSend);
    }
    let secs = snapshot
        .timestamp
        .unix_secs
        .ok_or(Error::MissingWallClock)?;

    out.write_str(r#"{"streams":[{"stream":{"app":"#)?;
    write_json_str(out, LOG_APP_LABEL)?;
    out.write_str(r#","device":"#)?;
    write_json_str(out, device.id)?;
    if let Some(location) = device.location {
        out.write_str(r#","location":"#)?;
        write_json_str(out, location)?;
    }
    out.write_str(r#"},"values":["#)?;

    let mut first = true;

    if snapshot.has_valid() {
        // Nanosecond timestamps, as a string
        write!(out, r#"["{}000000000","level=info"#, secs)?;
        for reading in snapshot.valid() {
            if let Some(value) = reading.value() {
                write!(out, " {}={:.2}", reading.kind().field(), value)?;
            }
        }
        out.write_str(r#""]"#)?;
        first = false;
    }

    for reading in snapshot.invalid() {
        if !first {
            out.write_char(',')?;
        }
        first = false;

        let fault = reading.fault().map(|f| f.name()).unwrap_or("unknown");
        write!(out, r#"["{}000000000","#, secs)?;

        write_json_fmt(
            out,
            format_args!(
                "level=warn sensor={} field={} fault={}",
                reading.source(),
                reading.kind().field(),
                fault
            ),
        )?;
        out.write_char(']')?;
    }

    out.write_str("]}]}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use embassy_time::Instant;

    use super::*;
    use crate::clock::Timestamp;
    use crate::format::tests::{snapshot, DEVICE};
    use crate::format::Payload;

    #[test]
    fn push_request_with_fault_line() {
        let mut out = Payload::new();
        encode(&mut out, &DEVICE, &snapshot(true)).unwrap();
        assert_eq!(
            out.as_str(),
            concat!(
                r#"{"streams":[{"stream":{"app":"env-telemetry","device":"ESP8266","location":"living room"},"#,
                r#""values":[["1700000000000000000","level=info temperature=22.50 co2=612.00"],"#,
                r#"["1700000000000000000","level=warn sensor=dht22 field=humidity fault=checksum"]]}]}"#
            )
        );
    }

    #[test]
    fn location_label_is_optional() {
        let device = Device {
            location: None,
            ..DEVICE
        };
        let mut out = Payload::new();
        encode(&mut out, &device, &snapshot(true)).unwrap();
        assert!(out.starts_with(
            r#"{"streams":[{"stream":{"app":"env-telemetry","device":"ESP8266"},"values":"#
        ));
    }

    #[test]
    fn needs_wall_clock() {
        let mut out = Payload::new();
        assert_eq!(
            encode(&mut out, &DEVICE, &snapshot(false)),
            Err(Error::MissingWallClock)
        );
    }

    #[test]
    fn empty_snapshot_has_nothing_to_send() {
        let mut out = Payload::new();
        let snapshot = Snapshot::new(Timestamp {
            monotonic: Instant::from_secs(0),
            unix_secs: Some(1),
        });
        assert_eq!(
            encode(&mut out, &DEVICE, &snapshot),
            Err(Error::NothingToSend)
        );
    }
}

use core::fmt::Write;

use crate::constants::INFLUX_MEASUREMENT;
use crate::sampler::Snapshot;

use super::{Device, Error};

/// One line of line protocol for the whole snapshot. Invalid readings are
/// left out; without a wall clock the server assigns the timestamp.
pub fn encode<W: Write>(out: &mut W, device: &Device, snapshot: &Snapshot) -> Result<(), Error> {
    if !snapshot.has_valid() {
        return Err(Error::NothingToSend);
    }

    write!(out, "{},device=", INFLUX_MEASUREMENT)?;
    write_tag_value(out, device.id)?;
    if let Some(location) = device.location {
        out.write_str(",location=")?;
        write_tag_value(out, location)?;
    }

    let mut first = true;
    for reading in snapshot.valid() {
        let Some(value) = reading.value() else {
            continue;
        };
        let separator = if first { ' ' } else { ',' };
        write!(out, "{}{}={:.2}", separator, reading.kind().field(), value)?;
        first = false;
    }

    match snapshot.timestamp.unix_secs {
        Some(secs) => writeln!(out, " {}", secs)?,
        None => {
            log::warn!("No wall clock, influx will timestamp the point on arrival");
            writeln!(out)?
        }
    }

    Ok(())
}

// Tag values escape commas, spaces and equals signs
fn write_tag_value<W: Write>(out: &mut W, value: &str) -> Result<(), Error> {
    for c in value.chars() {
        if matches!(c, ',' | ' ' | '=') {
            out.write_char('\\')?;
        }
        out.write_char(c)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use embassy_time::Instant;
    use heapless::String;

    use super::*;
    use crate::clock::Timestamp;
    use crate::format::tests::{snapshot, DEVICE};
    use crate::format::Payload;
    use crate::sensors::{SensorFault, SensorKind, SensorReading};

    #[test]
    fn line_with_timestamp() {
        let mut out = Payload::new();
        encode(&mut out, &DEVICE, &snapshot(true)).unwrap();
        assert_eq!(
            out.as_str(),
            "environment,device=ESP8266,location=living\\ room temperature=22.50,co2=612.00 1700000000\n"
        );
    }

    #[test]
    fn line_without_wall_clock() {
        let mut out = Payload::new();
        let device = Device {
            location: None,
            ..DEVICE
        };
        encode(&mut out, &device, &snapshot(false)).unwrap();
        assert_eq!(
            out.as_str(),
            "environment,device=ESP8266 temperature=22.50,co2=612.00\n"
        );
    }

    #[test]
    fn nothing_to_send_without_valid_readings() {
        let ts = Timestamp::at(Instant::from_secs(0), None);
        let mut snapshot = Snapshot::new(ts);
        snapshot
            .readings
            .push(SensorReading::invalid(
                "dht22",
                SensorKind::Temperature,
                SensorFault::Timeout,
                ts,
            ))
            .unwrap();

        let mut out = Payload::new();
        assert_eq!(
            encode(&mut out, &DEVICE, &snapshot),
            Err(Error::NothingToSend)
        );
    }

    #[test]
    fn overflow_is_reported() {
        let mut out: String<16> = String::new();
        assert_eq!(
            encode(&mut out, &DEVICE, &snapshot(true)),
            Err(Error::BufferOverflow)
        );
    }

    #[test]
    fn tag_escaping() {
        let mut out: String<32> = String::new();
        write_tag_value(&mut out, "a,b=c d").unwrap();
        assert_eq!(out.as_str(), "a\\,b\\=c\\ d");
    }
}

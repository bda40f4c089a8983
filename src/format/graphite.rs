use core::fmt::Write;

use crate::sampler::Snapshot;

use super::{write_json_fmt, Device, Error};

/// Graphite HTTP API body: one gauge per valid reading, named
/// `<device>.<field>` with the device id sanitised into a path segment.
pub fn encode<W: Write>(out: &mut W, device: &Device, snapshot: &Snapshot) -> Result<(), Error> {
    if !snapshot.has_valid() {
        return Err(Error::NothingToSend);
    }
    let secs = snapshot
        .timestamp
        .unix_secs
        .ok_or(Error::MissingWallClock)?;

    out.write_char('[')?;
    let mut first = true;
    for reading in snapshot.valid() {
        let Some(value) = reading.value() else {
            continue;
        };
        if !first {
            out.write_char(',')?;
        }
        first = false;

        out.write_str(r#"{"name":""#)?;
        write_path_segment(out, device.id)?;
        write!(
            out,
            r#".{}","interval":{},"value":{:.2},"time":{},"mtype":"gauge","tags":["#,
            reading.kind().field(),
            device.interval_secs,
            value,
            secs
        )?;

        write_json_fmt(out, format_args!("device={}", device.id))?;
        if let Some(location) = device.location {
            out.write_char(',')?;
            write_json_fmt(out, format_args!("location={}", location))?;
        }
        out.write_char(',')?;
        write_json_fmt(out, format_args!("sensor={}", reading.source()))?;

        out.write_str("]}")?;
    }
    out.write_char(']')?;
    Ok(())
}

// Graphite paths use dots as separators, keep [A-Za-z0-9_-]
fn write_path_segment<W: Write>(out: &mut W, value: &str) -> Result<(), Error> {
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.write_char(c)?;
        } else {
            out.write_char('_')?;
        }
    }
    Ok(())
}

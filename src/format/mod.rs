//! Backend wire formats.
//!
//! Every encoder is a pure function of the snapshot and the device labels,
//! so re-encoding the same snapshot yields the same bytes and a retried
//! upload writes exactly what the first attempt wrote.

use core::fmt::Write;

use heapless::String;

use crate::config::Config;
use crate::constants::PAYLOAD_BUFFER_SIZE;
use crate::endpoint::{Endpoint, EndpointKind};
use crate::sampler::Snapshot;

#[cfg(feature = "graphite")]
pub mod graphite;
#[cfg(feature = "influx")]
pub mod influx;
#[cfg(feature = "loki")]
pub mod loki;

pub type Payload = String<PAYLOAD_BUFFER_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No reading in the snapshot can be represented in this format
    NothingToSend,
    /// The format needs an absolute timestamp and the clock is not synced
    MissingWallClock,
    BufferOverflow,
    BackendDisabled,
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Error::BufferOverflow
    }
}

/// Labels attached to every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device<'a> {
    pub id: &'a str,
    pub location: Option<&'a str>,
    /// Sampling interval, reported to backends that store it
    pub interval_secs: u64,
}

impl<'a> From<&'a Config> for Device<'a> {
    fn from(config: &'a Config) -> Self {
        Self {
            id: config.device_id,
            location: config.location,
            interval_secs: config.interval.as_secs(),
        }
    }
}

/// Encode a snapshot for the given backend.
pub fn encode(kind: EndpointKind, device: &Device, snapshot: &Snapshot) -> Result<Payload, Error> {
    let mut payload = Payload::new();

    match kind {
        #[cfg(feature = "influx")]
        EndpointKind::TimeSeriesDb => influx::encode(&mut payload, device, snapshot)?,
        #[cfg(feature = "loki")]
        EndpointKind::LogAggregator => loki::encode(&mut payload, device, snapshot)?,
        #[cfg(feature = "graphite")]
        EndpointKind::MetricsService => graphite::encode(&mut payload, device, snapshot)?,
        #[allow(unreachable_patterns)]
        _ => return Err(Error::BackendDisabled),
    }

    Ok(payload)
}

/// A formatted payload bound to its destination.
#[derive(Debug)]
pub struct UploadBatch<'a> {
    pub snapshot: &'a Snapshot,
    pub endpoint: &'a Endpoint,
    pub payload: Payload,
}

impl<'a> UploadBatch<'a> {
    pub fn new(
        snapshot: &'a Snapshot,
        endpoint: &'a Endpoint,
        device: &Device,
    ) -> Result<Self, Error> {
        let payload = encode(endpoint.kind, device, snapshot)?;
        Ok(Self {
            snapshot,
            endpoint,
            payload,
        })
    }
}

/// Escapes everything written through it for use inside a JSON string.
pub(crate) struct JsonEscaped<'a, W>(pub &'a mut W);

impl<W: Write> Write for JsonEscaped<'_, W> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            match c {
                '"' => self.0.write_str("\\\"")?,
                '\\' => self.0.write_str("\\\\")?,
                '\n' => self.0.write_str("\\n")?,
                '\r' => self.0.write_str("\\r")?,
                '\t' => self.0.write_str("\\t")?,
                c if (c as u32) < 0x20 => write!(self.0, "\\u{:04x}", c as u32)?,
                c => self.0.write_char(c)?,
            }
        }
        Ok(())
    }
}

/// Write `value` as a JSON string literal, quotes included.
pub(crate) fn write_json_str<W: Write>(out: &mut W, value: &str) -> Result<(), Error> {
    write_json_fmt(out, format_args!("{}", value))
}

/// Like [`write_json_str`] for formatted text, without an intermediate buffer.
pub(crate) fn write_json_fmt<W: Write>(
    out: &mut W,
    args: core::fmt::Arguments<'_>,
) -> Result<(), Error> {
    out.write_char('"')?;
    JsonEscaped(&mut *out).write_fmt(args)?;
    out.write_char('"')?;
    Ok(())
}

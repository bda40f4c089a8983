use heapless::Vec;

use crate::clock::Timestamp;
use crate::constants::MAX_VALUES_PER_SENSOR;

#[cfg(feature = "bme280")]
pub mod bme280;
#[cfg(feature = "dht22")]
pub mod dht22;
#[cfg(feature = "scd30")]
pub mod scd30;
#[cfg(feature = "sds011")]
pub mod sds011;

/// Why a sensor value could not be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    /// The driver did not answer within the read timeout
    Timeout,
    /// Frame or CRC check failed
    Checksum,
    /// The value is outside the physical range of the quantity
    OutOfRange,
    /// The driver answered without a value for this quantity
    NoData,
    /// Bus or driver level failure
    ReadFailure,
}

impl SensorFault {
    pub fn name(&self) -> &'static str {
        match self {
            SensorFault::Timeout => "timeout",
            SensorFault::Checksum => "checksum",
            SensorFault::OutOfRange => "out_of_range",
            SensorFault::NoData => "no_data",
            SensorFault::ReadFailure => "read_failure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleSize {
    Pm2_5,
    Pm10,
}

/// Physical quantity measured by a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    /// Degrees Celsius
    Temperature,
    /// Relative humidity in percent
    Humidity,
    /// Parts per million
    Co2,
    /// Micrograms per cubic metre
    ParticulateDensity(ParticleSize),
    /// Hectopascal
    Pressure,
}

impl SensorKind {
    /// Field name used on every backend.
    pub fn field(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Co2 => "co2",
            SensorKind::ParticulateDensity(ParticleSize::Pm2_5) => "pm2_5",
            SensorKind::ParticulateDensity(ParticleSize::Pm10) => "pm10",
            SensorKind::Pressure => "pressure",
        }
    }

    /// Inclusive range a plausible value falls in.
    pub fn valid_range(&self) -> (f32, f32) {
        match self {
            SensorKind::Temperature => (-40.0, 85.0),
            SensorKind::Humidity => (0.0, 100.0),
            SensorKind::Co2 => (0.0, 40_000.0),
            SensorKind::ParticulateDensity(_) => (0.0, 999.9),
            SensorKind::Pressure => (300.0, 1100.0),
        }
    }

    pub fn check(&self, value: f32) -> Result<f32, SensorFault> {
        let (min, max) = self.valid_range();
        if value.is_finite() && value >= min && value <= max {
            Ok(value)
        } else {
            Err(SensorFault::OutOfRange)
        }
    }
}

/// Values returned by one driver read.
pub type RawSample = Vec<(SensorKind, f32), MAX_VALUES_PER_SENSOR>;

/// Capability every sensor driver implements.
pub trait Sensor {
    /// Short driver name, used as the `sensor` label in logs.
    fn name(&self) -> &'static str;

    /// Quantities this driver reports on every read.
    fn kinds(&self) -> &'static [SensorKind];

    async fn read_raw(&mut self) -> Result<RawSample, SensorFault>;
}

/// One value of one cycle. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    source: &'static str,
    kind: SensorKind,
    value: f32,
    timestamp: Timestamp,
    fault: Option<SensorFault>,
}

impl SensorReading {
    pub fn valid(source: &'static str, kind: SensorKind, value: f32, timestamp: Timestamp) -> Self {
        Self {
            source,
            kind,
            value,
            timestamp,
            fault: None,
        }
    }

    pub fn invalid(
        source: &'static str,
        kind: SensorKind,
        fault: SensorFault,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            source,
            kind,
            value: f32::NAN,
            timestamp,
            fault: Some(fault),
        }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn is_valid(&self) -> bool {
        self.fault.is_none()
    }

    pub fn fault(&self) -> Option<SensorFault> {
        self.fault
    }

    /// The measured value, only for valid readings.
    pub fn value(&self) -> Option<f32> {
        match self.fault {
            None => Some(self.value),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_time::Instant;

    use super::*;

    #[test]
    fn range_check_rejects_implausible_values() {
        assert_eq!(SensorKind::Temperature.check(22.5), Ok(22.5));
        assert_eq!(
            SensorKind::Temperature.check(-120.0),
            Err(SensorFault::OutOfRange)
        );
        assert_eq!(
            SensorKind::Humidity.check(f32::NAN),
            Err(SensorFault::OutOfRange)
        );
        assert_eq!(
            SensorKind::Co2.check(f32::INFINITY),
            Err(SensorFault::OutOfRange)
        );
        assert_eq!(SensorKind::Humidity.check(100.0), Ok(100.0));
    }

    #[test]
    fn invalid_reading_hides_its_value() {
        let ts = Timestamp::at(Instant::from_secs(1), None);
        let reading =
            SensorReading::invalid("dht22", SensorKind::Humidity, SensorFault::Checksum, ts);

        assert!(!reading.is_valid());
        assert_eq!(reading.value(), None);
        assert_eq!(reading.fault(), Some(SensorFault::Checksum));
    }

    #[test]
    fn field_names() {
        assert_eq!(
            SensorKind::ParticulateDensity(ParticleSize::Pm2_5).field(),
            "pm2_5"
        );
        assert_eq!(SensorKind::Co2.field(), "co2");
    }
}

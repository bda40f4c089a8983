use embassy_time::Delay;
use embedded_dht_rs::{dht22::Dht22 as Dht22Sensor, SensorError};
use embedded_hal::digital::{InputPin, OutputPin};
use log::{error, info};

use super::{RawSample, Sensor, SensorFault, SensorKind};

const KINDS: &[SensorKind] = &[SensorKind::Temperature, SensorKind::Humidity];

/// DHT22 (AM2302) on a single open-drain data line.
pub struct Dht22<P> {
    sensor: Dht22Sensor<P, Delay>,
}

impl<P: InputPin + OutputPin> Dht22<P> {
    pub fn new(pin: P) -> Self {
        info!("Initialised DHT22");
        Self {
            sensor: Dht22Sensor::new(pin, Delay),
        }
    }
}

impl<P: InputPin + OutputPin> Sensor for Dht22<P> {
    fn name(&self) -> &'static str {
        "dht22"
    }

    fn kinds(&self) -> &'static [SensorKind] {
        KINDS
    }

    async fn read_raw(&mut self) -> Result<RawSample, SensorFault> {
        // Bit-banged and blocking, a full frame takes about 5ms
        let reading = self.sensor.read().map_err(|e| {
            error!("DHT22: read failed: {:?}", e);
            fault(&e)
        })?;

        let mut raw = RawSample::new();
        raw.push((SensorKind::Temperature, reading.temperature)).ok();
        raw.push((SensorKind::Humidity, reading.humidity)).ok();
        Ok(raw)
    }
}

fn fault(error: &SensorError) -> SensorFault {
    match error {
        SensorError::ChecksumMismatch => SensorFault::Checksum,
        // No response edge within the protocol window
        SensorError::Timeout => SensorFault::Timeout,
        SensorError::PinError => SensorFault::ReadFailure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_keep_their_cause() {
        assert_eq!(fault(&SensorError::Timeout), SensorFault::Timeout);
        assert_eq!(fault(&SensorError::ChecksumMismatch), SensorFault::Checksum);
        assert_eq!(fault(&SensorError::PinError), SensorFault::ReadFailure);
    }
}

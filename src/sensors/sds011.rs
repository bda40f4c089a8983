use embedded_io_async::{Read, Write};
use log::{error, info};
use sds011_nostd_rs::{
    Config as Sds011Config, DeviceID as Sds011DeviceID, DeviceMode as Sds011DeviceMode,
    Sds011 as Sds011Sensor,
};

use super::{ParticleSize, RawSample, Sensor, SensorFault, SensorKind};

const KINDS: &[SensorKind] = &[
    SensorKind::ParticulateDensity(ParticleSize::Pm2_5),
    SensorKind::ParticulateDensity(ParticleSize::Pm10),
];

pub struct Sds011<S> {
    sensor: Sds011Sensor<S>,
}

impl<S: Read + Write> Sds011<S> {
    pub async fn new(serial: S) -> Result<Self, SensorFault> {
        info!("Initialising SDS011...");
        let mut sensor = Sds011Sensor::new(
            serial,
            Sds011Config {
                id: Sds011DeviceID {
                    id1: 0xFF,
                    id2: 0xFF,
                },
                mode: Sds011DeviceMode::Active,
            },
        );

        sensor.init().await.map_err(|e| {
            error!("SDS011: init failed: {:?}", e);
            SensorFault::ReadFailure
        })?;

        info!("Initialised SDS011");

        Ok(Self { sensor })
    }
}

impl<S: Read + Write> Sensor for Sds011<S> {
    fn name(&self) -> &'static str {
        "sds011"
    }

    fn kinds(&self) -> &'static [SensorKind] {
        KINDS
    }

    async fn read_raw(&mut self) -> Result<RawSample, SensorFault> {
        // Frames carry a checksum, a bad frame is the usual failure
        let sample = self.sensor.read_sample().await.map_err(|e| {
            error!("SDS011: error reading sample: {:?}", e);
            SensorFault::Checksum
        })?;

        let mut raw = RawSample::new();
        raw.push((KINDS[0], sample.pm2_5)).ok();
        raw.push((KINDS[1], sample.pm10)).ok();
        Ok(raw)
    }
}

use bme280_rs::{AsyncBme280, Oversampling, SensorMode};
use embassy_time::Delay;
use embedded_hal_async::i2c::I2c;
use log::{error, info};

use super::{RawSample, Sensor, SensorFault, SensorKind};

const KINDS: &[SensorKind] = &[
    SensorKind::Temperature,
    SensorKind::Humidity,
    SensorKind::Pressure,
];

pub struct Bme280<I2C> {
    sensor: AsyncBme280<I2C, Delay>,
}

impl<I2C: I2c> Bme280<I2C> {
    pub async fn new(i2c: I2C) -> Result<Self, SensorFault> {
        info!("Initialising BME280...");
        let mut sensor = AsyncBme280::new(i2c, Delay);
        sensor.init().await.map_err(|e| {
            error!("BME280: init failed: {:?}", e);
            SensorFault::ReadFailure
        })?;

        sensor
            .set_sampling_configuration(
                bme280_rs::Configuration::default()
                    .with_temperature_oversampling(Oversampling::Oversample1)
                    .with_pressure_oversampling(Oversampling::Oversample1)
                    .with_humidity_oversampling(Oversampling::Oversample1)
                    .with_sensor_mode(SensorMode::Normal),
            )
            .await
            .map_err(|e| {
                error!("BME280: sampling configuration failed: {:?}", e);
                SensorFault::ReadFailure
            })?;

        info!("Initialised BME280");

        Ok(Self { sensor })
    }
}

impl<I2C: I2c> Sensor for Bme280<I2C> {
    fn name(&self) -> &'static str {
        "bme280"
    }

    fn kinds(&self) -> &'static [SensorKind] {
        KINDS
    }

    async fn read_raw(&mut self) -> Result<RawSample, SensorFault> {
        let sample = self.sensor.read_sample().await.map_err(|e| {
            error!("BME280: error reading sample: {:?}", e);
            SensorFault::ReadFailure
        })?;

        // Missing quantities are left out and flagged by the sampler
        let mut raw = RawSample::new();
        if let Some(temperature) = sample.temperature {
            raw.push((SensorKind::Temperature, temperature)).ok();
        }
        if let Some(humidity) = sample.humidity {
            raw.push((SensorKind::Humidity, humidity)).ok();
        }
        if let Some(pressure) = sample.pressure {
            // Pa to hPa
            raw.push((SensorKind::Pressure, pressure / 100.0)).ok();
        }
        Ok(raw)
    }
}

//! Sensor drivers wired on this board. The sampler holds a single sensor
//! type, so every enabled driver is wrapped in one enum.

#[cfg(any(feature = "bme280", feature = "scd30"))]
use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
#[cfg(any(feature = "bme280", feature = "scd30"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(any(feature = "bme280", feature = "scd30"))]
use esp_hal::{i2c::master::I2c, Async};

use env_telemetry::sensors::{RawSample, Sensor, SensorFault, SensorKind};

#[cfg(any(feature = "bme280", feature = "scd30"))]
pub type I2cBus = I2cDevice<'static, NoopRawMutex, I2c<'static, Async>>;

pub enum BoardSensor {
    #[cfg(feature = "dht22")]
    Dht22(env_telemetry::sensors::dht22::Dht22<esp_hal::gpio::Flex<'static>>),
    #[cfg(feature = "bme280")]
    Bme280(env_telemetry::sensors::bme280::Bme280<I2cBus>),
    #[cfg(feature = "scd30")]
    Scd30(env_telemetry::sensors::scd30::Scd30<I2cBus>),
    #[cfg(feature = "sds011")]
    Sds011(env_telemetry::sensors::sds011::Sds011<esp_hal::uart::Uart<'static, esp_hal::Async>>),
}

impl Sensor for BoardSensor {
    fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "dht22")]
            BoardSensor::Dht22(s) => s.name(),
            #[cfg(feature = "bme280")]
            BoardSensor::Bme280(s) => s.name(),
            #[cfg(feature = "scd30")]
            BoardSensor::Scd30(s) => s.name(),
            #[cfg(feature = "sds011")]
            BoardSensor::Sds011(s) => s.name(),
        }
    }

    fn kinds(&self) -> &'static [SensorKind] {
        match self {
            #[cfg(feature = "dht22")]
            BoardSensor::Dht22(s) => s.kinds(),
            #[cfg(feature = "bme280")]
            BoardSensor::Bme280(s) => s.kinds(),
            #[cfg(feature = "scd30")]
            BoardSensor::Scd30(s) => s.kinds(),
            #[cfg(feature = "sds011")]
            BoardSensor::Sds011(s) => s.kinds(),
        }
    }

    async fn read_raw(&mut self) -> Result<RawSample, SensorFault> {
        match self {
            #[cfg(feature = "dht22")]
            BoardSensor::Dht22(s) => s.read_raw().await,
            #[cfg(feature = "bme280")]
            BoardSensor::Bme280(s) => s.read_raw().await,
            #[cfg(feature = "scd30")]
            BoardSensor::Scd30(s) => s.read_raw().await,
            #[cfg(feature = "sds011")]
            BoardSensor::Sds011(s) => s.read_raw().await,
        }
    }
}

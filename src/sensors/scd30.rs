use embassy_time::{Delay, Duration, Instant, Timer};
use embedded_hal_async::i2c::I2c;
use libscd::asynchronous::scd30::Scd30 as Scd30Sensor;
use log::{error, info};

use super::{RawSample, Sensor, SensorFault, SensorKind};

const AMBIENT_PRESSURE: u16 = 1013;
/// Maximum number of retries for SCD30 initialization
const MAX_INIT_RETRIES: u8 = 5;
/// Poll period while waiting for the data-ready flag
const DATA_READY_POLL_MS: u64 = 100;

const KINDS: &[SensorKind] = &[
    SensorKind::Temperature,
    SensorKind::Humidity,
    SensorKind::Co2,
];

pub struct Scd30<I2C> {
    sensor: Scd30Sensor<I2C, Delay>,
    data_ready_timeout: Duration,
}

impl<I2C: I2c> Scd30<I2C> {
    /// `interval_seconds` is the sampling interval, the sensor measures at
    /// the same pace so a fresh value is ready on every read.
    pub async fn new(
        i2c: I2C,
        interval_seconds: u16,
        data_ready_timeout: Duration,
    ) -> Result<Self, SensorFault> {
        info!("Initialising Scd30...");
        let mut sensor = Scd30Sensor::new(i2c, Delay);

        Timer::after(Duration::from_millis(1000)).await;

        info!("Stopping continuous measurement...");
        let mut retries = 0;
        loop {
            match sensor.stop_continuous_measurement().await {
                Ok(_) => break,
                Err(e) => {
                    retries += 1;
                    if retries >= MAX_INIT_RETRIES {
                        error!(
                            "SCD30: Failed to stop continuous measurement after {} retries: {:?}",
                            MAX_INIT_RETRIES, e
                        );
                        return Err(SensorFault::ReadFailure);
                    }
                    info!(
                        "Error occurred: {:?}. Retry {}/{} in 5 seconds...",
                        e, retries, MAX_INIT_RETRIES
                    );
                    Timer::after(Duration::from_millis(5000)).await;
                }
            }
        }

        Timer::after(Duration::from_millis(1000)).await;
        sensor
            .set_measurement_interval(interval_seconds)
            .await
            .map_err(|e| {
                error!("SCD30: Failed to set measurement interval: {:?}", e);
                SensorFault::ReadFailure
            })?;

        Timer::after(Duration::from_millis(100)).await;
        sensor
            .start_continuous_measurement(AMBIENT_PRESSURE)
            .await
            .map_err(|e| {
                error!("SCD30: Failed to start continuous measurement: {:?}", e);
                SensorFault::ReadFailure
            })?;

        info!("Initialised Scd30");

        Ok(Self {
            sensor,
            data_ready_timeout,
        })
    }
}

impl<I2C: I2c> Sensor for Scd30<I2C> {
    fn name(&self) -> &'static str {
        "scd30"
    }

    fn kinds(&self) -> &'static [SensorKind] {
        KINDS
    }

    async fn read_raw(&mut self) -> Result<RawSample, SensorFault> {
        let start = Instant::now();

        loop {
            if start.elapsed() > self.data_ready_timeout {
                error!("SCD30: Timeout waiting for data ready");
                return Err(SensorFault::Timeout);
            }

            match self.sensor.data_ready().await {
                Ok(true) => break,
                Ok(false) => Timer::after(Duration::from_millis(DATA_READY_POLL_MS)).await,
                Err(e) => {
                    error!("SCD30: Error checking data ready: {:?}", e);
                    return Err(SensorFault::ReadFailure);
                }
            }
        }

        let sample = self.sensor.read_measurement().await.map_err(|e| {
            error!("SCD30: Error reading measurement: {:?}", e);
            SensorFault::Checksum
        })?;

        let mut raw = RawSample::new();
        raw.push((SensorKind::Temperature, sample.temperature)).ok();
        raw.push((SensorKind::Humidity, sample.humidity)).ok();
        raw.push((SensorKind::Co2, sample.co2 as f32)).ok();
        Ok(raw)
    }
}

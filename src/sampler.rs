use embassy_futures::select::{select, Either};
use embassy_time::Duration;
use heapless::Vec;
use log::{debug, warn};

use crate::clock::{Clock, Timestamp, WallClock};
use crate::constants::{MAX_READINGS, MAX_SENSORS};
use crate::sensors::{Sensor, SensorFault, SensorReading};

/// Readings of one cycle, in sensor registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: Timestamp,
    pub readings: Vec<SensorReading, MAX_READINGS>,
}

impl Snapshot {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            readings: Vec::new(),
        }
    }

    pub fn valid(&self) -> impl Iterator<Item = &SensorReading> {
        self.readings.iter().filter(|r| r.is_valid())
    }

    pub fn invalid(&self) -> impl Iterator<Item = &SensorReading> {
        self.readings.iter().filter(|r| !r.is_valid())
    }

    pub fn has_valid(&self) -> bool {
        self.valid().next().is_some()
    }

    fn record(&mut self, reading: SensorReading) {
        if self.readings.push(reading).is_err() {
            warn!(
                "Snapshot full, dropping {} reading from {}",
                reading.kind().field(),
                reading.source()
            );
        }
    }
}

#[derive(Debug)]
pub enum Error {
    TooManySensors,
}

/// Reads every attached sensor once per trigger.
pub struct Sampler<S> {
    sensors: Vec<S, MAX_SENSORS>,
    timeout: Duration,
}

impl<S: Sensor> Sampler<S> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sensors: Vec::new(),
            timeout,
        }
    }

    pub fn attach(&mut self, sensor: S) -> Result<(), Error> {
        log::info!("Attached sensor {}", sensor.name());
        self.sensors
            .push(sensor)
            .map_err(|_| Error::TooManySensors)
    }

    pub fn sensors(&self) -> &[S] {
        &self.sensors
    }

    /// Take one snapshot. Never fails: faults become invalid readings.
    pub async fn sample<C: Clock>(&mut self, clock: &C, wall_clock: Option<&WallClock>) -> Snapshot {
        let timestamp = Timestamp::at(clock.now(), wall_clock);
        let mut snapshot = Snapshot::new(timestamp);

        for sensor in self.sensors.iter_mut() {
            let deadline = clock.now() + self.timeout;
            let result = match select(sensor.read_raw(), clock.sleep_until(deadline)).await {
                Either::First(result) => result,
                Either::Second(()) => Err(SensorFault::Timeout),
            };

            let name = sensor.name();
            match result {
                Ok(raw) => {
                    for &kind in sensor.kinds() {
                        let reading = match raw.iter().find(|(k, _)| *k == kind) {
                            Some(&(_, value)) => match kind.check(value) {
                                Ok(value) => SensorReading::valid(name, kind, value, timestamp),
                                Err(fault) => {
                                    warn!("{}: {} value {} rejected", name, kind.field(), value);
                                    SensorReading::invalid(name, kind, fault, timestamp)
                                }
                            },
                            None => {
                                warn!("{}: no {} value in sample", name, kind.field());
                                SensorReading::invalid(name, kind, SensorFault::NoData, timestamp)
                            }
                        };
                        snapshot.record(reading);
                    }

                    for (kind, _) in raw.iter().filter(|(k, _)| !sensor.kinds().contains(k)) {
                        debug!("{}: ignoring undeclared {} value", name, kind.field());
                    }
                }
                Err(fault) => {
                    warn!("{}: read failed: {:?}", name, fault);
                    for &kind in sensor.kinds() {
                        snapshot.record(SensorReading::invalid(name, kind, fault, timestamp));
                    }
                }
            }
        }

        debug!("Snapshot: {:?}", snapshot);
        snapshot
    }
}

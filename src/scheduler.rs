use embassy_time::{Duration, Instant};
use heapless::Vec;
use log::{debug, error, info, warn};

use crate::clock::{Clock, WallClock};
use crate::config::Config;
use crate::constants::MAX_ENDPOINTS;
use crate::endpoint::EndpointKind;
use crate::format::{self, Device, UploadBatch};
use crate::http::HttpClient;
use crate::sampler::Sampler;
use crate::sensors::Sensor;
use crate::uploader::{UploadError, Uploader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Sampling,
    Formatting,
    Uploading,
}

/// What happened to one endpoint during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Delivered { attempts: u8 },
    Failed(UploadError),
    Skipped(format::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// 1 for the first cycle
    pub cycle: u32,
    /// Boundary this cycle was scheduled for
    pub trigger: Instant,
    pub readings: usize,
    pub invalid_readings: usize,
    pub uploads: Vec<(EndpointKind, UploadStatus), MAX_ENDPOINTS>,
}

/// First boundary `previous + k * interval` (k >= 1) that is not in the past.
/// Returns the boundary and how many boundaries were skipped to reach it.
pub fn next_trigger(previous: Instant, interval: Duration, now: Instant) -> (Instant, u64) {
    let next = previous + interval;
    if next >= now {
        return (next, 0);
    }

    let behind = (now - next).as_ticks();
    let step = interval.as_ticks().max(1);
    let skipped = behind.div_ceil(step);
    (next + Duration::from_ticks(skipped * step), skipped)
}

/// Drives sample, format and upload on absolute interval boundaries.
pub struct Scheduler<'a, C, S, H> {
    config: &'a Config,
    clock: C,
    sampler: Sampler<S>,
    uploader: Uploader<H>,
    wall_clock: Option<WallClock>,
    state: CycleState,
    next_trigger: Option<Instant>,
    cycle: u32,
}

impl<'a, C, S, H> Scheduler<'a, C, S, H>
where
    C: Clock,
    S: Sensor,
    H: HttpClient,
{
    pub fn new(config: &'a Config, clock: C, sampler: Sampler<S>, uploader: Uploader<H>) -> Self {
        Self {
            config,
            clock,
            sampler,
            uploader,
            wall_clock: None,
            state: CycleState::Idle,
            next_trigger: None,
            cycle: 0,
        }
    }

    pub fn set_wall_clock(&mut self, wall_clock: WallClock) {
        info!("Wall clock synced");
        self.wall_clock = Some(wall_clock);
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    fn transition(&mut self, state: CycleState) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Run cycles forever. Failed cycles are logged, never fatal.
    pub async fn run(&mut self) -> ! {
        loop {
            self.step().await;
        }
    }

    /// Wait for the next boundary and run one full cycle.
    pub async fn step(&mut self) -> CycleReport {
        let trigger = match self.next_trigger {
            Some(at) => {
                self.clock.sleep_until(at).await;
                at
            }
            None => self.clock.now(),
        };
        self.cycle += 1;
        info!("Cycle {} started", self.cycle);

        self.transition(CycleState::Sampling);
        let snapshot = self
            .sampler
            .sample(&self.clock, self.wall_clock.as_ref())
            .await;

        let mut report = CycleReport {
            cycle: self.cycle,
            trigger,
            readings: snapshot.readings.len(),
            invalid_readings: snapshot.invalid().count(),
            uploads: Vec::new(),
        };
        if report.invalid_readings > 0 {
            warn!(
                "{} of {} readings invalid this cycle",
                report.invalid_readings, report.readings
            );
        }

        let config = self.config;
        let device = Device::from(config);
        for endpoint in config.endpoints() {
            let name = endpoint.kind.name();

            self.transition(CycleState::Formatting);
            let status = match UploadBatch::new(&snapshot, endpoint, &device) {
                Ok(batch) => {
                    self.transition(CycleState::Uploading);
                    match self.uploader.upload(&batch, &self.clock).await {
                        Ok(attempts) => UploadStatus::Delivered { attempts },
                        Err(e) => {
                            error!("{}: no data point this cycle: {:?}", name, e);
                            UploadStatus::Failed(e)
                        }
                    }
                }
                Err(e) => {
                    warn!("{}: nothing uploaded this cycle: {:?}", name, e);
                    UploadStatus::Skipped(e)
                }
            };
            // One slot per configured endpoint
            report.uploads.push((endpoint.kind, status)).ok();
        }

        self.transition(CycleState::Idle);

        let (next, skipped) = next_trigger(trigger, config.interval, self.clock.now());
        if skipped > 0 {
            warn!(
                "Cycle {} overran its interval, skipping {} boundaries",
                self.cycle, skipped
            );
        }
        self.next_trigger = Some(next);

        report
    }
}

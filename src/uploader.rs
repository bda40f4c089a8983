use embassy_futures::select::{select, Either};
use embassy_time::Duration;
use heapless::String;
use log::{error, info, warn};

use crate::clock::Clock;
use crate::constants::{AUTH_HEADER_SIZE, REQUEST_PATH_SIZE};
use crate::format::UploadBatch;
use crate::http::{HttpClient, Request, TransportError};

/// Why a batch did not make it to its endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    /// Network trouble or server-side overload, retried until the budget ran out
    TransientNetwork { attempts: u8 },
    /// Credentials refused. Terminal for the batch.
    AuthRejected { status: u16 },
    /// Payload refused. Terminal for the batch.
    PayloadRejected { status: u16 },
    /// The request could not be assembled (target or header too long)
    Request,
}

/// Outcome of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Delivered,
    Transient,
    AuthRejected(u16),
    PayloadRejected(u16),
}

fn classify(result: Result<u16, TransportError>) -> Attempt {
    match result {
        Ok(200..=299) => Attempt::Delivered,
        Ok(status @ (401 | 403)) => Attempt::AuthRejected(status),
        Ok(408) | Ok(429) | Ok(500..=599) => Attempt::Transient,
        Ok(status) => Attempt::PayloadRejected(status),
        Err(_) => Attempt::Transient,
    }
}

/// Retry budget for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per batch, including the first
    pub max_attempts: u8,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound for one attempt, connect included
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Delay after the `retry`-th failed attempt (0 based): doubles every
    /// time until it reaches `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let ticks = self.initial_backoff.as_ticks().saturating_mul(factor);
        Duration::from_ticks(ticks).min(self.max_backoff)
    }
}

pub struct Uploader<H> {
    client: H,
    policy: RetryPolicy,
}

impl<H: HttpClient> Uploader<H> {
    pub fn new(client: H, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Deliver a batch. Returns the number of attempts it took.
    pub async fn upload<C: Clock>(
        &mut self,
        batch: &UploadBatch<'_>,
        clock: &C,
    ) -> Result<u8, UploadError> {
        let endpoint = batch.endpoint;
        let name = endpoint.kind.name();

        let mut target: String<REQUEST_PATH_SIZE> = String::new();
        endpoint.write_target(&mut target).map_err(|e| {
            error!("{}: request target: {:?}", name, e);
            UploadError::Request
        })?;
        let mut authorization: String<AUTH_HEADER_SIZE> = String::new();
        endpoint.authorization(&mut authorization).map_err(|e| {
            error!("{}: authorization header: {:?}", name, e);
            UploadError::Request
        })?;

        let request = Request {
            scheme: endpoint.url.scheme,
            host: endpoint.url.host,
            port: endpoint.url.port,
            target: &target,
            authorization: &authorization,
            content_type: endpoint.kind.content_type(),
            body: batch.payload.as_bytes(),
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;

            let deadline = clock.now() + self.policy.attempt_timeout;
            let result = match select(self.client.send(&request), clock.sleep_until(deadline)).await
            {
                Either::First(result) => result,
                Either::Second(()) => {
                    warn!("{}: attempt {} timed out", name, attempt);
                    Err(TransportError::Timeout)
                }
            };

            match classify(result) {
                Attempt::Delivered => {
                    info!("{}: {} bytes delivered", name, request.body.len());
                    return Ok(attempt);
                }
                Attempt::AuthRejected(status) => {
                    error!("{}: credentials rejected with {}", name, status);
                    return Err(UploadError::AuthRejected { status });
                }
                Attempt::PayloadRejected(status) => {
                    error!("{}: payload rejected with {}", name, status);
                    return Err(UploadError::PayloadRejected { status });
                }
                Attempt::Transient => {
                    if attempt >= self.policy.max_attempts {
                        error!("{}: giving up after {} attempts: {:?}", name, attempt, result);
                        return Err(UploadError::TransientNetwork { attempts: attempt });
                    }

                    let backoff = self.policy.backoff(u32::from(attempt - 1));
                    warn!(
                        "{}: attempt {}/{} failed ({:?}), retrying in {}ms",
                        name,
                        attempt,
                        self.policy.max_attempts,
                        result,
                        backoff.as_millis()
                    );
                    clock.sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;
    use embassy_time::Instant;

    use super::*;
    use crate::clock::{Timestamp, WallClock};
    use crate::endpoint::{BaseUrl, Credentials, Endpoint, EndpointKind};
    use crate::format::tests::DEVICE;
    use crate::sampler::Snapshot;
    use crate::sensors::{SensorKind, SensorReading};
    use crate::testing::{FakeClock, FakeHttp};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(10),
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint {
            kind: EndpointKind::TimeSeriesDb,
            url: BaseUrl::parse("https://influx.example.com").unwrap(),
            credentials: Credentials::Token("token"),
            org: Some("home"),
            bucket: Some("arduino"),
        }
    }

    fn snapshot() -> Snapshot {
        let wall = WallClock::new(Instant::from_secs(0), 1_700_000_000);
        let ts = Timestamp::at(Instant::from_secs(0), Some(&wall));
        let mut snapshot = Snapshot::new(ts);
        snapshot
            .readings
            .push(SensorReading::valid("dht22", SensorKind::Temperature, 22.5, ts))
            .unwrap();
        snapshot
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = policy();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(16));
        assert_eq!(policy.backoff(5), Duration::from_secs(30));
        assert_eq!(policy.backoff(200), Duration::from_secs(30));
    }

    #[test]
    fn classification() {
        assert_eq!(classify(Ok(204)), Attempt::Delivered);
        assert_eq!(classify(Ok(200)), Attempt::Delivered);
        assert_eq!(classify(Ok(401)), Attempt::AuthRejected(401));
        assert_eq!(classify(Ok(403)), Attempt::AuthRejected(403));
        assert_eq!(classify(Ok(429)), Attempt::Transient);
        assert_eq!(classify(Ok(503)), Attempt::Transient);
        assert_eq!(classify(Ok(400)), Attempt::PayloadRejected(400));
        assert_eq!(classify(Ok(413)), Attempt::PayloadRejected(413));
        assert_eq!(classify(Err(TransportError::Dns)), Attempt::Transient);
    }

    #[test]
    fn delivers_on_first_attempt() {
        let clock = FakeClock::default();
        let http = FakeHttp::answering(Ok(204));
        let mut uploader = Uploader::new(http.clone(), policy());
        let snapshot = snapshot();
        let endpoint = endpoint();
        let batch = UploadBatch::new(&snapshot, &endpoint, &DEVICE).unwrap();

        assert_eq!(block_on(uploader.upload(&batch, &clock)), Ok(1));

        let sent = http.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].host, "influx.example.com");
        assert_eq!(
            sent[0].target,
            "/api/v2/write?org=home&bucket=arduino&precision=s"
        );
        assert_eq!(sent[0].authorization, "Token token");
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn transient_failures_retry_with_increasing_backoff() {
        let clock = FakeClock::default();
        let http = FakeHttp::answering(Err(TransportError::Connect));
        let mut uploader = Uploader::new(http.clone(), policy());
        let snapshot = snapshot();
        let endpoint = endpoint();
        let batch = UploadBatch::new(&snapshot, &endpoint, &DEVICE).unwrap();

        assert_eq!(
            block_on(uploader.upload(&batch, &clock)),
            Err(UploadError::TransientNetwork { attempts: 4 })
        );
        assert_eq!(http.sent().len(), 4);

        let sleeps = clock.sleeps();
        assert_eq!(sleeps.len(), 3);
        assert!(sleeps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sleeps[0], Duration::from_secs(1));

        // Every attempt carries the same bytes
        let sent = http.sent();
        assert!(sent.iter().all(|s| s == &sent[0]));
    }

    #[test]
    fn recovers_after_transient_failure() {
        let clock = FakeClock::default();
        let http = FakeHttp::answering(Ok(204)).then(Ok(503)).then(Err(TransportError::Read));
        let mut uploader = Uploader::new(http.clone(), policy());
        let snapshot = snapshot();
        let endpoint = endpoint();
        let batch = UploadBatch::new(&snapshot, &endpoint, &DEVICE).unwrap();

        assert_eq!(block_on(uploader.upload(&batch, &clock)), Ok(3));
        assert_eq!(
            clock.sleeps(),
            [Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn resending_a_batch_repeats_the_request() {
        let clock = FakeClock::default();
        let http = FakeHttp::answering(Ok(204));
        let mut uploader = Uploader::new(http.clone(), policy());
        let snapshot = snapshot();
        let endpoint = endpoint();
        let batch = UploadBatch::new(&snapshot, &endpoint, &DEVICE).unwrap();

        assert_eq!(block_on(uploader.upload(&batch, &clock)), Ok(1));
        assert_eq!(block_on(uploader.upload(&batch, &clock)), Ok(1));

        let sent = http.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        assert_eq!(
            sent[0].body,
            b"environment,device=ESP8266,location=living\\ room temperature=22.50 1700000000\n"
        );
    }

    #[test]
    fn auth_rejection_is_terminal() {
        let clock = FakeClock::default();
        let http = FakeHttp::answering(Ok(401));
        let mut uploader = Uploader::new(http.clone(), policy());
        let snapshot = snapshot();
        let endpoint = endpoint();
        let batch = UploadBatch::new(&snapshot, &endpoint, &DEVICE).unwrap();

        assert_eq!(
            block_on(uploader.upload(&batch, &clock)),
            Err(UploadError::AuthRejected { status: 401 })
        );
        assert_eq!(http.sent().len(), 1);
    }

    #[test]
    fn payload_rejection_is_terminal() {
        let clock = FakeClock::default();
        let http = FakeHttp::answering(Ok(400));
        let mut uploader = Uploader::new(http.clone(), policy());
        let snapshot = snapshot();
        let endpoint = endpoint();
        let batch = UploadBatch::new(&snapshot, &endpoint, &DEVICE).unwrap();

        assert_eq!(
            block_on(uploader.upload(&batch, &clock)),
            Err(UploadError::PayloadRejected { status: 400 })
        );
        assert_eq!(http.sent().len(), 1);
    }

    #[test]
    fn hanging_attempts_are_bounded() {
        let clock = FakeClock::default();
        let mut uploader = Uploader::new(
            FakeHttp::hanging(),
            RetryPolicy {
                max_attempts: 2,
                ..policy()
            },
        );
        let snapshot = snapshot();
        let endpoint = endpoint();
        let batch = UploadBatch::new(&snapshot, &endpoint, &DEVICE).unwrap();

        assert_eq!(
            block_on(uploader.upload(&batch, &clock)),
            Err(UploadError::TransientNetwork { attempts: 2 })
        );
        // timeout, backoff, timeout
        assert_eq!(
            clock.sleeps(),
            [
                Duration::from_secs(10),
                Duration::from_secs(1),
                Duration::from_secs(10)
            ]
        );
    }
}

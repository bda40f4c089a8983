//! Fakes shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec as StdVec;

use embassy_time::{Duration, Instant};

use crate::clock::Clock;
use crate::http::{HttpClient, Request, TransportError};
use crate::sensors::{RawSample, Sensor, SensorFault, SensorKind};

/// Manually driven clock. Sleeping jumps straight to the deadline.
#[derive(Clone, Default)]
pub struct FakeClock {
    now: Rc<Cell<u64>>,
    sleeps: Rc<RefCell<StdVec<Duration>>>,
}

impl FakeClock {
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by.as_ticks());
    }

    /// Durations of every sleep, in order.
    pub fn sleeps(&self) -> StdVec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.now.get())
    }

    async fn sleep_until(&self, deadline: Instant) {
        let now = self.now();
        if deadline > now {
            self.sleeps.borrow_mut().push(deadline - now);
            self.now.set(deadline.as_ticks());
        } else {
            self.sleeps.borrow_mut().push(Duration::from_ticks(0));
        }
    }
}

pub enum Script {
    Values(&'static [(SensorKind, f32)]),
    Fail(SensorFault),
    Hang,
}

/// Sensor replaying a fixed answer, optionally taking time to do so.
pub struct FakeSensor {
    pub name: &'static str,
    pub kinds: &'static [SensorKind],
    pub script: Script,
    pub clock: Option<(FakeClock, Duration)>,
}

impl FakeSensor {
    pub fn values(
        name: &'static str,
        kinds: &'static [SensorKind],
        values: &'static [(SensorKind, f32)],
    ) -> Self {
        Self {
            name,
            kinds,
            script: Script::Values(values),
            clock: None,
        }
    }

    pub fn failing(name: &'static str, kinds: &'static [SensorKind], fault: SensorFault) -> Self {
        Self {
            name,
            kinds,
            script: Script::Fail(fault),
            clock: None,
        }
    }

    pub fn hanging(name: &'static str, kinds: &'static [SensorKind]) -> Self {
        Self {
            name,
            kinds,
            script: Script::Hang,
            clock: None,
        }
    }

    pub fn taking(mut self, clock: &FakeClock, duration: Duration) -> Self {
        self.clock = Some((clock.clone(), duration));
        self
    }
}

impl Sensor for FakeSensor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kinds(&self) -> &'static [SensorKind] {
        self.kinds
    }

    async fn read_raw(&mut self) -> Result<RawSample, SensorFault> {
        if let Some((clock, duration)) = &self.clock {
            clock.advance(*duration);
        }

        match self.script {
            Script::Values(values) => Ok(values.iter().copied().collect()),
            Script::Fail(fault) => Err(fault),
            Script::Hang => core::future::pending().await,
        }
    }
}

/// What a [`FakeHttp`] request looked like on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub host: String,
    pub target: String,
    pub authorization: String,
    pub body: StdVec<u8>,
}

/// HTTP client answering from a queue of scripted results. Once the queue is
/// empty every request gets the fallback answer.
#[derive(Clone)]
pub struct FakeHttp {
    answers: Rc<RefCell<VecDeque<Result<u16, TransportError>>>>,
    fallback: Result<u16, TransportError>,
    sent: Rc<RefCell<StdVec<Sent>>>,
    hang: bool,
}

impl FakeHttp {
    pub fn answering(fallback: Result<u16, TransportError>) -> Self {
        Self {
            answers: Rc::default(),
            fallback,
            sent: Rc::default(),
            hang: false,
        }
    }

    pub fn then(self, answer: Result<u16, TransportError>) -> Self {
        self.answers.borrow_mut().push_back(answer);
        self
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::answering(Ok(204))
        }
    }

    pub fn sent(&self) -> StdVec<Sent> {
        self.sent.borrow().clone()
    }
}

impl HttpClient for FakeHttp {
    async fn send(&mut self, request: &Request<'_>) -> Result<u16, TransportError> {
        self.sent.borrow_mut().push(Sent {
            host: request.host.into(),
            target: request.target.into(),
            authorization: request.authorization.into(),
            body: request.body.to_vec(),
        });

        if self.hang {
            return core::future::pending().await;
        }

        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

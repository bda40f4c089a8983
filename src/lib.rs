#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

//! Environmental telemetry for ESP32 boards.
//!
//! Sensors are sampled on a fixed, drift-corrected interval and every
//! snapshot is pushed to the configured backends: InfluxDB (line protocol),
//! Loki (log lines) and Graphite (gauges). Everything in this library is
//! hardware independent; the firmware binary supplies the clock, the sensor
//! drivers and the HTTP client.

pub mod clock;
pub mod config;
pub mod constants;
pub mod endpoint;
pub mod format;
pub mod http;
pub mod ntp;
pub mod sampler;
pub mod scheduler;
pub mod sensors;
pub mod uploader;

#[cfg(test)]
mod testing;

use embassy_time::Duration;
use heapless::Vec;

use crate::constants::{MAX_DEVICE_ID_LEN, MAX_ENDPOINTS};
use crate::endpoint::{BaseUrl, Credentials, Endpoint, EndpointKind};
use crate::uploader::RetryPolicy;

/// InfluxDB v2 connection settings
pub struct InfluxSettings {
    pub url: &'static str,
    pub org: &'static str,
    pub bucket: &'static str,
    pub token: &'static str,
}

/// Loki push settings (Grafana Cloud user id and API key)
pub struct LokiSettings {
    pub url: &'static str,
    pub user: &'static str,
    pub api_key: &'static str,
}

/// Graphite HTTP API settings (Grafana Cloud user id and API key)
pub struct GraphiteSettings {
    pub url: &'static str,
    pub user: &'static str,
    pub api_key: &'static str,
}

/// Values from cfg.toml, baked in at compile time by build.rs.
pub struct BuildConfig {
    // Device ID (used as DHCP hostname and as the device tag on every backend)
    pub device_id: &'static str,

    // Location identifier (optional tag)
    pub location: Option<&'static str>,

    // Wi-Fi SSID to connect to
    pub wifi_ssid: &'static str,

    // Wi-Fi pre-shared key (password)
    pub wifi_psk: &'static str,

    // Measurement interval in seconds
    pub measurement_interval_seconds: u32,

    // Upper bound for a single sensor read
    pub sensor_timeout_ms: u64,

    // Upper bound for a single HTTP attempt
    pub upload_attempt_timeout_ms: u64,

    // Attempts per batch, including the first one
    pub upload_max_attempts: u8,

    // Exponential backoff between transient failures
    pub upload_backoff_initial_ms: u64,
    pub upload_backoff_max_ms: u64,

    // SNTP server hostname
    pub ntp_server: &'static str,

    pub influxdb: Option<InfluxSettings>,
    pub loki: Option<LokiSettings>,
    pub graphite: Option<GraphiteSettings>,
}

pub mod generated {
    use super::*;

    // config values are generated at compile time
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

pub use generated::BUILD_CONFIG;

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    EmptyDeviceId,
    /// Longer than a DHCP hostname may be
    DeviceIdTooLong,
    ZeroInterval,
    ZeroSensorTimeout,
    ZeroAttemptTimeout,
    ZeroUploadAttempts,
    /// Initial backoff must be non-zero and below the cap
    InvalidBackoff,
    NoEndpoints,
    InvalidUrl(EndpointKind),
    MissingCredential(EndpointKind),
    BackendDisabled(EndpointKind),
}

/// Runtime configuration, validated once at startup and passed by reference.
#[derive(Debug)]
pub struct Config {
    pub device_id: &'static str,
    pub location: Option<&'static str>,
    pub interval: Duration,
    pub sensor_timeout: Duration,
    pub retry: RetryPolicy,
    pub endpoints: Vec<Endpoint, MAX_ENDPOINTS>,
}

impl Config {
    pub fn from_build(build: &BuildConfig) -> Result<Self, ConfigError> {
        let device_id = build.device_id.trim();
        if device_id.is_empty() {
            return Err(ConfigError::EmptyDeviceId);
        }
        if device_id.len() > MAX_DEVICE_ID_LEN {
            return Err(ConfigError::DeviceIdTooLong);
        }
        if build.measurement_interval_seconds == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if build.sensor_timeout_ms == 0 {
            return Err(ConfigError::ZeroSensorTimeout);
        }
        if build.upload_attempt_timeout_ms == 0 {
            return Err(ConfigError::ZeroAttemptTimeout);
        }
        if build.upload_max_attempts == 0 {
            return Err(ConfigError::ZeroUploadAttempts);
        }
        if build.upload_backoff_initial_ms == 0
            || build.upload_backoff_initial_ms >= build.upload_backoff_max_ms
        {
            return Err(ConfigError::InvalidBackoff);
        }

        let mut endpoints = Vec::new();

        if let Some(influx) = &build.influxdb {
            let kind = EndpointKind::TimeSeriesDb;
            require(kind, &[influx.org, influx.bucket, influx.token])?;
            push(
                &mut endpoints,
                Endpoint {
                    kind,
                    url: parse_url(kind, influx.url)?,
                    credentials: Credentials::Token(influx.token),
                    org: Some(influx.org),
                    bucket: Some(influx.bucket),
                },
            )?;
        }

        if let Some(loki) = &build.loki {
            let kind = EndpointKind::LogAggregator;
            require(kind, &[loki.user, loki.api_key])?;
            push(
                &mut endpoints,
                Endpoint {
                    kind,
                    url: parse_url(kind, loki.url)?,
                    credentials: Credentials::Basic {
                        user: loki.user,
                        key: loki.api_key,
                    },
                    org: None,
                    bucket: None,
                },
            )?;
        }

        if let Some(graphite) = &build.graphite {
            let kind = EndpointKind::MetricsService;
            require(kind, &[graphite.user, graphite.api_key])?;
            push(
                &mut endpoints,
                Endpoint {
                    kind,
                    url: parse_url(kind, graphite.url)?,
                    credentials: Credentials::Bearer {
                        user: graphite.user,
                        key: graphite.api_key,
                    },
                    org: None,
                    bucket: None,
                },
            )?;
        }

        if endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }

        Ok(Self {
            device_id,
            location: build.location.map(str::trim).filter(|l| !l.is_empty()),
            interval: Duration::from_secs(build.measurement_interval_seconds.into()),
            sensor_timeout: Duration::from_millis(build.sensor_timeout_ms),
            retry: RetryPolicy {
                max_attempts: build.upload_max_attempts,
                initial_backoff: Duration::from_millis(build.upload_backoff_initial_ms),
                max_backoff: Duration::from_millis(build.upload_backoff_max_ms),
                attempt_timeout: Duration::from_millis(build.upload_attempt_timeout_ms),
            },
            endpoints,
        })
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

fn require(kind: EndpointKind, values: &[&str]) -> Result<(), ConfigError> {
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(ConfigError::MissingCredential(kind));
    }
    Ok(())
}

fn parse_url(kind: EndpointKind, url: &'static str) -> Result<BaseUrl, ConfigError> {
    BaseUrl::parse(url).map_err(|e| {
        log::error!("{} url {:?} rejected: {:?}", kind.name(), url, e);
        ConfigError::InvalidUrl(kind)
    })
}

fn push(
    endpoints: &mut Vec<Endpoint, MAX_ENDPOINTS>,
    endpoint: Endpoint,
) -> Result<(), ConfigError> {
    if !endpoint.kind.is_enabled() {
        return Err(ConfigError::BackendDisabled(endpoint.kind));
    }
    // One slot per backend, cannot overflow
    endpoints.push(endpoint).ok();
    Ok(())
}

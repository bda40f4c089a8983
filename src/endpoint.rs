use core::fmt::Write;

use base64::Engine;
use heapless::String;

use crate::constants::{AUTH_HEADER_SIZE, REQUEST_PATH_SIZE};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    InvalidScheme,
    MissingHost,
    InvalidPort,
    UnsupportedUrl,
    BufferOverflow,
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Error::BufferOverflow
    }
}

/// Telemetry backend behind an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// InfluxDB v2 write API
    TimeSeriesDb,
    /// Loki push API
    LogAggregator,
    /// Graphite HTTP metrics API
    MetricsService,
}

impl EndpointKind {
    pub fn name(&self) -> &'static str {
        match self {
            EndpointKind::TimeSeriesDb => "influxdb",
            EndpointKind::LogAggregator => "loki",
            EndpointKind::MetricsService => "graphite",
        }
    }

    /// Whether the formatter for this backend is compiled in.
    pub fn is_enabled(&self) -> bool {
        match self {
            EndpointKind::TimeSeriesDb => cfg!(feature = "influx"),
            EndpointKind::LogAggregator => cfg!(feature = "loki"),
            EndpointKind::MetricsService => cfg!(feature = "graphite"),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            EndpointKind::TimeSeriesDb => "text/plain; charset=utf-8",
            EndpointKind::LogAggregator | EndpointKind::MetricsService => "application/json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// `scheme://host[:port][/prefix]`, without query or fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseUrl {
    pub scheme: Scheme,
    pub host: &'static str,
    pub port: u16,
    /// Path prefix without trailing slash, empty for the root
    pub prefix: &'static str,
}

impl BaseUrl {
    pub fn parse(url: &'static str) -> Result<Self, Error> {
        let url = url.trim();
        let (scheme, rest) = if let Some(rest) = url.strip_prefix("https://") {
            (Scheme::Https, rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (Scheme::Http, rest)
        } else {
            return Err(Error::InvalidScheme);
        };

        if rest.contains(['?', '#', '@']) {
            return Err(Error::UnsupportedUrl);
        }

        let (authority, prefix) = match rest.find('/') {
            Some(pos) => (&rest[..pos], rest[pos..].trim_end_matches('/')),
            None => (rest, ""),
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| Error::InvalidPort)?),
            None => (authority, scheme.default_port()),
        };

        if host.is_empty() {
            return Err(Error::MissingHost);
        }
        if port == 0 {
            return Err(Error::InvalidPort);
        }

        Ok(Self {
            scheme,
            host,
            port,
            prefix,
        })
    }
}

/// How an endpoint authenticates uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    /// `Authorization: Token <token>`
    Token(&'static str),
    /// `Authorization: Basic base64(user:key)`
    Basic {
        user: &'static str,
        key: &'static str,
    },
    /// `Authorization: Bearer user:key`
    Bearer {
        user: &'static str,
        key: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub kind: EndpointKind,
    pub url: BaseUrl,
    pub credentials: Credentials,
    pub org: Option<&'static str>,
    pub bucket: Option<&'static str>,
}

impl Endpoint {
    /// Request target for the write call of this backend.
    pub fn write_target(&self, out: &mut String<REQUEST_PATH_SIZE>) -> Result<(), Error> {
        out.clear();
        out.push_str(self.url.prefix)
            .map_err(|_| Error::BufferOverflow)?;

        match self.kind {
            EndpointKind::TimeSeriesDb => {
                out.push_str("/api/v2/write?org=")
                    .map_err(|_| Error::BufferOverflow)?;
                percent_encode(out, self.org.unwrap_or_default())?;
                out.push_str("&bucket=")
                    .map_err(|_| Error::BufferOverflow)?;
                percent_encode(out, self.bucket.unwrap_or_default())?;
                out.push_str("&precision=s")
                    .map_err(|_| Error::BufferOverflow)?;
            }
            EndpointKind::LogAggregator => out
                .push_str("/loki/api/v1/push")
                .map_err(|_| Error::BufferOverflow)?,
            EndpointKind::MetricsService => out
                .push_str("/metrics")
                .map_err(|_| Error::BufferOverflow)?,
        }

        Ok(())
    }

    /// Value of the Authorization header.
    pub fn authorization(&self, out: &mut String<AUTH_HEADER_SIZE>) -> Result<(), Error> {
        out.clear();
        match self.credentials {
            Credentials::Token(token) => write!(out, "Token {}", token)?,
            Credentials::Bearer { user, key } => write!(out, "Bearer {}:{}", user, key)?,
            Credentials::Basic { user, key } => {
                let mut plain: String<AUTH_HEADER_SIZE> = String::new();
                write!(plain, "{}:{}", user, key)?;

                let mut encoded = [0u8; AUTH_HEADER_SIZE];
                let len = base64::engine::general_purpose::STANDARD
                    .encode_slice(plain.as_bytes(), &mut encoded)
                    .map_err(|_| Error::BufferOverflow)?;
                let encoded =
                    core::str::from_utf8(&encoded[..len]).map_err(|_| Error::BufferOverflow)?;

                write!(out, "Basic {}", encoded)?;
            }
        }
        Ok(())
    }
}

// RFC 3986 unreserved characters pass through, everything else is %XX
fn percent_encode<const N: usize>(out: &mut String<N>, value: &str) -> Result<(), Error> {
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char).map_err(|_| Error::BufferOverflow)?;
        } else {
            write!(out, "%{:02X}", byte)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn influx() -> Endpoint {
        Endpoint {
            kind: EndpointKind::TimeSeriesDb,
            url: BaseUrl::parse("https://europe-west1-1.gcp.cloud2.influxdata.com").unwrap(),
            credentials: Credentials::Token("secret"),
            org: Some("home@example.com"),
            bucket: Some("arduino"),
        }
    }

    #[test]
    fn parses_base_urls() {
        let url = BaseUrl::parse("https://graphite.example.net/graphite/").unwrap();
        assert_eq!(url.scheme, Scheme::Https);
        assert_eq!(url.host, "graphite.example.net");
        assert_eq!(url.port, 443);
        assert_eq!(url.prefix, "/graphite");

        let url = BaseUrl::parse("http://10.0.0.5:8086").unwrap();
        assert_eq!(url.scheme, Scheme::Http);
        assert_eq!(url.host, "10.0.0.5");
        assert_eq!(url.port, 8086);
        assert_eq!(url.prefix, "");
    }

    #[test]
    fn rejects_bad_urls() {
        assert_eq!(BaseUrl::parse("ftp://host"), Err(Error::InvalidScheme));
        assert_eq!(BaseUrl::parse("https://"), Err(Error::MissingHost));
        assert_eq!(BaseUrl::parse("http://host:abc"), Err(Error::InvalidPort));
        assert_eq!(BaseUrl::parse("http://host:0"), Err(Error::InvalidPort));
        assert_eq!(
            BaseUrl::parse("https://user@host/path"),
            Err(Error::UnsupportedUrl)
        );
    }

    #[test]
    fn influx_target_encodes_query_values() {
        let mut target = String::new();
        influx().write_target(&mut target).unwrap();
        assert_eq!(
            target.as_str(),
            "/api/v2/write?org=home%40example.com&bucket=arduino&precision=s"
        );
    }

    #[test]
    fn targets_keep_the_url_prefix() {
        let endpoint = Endpoint {
            kind: EndpointKind::MetricsService,
            url: BaseUrl::parse("https://graphite.example.net/graphite").unwrap(),
            credentials: Credentials::Bearer {
                user: "42",
                key: "k",
            },
            org: None,
            bucket: None,
        };
        let mut target = String::new();
        endpoint.write_target(&mut target).unwrap();
        assert_eq!(target.as_str(), "/graphite/metrics");
    }

    #[test]
    fn authorization_headers() {
        let mut header = String::new();

        influx().authorization(&mut header).unwrap();
        assert_eq!(header.as_str(), "Token secret");

        let loki = Endpoint {
            kind: EndpointKind::LogAggregator,
            url: BaseUrl::parse("https://logs.example.net").unwrap(),
            credentials: Credentials::Basic {
                user: "user",
                key: "pass",
            },
            org: None,
            bucket: None,
        };
        loki.authorization(&mut header).unwrap();
        assert_eq!(header.as_str(), "Basic dXNlcjpwYXNz");

        let graphite = Endpoint {
            credentials: Credentials::Bearer {
                user: "42",
                key: "abc",
            },
            kind: EndpointKind::MetricsService,
            ..loki
        };
        graphite.authorization(&mut header).unwrap();
        assert_eq!(header.as_str(), "Bearer 42:abc");
    }
}

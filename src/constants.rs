/// Current firmware version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Size of the heap in DRAM (internal memory)
pub const HEAP_SIZE: usize = 96 * 1024;

/// Size of the TCP socket receive buffer for encrypted data
pub const RX_BUFFER_SIZE: usize = 4096;
/// Size of the TCP socket transmit buffer for encrypted data
pub const TX_BUFFER_SIZE: usize = 4096;

/// TLS record buffers (a full TLS 1.3 record needs 16 KiB plus overhead)
pub const TLS_READ_BUFFER_SIZE: usize = 16640;
pub const TLS_WRITE_BUFFER_SIZE: usize = 4096;

/// Maximum number of sensor drivers attached to the sampler
pub const MAX_SENSORS: usize = 4;
/// Maximum number of values a single driver reports per read
pub const MAX_VALUES_PER_SENSOR: usize = 4;
/// Maximum number of readings in one snapshot
pub const MAX_READINGS: usize = MAX_SENSORS * MAX_VALUES_PER_SENSOR;
/// Device ids double as DHCP hostnames
pub const MAX_DEVICE_ID_LEN: usize = 32;
/// One endpoint per backend
pub const MAX_ENDPOINTS: usize = 3;

/// Buffer for a formatted payload
pub const PAYLOAD_BUFFER_SIZE: usize = 2048;
/// Buffer for the request target (path and query string)
pub const REQUEST_PATH_SIZE: usize = 256;
/// Buffer for the Authorization header value
pub const AUTH_HEADER_SIZE: usize = 512;
/// Buffer for the HTTP response head, only the status line is needed
pub const HTTP_RESPONSE_BUFFER_SIZE: usize = 512;

/// User agent sent with every upload
pub const USER_AGENT: &str = concat!("esp32-env-telemetry/", env!("CARGO_PKG_VERSION"));

/// Application label attached to log streams
pub const LOG_APP_LABEL: &str = "env-telemetry";

/// Measurement name for the time-series database
pub const INFLUX_MEASUREMENT: &str = "environment";

/// UDP port for SNTP
pub const NTP_PORT: u16 = 123;
/// Interval in seconds between wall clock re-syncs (3600 = 1 hour)
pub const TIME_SYNC_INTERVAL: u64 = 3600;
/// Attempts made for the initial wall clock sync at boot
pub const TIME_SYNC_BOOT_ATTEMPTS: u8 = 3;

/// Wi-Fi association timeout
pub const WIFI_CONNECT_TIMEOUT_SECS: u64 = 20;
/// Delay before re-associating after a disconnect or failure
pub const WIFI_RECONNECT_DELAY_MS: u64 = 5000;

/// Buffer size for UART read operations (for SDS011 sensor)
pub const UART_READ_BUFFER_SIZE: usize = 64;
/// AT command character for UART configuration
pub const UART_AT_CMD: u8 = 0xAB;

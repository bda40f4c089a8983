use std::{env, error::Error, fs, path::Path};

use serde::Deserialize;

#[derive(Deserialize)]
struct RawConfig {
    device_id: String,
    location: Option<String>,
    wifi_ssid: String,
    wifi_psk: String,
    measurement_interval_seconds: u32,
    #[serde(default = "default_dht_pin")]
    dht_pin: u8,
    #[serde(default = "default_i2c_sda_pin")]
    i2c_sda_pin: u8,
    #[serde(default = "default_i2c_scl_pin")]
    i2c_scl_pin: u8,
    #[serde(default = "default_uart_tx_pin")]
    uart_tx_pin: u8,
    #[serde(default = "default_uart_rx_pin")]
    uart_rx_pin: u8,
    #[serde(default = "default_sensor_timeout_ms")]
    sensor_timeout_ms: u64,
    #[serde(default = "default_upload_attempt_timeout_ms")]
    upload_attempt_timeout_ms: u64,
    #[serde(default = "default_upload_max_attempts")]
    upload_max_attempts: u8,
    #[serde(default = "default_upload_backoff_initial_ms")]
    upload_backoff_initial_ms: u64,
    #[serde(default = "default_upload_backoff_max_ms")]
    upload_backoff_max_ms: u64,
    #[serde(default = "default_ntp_server")]
    ntp_server: String,
    influxdb: Option<RawInflux>,
    loki: Option<RawCredentials>,
    graphite: Option<RawCredentials>,
}

#[derive(Deserialize)]
struct RawInflux {
    url: String,
    org: String,
    bucket: String,
    token: String,
}

#[derive(Deserialize)]
struct RawCredentials {
    url: String,
    user: String,
    api_key: String,
}

fn default_dht_pin() -> u8 {
    2
}
fn default_i2c_sda_pin() -> u8 {
    21
}
fn default_i2c_scl_pin() -> u8 {
    22
}
fn default_uart_tx_pin() -> u8 {
    17
}
fn default_uart_rx_pin() -> u8 {
    16
}
fn default_sensor_timeout_ms() -> u64 {
    5_000
}
fn default_upload_attempt_timeout_ms() -> u64 {
    10_000
}
fn default_upload_max_attempts() -> u8 {
    4
}
fn default_upload_backoff_initial_ms() -> u64 {
    1_000
}
fn default_upload_backoff_max_ms() -> u64 {
    30_000
}
fn default_ntp_server() -> String {
    "pool.ntp.org".into()
}

fn influx_code(raw: &Option<RawInflux>) -> String {
    match raw {
        Some(i) => format!(
            "Some(InfluxSettings {{ url: {:?}, org: {:?}, bucket: {:?}, token: {:?} }})",
            i.url, i.org, i.bucket, i.token
        ),
        None => "None".into(),
    }
}

fn credentials_code(name: &str, raw: &Option<RawCredentials>) -> String {
    match raw {
        Some(c) => format!(
            "Some({name} {{ url: {:?}, user: {:?}, api_key: {:?} }})",
            c.url, c.user, c.api_key
        ),
        None => "None".into(),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Tell Cargo to rerun if toml changes
    println!("cargo:rerun-if-changed=cfg.toml");
    println!("cargo:rerun-if-changed=cfg.toml.example");

    // Fall back to the example so the library builds on a fresh checkout
    let source = if Path::new("cfg.toml").exists() {
        "cfg.toml"
    } else {
        println!("cargo:warning=cfg.toml not found, using cfg.toml.example");
        "cfg.toml.example"
    };

    // Read and parse
    let toml_str = fs::read_to_string(source)?;
    let raw: RawConfig = toml::from_str(&toml_str)?;

    // Generate Rust code
    let out_dir = env::var("OUT_DIR")?;
    let dest_path = Path::new(&out_dir).join("config.rs");
    let code = format!(
        r#"
        pub const BUILD_CONFIG: BuildConfig = BuildConfig {{
            device_id: {device:?},
            location: {loc:?},
            wifi_ssid: {ssid:?},
            wifi_psk: {psk:?},
            measurement_interval_seconds: {intv},
            sensor_timeout_ms: {sto},
            upload_attempt_timeout_ms: {uto},
            upload_max_attempts: {uma},
            upload_backoff_initial_ms: {ubi},
            upload_backoff_max_ms: {ubm},
            ntp_server: {ntp:?},
            influxdb: {influx},
            loki: {loki},
            graphite: {graphite},
        }};
    "#,
        device = raw.device_id,
        loc = raw.location,
        ssid = raw.wifi_ssid,
        psk = raw.wifi_psk,
        intv = raw.measurement_interval_seconds,
        sto = raw.sensor_timeout_ms,
        uto = raw.upload_attempt_timeout_ms,
        uma = raw.upload_max_attempts,
        ubi = raw.upload_backoff_initial_ms,
        ubm = raw.upload_backoff_max_ms,
        ntp = raw.ntp_server,
        influx = influx_code(&raw.influxdb),
        loki = credentials_code("LokiSettings", &raw.loki),
        graphite = credentials_code("GraphiteSettings", &raw.graphite),
    );

    fs::write(dest_path, code)?;

    // Pin selection macros for the firmware, so GPIOs are taken from the
    // peripherals by name and a bad number fails to compile
    let pins = [
        ("dht_pin", raw.dht_pin),
        ("i2c_sda_pin", raw.i2c_sda_pin),
        ("i2c_scl_pin", raw.i2c_scl_pin),
        ("uart_tx_pin", raw.uart_tx_pin),
        ("uart_rx_pin", raw.uart_rx_pin),
    ];
    let pins_code: String = pins
        .iter()
        .map(|(name, gpio)| {
            format!(
                "#[allow(unused_macros)]\nmacro_rules! {name} {{ ($p:ident) => {{ $p.GPIO{gpio} }}; }}\n"
            )
        })
        .collect();
    fs::write(Path::new(&out_dir).join("pins.rs"), pins_code)?;

    Ok(())
}

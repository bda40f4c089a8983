#![no_std]
#![no_main]

use static_cell::{ConstStaticCell, StaticCell};

use embassy_executor::Spawner;
use embassy_net::Stack;
use embassy_time::{Duration, Timer};

use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{self as hal};
use esp_println::logger::init_logger;

use hal::{
    clock::CpuClock,
    gpio::{DriveMode, Level, Output, OutputConfig, Pull},
    peripherals::Peripherals,
    rng::Rng,
    timer::timg::TimerGroup,
};
use log::{debug, error, info, warn};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;

use env_telemetry::clock::EmbassyClock;
use env_telemetry::config::{Config, BUILD_CONFIG};
use env_telemetry::constants::*;
use env_telemetry::sampler::{self, Sampler};
use env_telemetry::scheduler::Scheduler;
use env_telemetry::sensors::dht22::Dht22;
use env_telemetry::uploader::Uploader;

mod board;
mod time_sync;
mod transport;
mod wifi;

use board::BoardSensor;
use transport::{Buffers, NetClient};
use wifi::Wifi;

esp_bootloader_esp_idf::esp_app_desc!();

// dht_pin!, i2c_sda_pin!, ... pick the GPIOs named in cfg.toml
include!(concat!(env!("OUT_DIR"), "/pins.rs"));

/// Delay before rebooting after a failed startup
const RESTART_DELAY_SECS: u64 = 30;

type TelemetryScheduler = Scheduler<'static, EmbassyClock, BoardSensor, NetClient>;

static CONFIG: StaticCell<Config> = StaticCell::new();
static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static BUFFERS: ConstStaticCell<Buffers> = ConstStaticCell::new(Buffers::new());

#[cfg(any(feature = "bme280", feature = "scd30"))]
static I2C_BUS: StaticCell<
    embassy_sync::mutex::Mutex<
        embassy_sync::blocking_mutex::raw::NoopRawMutex,
        hal::i2c::master::I2c<'static, hal::Async>,
    >,
> = StaticCell::new();

#[derive(Debug)]
enum Error {
    RadioInitFailed,
    #[allow(dead_code)]
    Wifi(wifi::Error),
    #[allow(dead_code)]
    Sampler(sampler::Error),
    #[allow(dead_code)]
    BusConfig(hal::i2c::master::ConfigError),
    #[allow(dead_code)]
    UartConfig(hal::uart::ConfigError),
}

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    init_logger(log::LevelFilter::Info);
    info!("esp32-env-telemetry v{}", VERSION);

    let peripherals = esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::max()));

    esp_alloc::heap_allocator!(size: HEAP_SIZE);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // possibly high transient required at init
    // https://github.com/esp-rs/esp-hal/issues/1626
    Timer::after(Duration::from_millis(1000)).await;

    let config = match Config::from_build(&BUILD_CONFIG) {
        Ok(config) => CONFIG.init(config),
        Err(e) => {
            // Nothing to retry, cfg.toml has to be fixed and the firmware rebuilt
            error!("Invalid configuration: {:?}", e);
            loop {
                Timer::after(Duration::from_secs(3600)).await;
            }
        }
    };

    match setup(spawner, peripherals, config).await {
        Ok((scheduler, stack)) => run(scheduler, stack, config).await,
        Err(e) => {
            error!(
                "Startup failed: {:?}, restarting in {}s",
                e, RESTART_DELAY_SECS
            );
            Timer::after(Duration::from_secs(RESTART_DELAY_SECS)).await;
            hal::system::software_reset()
        }
    }
}

async fn setup(
    spawner: Spawner,
    peripherals: Peripherals,
    config: &'static Config,
) -> Result<(TelemetryScheduler, Stack<'static>), Error> {
    let mut sampler = Sampler::new(config.sensor_timeout);

    let mut dht_line = Output::new(
        dht_pin!(peripherals),
        Level::High,
        OutputConfig::default()
            .with_drive_mode(DriveMode::OpenDrain)
            .with_pull(Pull::Up),
    )
    .into_flex();
    dht_line.set_input_enable(true);
    sampler
        .attach(BoardSensor::Dht22(Dht22::new(dht_line)))
        .map_err(Error::Sampler)?;

    #[cfg(any(feature = "bme280", feature = "scd30"))]
    {
        use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
        use hal::{
            i2c::master::{BusTimeout, I2c},
            time::Rate,
        };

        let i2c_config = hal::i2c::master::Config::default()
            .with_frequency(Rate::from_khz(100))
            .with_timeout(BusTimeout::BusCycles(24));

        let i2c = I2c::new(peripherals.I2C0, i2c_config)
            .map_err(Error::BusConfig)?
            .with_sda(i2c_sda_pin!(peripherals))
            .with_scl(i2c_scl_pin!(peripherals))
            .into_async();

        let i2c_bus = I2C_BUS.init(embassy_sync::mutex::Mutex::new(i2c));

        #[cfg(feature = "bme280")]
        {
            use env_telemetry::sensors::bme280::Bme280;

            match Bme280::new(I2cDevice::new(i2c_bus)).await {
                Ok(sensor) => sampler
                    .attach(BoardSensor::Bme280(sensor))
                    .map_err(Error::Sampler)?,
                Err(e) => warn!("BME280 unavailable: {:?}", e),
            }
        }

        #[cfg(feature = "scd30")]
        {
            use env_telemetry::sensors::scd30::Scd30;

            // The SCD30 accepts 2 to 1800 seconds
            let interval_secs = config.interval.as_secs().clamp(2, 1800) as u16;
            match Scd30::new(I2cDevice::new(i2c_bus), interval_secs, config.sensor_timeout).await {
                Ok(sensor) => sampler
                    .attach(BoardSensor::Scd30(sensor))
                    .map_err(Error::Sampler)?,
                Err(e) => warn!("SCD30 unavailable: {:?}", e),
            }
        }
    }

    #[cfg(feature = "sds011")]
    {
        use env_telemetry::sensors::sds011::Sds011;
        use hal::uart::{RxConfig, Uart};

        let uart_config = hal::uart::Config::default()
            .with_rx(RxConfig::default().with_fifo_full_threshold(UART_READ_BUFFER_SIZE as u16))
            .with_baudrate(9600)
            .with_stop_bits(hal::uart::StopBits::_1)
            .with_data_bits(hal::uart::DataBits::_8)
            .with_parity(hal::uart::Parity::None);

        let mut uart = Uart::new(peripherals.UART2, uart_config)
            .map_err(Error::UartConfig)?
            .with_tx(uart_tx_pin!(peripherals))
            .with_rx(uart_rx_pin!(peripherals))
            .into_async();

        uart.set_at_cmd(hal::uart::AtCmdConfig::default().with_cmd_char(UART_AT_CMD));

        match Sds011::new(uart).await {
            Ok(sensor) => sampler
                .attach(BoardSensor::Sds011(sensor))
                .map_err(Error::Sampler)?,
            Err(e) => warn!("SDS011 unavailable: {:?}", e),
        }
    }

    info!("{} sensor(s) attached", sampler.sensors().len());

    let mut rng = Rng::new();
    let mut seed = [0u8; 32];
    for chunk in seed.chunks_mut(4) {
        chunk.copy_from_slice(&rng.random().to_le_bytes());
    }

    let radio = RADIO.init(esp_radio::init().map_err(|_| Error::RadioInitFailed)?);
    let stack_seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let wifi = Wifi::new(
        radio,
        peripherals.WIFI,
        config.device_id,
        stack_seed,
        spawner,
    )
    .map_err(Error::Wifi)?;
    wifi.wait_online().await;

    let client = NetClient::new(wifi.stack, ChaCha8Rng::from_seed(seed), BUFFERS.take());

    let scheduler = Scheduler::new(
        config,
        EmbassyClock,
        sampler,
        Uploader::new(client, config.retry),
    );

    Ok((scheduler, wifi.stack))
}

async fn sync_wall_clock(scheduler: &mut TelemetryScheduler, stack: Stack<'static>) -> bool {
    match time_sync::sync(stack, BUILD_CONFIG.ntp_server).await {
        Ok(wall_clock) => {
            scheduler.set_wall_clock(wall_clock);
            true
        }
        Err(e) => {
            warn!("Wall clock sync failed: {:?}", e);
            false
        }
    }
}

async fn run(mut scheduler: TelemetryScheduler, stack: Stack<'static>, config: &Config) -> ! {
    let mut synced = false;
    for _ in 0..TIME_SYNC_BOOT_ATTEMPTS {
        if sync_wall_clock(&mut scheduler, stack).await {
            synced = true;
            break;
        }
        Timer::after(Duration::from_secs(1)).await;
    }
    if !synced {
        warn!("Starting without wall clock, only timestamp-free payloads go out");
    }

    let resync_every = (TIME_SYNC_INTERVAL / config.interval.as_secs().max(1)).max(1);
    let mut sync_counter = 0;

    loop {
        let report = scheduler.step().await;
        debug!("{:?}", report);

        // Resync right after a cycle so it never delays a trigger
        sync_counter += 1;
        if !synced || sync_counter >= resync_every {
            sync_counter = 0;
            synced = sync_wall_clock(&mut scheduler, stack).await || synced;
        }
    }
}

use embassy_executor::Spawner;
use embassy_net::{Runner, Stack, StackResources};
use embassy_time::{with_timeout, Duration, Timer};

use esp_radio::{
    wifi::{ClientConfig, Config, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState},
    Controller,
};

use core::str::FromStr;
use heapless::String;
use log::{error, info};
use static_cell::StaticCell;

use env_telemetry::config::BUILD_CONFIG;
use env_telemetry::constants::{
    MAX_DEVICE_ID_LEN, WIFI_CONNECT_TIMEOUT_SECS, WIFI_RECONNECT_DELAY_MS,
};

// DNS, one TCP session and the SNTP socket at once
static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

pub struct Wifi {
    pub stack: Stack<'static>,
}

#[derive(Debug)]
pub enum Error {
    WifiInitFailed,
    HostnameTooLong,
    SpawnFailed,
}

impl Wifi {
    pub fn new(
        radio: &'static Controller<'static>,
        wifi: esp_hal::peripherals::WIFI<'static>,
        hostname: &str,
        seed: u64,
        spawner: Spawner,
    ) -> Result<Self, Error> {
        let (controller, interfaces) = esp_radio::wifi::new(radio, wifi, Config::default())
            .map_err(|_| Error::WifiInitFailed)?;

        let mut dhcp_config = embassy_net::DhcpConfig::default();
        dhcp_config.hostname = Some(
            String::<MAX_DEVICE_ID_LEN>::from_str(hostname).map_err(|_| Error::HostnameTooLong)?,
        );

        let config = embassy_net::Config::dhcpv4(dhcp_config);

        let resources = RESOURCES.init(StackResources::new());
        let (stack, runner) = embassy_net::new(interfaces.sta, config, resources, seed);

        spawner
            .spawn(connection(controller))
            .map_err(|_| Error::SpawnFailed)?;
        spawner
            .spawn(net_task(runner))
            .map_err(|_| Error::SpawnFailed)?;

        Ok(Self { stack })
    }

    /// Wait for the link and a DHCP lease.
    pub async fn wait_online(&self) {
        info!("Waiting for network stack to be ready...");
        self.stack.wait_link_up().await;
        self.stack.wait_config_up().await;

        if let Some(config) = self.stack.config_v4() {
            info!("Got IP: {}", config.address);
        }
    }
}

#[embassy_executor::task]
async fn connection(mut controller: WifiController<'static>) {
    info!(
        "Start connection task, device capabilities: {:?}",
        controller.capabilities()
    );
    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            // wait until we're no longer connected
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
        }

        if !matches!(controller.is_started(), Ok(true)) {
            info!("Connecting to wifi with SSID: {:?}", BUILD_CONFIG.wifi_ssid);
            let client_config = ClientConfig::default()
                .with_ssid(BUILD_CONFIG.wifi_ssid.into())
                .with_password(BUILD_CONFIG.wifi_psk.into());
            if let Err(e) = controller.set_config(&ModeConfig::Client(client_config)) {
                error!("Failed to set WiFi config: {:?}. Retrying...", e);
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
                continue;
            }
            if let Err(e) = controller.start_async().await {
                error!("Failed to start WiFi: {:?}. Retrying...", e);
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
                continue;
            }
            info!("Wifi started!");
        }

        match with_timeout(
            Duration::from_secs(WIFI_CONNECT_TIMEOUT_SECS),
            controller.connect_async(),
        )
        .await
        {
            Ok(Ok(_)) => info!("Wifi connected!"),
            Ok(Err(e)) => {
                info!("Failed to connect to wifi: {e:?}");
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
            }
            Err(_) => {
                info!("Wifi connection timed out");
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
            }
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

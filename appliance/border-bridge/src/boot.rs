//! Wiring and ordered startup. `boot.py`'s `Boot` class is the
//! reference for the sequence: load config, build the tables, bring up
//! serial, learn our Wi-Fi identity, wait for a global address, then start
//! capture, timers, and the shell.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{event, Level};

use crate::cli::Cli;
use crate::config::BridgeConfig;
use crate::events::EventBus;
use crate::ip_config::IpConfigurator;
use crate::mode_store::{BridgeMode, ModeStore};
use crate::nd_bridge::NdBridge;
use crate::netlink::NetlinkClient;
use crate::node_table::NodeTable;
use crate::packet_buffer::PacketBuffer;
use crate::serial::{self, SerialIo};
use crate::timers;
use crate::wifi::WifiIo;

pub async fn run(config_path: &Path) -> Result<()> {
    let config = BridgeConfig::load(config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let bus = Arc::new(EventBus::new());
    let node_table = Arc::new(NodeTable::new(bus.clone()));
    let packet_buffer = PacketBuffer::new(bus.clone());
    let mode_store = Arc::new(ModeStore::new(bus.clone(), config.clone()));

    let serial_port = serial::open_serial_port(Path::new(&config.serial_device))
        .with_context(|| format!("opening serial device {}", config.serial_device))?;
    let serial = SerialIo::start(serial_port, bus.clone(), node_table.clone(), mode_store.clone())
        .context("starting serial reader")?;
    serial.install(&bus).await;
    packet_buffer.install(&bus).await;

    // Wi-Fi capture needs our own MAC up front to build outgoing frames, so
    // a throwaway netlink lookup resolves it before the capture socket opens.
    let our_mac = {
        let mut netlink = NetlinkClient::connect().context("connecting to rtnetlink")?;
        netlink
            .find_interface(&config.wifi_device)
            .await
            .with_context(|| format!("looking up interface {}", config.wifi_device))?
            .with_context(|| format!("no such network interface: {}", config.wifi_device))?
            .mac
    };

    let wifi = WifiIo::start(
        &config.wifi_device,
        our_mac,
        bus.clone(),
        node_table.clone(),
        mode_store.clone(),
    )
    .with_context(|| format!("opening wifi capture on {}", config.wifi_device))?;
    wifi.install(&bus).await;

    let ip_configurator = IpConfigurator::new(mode_store.clone(), wifi.clone(), &config.wifi_device)
        .await
        .context("resolving wifi interface over netlink")?;
    ip_configurator.install(&bus).await;

    let nd_bridge = NdBridge::new(node_table.clone(), mode_store.clone(), wifi.clone(), serial.clone());
    nd_bridge.install(&bus).await;

    event!(Level::INFO, "BOOT: requesting configuration and pushing metrics");
    serial.request_config().await;
    serial.send_config().await;

    event!(Level::INFO, "BOOT: waiting for a wifi global address");
    mode_store.wait_for_wifi_global_address().await;
    event!(
        Level::INFO,
        "BOOT: wifi global address is {:?}",
        mode_store.wifi_global_address().await
    );

    timers::spawn_neighbour_request_timer(serial.clone());
    timers::spawn_purge_timer(node_table.clone(), packet_buffer.clone());

    if mode_store.mode().await == BridgeMode::Node {
        event!(Level::INFO, "BOOT: seeding a pending solicitation for the border router");
        nd_bridge.seed_pending(config.border_router_ipv6).await;
    }

    let cli = Cli::new(node_table, packet_buffer, mode_store, nd_bridge, serial);
    cli.run().await;
    event!(Level::INFO, "BOOT: shell exited, shutting down");
    Ok(())
}

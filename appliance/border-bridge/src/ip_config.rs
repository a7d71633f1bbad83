//! `IpConfigurator` — assigns the Wi-Fi interface its IPv6 address.
//!
//! In NODE mode the bridge is a SLAAC client: it listens for a Router
//! Advertisement's prefix and derives an EUI-64 address from its own MAC
//! via `ip::slaac_autoconfig_mac48`. In ROUTER mode it's the opposite — a static address from the configured
//! border-router IPv6/subnet, brought up over netlink, with the mote prefix
//! advertised back out periodically.

use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{event, Level};

use crate::events::{Event, EventBus, EventKind, Producer};
use crate::ip::slaac_autoconfig_mac48;
use crate::mode_store::{BridgeMode, ModeStore};
use crate::netlink::NetlinkClient;
use crate::wifi::WifiIo;

/// RFC 4861 allows 4–1800s; the original doesn't pin one down, so we pick a
/// steady middle value for the periodic re-advertisement in ROUTER mode.
const ROUTER_ADVERTISEMENT_INTERVAL: Duration = Duration::from_secs(15);
const ROUTER_ADVERTISEMENT_LIFETIME: u16 = 1800;

const LINK_LOCAL_PREFIX: Ipv6Addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0);
const LINK_LOCAL_PREFIX_LEN: u8 = 64;

pub struct IpConfigurator {
    mode_store: Arc<ModeStore>,
    wifi: Arc<WifiIo>,
    netlink: Mutex<NetlinkClient>,
    ifname: String,
    ifindex: u32,
}

impl IpConfigurator {
    /// Connects to netlink and resolves `ifname`'s index/MAC. The MAC is
    /// written into `ModeStore` immediately — Boot needs it before `WifiIo`
    /// can build any outgoing frame. Also brings the interface up with its
    /// EUI-64 link-local address, independent of mode or any router
    /// advertisement — SLAAC assigns link-local regardless of whether a
    /// global prefix has been learned yet.
    pub async fn new(
        mode_store: Arc<ModeStore>,
        wifi: Arc<WifiIo>,
        ifname: &str,
    ) -> Result<Arc<IpConfigurator>> {
        let mut netlink = NetlinkClient::connect().context("connecting to rtnetlink")?;
        let info = netlink
            .find_interface(ifname)
            .await
            .with_context(|| format!("looking up interface {}", ifname))?
            .with_context(|| format!("no such network interface: {}", ifname))?;
        mode_store.set_wifi_l2(info.mac).await;

        let link_local = slaac_autoconfig_mac48(&info.mac, &LINK_LOCAL_PREFIX);
        netlink
            .bring_up(info.index)
            .await
            .with_context(|| format!("bringing up {}", ifname))?;
        netlink
            .add_address(info.index, IpAddr::V6(link_local), LINK_LOCAL_PREFIX_LEN)
            .await
            .with_context(|| format!("assigning link-local {} to {}", link_local, ifname))?;
        mode_store.set_wifi_link_local_address(link_local).await;
        event!(Level::INFO, "IPCONF: assigned link-local {} to {}", link_local, ifname);

        Ok(Arc::new(IpConfigurator {
            mode_store,
            wifi,
            netlink: Mutex::new(netlink),
            ifname: ifname.to_owned(),
            ifindex: info.index,
        }))
    }

    pub async fn install(self: &Arc<Self>, bus: &EventBus) {
        let this = self.clone();
        bus.subscribe(Producer::WifiParser, EventKind::RouterAdvertisement, move |e| {
            let this = this.clone();
            async move {
                if let Event::RouterAdvertisement { prefix, prefix_len } = e {
                    this.handle_router_advertisement(prefix, prefix_len).await;
                }
            }
        })
        .await;

        let this = self.clone();
        bus.subscribe(Producer::ModeStore, EventKind::ChangeMode, move |e| {
            let this = this.clone();
            async move {
                if let Event::ChangeMode(mode) = e {
                    this.handle_change_mode(mode).await;
                }
            }
        })
        .await;
    }

    /// NODE-mode SLAAC: derive our address from the advertised prefix plus
    /// our own MAC, install it over netlink, and unblock Boot once it's set.
    async fn handle_router_advertisement(&self, prefix: Ipv6Addr, prefix_len: u8) {
        if self.mode_store.mode().await != BridgeMode::Node {
            return;
        }
        if self.mode_store.wifi_global_address().await.is_some() {
            return;
        }
        let mac = self.mode_store.wifi_l2().await;
        let address = slaac_autoconfig_mac48(&mac, &prefix);
        event!(Level::INFO, "IPCONF: deriving {} from prefix {}/{} and our MAC", address, prefix, prefix_len);
        if let Err(err) = self.bring_up_and_assign(address, prefix_len).await {
            event!(Level::WARN, "IPCONF: failed to assign {}: {}", address, err);
            return;
        }
        self.mode_store.set_wifi_global_address(address).await;
    }

    /// ROUTER-mode static addressing: bring the interface up with the
    /// configured border-router address, then start advertising the mote
    /// prefix. NODE mode listens for RAs instead, so this only fires when
    /// the mode transitions to ROUTER.
    async fn handle_change_mode(self: &Arc<Self>, mode: BridgeMode) {
        if mode != BridgeMode::Router {
            return;
        }
        let config = self.mode_store.config().clone();
        event!(
            Level::INFO,
            "IPCONF: switching to router mode, assigning {}/{}",
            config.border_router_ipv6,
            config.wifi_subnet.prefix_len,
        );
        if let Err(err) = self
            .bring_up_and_assign(config.border_router_ipv6, config.wifi_subnet.prefix_len)
            .await
        {
            event!(Level::WARN, "IPCONF: failed to assign border router address: {}", err);
            return;
        }
        self.mode_store.set_wifi_global_address(config.border_router_ipv6).await;
        self.clone().spawn_router_advertiser(config.wifi_subnet.network, config.wifi_subnet.prefix_len);
    }

    async fn bring_up_and_assign(&self, address: Ipv6Addr, prefix_len: u8) -> Result<()> {
        let mut netlink = self.netlink.lock().await;
        netlink
            .bring_up(self.ifindex)
            .await
            .with_context(|| format!("bringing up {}", self.ifname))?;
        netlink
            .add_address(self.ifindex, IpAddr::V6(address), prefix_len)
            .await
            .with_context(|| format!("assigning {}/{} to {}", address, prefix_len, self.ifname))?;
        Ok(())
    }

    fn spawn_router_advertiser(self: Arc<Self>, prefix: Ipv6Addr, prefix_len: u8) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ROUTER_ADVERTISEMENT_INTERVAL);
            loop {
                ticker.tick().await;
                self.wifi
                    .send_router_advertisement(prefix, prefix_len, ROUTER_ADVERTISEMENT_LIFETIME)
                    .await;
            }
        });
    }
}

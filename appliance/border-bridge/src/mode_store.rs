//! Global bridge configuration and addressing state — the Rust analogue of
//! the original `Data` class. Every mutation that changes `mode` publishes
//! `ChangeMode` (see DESIGN.md: the original source set the mode without
//! emitting an event; we emit it so downstream subscribers see every
//! transition, including the first one).

use std::net::Ipv6Addr;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::config::BridgeConfig;
use crate::events::{Event, EventBus, Producer};
use crate::node_table::Tech;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BridgeMode {
    Node,
    Router,
}

#[derive(Clone, Debug, Default)]
struct Addresses {
    wifi_l2: [u8; 6],
    wifi_link_local: Option<Ipv6Addr>,
    wifi_global: Option<Ipv6Addr>,
    mote_global: Option<Ipv6Addr>,
    mote_link_local: Option<Ipv6Addr>,
}

pub struct ModeStore {
    bus: Arc<EventBus>,
    config: BridgeConfig,
    mode: Mutex<BridgeMode>,
    addresses: Mutex<Addresses>,
    /// Fired once `wifi_global` is first populated; Boot waits on this
    /// instead of the original's `time.sleep(1)` polling loop.
    wifi_global_ready: Notify,
}

impl ModeStore {
    pub fn new(bus: Arc<EventBus>, config: BridgeConfig) -> ModeStore {
        ModeStore {
            bus,
            config,
            mode: Mutex::new(BridgeMode::Node),
            addresses: Mutex::new(Addresses::default()),
            wifi_global_ready: Notify::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub async fn mode(&self) -> BridgeMode {
        *self.mode.lock().await
    }

    pub async fn set_mode(&self, mode: BridgeMode) {
        {
            let mut current = self.mode.lock().await;
            if *current == mode {
                return;
            }
            *current = mode;
        }
        self.bus
            .publish(Producer::ModeStore, Event::ChangeMode(mode))
            .await;
    }

    pub async fn set_wifi_l2(&self, mac: [u8; 6]) {
        self.addresses.lock().await.wifi_l2 = mac;
    }

    pub async fn wifi_l2(&self) -> [u8; 6] {
        self.addresses.lock().await.wifi_l2
    }

    /// The EUI-64 link-local address derived from our own MAC, set once at
    /// boot by `IpConfigurator` independent of mode or any router
    /// advertisement — `owns_address` needs it so the ND bridge can answer
    /// a solicitation for our link-local identity, not only our global one.
    pub async fn set_wifi_link_local_address(&self, addr: Ipv6Addr) {
        self.addresses.lock().await.wifi_link_local = Some(addr);
    }

    pub async fn wifi_link_local_address(&self) -> Option<Ipv6Addr> {
        self.addresses.lock().await.wifi_link_local
    }

    pub async fn set_wifi_global_address(&self, addr: Ipv6Addr) {
        let mut addresses = self.addresses.lock().await;
        let was_set = addresses.wifi_global.is_some();
        addresses.wifi_global = Some(addr);
        if !was_set {
            self.wifi_global_ready.notify_waiters();
        }
    }

    pub async fn wifi_global_address(&self) -> Option<Ipv6Addr> {
        self.addresses.lock().await.wifi_global
    }

    /// Resolves once a Wi-Fi global address has been established. If one
    /// is already set, returns immediately.
    pub async fn wait_for_wifi_global_address(&self) {
        if self.wifi_global_address().await.is_some() {
            return;
        }
        self.wifi_global_ready.notified().await;
    }

    pub async fn set_mote_address(&self, addr: Ipv6Addr) {
        let mut addresses = self.addresses.lock().await;
        if addr.is_unicast_link_local() {
            addresses.mote_link_local = Some(addr);
        } else {
            addresses.mote_global = Some(addr);
        }
    }

    pub async fn mote_global_address(&self) -> Option<Ipv6Addr> {
        self.addresses.lock().await.mote_global
    }

    pub async fn mote_link_local_address(&self) -> Option<Ipv6Addr> {
        self.addresses.lock().await.mote_link_local
    }

    /// True if `addr` is one of this bridge's own Wi-Fi-side addresses
    /// (global or link-local); used by the ND bridge to decide whether to
    /// answer a solicitation for itself.
    pub async fn owns_address(&self, addr: &Ipv6Addr) -> bool {
        let addresses = self.addresses.lock().await;
        addresses.wifi_global.as_ref() == Some(addr) || addresses.wifi_link_local.as_ref() == Some(addr)
    }

    pub async fn print_data(&self) -> String {
        let addresses = self.addresses.lock().await;
        format!(
            "mode={:?}\nwifi_l2={:02x?}\nwifi_link_local={:?}\nwifi_global={:?}\nmote_global={:?}\nmote_link_local={:?}\nborder_router={}\n",
            self.mode().await,
            addresses.wifi_l2,
            addresses.wifi_link_local,
            addresses.wifi_global,
            addresses.mote_global,
            addresses.mote_link_local,
            self.config.border_router_ipv6,
        )
    }
}

/// Tech type attributed to a neighbour address learned from the
/// co-processor's `!n` line — motes are always `Tech::Rpl`.
pub const MOTE_TECH: Tech = Tech::Rpl;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeConfig, Ipv6Subnet, MetricWeights};
    use crate::events::EventBus;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            serial_device: "/dev/null".into(),
            wifi_device: "wlan0".into(),
            wifi_subnet: "2001:db8::/64".parse().unwrap(),
            border_router_ipv6: "2001:db8::1".parse().unwrap(),
            metrics: MetricWeights { en: 1, bw: 2, etx: 3 },
        }
    }

    #[tokio::test]
    async fn owns_address_recognizes_global_and_link_local() {
        let store = ModeStore::new(Arc::new(EventBus::new()), test_config());
        let global: Ipv6Addr = "2001:db8::5054:ff:fe12:3456".parse().unwrap();
        let link_local: Ipv6Addr = "fe80::5054:ff:fe12:3456".parse().unwrap();
        let other: Ipv6Addr = "2001:db8::9999".parse().unwrap();

        assert!(!store.owns_address(&global).await);
        store.set_wifi_global_address(global).await;
        store.set_wifi_link_local_address(link_local).await;

        assert!(store.owns_address(&global).await);
        assert!(store.owns_address(&link_local).await);
        assert!(!store.owns_address(&other).await);
    }

    #[tokio::test]
    async fn set_mode_is_idempotent_and_emits_once() {
        let bus = Arc::new(EventBus::new());
        let store = ModeStore::new(bus.clone(), test_config());
        assert_eq!(store.mode().await, BridgeMode::Node);
        store.set_mode(BridgeMode::Node).await;
        assert_eq!(store.mode().await, BridgeMode::Node);
        store.set_mode(BridgeMode::Router).await;
        assert_eq!(store.mode().await, BridgeMode::Router);
    }
}

//! `NdBridge` — proxies IPv6 Neighbor Discovery across the Wi-Fi/RPL split.
//! A Wi-Fi host resolving a mote gets our MAC back; a mote asking
//! "is this host reachable over Wi-Fi" gets answered from `NodeTable`
//! instead of a real NS/NA round trip (the co-processor has no Wi-Fi NIC
//! of its own to do that with).

use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{event, Level};

use crate::events::{Event, EventBus, EventKind, Producer};
use crate::mode_store::ModeStore;
use crate::nd::{NeighbourAdvertisement, NeighbourSolicitation};
use crate::node_table::{NodeTable, Tech};
use crate::serial::SerialIo;
use crate::wifi::WifiIo;

pub const NS_TIMEOUT: Duration = Duration::from_secs(3);
pub const NS_MAX_RETRIES: u32 = 2;
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct PendingEntry {
    deadline: Instant,
    retries_remaining: u32,
}

pub struct NdBridge {
    node_table: Arc<NodeTable>,
    mode_store: Arc<ModeStore>,
    wifi: Arc<WifiIo>,
    serial: Arc<SerialIo>,
    pending: Mutex<HashMap<Ipv6Addr, PendingEntry>>,
}

impl NdBridge {
    pub fn new(
        node_table: Arc<NodeTable>,
        mode_store: Arc<ModeStore>,
        wifi: Arc<WifiIo>,
        serial: Arc<SerialIo>,
    ) -> Arc<NdBridge> {
        Arc::new(NdBridge {
            node_table,
            mode_store,
            wifi,
            serial,
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub async fn install(self: &Arc<Self>, bus: &EventBus) {
        let nd = self.clone();
        bus.subscribe(Producer::NodeTable, EventKind::NewNode, move |e| {
            let nd = nd.clone();
            async move {
                if let Event::NewNode(node) = e {
                    nd.handle_new_node(node.ip, node.tech).await;
                }
            }
        })
        .await;

        let nd = self.clone();
        bus.subscribe(Producer::WifiParser, EventKind::NeighbourSolicitation, move |e| {
            let nd = nd.clone();
            async move {
                if let Event::NeighbourSolicitation(ns) = e {
                    nd.handle_solicitation(ns).await;
                }
            }
        })
        .await;

        let nd = self.clone();
        bus.subscribe(Producer::WifiParser, EventKind::NeighbourAdvertisement, move |e| {
            let nd = nd.clone();
            async move {
                if let Event::NeighbourAdvertisement(na) = e {
                    nd.handle_advertisement(na).await;
                }
            }
        })
        .await;

        let nd = self.clone();
        bus.subscribe(Producer::SerialParser, EventKind::RequestRouteToMote, move |e| {
            let nd = nd.clone();
            async move {
                if let Event::RequestRouteToMote { qid, ip } = e {
                    nd.handle_route_request(qid, ip).await;
                }
            }
        })
        .await;

        self.clone().spawn_sweeper();
    }

    /// Seeds a pending entry for `target` without waiting on a `NewNode`
    /// event — used by Boot to resolve the border router before any mote
    /// traffic arrives.
    pub async fn seed_pending(&self, target: Ipv6Addr) {
        self.insert_pending(target).await;
    }

    async fn handle_new_node(&self, ip: Ipv6Addr, tech: Tech) {
        if tech != Tech::Wifi {
            return;
        }
        self.insert_pending(ip).await;
    }

    async fn insert_pending(&self, target: Ipv6Addr) {
        {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&target) {
                return;
            }
            pending.insert(
                target,
                PendingEntry {
                    deadline: Instant::now() + NS_TIMEOUT,
                    retries_remaining: NS_MAX_RETRIES,
                },
            );
        }
        event!(Level::DEBUG, "ND: confirming reachability of {} over wifi", target);
        self.wifi.send_solicitation(target).await;
    }

    async fn handle_solicitation(&self, ns: NeighbourSolicitation) {
        let is_known_mote = match self.node_table.lookup(&ns.target).await {
            Some(node) => node.tech == Tech::Rpl,
            None => false,
        };
        let is_mote_address = self.mode_store.mote_global_address().await == Some(ns.target)
            || self.mode_store.mote_link_local_address().await == Some(ns.target);
        let is_our_own_wifi_address = self.mode_store.owns_address(&ns.target).await;
        if !is_known_mote && !is_mote_address && !is_our_own_wifi_address {
            return;
        }
        self.wifi
            .send_advertisement(ns.source_ip, ns.source_link_layer, ns.target, true)
            .await;
    }

    async fn handle_advertisement(&self, na: NeighbourAdvertisement) {
        let matched = self.pending.lock().await.remove(&na.source_ip).is_some();
        if matched {
            event!(Level::INFO, "ND: {} confirmed reachable over wifi", na.source_ip);
        }
        self.node_table.observe(na.source_ip, Tech::Wifi).await;
    }

    async fn handle_route_request(&self, qid: u32, ip: Ipv6Addr) {
        let reachable = matches!(
            self.node_table.lookup(&ip).await,
            Some(node) if node.tech == Tech::Wifi
        );
        event!(Level::DEBUG, "ND: route request for {} (qid={}) answered {}", ip, qid, reachable);
        self.serial.send_route_response(qid, reachable).await;
    }

    pub async fn print_pending(&self) -> String {
        let pending = self.pending.lock().await;
        let mut out = String::new();
        for (target, entry) in pending.iter() {
            out.push_str(&format!(
                "{}  retries_remaining={}  expires_in={:?}\n",
                target,
                entry.retries_remaining,
                entry.deadline.saturating_duration_since(Instant::now()),
            ));
        }
        out
    }

    fn spawn_sweeper(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                self.sweep_pending().await;
            }
        });
    }

    async fn sweep_pending(&self) {
        let now = Instant::now();
        let mut retry_targets = Vec::new();
        let mut expired_targets = Vec::new();

        {
            let mut pending = self.pending.lock().await;
            pending.retain(|target, entry| {
                if entry.deadline > now {
                    return true;
                }
                if entry.retries_remaining > 0 {
                    entry.retries_remaining -= 1;
                    entry.deadline = now + NS_TIMEOUT;
                    retry_targets.push(*target);
                    true
                } else {
                    expired_targets.push(*target);
                    false
                }
            });
        }

        for target in expired_targets {
            event!(Level::DEBUG, "ND: {} did not answer NS, giving up", target);
        }
        for target in retry_targets {
            self.wifi.send_solicitation(target).await;
        }
    }
}

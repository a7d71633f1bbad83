//! Mapping from mote/host IPv6 address to which link layer it lives on.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{event, Level};

use crate::events::{Event, EventBus, Producer};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Tech {
    Wifi,
    Rpl,
}

impl fmt::Display for Tech {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Tech::Wifi => write!(f, "wifi"),
            Tech::Rpl => write!(f, "rpl"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeAddress {
    pub ip: Ipv6Addr,
    pub tech: Tech,
    pub last_seen: Instant,
}

impl PartialEq for NodeAddress {
    fn eq(&self, other: &NodeAddress) -> bool {
        self.ip == other.ip
    }
}

pub const PURGE_TTL: Duration = Duration::from_secs(30);

pub struct NodeTable {
    bus: Arc<EventBus>,
    entries: Mutex<HashMap<Ipv6Addr, NodeAddress>>,
}

impl NodeTable {
    pub fn new(bus: Arc<EventBus>) -> NodeTable {
        NodeTable {
            bus,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a freshly-seen node, or refresh `last_seen` if it's already
    /// known. `tech` never changes after the first insert — a second
    /// insert under a different tech is an invariant violation, logged and
    /// ignored per the documented error policy.
    pub async fn observe(&self, ip: Ipv6Addr, tech: Tech) {
        let now = Instant::now();
        let emit = {
            let mut entries = self.entries.lock().await;
            match entries.get_mut(&ip) {
                Some(existing) if existing.tech == tech => {
                    existing.last_seen = now;
                    Some(Event::NodeRefresh(existing.clone()))
                }
                Some(existing) => {
                    event!(
                        Level::ERROR,
                        "node table: {} already tracked as {}, ignoring conflicting {} observation",
                        ip,
                        existing.tech,
                        tech,
                    );
                    None
                }
                None => {
                    let node = NodeAddress {
                        ip,
                        tech,
                        last_seen: now,
                    };
                    entries.insert(ip, node.clone());
                    Some(Event::NewNode(node))
                }
            }
        };
        if let Some(event) = emit {
            self.bus.publish(Producer::NodeTable, event).await;
        }
    }

    pub async fn lookup(&self, ip: &Ipv6Addr) -> Option<NodeAddress> {
        self.entries.lock().await.get(ip).cloned()
    }

    /// Drop entries that haven't been refreshed within `PURGE_TTL`.
    pub async fn purge(&self, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, node| now.saturating_duration_since(node.last_seen) <= ttl);
    }

    pub async fn snapshot(&self) -> Vec<NodeAddress> {
        self.entries.lock().await.values().cloned().collect()
    }

    pub async fn print_table(&self) -> String {
        let mut out = String::new();
        for node in self.snapshot().await {
            out.push_str(&format!(
                "{}  tech={}  age={:?}\n",
                node.ip,
                node.tech,
                node.last_seen.elapsed()
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn addr(n: u16) -> Ipv6Addr {
        Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, n)
    }

    #[tokio::test]
    async fn insert_then_refresh_keeps_tech() {
        let bus = Arc::new(EventBus::new());
        let table = NodeTable::new(bus);
        table.observe(addr(1), Tech::Wifi).await;
        table.observe(addr(1), Tech::Wifi).await;
        let node = table.lookup(&addr(1)).await.unwrap();
        assert_eq!(node.tech, Tech::Wifi);
    }

    #[tokio::test]
    async fn conflicting_tech_is_ignored() {
        let bus = Arc::new(EventBus::new());
        let table = NodeTable::new(bus);
        table.observe(addr(1), Tech::Wifi).await;
        table.observe(addr(1), Tech::Rpl).await;
        let node = table.lookup(&addr(1)).await.unwrap();
        assert_eq!(node.tech, Tech::Wifi);
    }

    #[tokio::test]
    async fn purge_drops_stale_entries_only() {
        let bus = Arc::new(EventBus::new());
        let table = NodeTable::new(bus);
        table.observe(addr(1), Tech::Wifi).await;
        table.observe(addr(2), Tech::Rpl).await;

        {
            let mut entries = table.entries.lock().await;
            let stale = entries.get_mut(&addr(1)).unwrap();
            stale.last_seen = Instant::now() - Duration::from_secs(31);
        }

        table.purge(PURGE_TTL).await;
        assert!(table.lookup(&addr(1)).await.is_none());
        assert!(table.lookup(&addr(2)).await.is_some());
    }
}

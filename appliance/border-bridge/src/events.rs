//! In-process publish/subscribe bus.
//!
//! The original bridge dispatched on the Python class of the event object,
//! checked with `isinstance` at each subscriber. Here that becomes a closed
//! `Event` enum matched exhaustively by every subscriber — no runtime type
//! check, no weak references, and the compiler tells you when a new event
//! kind needs handling somewhere.

use std::fmt;
use std::future::Future;
use std::net::Ipv6Addr;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::mode_store::BridgeMode;
use crate::nd::{NeighbourAdvertisement, NeighbourSolicitation};
use crate::node_table::NodeAddress;
use crate::packet::ContikiPacket;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Clone, Debug)]
pub enum Event {
    ContikiBoot,
    SerialPacketToSend(ContikiPacket),
    MoteGlobalAddress(Ipv6Addr),
    RequestRouteToMote { qid: u32, ip: Ipv6Addr },
    ResponseToPacketRequest { qid: u32, forward: bool },
    HelloBridgeRequest,
    NewNode(NodeAddress),
    NodeRefresh(NodeAddress),
    NeighbourSolicitation(NeighbourSolicitation),
    NeighbourAdvertisement(NeighbourAdvertisement),
    RouterAdvertisement { prefix: Ipv6Addr, prefix_len: u8 },
    RootPacketForward(ContikiPacket),
    PacketSendToSerial(ContikiPacket),
    PacketForwardToSerial(ContikiPacket),
    PacketBuff { qid: u32, packet: ContikiPacket },
    ChangeMode(BridgeMode),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EventKind {
    ContikiBoot,
    SerialPacketToSend,
    MoteGlobalAddress,
    RequestRouteToMote,
    ResponseToPacketRequest,
    HelloBridgeRequest,
    NewNode,
    NodeRefresh,
    NeighbourSolicitation,
    NeighbourAdvertisement,
    RouterAdvertisement,
    RootPacketForward,
    PacketSendToSerial,
    PacketForwardToSerial,
    PacketBuff,
    ChangeMode,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ContikiBoot => EventKind::ContikiBoot,
            Event::SerialPacketToSend(_) => EventKind::SerialPacketToSend,
            Event::MoteGlobalAddress(_) => EventKind::MoteGlobalAddress,
            Event::RequestRouteToMote { .. } => EventKind::RequestRouteToMote,
            Event::ResponseToPacketRequest { .. } => EventKind::ResponseToPacketRequest,
            Event::HelloBridgeRequest => EventKind::HelloBridgeRequest,
            Event::NewNode(_) => EventKind::NewNode,
            Event::NodeRefresh(_) => EventKind::NodeRefresh,
            Event::NeighbourSolicitation(_) => EventKind::NeighbourSolicitation,
            Event::NeighbourAdvertisement(_) => EventKind::NeighbourAdvertisement,
            Event::RouterAdvertisement { .. } => EventKind::RouterAdvertisement,
            Event::RootPacketForward(_) => EventKind::RootPacketForward,
            Event::PacketSendToSerial(_) => EventKind::PacketSendToSerial,
            Event::PacketForwardToSerial(_) => EventKind::PacketForwardToSerial,
            Event::PacketBuff { .. } => EventKind::PacketBuff,
            Event::ChangeMode(_) => EventKind::ChangeMode,
        }
    }
}

/// Identifies which component a subscription applies to. A component only
/// ever calls `EventBus::publish` with its own variant, so "a producer
/// declares which kinds it produces" is enforced by module boundaries
/// rather than a runtime registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Producer {
    SerialParser,
    WifiParser,
    NodeTable,
    PacketBuffer,
    ModeStore,
}

type Handler = Arc<dyn Fn(Event) -> BoxFuture + Send + Sync>;

struct Subscription {
    producer: Producer,
    kind: EventKind,
    handler: Handler,
}

/// Synchronous, in-registration-order dispatch on the producer's task.
///
/// `publish` snapshots the matching handler list before awaiting any of
/// them, so a handler that itself publishes an event (e.g. the packet
/// buffer turning a `RootPacketForward` into a `PacketBuff`) does not
/// deadlock against the subscriber-list lock. Handlers still run strictly
/// one after another, in the order they were registered.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub async fn subscribe<F, Fut>(&self, producer: Producer, kind: EventKind, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event| Box::pin(handler(event)));
        self.subscriptions.lock().await.push(Subscription {
            producer,
            kind,
            handler,
        });
    }

    pub async fn publish(&self, producer: Producer, event: Event) {
        let kind = event.kind();
        let handlers: Vec<Handler> = {
            let subs = self.subscriptions.lock().await;
            subs.iter()
                .filter(|s| s.producer == producer && s.kind == kind)
                .map(|s| s.handler.clone())
                .collect()
        };
        for handler in handlers {
            handler(event.clone()).await;
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EventBus").finish()
    }
}

//! `PacketBuffer` — the ask-before-forward decision queue. Every
//! packet bound for the RPL subnet gets a monotonic `qid` and waits for the
//! co-processor's `$p;<qid>;<0|1>` verdict before it's allowed onto the
//! serial line; a sweeper drops verdicts that never arrive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{event, Level};

use crate::events::{Event, EventBus, EventKind, Producer};
use crate::packet::ContikiPacket;

pub const DECISION_TTL: Duration = Duration::from_secs(5);

struct DecisionEntry {
    packet: ContikiPacket,
    inserted: Instant,
}

pub struct PacketBuffer {
    bus: Arc<EventBus>,
    next_qid: AtomicU32,
    entries: Mutex<HashMap<u32, DecisionEntry>>,
}

impl PacketBuffer {
    pub fn new(bus: Arc<EventBus>) -> Arc<PacketBuffer> {
        Arc::new(PacketBuffer {
            bus,
            next_qid: AtomicU32::new(1),
            entries: Mutex::new(HashMap::new()),
        })
    }

    pub async fn install(self: &Arc<Self>, bus: &EventBus) {
        let buffer = self.clone();
        bus.subscribe(Producer::WifiParser, EventKind::RootPacketForward, move |e| {
            let buffer = buffer.clone();
            async move {
                if let Event::RootPacketForward(packet) = e {
                    buffer.buffer_for_decision(packet).await;
                }
            }
        })
        .await;

        let buffer = self.clone();
        bus.subscribe(Producer::SerialParser, EventKind::ResponseToPacketRequest, move |e| {
            let buffer = buffer.clone();
            async move {
                if let Event::ResponseToPacketRequest { qid, forward } = e {
                    buffer.resolve_decision(qid, forward).await;
                }
            }
        })
        .await;
    }

    async fn buffer_for_decision(&self, packet: ContikiPacket) {
        let qid = self.next_qid.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().await.insert(
            qid,
            DecisionEntry {
                packet: packet.clone(),
                inserted: Instant::now(),
            },
        );
        event!(Level::DEBUG, "BUFFER: queued forward decision qid={}", qid);
        self.bus
            .publish(Producer::PacketBuffer, Event::PacketBuff { qid, packet })
            .await;
    }

    async fn resolve_decision(&self, qid: u32, forward: bool) {
        let entry = self.entries.lock().await.remove(&qid);
        let packet = match entry {
            Some(entry) => entry.packet,
            None => {
                event!(Level::DEBUG, "BUFFER: late or unknown decision for qid={}, ignoring", qid);
                return;
            }
        };
        if forward {
            event!(Level::DEBUG, "BUFFER: qid={} approved, forwarding to contiki", qid);
            self.bus
                .publish(Producer::PacketBuffer, Event::PacketForwardToSerial(packet))
                .await;
        } else {
            event!(Level::DEBUG, "BUFFER: qid={} denied, dropping", qid);
        }
    }

    /// Drops decisions older than `DECISION_TTL` that never got an answer.
    /// Driven by the purge timer.
    pub async fn sweep(&self, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.inserted) <= ttl);
        let dropped = before - entries.len();
        if dropped > 0 {
            event!(Level::DEBUG, "BUFFER: swept {} stale decision(s)", dropped);
        }
    }

    pub async fn print_buffer_stats(&self) -> String {
        let entries = self.entries.lock().await;
        format!("pending decisions: {}\n", entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn packet() -> ContikiPacket {
        ContikiPacket::from_bytes(vec![0x60, 0, 0, 0, 0, 0, 0x3a, 0xff])
    }

    #[tokio::test]
    async fn root_packet_forward_assigns_monotonic_qids() {
        let bus = Arc::new(EventBus::new());
        let buffer = PacketBuffer::new(bus.clone());
        buffer.install(&bus).await;

        let seen_qids = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen_qids.clone();
        bus.subscribe(Producer::PacketBuffer, EventKind::PacketBuff, move |e| {
            let seen2 = seen2.clone();
            async move {
                if let Event::PacketBuff { qid, .. } = e {
                    seen2.lock().await.push(qid);
                }
            }
        })
        .await;

        bus.publish(Producer::WifiParser, Event::RootPacketForward(packet())).await;
        bus.publish(Producer::WifiParser, Event::RootPacketForward(packet())).await;
        assert_eq!(*seen_qids.lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn approved_decision_emits_forward_to_serial() {
        let bus = Arc::new(EventBus::new());
        let buffer = PacketBuffer::new(bus.clone());
        buffer.install(&bus).await;

        let forwarded = Arc::new(AtomicUsize::new(0));
        let forwarded2 = forwarded.clone();
        bus.subscribe(Producer::PacketBuffer, EventKind::PacketForwardToSerial, move |_| {
            let forwarded2 = forwarded2.clone();
            async move {
                forwarded2.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        bus.publish(Producer::WifiParser, Event::RootPacketForward(packet())).await;
        bus.publish(
            Producer::SerialParser,
            Event::ResponseToPacketRequest { qid: 1, forward: true },
        )
        .await;
        assert_eq!(forwarded.load(Ordering::SeqCst), 1);
        assert_eq!(buffer.entries.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn denied_decision_drops_without_forwarding() {
        let bus = Arc::new(EventBus::new());
        let buffer = PacketBuffer::new(bus.clone());
        buffer.install(&bus).await;

        let forwarded = Arc::new(AtomicUsize::new(0));
        let forwarded2 = forwarded.clone();
        bus.subscribe(Producer::PacketBuffer, EventKind::PacketForwardToSerial, move |_| {
            let forwarded2 = forwarded2.clone();
            async move {
                forwarded2.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        bus.publish(Producer::WifiParser, Event::RootPacketForward(packet())).await;
        bus.publish(
            Producer::SerialParser,
            Event::ResponseToPacketRequest { qid: 1, forward: false },
        )
        .await;
        assert_eq!(forwarded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_qid_is_ignored() {
        let bus = Arc::new(EventBus::new());
        let buffer = PacketBuffer::new(bus.clone());
        buffer.install(&bus).await;
        bus.publish(
            Producer::SerialParser,
            Event::ResponseToPacketRequest { qid: 999, forward: true },
        )
        .await;
    }

    #[tokio::test]
    async fn sweep_drops_only_stale_entries() {
        let bus = Arc::new(EventBus::new());
        let buffer = PacketBuffer::new(bus.clone());
        buffer.install(&bus).await;
        bus.publish(Producer::WifiParser, Event::RootPacketForward(packet())).await;

        {
            let mut entries = buffer.entries.lock().await;
            let entry = entries.get_mut(&1).unwrap();
            entry.inserted = Instant::now() - Duration::from_secs(6);
        }
        buffer.sweep(DECISION_TTL).await;
        assert_eq!(buffer.entries.lock().await.len(), 0);
    }
}

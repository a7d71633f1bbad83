//! Periodic ticks driving the neighbour-list refresh and table purges.
//! No event-bus involvement — each timer owns a handle to the component it
//! drives and calls it directly, since a tick isn't something any other
//! subscriber needs to see.

use std::sync::Arc;
use std::time::Duration;

use crate::node_table::{NodeTable, PURGE_TTL};
use crate::packet_buffer::{PacketBuffer, DECISION_TTL};
use crate::serial::SerialIo;

const NEIGHBOUR_REQUEST_PERIOD: Duration = Duration::from_secs(10);
const PURGE_PERIOD: Duration = Duration::from_secs(1);

/// Asks the co-processor for its current neighbour list every 10s.
pub fn spawn_neighbour_request_timer(serial: Arc<SerialIo>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(NEIGHBOUR_REQUEST_PERIOD);
        loop {
            ticker.tick().await;
            serial.request_neighbours().await;
        }
    });
}

/// Sweeps stale `NodeTable` entries and stale packet-buffer decisions every
/// second.
pub fn spawn_purge_timer(node_table: Arc<NodeTable>, packet_buffer: Arc<PacketBuffer>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_PERIOD);
        loop {
            ticker.tick().await;
            node_table.purge(PURGE_TTL).await;
            packet_buffer.sweep(DECISION_TTL).await;
        }
    });
}

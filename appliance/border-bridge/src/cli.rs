//! Interactive command shell: one command per stdin line, each printing
//! a snapshot of a named table. Follows the serial reader's shape — a
//! blocking stdin read handed off to a `spawn_blocking` task that calls back
//! into the async world per line.

use std::io::{self, BufRead};
use std::sync::Arc;

use tracing::{event, Level};

use crate::mode_store::ModeStore;
use crate::nd_bridge::NdBridge;
use crate::node_table::NodeTable;
use crate::packet_buffer::PacketBuffer;
use crate::serial::SerialIo;

pub struct Cli {
    node_table: Arc<NodeTable>,
    packet_buffer: Arc<PacketBuffer>,
    mode_store: Arc<ModeStore>,
    nd_bridge: Arc<NdBridge>,
    serial: Arc<SerialIo>,
}

impl Cli {
    pub fn new(
        node_table: Arc<NodeTable>,
        packet_buffer: Arc<PacketBuffer>,
        mode_store: Arc<ModeStore>,
        nd_bridge: Arc<NdBridge>,
        serial: Arc<SerialIo>,
    ) -> Cli {
        Cli {
            node_table,
            packet_buffer,
            mode_store,
            nd_bridge,
            serial,
        }
    }

    /// Runs the command loop until stdin hits EOF. Returning from here is
    /// the orderly-shutdown path, exit code 0.
    pub async fn run(self) {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(16);
        tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        event!(Level::WARN, "cli: stdin read error: {}", err);
                        break;
                    }
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });

        while let Some(line) = rx.recv().await {
            self.dispatch(line.trim()).await;
        }
    }

    async fn dispatch(&self, command: &str) {
        match command {
            "node" => print!("{}", self.node_table.print_table().await),
            "metric" => self.serial.print_metrics_request().await,
            "flow" => self.serial.print_flows_request().await,
            "stats" => self.serial.print_statistics_request().await,
            "data" => print!("{}", self.mode_store.print_data().await),
            "pending" => print!("{}", self.nd_bridge.print_pending().await),
            "buffer" => print!("{}", self.packet_buffer.print_buffer_stats().await),
            "" => {}
            other => println!("unknown command: {:?}", other),
        }
    }
}

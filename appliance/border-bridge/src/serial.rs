//! `SerialIo` — the tagged line protocol of the serial co-processor link.
//! One reader task parses inbound lines and turns them into `Event`s
//! or direct table mutations; outbound commands are short writes serialized
//! behind a mutex so any task can ask the co-processor something.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::net::Ipv6Addr;
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result};
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::sys::termios::{self, BaudRate, SetArg};
use owned_fd::OwnedFd;
use tracing::{event, Level};

use crate::config::MetricWeights;
use crate::events::{Event, EventBus, Producer};
use crate::mode_store::{BridgeMode, ModeStore, MOTE_TECH};
use crate::node_table::{NodeTable, Tech};
use crate::packet::ContikiPacket;

fn configure_port(raw_fd: RawFd) -> nix::Result<()> {
    let mut tio = termios::tcgetattr(raw_fd)?;
    termios::cfmakeraw(&mut tio);
    termios::cfsetspeed(&mut tio, BaudRate::B115200)?;
    tio.control_flags.remove(termios::ControlFlags::PARENB | termios::ControlFlags::CSTOPB);
    tio.control_flags.insert(termios::ControlFlags::CS8 | termios::ControlFlags::CREAD | termios::ControlFlags::CLOCAL);
    termios::tcsetattr(raw_fd, SetArg::TCSANOW, &tio)
}

/// Opens `device` as an 8N1 115200 baud line. Anything past "open the port,
/// read/write bytes" is out of scope — no chip-specific driver, no flow
/// control beyond raw mode.
pub fn open_serial_port(device: &Path) -> Result<File> {
    let fd = open(device, OFlag::O_RDWR | OFlag::O_NOCTTY, Mode::empty())
        .with_context(|| format!("failed to open serial device {}", device.display()))?;
    configure_port(fd)
        .with_context(|| format!("failed to configure serial device {}", device.display()))?;
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    Ok(owned.into_file())
}

pub struct SerialIo {
    bus: Arc<EventBus>,
    node_table: Arc<NodeTable>,
    mode_store: Arc<ModeStore>,
    writer: Arc<StdMutex<File>>,
}

impl SerialIo {
    /// Takes ownership of an already-configured port. Spawns the reader
    /// task immediately; the returned `SerialIo` is the writer half plus
    /// the handle other components use to push outbound commands.
    pub fn start(
        port: File,
        bus: Arc<EventBus>,
        node_table: Arc<NodeTable>,
        mode_store: Arc<ModeStore>,
    ) -> Result<Arc<SerialIo>> {
        let writer_half = port.try_clone().context("cloning serial fd for writer half")?;
        let serial = Arc::new(SerialIo {
            bus,
            node_table,
            mode_store,
            writer: Arc::new(StdMutex::new(writer_half)),
        });
        serial.clone().spawn_reader(port);
        Ok(serial)
    }

    /// Registers this instance as the subscriber that turns bus events back
    /// into outbound serial commands (the original's `SerialCommands.notify`).
    pub async fn install(self: &Arc<Self>, bus: &EventBus) {
        let serial = self.clone();
        bus.subscribe(Producer::SerialParser, crate::events::EventKind::ContikiBoot, move |_| {
            let serial = serial.clone();
            async move { serial.send_config().await }
        })
        .await;

        let serial = self.clone();
        bus.subscribe(Producer::WifiParser, crate::events::EventKind::PacketSendToSerial, move |e| {
            let serial = serial.clone();
            async move {
                if let Event::PacketSendToSerial(packet) = e {
                    serial.send_packet(&packet).await;
                }
            }
        })
        .await;

        let serial = self.clone();
        bus.subscribe(Producer::PacketBuffer, crate::events::EventKind::PacketForwardToSerial, move |e| {
            let serial = serial.clone();
            async move {
                if let Event::PacketForwardToSerial(packet) = e {
                    serial.forward_packet(&packet).await;
                }
            }
        })
        .await;

        let serial = self.clone();
        bus.subscribe(Producer::PacketBuffer, crate::events::EventKind::PacketBuff, move |e| {
            let serial = serial.clone();
            async move {
                if let Event::PacketBuff { qid, packet } = e {
                    serial.request_forward_decision(qid, &packet).await;
                }
            }
        })
        .await;

        let serial = self.clone();
        bus.subscribe(Producer::SerialParser, crate::events::EventKind::HelloBridgeRequest, move |_| {
            let serial = serial.clone();
            async move { serial.send_hello_response().await }
        })
        .await;
    }

    fn spawn_reader(self: Arc<Self>, port: File) {
        tokio::task::spawn_blocking(move || {
            let handle = tokio::runtime::Handle::current();
            let mut reader = BufReader::new(port);
            let mut raw_line = Vec::new();
            let mut reading_print = false;
            loop {
                raw_line.clear();
                match reader.read_until(b'\n', &mut raw_line) {
                    Ok(0) => {
                        event!(Level::WARN, "serial: end of stream, reader task exiting");
                        return;
                    }
                    Ok(_) => {
                        handle.block_on(self.handle_line(&raw_line, &mut reading_print));
                    }
                    Err(err) => {
                        event!(Level::WARN, "serial: transient read error: {}", err);
                    }
                }
            }
        });
    }

    async fn handle_line(&self, raw_line: &[u8], reading_print: &mut bool) {
        let line = strip_newline(raw_line);

        if line.starts_with(b"<-") {
            *reading_print = true;
            return;
        }
        if line.starts_with(b"->") {
            *reading_print = false;
            return;
        }
        if *reading_print {
            event!(Level::DEBUG, "CONTIKI:{}", String::from_utf8_lossy(line));
            return;
        }
        if line.len() >= 3 && &line[..2] == b"!t" {
            print_instrumentation_timestamp(line[2]);
            return;
        }

        match line.get(..2) {
            Some(b"?w") => {
                event!(Level::INFO, "CONTIKI: sending hello message");
                self.bus.publish(Producer::SerialParser, Event::HelloBridgeRequest).await;
            }
            Some(b"!r") => self.handle_global_addresses(&line[2..]).await,
            Some(b"!n") => self.handle_neighbours(&line[2..]).await,
            Some(b"!c") => self.handle_mode_announce(&line[2..]).await,
            Some(b"!b") => {
                event!(Level::INFO, "CONTIKI: contiki device is booting");
                self.bus.publish(Producer::SerialParser, Event::ContikiBoot).await;
            }
            Some(b"!p") if line.get(2) == Some(&b';') => self.handle_packet_to_send(&line[3..]).await,
            Some(b"?p") if line.get(2) == Some(&b';') => self.handle_route_query(&line[3..]).await,
            Some(b"$p") if line.get(2) == Some(&b';') => self.handle_route_answer(&line[3..]).await,
            _ => {
                event!(Level::DEBUG, "CONTIKI:{}", String::from_utf8_lossy(line));
            }
        }
    }

    async fn handle_global_addresses(&self, payload: &[u8]) {
        let payload = String::from_utf8_lossy(payload);
        for addr in payload.split(';') {
            if addr.is_empty() {
                continue;
            }
            match addr.parse::<Ipv6Addr>() {
                Ok(ip) => {
                    self.mode_store.set_mote_address(ip).await;
                    if !ip.is_unicast_link_local() {
                        event!(Level::INFO, "BRIDGE: contiki uses global IPv6 address \"{}\"", ip);
                        self.bus.publish(Producer::SerialParser, Event::MoteGlobalAddress(ip)).await;
                    }
                }
                Err(_) => event!(Level::DEBUG, "BRIDGE: malformed address in !r line: {:?}", addr),
            }
        }
    }

    async fn handle_neighbours(&self, payload: &[u8]) {
        let payload = String::from_utf8_lossy(payload);
        for node in payload.split(';') {
            if node.is_empty() {
                continue;
            }
            match node.parse::<Ipv6Addr>() {
                Ok(ip) => self.node_table.observe(ip, MOTE_TECH).await,
                Err(_) => event!(Level::ERROR, "BRIDGE: neighbour ip address \"{}\" is not valid", node),
            }
        }
    }

    async fn handle_mode_announce(&self, payload: &[u8]) {
        let payload = String::from_utf8_lossy(payload);
        let mode = match payload.trim().parse::<u8>() {
            Ok(0) => BridgeMode::Node,
            Ok(_) => BridgeMode::Router,
            Err(_) => {
                event!(Level::DEBUG, "BRIDGE: malformed !c line: {:?}", payload);
                return;
            }
        };
        event!(Level::INFO, "BRIDGE: bridge runs in mode {:?}", mode);
        // The original sets the mode without emitting an event; we emit
        // `ChangeMode` (via `set_mode`) instead, so downstream subscribers
        // see every mode transition including the first one.
        self.mode_store.set_mode(mode).await;
    }

    async fn handle_packet_to_send(&self, payload: &[u8]) {
        let hex = String::from_utf8_lossy(payload);
        match ContikiPacket::from_contiki_format(&hex) {
            Ok(packet) => {
                event!(Level::DEBUG, "BRIDGE: incoming packet to send");
                self.bus.publish(Producer::SerialParser, Event::SerialPacketToSend(packet)).await;
            }
            Err(err) => event!(Level::DEBUG, "BRIDGE: malformed !p payload: {}", err),
        }
    }

    async fn handle_route_query(&self, payload: &[u8]) {
        let payload = String::from_utf8_lossy(payload);
        let mut parts = payload.splitn(2, ';');
        let qid = parts.next().and_then(|s| s.parse::<u32>().ok());
        let ip = parts.next().and_then(|s| s.parse::<Ipv6Addr>().ok());
        match (qid, ip) {
            (Some(qid), Some(ip)) => {
                event!(Level::DEBUG, "BRIDGE: contiki wants to use wifi for target host \"{}\"", ip);
                self.bus
                    .publish(Producer::SerialParser, Event::RequestRouteToMote { qid, ip })
                    .await;
            }
            _ => event!(Level::DEBUG, "BRIDGE: malformed ?p line: {:?}", payload),
        }
    }

    async fn handle_route_answer(&self, payload: &[u8]) {
        let payload = String::from_utf8_lossy(payload);
        let mut parts = payload.splitn(2, ';');
        let qid = parts.next().and_then(|s| s.parse::<u32>().ok());
        let forward = parts.next().map(|s| s.trim() == "1");
        match (qid, forward) {
            (Some(qid), Some(forward)) => {
                event!(Level::DEBUG, "CONTIKI: sending response \"{}\" to path id: \"{}\"", forward as u8, qid);
                self.bus
                    .publish(Producer::SerialParser, Event::ResponseToPacketRequest { qid, forward })
                    .await;
            }
            _ => event!(Level::DEBUG, "BRIDGE: malformed $p line: {:?}", payload),
        }
    }

    async fn write_line(&self, line: String) {
        let writer = self.writer.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut file = writer.lock().expect("serial writer mutex poisoned");
            file.write_all(line.as_bytes())
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => event!(Level::WARN, "BRIDGE: serial write failed: {}", err),
            Err(err) => event!(Level::WARN, "BRIDGE: serial writer task panicked: {}", err),
        }
    }

    pub async fn send_config(&self) {
        let metrics: MetricWeights = self.mode_store.config().metrics.clone();
        let cmd = format!("!we{}b{}x{}\n", metrics.en, metrics.bw, metrics.etx);
        event!(Level::INFO, "BRIDGE: sending config \"{}\" to contiki", cmd.trim_end());
        self.write_line(cmd).await;
    }

    pub async fn request_config(&self) {
        event!(Level::INFO, "BRIDGE: requesting configuration from contiki");
        self.write_line("?c\n".to_owned()).await;
    }

    pub async fn request_neighbours(&self) {
        event!(Level::INFO, "BRIDGE: requesting neighbours from contiki");
        self.write_line("?n\n".to_owned()).await;
    }

    pub async fn send_packet(&self, packet: &ContikiPacket) {
        event!(Level::DEBUG, "BRIDGE: sending packet to contiki");
        self.write_line(format!("!p;{}\n", packet.get_contiki_format())).await;
    }

    pub async fn forward_packet(&self, packet: &ContikiPacket) {
        event!(Level::DEBUG, "BRIDGE: forwarding packet to contiki");
        self.write_line(format!("!f;{}\n", packet.get_contiki_format())).await;
    }

    pub async fn request_forward_decision(&self, qid: u32, packet: &ContikiPacket) {
        event!(Level::INFO, "BRIDGE: requesting forward decision");
        self.write_line(format!("?p;{};{}\n", qid, packet.get_contiki_format())).await;
    }

    pub async fn send_route_response(&self, qid: u32, forward: bool) {
        let cmd = format!("$p;{};{}\n", qid, forward as u8);
        event!(Level::INFO, "BRIDGE: sending response to route request \"{}\"", cmd.trim_end());
        self.write_line(cmd).await;
    }

    async fn send_hello_response(&self) {
        self.write_line("$w\n".to_owned()).await;
    }

    pub async fn print_flows_request(&self) {
        self.write_line("#f".to_owned()).await;
    }

    pub async fn print_metrics_request(&self) {
        self.write_line("#m".to_owned()).await;
    }

    pub async fn print_statistics_request(&self) {
        self.write_line("#s".to_owned()).await;
    }
}

fn strip_newline(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

const TIMESTAMP_LABELS: [&str; 8] = [
    "sent rpl",
    "sent wifi",
    "R forwarded rpl",
    "R forwarded wifi",
    "W forwarded rpl",
    "W forwarded wifi",
    "received over wifi",
    "received over rpl",
];

fn print_instrumentation_timestamp(tag_digit: u8) {
    let index = (tag_digit as char).to_digit(10).and_then(|n| (n as usize).checked_sub(1));
    let label = index.and_then(|i| TIMESTAMP_LABELS.get(i)).copied().unwrap_or("unknown");
    let measured_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    println!("{} '{}'\n", label, measured_ms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeConfig, Ipv6Subnet};
    use crate::events::EventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            serial_device: "/dev/null".into(),
            wifi_device: "wlan0".into(),
            wifi_subnet: "2001:db8::/64".parse().unwrap(),
            border_router_ipv6: "2001:db8::1".parse().unwrap(),
            metrics: MetricWeights { en: 1, bw: 2, etx: 3 },
        }
    }

    async fn harness() -> (Arc<SerialIo>, File, Arc<EventBus>, Arc<NodeTable>, Arc<ModeStore>) {
        let (reader_end, writer_end) = nix::unistd::pipe().unwrap();
        let reader_file = unsafe { <File as FromRawFd>::from_raw_fd(reader_end) };
        let writer_file = unsafe { <File as FromRawFd>::from_raw_fd(writer_end) };

        let bus = Arc::new(EventBus::new());
        let node_table = Arc::new(NodeTable::new(bus.clone()));
        let mode_store = Arc::new(ModeStore::new(bus.clone(), test_config()));
        let serial = SerialIo::start(reader_file, bus.clone(), node_table.clone(), mode_store.clone()).unwrap();
        (serial, writer_file, bus, node_table, mode_store)
    }

    #[tokio::test]
    async fn boot_line_emits_contiki_boot_event() {
        let (_serial, mut writer, bus, _nt, _ms) = harness().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        bus.subscribe(Producer::SerialParser, EventKind::ContikiBoot, move |_| {
            let counter2 = counter2.clone();
            async move {
                counter2.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
        writer.write_all(b"!b\n").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tag_emits_no_events() {
        let (_serial, mut writer, bus, _nt, _ms) = harness().await;
        let counter = Arc::new(AtomicUsize::new(0));
        for kind in [
            EventKind::ContikiBoot,
            EventKind::HelloBridgeRequest,
            EventKind::MoteGlobalAddress,
        ] {
            let counter2 = counter.clone();
            bus.subscribe(Producer::SerialParser, kind, move |_| {
                let counter2 = counter2.clone();
                async move {
                    counter2.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        }
        writer.write_all(b"!zzz\n").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn global_address_line_sets_mode_store_and_emits_event() {
        let (_serial, mut writer, bus, _nt, ms) = harness().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        bus.subscribe(Producer::SerialParser, EventKind::MoteGlobalAddress, move |_| {
            let counter2 = counter2.clone();
            async move {
                counter2.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
        writer.write_all(b"!r2001:db8::1;fe80::abcd;\n").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(ms.mote_global_address().await, Some("2001:db8::1".parse().unwrap()));
        assert_eq!(ms.mote_link_local_address().await, Some("fe80::abcd".parse().unwrap()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn neighbour_list_populates_node_table_as_rpl() {
        let (_serial, mut writer, _bus, nt, _ms) = harness().await;
        writer.write_all(b"!n2001:db8::5;2001:db8::6;\n").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let node = nt.lookup(&"2001:db8::5".parse().unwrap()).await.unwrap();
        assert_eq!(node.tech, Tech::Rpl);
    }

    #[tokio::test]
    async fn route_query_emits_request_route_event() {
        let (_serial, mut writer, bus, _nt, _ms) = harness().await;
        let seen = Arc::new(StdMutex::new(None));
        let seen2 = seen.clone();
        bus.subscribe(Producer::SerialParser, EventKind::RequestRouteToMote, move |e| {
            let seen2 = seen2.clone();
            async move {
                if let Event::RequestRouteToMote { qid, ip } = e {
                    *seen2.lock().unwrap() = Some((qid, ip));
                }
            }
        })
        .await;
        writer.write_all(b"?p;7;2001:db8::2\n").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), Some((7, "2001:db8::2".parse().unwrap())));
    }
}

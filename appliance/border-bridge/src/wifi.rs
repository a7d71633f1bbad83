//! `WifiIo` — the Wi-Fi side of the bridge: a raw `AF_PACKET` capture
//! of the Wi-Fi interface, classifying inbound IPv6 frames into `Event`s,
//! and building outbound Ethernet+IPv6+ICMPv6 frames for ND proxying and
//! packet re-injection. Raw socket setup follows the same manual
//! `libc::socket`/`setsockopt` style as `appliance-netman::setup_icmp6_socket`,
//! generalized from a filtered ICMPv6 socket to a full-frame `ETH_P_IPV6`
//! capture (we need the Ethernet header too, to learn peer MACs and to
//! build replies).

use std::collections::HashMap;
use std::ffi::CString;
use std::mem;
use std::net::Ipv6Addr;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{bail, Context, Result};
use tracing::{event, Level};

use crate::events::{Event, EventBus, EventKind, Producer};
use crate::mode_store::{BridgeMode, ModeStore};
use crate::nd;
use crate::node_table::{NodeTable, Tech};
use crate::packet::ContikiPacket;

const ETH_P_IPV6: u16 = 0x86dd;
const ETH_HEADER_LEN: usize = 14;
const IPV6_HEADER_LEN: usize = 40;
const NEXT_HEADER_ICMPV6: u8 = 58;
const HOP_LIMIT_ND: u8 = 255;

fn if_nametoindex(name: &str) -> Result<libc::c_int> {
    let cname = CString::new(name).with_context(|| format!("interface name {:?} contains a NUL byte", name))?;
    let idx = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if idx == 0 {
        bail!("no such network interface: {}", name);
    }
    Ok(idx as libc::c_int)
}

fn open_capture_socket(ifname: &str) -> Result<(RawFd, libc::c_int)> {
    let ifindex = if_nametoindex(ifname)?;
    let proto = (ETH_P_IPV6 as u16).to_be();

    let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, proto as libc::c_int) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error()).context("opening AF_PACKET capture socket");
    }

    let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as u16;
    addr.sll_protocol = proto;
    addr.sll_ifindex = ifindex;

    let ret = unsafe {
        libc::bind(
            fd,
            &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_ll>() as u32,
        )
    };
    if ret < 0 {
        let err = std::io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err).with_context(|| format!("binding capture socket to {}", ifname));
    }

    Ok((fd, ifindex))
}

struct ParsedFrame<'a> {
    src_mac: [u8; 6],
    src_ip: Ipv6Addr,
    dst_ip: Ipv6Addr,
    next_header: u8,
    /// The complete IPv6 datagram (header + payload), as the co-processor
    /// expects it over `!p`/`?p`.
    ipv6_packet: &'a [u8],
    /// Upper-layer payload, valid only when `next_header == ICMPv6`.
    upper_payload: &'a [u8],
}

fn parse_ethernet_ipv6(frame: &[u8]) -> Option<ParsedFrame> {
    if frame.len() < ETH_HEADER_LEN + IPV6_HEADER_LEN {
        return None;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != ETH_P_IPV6 {
        return None;
    }
    let mut src_mac = [0u8; 6];
    src_mac.copy_from_slice(&frame[6..12]);

    let ipv6_packet = &frame[ETH_HEADER_LEN..];
    if (ipv6_packet[0] >> 4) != 6 {
        return None;
    }
    let payload_len = u16::from_be_bytes([ipv6_packet[4], ipv6_packet[5]]) as usize;
    let next_header = ipv6_packet[6];
    if ipv6_packet.len() < IPV6_HEADER_LEN + payload_len {
        return None;
    }
    let mut src_bytes = [0u8; 16];
    src_bytes.copy_from_slice(&ipv6_packet[8..24]);
    let mut dst_bytes = [0u8; 16];
    dst_bytes.copy_from_slice(&ipv6_packet[24..40]);

    Some(ParsedFrame {
        src_mac,
        src_ip: Ipv6Addr::from(src_bytes),
        dst_ip: Ipv6Addr::from(dst_bytes),
        next_header,
        ipv6_packet: &ipv6_packet[..IPV6_HEADER_LEN + payload_len],
        upper_payload: &ipv6_packet[IPV6_HEADER_LEN..IPV6_HEADER_LEN + payload_len],
    })
}

/// `ff02::1:ffXX:XXXX` plus the RFC 2464 Ethernet multicast mapping
/// `33:33:ff:XX:XX:XX`, both derived from the low 24 bits of `target`.
fn solicited_node_multicast(target: &Ipv6Addr) -> (Ipv6Addr, [u8; 6]) {
    let o = target.octets();
    let mut ip_octets = [0u8; 16];
    ip_octets[0] = 0xff;
    ip_octets[1] = 0x02;
    ip_octets[11] = 0x01;
    ip_octets[12] = 0xff;
    ip_octets[13] = o[13];
    ip_octets[14] = o[14];
    ip_octets[15] = o[15];
    let mac = [0x33, 0x33, 0xff, o[13], o[14], o[15]];
    (Ipv6Addr::from(ip_octets), mac)
}

fn build_ipv6_frame(dst_mac: [u8; 6], src_mac: [u8; 6], src_ip: &Ipv6Addr, dst_ip: &Ipv6Addr, mut icmp6: Vec<u8>) -> Vec<u8> {
    let checksum = nd::icmp6_checksum(src_ip, dst_ip, &icmp6);
    let [hi, lo] = checksum.to_be_bytes();
    icmp6[2] = hi;
    icmp6[3] = lo;

    let mut frame = Vec::with_capacity(ETH_HEADER_LEN + IPV6_HEADER_LEN + icmp6.len());
    frame.extend_from_slice(&dst_mac);
    frame.extend_from_slice(&src_mac);
    frame.extend_from_slice(&ETH_P_IPV6.to_be_bytes());

    frame.push(0x60);
    frame.extend_from_slice(&[0, 0, 0]);
    frame.extend_from_slice(&(icmp6.len() as u16).to_be_bytes());
    frame.push(NEXT_HEADER_ICMPV6);
    frame.push(HOP_LIMIT_ND);
    frame.extend_from_slice(&src_ip.octets());
    frame.extend_from_slice(&dst_ip.octets());
    frame.extend_from_slice(&icmp6);
    frame
}

pub struct WifiIo {
    bus: Arc<EventBus>,
    node_table: Arc<NodeTable>,
    mode_store: Arc<ModeStore>,
    write_fd: RawFd,
    our_mac: [u8; 6],
    mac_cache: StdMutex<HashMap<Ipv6Addr, [u8; 6]>>,
}

impl WifiIo {
    pub fn start(
        ifname: &str,
        our_mac: [u8; 6],
        bus: Arc<EventBus>,
        node_table: Arc<NodeTable>,
        mode_store: Arc<ModeStore>,
    ) -> Result<Arc<WifiIo>> {
        let (fd, _ifindex) = open_capture_socket(ifname)?;
        let wifi = Arc::new(WifiIo {
            bus,
            node_table,
            mode_store,
            write_fd: fd,
            our_mac,
            mac_cache: StdMutex::new(HashMap::new()),
        });
        wifi.clone().spawn_reader(fd);
        Ok(wifi)
    }

    pub async fn install(self: &Arc<Self>, bus: &EventBus) {
        let wifi = self.clone();
        bus.subscribe(Producer::SerialParser, EventKind::SerialPacketToSend, move |e| {
            let wifi = wifi.clone();
            async move {
                if let Event::SerialPacketToSend(packet) = e {
                    wifi.send_packet(&packet).await;
                }
            }
        })
        .await;
    }

    fn spawn_reader(self: Arc<Self>, fd: RawFd) {
        tokio::task::spawn_blocking(move || {
            let handle = tokio::runtime::Handle::current();
            let mut buf = vec![0u8; 2048];
            loop {
                let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
                if n < 0 {
                    event!(Level::WARN, "wifi capture: read error: {}", std::io::Error::last_os_error());
                    continue;
                }
                if n == 0 {
                    event!(Level::WARN, "wifi capture: end of stream, reader task exiting");
                    return;
                }
                handle.block_on(self.handle_frame(&buf[..n as usize]));
            }
        });
    }

    async fn handle_frame(&self, frame: &[u8]) {
        let parsed = match parse_ethernet_ipv6(frame) {
            Some(parsed) => parsed,
            None => return,
        };

        if !parsed.src_ip.is_unspecified() && !parsed.src_ip.is_multicast() {
            self.mac_cache.lock().unwrap().insert(parsed.src_ip, parsed.src_mac);
            self.node_table.observe(parsed.src_ip, Tech::Wifi).await;
        }

        if parsed.next_header == NEXT_HEADER_ICMPV6 && !parsed.upper_payload.is_empty() {
            match parsed.upper_payload[0] {
                nd::ICMP6_NEIGHBOR_SOLICITATION => {
                    if let Some(ns) = nd::parse_solicitation(parsed.src_ip, parsed.upper_payload) {
                        self.bus
                            .publish(Producer::WifiParser, Event::NeighbourSolicitation(ns))
                            .await;
                    }
                    return;
                }
                nd::ICMP6_NEIGHBOR_ADVERTISEMENT => {
                    if let Some(na) = nd::parse_advertisement(parsed.src_ip, parsed.upper_payload) {
                        self.bus
                            .publish(Producer::WifiParser, Event::NeighbourAdvertisement(na))
                            .await;
                    }
                    return;
                }
                nd::ICMP6_ROUTER_ADVERTISEMENT => {
                    if let Some((prefix, prefix_len)) = nd::find_prefix_information(parsed.upper_payload) {
                        self.bus
                            .publish(Producer::WifiParser, Event::RouterAdvertisement { prefix, prefix_len })
                            .await;
                    }
                    return;
                }
                _ => {}
            }
        }

        self.classify_unicast(parsed.dst_ip, parsed.ipv6_packet).await;
    }

    async fn classify_unicast(&self, dst_ip: Ipv6Addr, ipv6_packet: &[u8]) {
        let mote_global = self.mode_store.mote_global_address().await;
        let mode = self.mode_store.mode().await;
        let packet = ContikiPacket::from_bytes(ipv6_packet.to_vec());

        match mode {
            BridgeMode::Node => {
                if Some(dst_ip) == mote_global {
                    event!(Level::DEBUG, "WIFI: packet for the co-processor, sending directly");
                    self.bus
                        .publish(Producer::WifiParser, Event::PacketSendToSerial(packet))
                        .await;
                }
            }
            BridgeMode::Router => {
                if Some(dst_ip) == mote_global || in_rpl_subnet(&dst_ip, mote_global.as_ref()) {
                    event!(Level::DEBUG, "WIFI: packet for the RPL subnet, buffering a forward decision");
                    self.bus
                        .publish(Producer::WifiParser, Event::RootPacketForward(packet))
                        .await;
                }
            }
        }
    }

    fn write_frame(&self, frame: &[u8]) {
        let ret = unsafe { libc::write(self.write_fd, frame.as_ptr() as *const libc::c_void, frame.len()) };
        if ret < 0 {
            event!(Level::WARN, "wifi: frame write failed: {}", std::io::Error::last_os_error());
        }
    }

    /// Sends an NS to confirm reachability of a newly observed RPL node,
    /// invoked by `NdBridge` in response to a `NewNode` event.
    pub async fn send_solicitation(&self, target: Ipv6Addr) {
        let src = match self.mode_store.wifi_global_address().await {
            Some(ip) => ip,
            None => return,
        };
        let (multicast_ip, multicast_mac) = solicited_node_multicast(&target);
        let body = nd::build_solicitation(&target, Some(self.our_mac));
        let frame = build_ipv6_frame(multicast_mac, self.our_mac, &src, &multicast_ip, body);
        event!(Level::DEBUG, "WIFI: sending neighbour solicitation for {}", target);
        self.write_frame(&frame);
    }

    /// Answers a solicitation on behalf of a mote (`override_` true when
    /// proxying for a host that isn't us).
    pub async fn send_advertisement(&self, requester_ip: Ipv6Addr, requester_mac: Option<[u8; 6]>, target: Ipv6Addr, override_: bool) {
        let src = match self.mode_store.wifi_global_address().await {
            Some(ip) => ip,
            None => return,
        };
        let dst_mac = requester_mac.unwrap_or(self.our_mac);
        let body = nd::build_advertisement(&target, Some(self.our_mac), false, true, override_);
        let frame = build_ipv6_frame(dst_mac, self.our_mac, &src, &requester_ip, body);
        event!(Level::DEBUG, "WIFI: sending proxy neighbour advertisement for {} to {}", target, requester_ip);
        self.write_frame(&frame);
    }

    /// Advertises the mote prefix onto `ff02::1` (all-nodes multicast) — the
    /// ROUTER-mode counterpart to SLAAC, driven by `IpConfigurator` on a
    /// timer once the bridge has a Wi-Fi global address to advertise from.
    pub async fn send_router_advertisement(&self, prefix: Ipv6Addr, prefix_len: u8, router_lifetime: u16) {
        let src = match self.mode_store.wifi_global_address().await {
            Some(ip) => ip,
            None => return,
        };
        const ALL_NODES_MULTICAST: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);
        const ALL_NODES_MAC: [u8; 6] = [0x33, 0x33, 0x00, 0x00, 0x00, 0x01];
        let body = nd::build_router_advertisement(&prefix, prefix_len, router_lifetime);
        let frame = build_ipv6_frame(ALL_NODES_MAC, self.our_mac, &src, &ALL_NODES_MULTICAST, body);
        event!(Level::DEBUG, "WIFI: advertising prefix {}/{}", prefix, prefix_len);
        self.write_frame(&frame);
    }

    /// Re-injects a `ContikiPacket` from the co-processor onto the Wi-Fi
    /// segment. The destination MAC is resolved from frames we've already
    /// observed; unresolved destinations fall back to an Ethernet broadcast
    /// (best-effort — the next reply will teach us the real MAC).
    pub async fn send_packet(&self, packet: &ContikiPacket) {
        let bytes = packet.as_bytes();
        if bytes.len() < IPV6_HEADER_LEN {
            event!(Level::DEBUG, "WIFI: packet from co-processor is too short to be IPv6, dropping");
            return;
        }
        let mut dst_bytes = [0u8; 16];
        dst_bytes.copy_from_slice(&bytes[24..40]);
        let dst_ip = Ipv6Addr::from(dst_bytes);
        let dst_mac = self
            .mac_cache
            .lock()
            .unwrap()
            .get(&dst_ip)
            .copied()
            .unwrap_or([0xff; 6]);

        let mut frame = Vec::with_capacity(ETH_HEADER_LEN + bytes.len());
        frame.extend_from_slice(&dst_mac);
        frame.extend_from_slice(&self.our_mac);
        frame.extend_from_slice(&ETH_P_IPV6.to_be_bytes());
        frame.extend_from_slice(bytes);
        event!(Level::DEBUG, "WIFI: forwarding co-processor packet to {}", dst_ip);
        self.write_frame(&frame);
    }
}

/// Whether `dst` shares the RPL mote's advertised `/64` prefix. We treat
/// `mote_global`'s own `/64` as that subnet since it's the only RPL-side
/// prefix the bridge ever learns (see DESIGN.md).
fn in_rpl_subnet(dst: &Ipv6Addr, mote_global: Option<&Ipv6Addr>) -> bool {
    match mote_global {
        Some(mote) => dst.octets()[..8] == mote.octets()[..8],
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> [u8; 6] {
        [0x02, 0, 0, 0, 0, n]
    }

    fn build_test_frame(src_mac: [u8; 6], dst_mac: [u8; 6], src_ip: Ipv6Addr, dst_ip: Ipv6Addr, next_header: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&dst_mac);
        frame.extend_from_slice(&src_mac);
        frame.extend_from_slice(&ETH_P_IPV6.to_be_bytes());
        frame.push(0x60);
        frame.extend_from_slice(&[0, 0, 0]);
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.push(next_header);
        frame.push(64);
        frame.extend_from_slice(&src_ip.octets());
        frame.extend_from_slice(&dst_ip.octets());
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn parses_ethernet_and_ipv6_headers() {
        let src_ip: Ipv6Addr = "2001:db8::5".parse().unwrap();
        let dst_ip: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let frame = build_test_frame(mac(5), mac(1), src_ip, dst_ip, 17, b"hello");
        let parsed = parse_ethernet_ipv6(&frame).unwrap();
        assert_eq!(parsed.src_mac, mac(5));
        assert_eq!(parsed.src_ip, src_ip);
        assert_eq!(parsed.dst_ip, dst_ip);
        assert_eq!(parsed.next_header, 17);
        assert_eq!(parsed.upper_payload, b"hello");
    }

    #[test]
    fn non_ipv6_ethertype_is_rejected() {
        let mut frame = build_test_frame(mac(5), mac(1), Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST, 17, b"x");
        frame[12] = 0x08;
        frame[13] = 0x00;
        assert!(parse_ethernet_ipv6(&frame).is_none());
    }

    #[test]
    fn solicited_node_multicast_uses_low_24_bits() {
        let target = Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0xaabb, 0xccdd);
        let (ip, mac) = solicited_node_multicast(&target);
        assert_eq!(mac, [0x33, 0x33, 0xff, 0xbb, 0xcc, 0xdd]);
        assert_eq!(ip, Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0x0001, 0xffbb, 0xccdd));
    }

    #[test]
    fn rpl_subnet_match_compares_high_64_bits() {
        let mote: Ipv6Addr = "2001:db8:1:2::5".parse().unwrap();
        let inside: Ipv6Addr = "2001:db8:1:2::99".parse().unwrap();
        let outside: Ipv6Addr = "2001:db8:1:3::99".parse().unwrap();
        assert!(in_rpl_subnet(&inside, Some(&mote)));
        assert!(!in_rpl_subnet(&outside, Some(&mote)));
        assert!(!in_rpl_subnet(&inside, None));
    }
}

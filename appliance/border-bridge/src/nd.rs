//! ICMPv6 Neighbor Solicitation / Advertisement wire format (RFC 4861 §4.3,
//! §4.4): message bodies plus the link-layer-address option, the pseudo-header
//! checksum they're carried under, and the parse/build pair `wifi.rs` calls
//! to move between captured frames and `Event`s.

use std::net::Ipv6Addr;

pub const ICMP6_ROUTER_ADVERTISEMENT: u8 = 134;
pub const ICMP6_NEIGHBOR_SOLICITATION: u8 = 135;
pub const ICMP6_NEIGHBOR_ADVERTISEMENT: u8 = 136;

const OPT_SOURCE_LINK_LAYER_ADDRESS: u8 = 1;
const OPT_TARGET_LINK_LAYER_ADDRESS: u8 = 2;
const OPT_PREFIX_INFORMATION: u8 = 3;

const RA_FIXED_HEADER_LEN: usize = 16;

const NA_FLAG_ROUTER: u8 = 0x80;
const NA_FLAG_SOLICITED: u8 = 0x40;
const NA_FLAG_OVERRIDE: u8 = 0x20;

#[derive(Clone, Debug)]
pub struct NeighbourSolicitation {
    pub source_ip: Ipv6Addr,
    pub target: Ipv6Addr,
    pub source_link_layer: Option<[u8; 6]>,
}

#[derive(Clone, Debug)]
pub struct NeighbourAdvertisement {
    pub source_ip: Ipv6Addr,
    pub target: Ipv6Addr,
    pub target_link_layer: Option<[u8; 6]>,
    pub router: bool,
    pub solicited: bool,
    pub override_: bool,
}

fn find_link_layer_option(mut options: &[u8], want_type: u8) -> Option<[u8; 6]> {
    while options.len() >= 2 {
        let opt_type = options[0];
        let opt_len_words = options[1] as usize;
        if opt_len_words == 0 {
            return None;
        }
        let opt_len = opt_len_words * 8;
        if options.len() < opt_len {
            return None;
        }
        if opt_type == want_type && opt_len == 8 {
            let mut mac = [0u8; 6];
            mac.copy_from_slice(&options[2..8]);
            return Some(mac);
        }
        options = &options[opt_len..];
    }
    None
}

fn link_layer_option(opt_type: u8, mac: [u8; 6]) -> [u8; 8] {
    let mut opt = [0u8; 8];
    opt[0] = opt_type;
    opt[1] = 1; // length in units of 8 octets
    opt[2..8].copy_from_slice(&mac);
    opt
}

/// `body` is the ICMPv6 message starting at the type byte (checksum still
/// present but not validated here — the capture path trusts the kernel/NIC).
pub fn parse_solicitation(source_ip: Ipv6Addr, body: &[u8]) -> Option<NeighbourSolicitation> {
    if body.len() < 24 || body[0] != ICMP6_NEIGHBOR_SOLICITATION {
        return None;
    }
    let mut target_bytes = [0u8; 16];
    target_bytes.copy_from_slice(&body[8..24]);
    Some(NeighbourSolicitation {
        source_ip,
        target: Ipv6Addr::from(target_bytes),
        source_link_layer: find_link_layer_option(&body[24..], OPT_SOURCE_LINK_LAYER_ADDRESS),
    })
}

pub fn parse_advertisement(source_ip: Ipv6Addr, body: &[u8]) -> Option<NeighbourAdvertisement> {
    if body.len() < 24 || body[0] != ICMP6_NEIGHBOR_ADVERTISEMENT {
        return None;
    }
    let flags = body[4];
    let mut target_bytes = [0u8; 16];
    target_bytes.copy_from_slice(&body[8..24]);
    Some(NeighbourAdvertisement {
        source_ip,
        target: Ipv6Addr::from(target_bytes),
        target_link_layer: find_link_layer_option(&body[24..], OPT_TARGET_LINK_LAYER_ADDRESS),
        router: flags & NA_FLAG_ROUTER != 0,
        solicited: flags & NA_FLAG_SOLICITED != 0,
        override_: flags & NA_FLAG_OVERRIDE != 0,
    })
}

pub fn build_solicitation(target: &Ipv6Addr, source_link_layer: Option<[u8; 6]>) -> Vec<u8> {
    let mut body = Vec::with_capacity(32);
    body.push(ICMP6_NEIGHBOR_SOLICITATION);
    body.push(0); // code
    body.extend_from_slice(&[0, 0]); // checksum, filled in by the caller
    body.extend_from_slice(&[0, 0, 0, 0]); // reserved
    body.extend_from_slice(&target.octets());
    if let Some(mac) = source_link_layer {
        body.extend_from_slice(&link_layer_option(OPT_SOURCE_LINK_LAYER_ADDRESS, mac));
    }
    body
}

pub fn build_advertisement(
    target: &Ipv6Addr,
    target_link_layer: Option<[u8; 6]>,
    router: bool,
    solicited: bool,
    override_: bool,
) -> Vec<u8> {
    let mut flags = 0u8;
    if router {
        flags |= NA_FLAG_ROUTER;
    }
    if solicited {
        flags |= NA_FLAG_SOLICITED;
    }
    if override_ {
        flags |= NA_FLAG_OVERRIDE;
    }

    let mut body = Vec::with_capacity(32);
    body.push(ICMP6_NEIGHBOR_ADVERTISEMENT);
    body.push(0); // code
    body.extend_from_slice(&[0, 0]); // checksum, filled in by the caller
    body.push(flags);
    body.extend_from_slice(&[0, 0, 0]); // reserved
    body.extend_from_slice(&target.octets());
    if let Some(mac) = target_link_layer {
        body.extend_from_slice(&link_layer_option(OPT_TARGET_LINK_LAYER_ADDRESS, mac));
    }
    body
}

/// Minimal Router Advertisement (RFC 4861 §4.2) carrying a single Prefix
/// Information option (§4.6.2) — the mote prefix we advertise in ROUTER
/// mode. `router_lifetime` in seconds; 0 means "not a default router",
/// which is correct here since we're advertising a prefix, not offering
/// ourselves as the next hop for non-mote traffic.
pub fn build_router_advertisement(prefix: &Ipv6Addr, prefix_len: u8, router_lifetime: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(RA_FIXED_HEADER_LEN + 32);
    body.push(ICMP6_ROUTER_ADVERTISEMENT);
    body.push(0); // code
    body.extend_from_slice(&[0, 0]); // checksum, filled in by the caller
    body.push(64); // current hop limit
    body.push(0); // flags: not managed, not other-config
    body.extend_from_slice(&router_lifetime.to_be_bytes());
    body.extend_from_slice(&[0, 0, 0, 0]); // reachable time: unspecified
    body.extend_from_slice(&[0, 0, 0, 0]); // retrans timer: unspecified

    body.push(OPT_PREFIX_INFORMATION);
    body.push(4); // option length in units of 8 octets (32 bytes)
    body.push(prefix_len);
    body.push(0xc0); // on-link + autonomous-address-configuration
    body.extend_from_slice(&86400u32.to_be_bytes()); // valid lifetime
    body.extend_from_slice(&14400u32.to_be_bytes()); // preferred lifetime
    body.extend_from_slice(&[0, 0, 0, 0]); // reserved
    body.extend_from_slice(&prefix.octets());
    body
}

/// Pulls the prefix and prefix length out of a Router Advertisement's
/// Prefix Information option, for the NODE-mode SLAAC path.
pub fn find_prefix_information(body: &[u8]) -> Option<(Ipv6Addr, u8)> {
    if body.len() < RA_FIXED_HEADER_LEN || body[0] != ICMP6_ROUTER_ADVERTISEMENT {
        return None;
    }
    let mut options = &body[RA_FIXED_HEADER_LEN..];
    while options.len() >= 2 {
        let opt_type = options[0];
        let opt_len_words = options[1] as usize;
        if opt_len_words == 0 {
            return None;
        }
        let opt_len = opt_len_words * 8;
        if options.len() < opt_len {
            return None;
        }
        if opt_type == OPT_PREFIX_INFORMATION && opt_len == 32 {
            let prefix_len = options[2];
            let mut prefix_bytes = [0u8; 16];
            prefix_bytes.copy_from_slice(&options[16..32]);
            return Some((Ipv6Addr::from(prefix_bytes), prefix_len));
        }
        options = &options[opt_len..];
    }
    None
}

/// RFC 1071 Internet checksum over the IPv6 pseudo-header + ICMPv6 message,
/// with the message's own checksum field treated as zero. Call this after
/// `build_solicitation`/`build_advertisement` and splice the result into
/// bytes `[2..4]` of the body before transmission.
pub fn icmp6_checksum(src: &Ipv6Addr, dst: &Ipv6Addr, icmp6: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut add_words = |bytes: &[u8]| {
        let mut chunks = bytes.chunks_exact(2);
        for chunk in &mut chunks {
            sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
        }
        if let [last] = chunks.remainder() {
            sum += (*last as u32) << 8;
        }
    };

    add_words(&src.octets());
    add_words(&dst.octets());
    add_words(&(icmp6.len() as u32).to_be_bytes());
    add_words(&[0, 0, 0, 58]); // next header: ICMPv6

    let mut checksummed = icmp6.to_vec();
    checksummed[2] = 0;
    checksummed[3] = 0;
    add_words(&checksummed);

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(n: u16) -> Ipv6Addr {
        Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, n)
    }

    #[test]
    fn solicitation_round_trips_target_and_option() {
        let mac = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
        let body = build_solicitation(&ip(2), Some(mac));
        let ns = parse_solicitation(ip(1), &body).unwrap();
        assert_eq!(ns.target, ip(2));
        assert_eq!(ns.source_link_layer, Some(mac));
    }

    #[test]
    fn advertisement_round_trips_flags_and_option() {
        let mac = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
        let body = build_advertisement(&ip(2), Some(mac), false, true, true);
        let na = parse_advertisement(ip(2), &body).unwrap();
        assert_eq!(na.target, ip(2));
        assert_eq!(na.target_link_layer, Some(mac));
        assert!(na.solicited);
        assert!(na.override_);
        assert!(!na.router);
    }

    #[test]
    fn checksum_is_stable_across_recomputation() {
        let body = build_solicitation(&ip(2), None);
        let a = icmp6_checksum(&ip(1), &ip(2), &body);
        let b = icmp6_checksum(&ip(1), &ip(2), &body);
        assert_eq!(a, b);
    }

    #[test]
    fn truncated_body_is_rejected() {
        assert!(parse_solicitation(ip(1), &[0u8; 4]).is_none());
    }

    #[test]
    fn router_advertisement_round_trips_prefix() {
        let prefix = Ipv6Addr::new(0x2001, 0xdb8, 1, 0, 0, 0, 0, 0);
        let body = build_router_advertisement(&prefix, 64, 1800);
        let (parsed_prefix, parsed_len) = find_prefix_information(&body).unwrap();
        assert_eq!(parsed_prefix, prefix);
        assert_eq!(parsed_len, 64);
    }

    #[test]
    fn router_advertisement_without_prefix_option_returns_none() {
        let mut body = [0u8; RA_FIXED_HEADER_LEN];
        body[0] = ICMP6_ROUTER_ADVERTISEMENT;
        assert!(find_prefix_information(&body).is_none());
    }
}

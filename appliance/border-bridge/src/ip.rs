//! EUI-64 SLAAC address derivation, kept verbatim from
//! `appliance-netman::ip::slaac_autoconfig_mac48`.

use std::net::Ipv6Addr;

pub fn slaac_autoconfig_mac48(mac: &[u8; 6], prefix: &Ipv6Addr) -> Ipv6Addr {
    const FIXED: [u8; 2] = [0xFF, 0xFE];

    let mut buf = prefix.octets();
    for (idx, octet) in buf[8..].iter_mut().enumerate() {
        *octet = match idx {
            0 => mac[idx] ^ 0x02,
            1 | 2 => mac[idx],
            3 | 4 => FIXED[idx - 3],
            5 | 6 | 7 => mac[idx - 2],
            _ => unreachable!(),
        };
    }
    buf.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_eui64_from_mac_and_prefix() {
        let mac = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];
        let prefix: Ipv6Addr = "fec0::".parse().unwrap();
        let address = slaac_autoconfig_mac48(&mac, &prefix);
        assert_eq!(address, "fec0::5054:ff:fe12:3456".parse::<Ipv6Addr>().unwrap());
    }
}

//! Minimal rtnetlink client used by the IP auto-configurator: list
//! interfaces (to learn the Wi-Fi MAC and ifindex), bring an interface up,
//! and add an address to it. Trimmed from `appliance-netman`'s netlink
//! module down to the three calls the IP auto-configurator needs.

use std::convert::TryInto;
use std::net::IpAddr;

use futures::StreamExt;
use netlink_packet_core::NetlinkPayload;
use netlink_packet_route::rtnl::address::nlas::Nla as AddressNla;
use netlink_packet_route::rtnl::constants::{AF_INET, AF_INET6, AF_UNSPEC, ARPHRD_NETROM, RT_SCOPE_UNIVERSE};
use netlink_packet_route::rtnl::link::nlas::Nla as LinkNla;
use netlink_packet_route::{
    AddressMessage, LinkMessage, NetlinkHeader, NetlinkMessage, RtnlMessage, IFF_UP,
    NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_REQUEST,
};
use netlink_proto::{new_connection, sys::protocols::NETLINK_ROUTE, sys::SocketAddr, ConnectionHandle};

#[derive(Clone, Debug, Default)]
pub struct InterfaceInfo {
    pub index: u32,
    pub name: String,
    pub mac: [u8; 6],
}

pub struct NetlinkClient {
    handle: ConnectionHandle<RtnlMessage>,
}

impl NetlinkClient {
    pub fn connect() -> anyhow::Result<NetlinkClient> {
        let (conn, handle, _unsolicited) = new_connection(NETLINK_ROUTE)?;
        tokio::spawn(conn);
        Ok(NetlinkClient { handle })
    }

    pub async fn find_interface(&mut self, name: &str) -> anyhow::Result<Option<InterfaceInfo>> {
        let request: NetlinkMessage<RtnlMessage> = NetlinkMessage {
            header: NetlinkHeader {
                flags: NLM_F_DUMP | NLM_F_REQUEST,
                ..Default::default()
            },
            payload: RtnlMessage::GetLink(LinkMessage::default()).into(),
        };

        let mut response = self.handle.request(request, SocketAddr::new(0, 0))?;
        while let Some(packet) = response.next().await {
            let link = match packet.payload {
                NetlinkPayload::InnerMessage(RtnlMessage::NewLink(link)) => link,
                _ => continue,
            };
            let mut ifname = String::new();
            let mut mac = [0u8; 6];
            for nla in &link.nlas {
                match nla {
                    LinkNla::IfName(n) => ifname = n.clone(),
                    LinkNla::Address(addr) if addr.len() == 6 => mac.copy_from_slice(addr),
                    _ => {}
                }
            }
            if ifname == name {
                return Ok(Some(InterfaceInfo {
                    index: link.header.index,
                    name: ifname,
                    mac,
                }));
            }
        }
        Ok(None)
    }

    pub async fn bring_up(&mut self, interface_index: u32) -> anyhow::Result<()> {
        let mut msg = LinkMessage::default();
        msg.header.interface_family = AF_UNSPEC.try_into().unwrap();
        msg.header.index = interface_index;
        msg.header.link_layer_type = ARPHRD_NETROM;
        msg.header.flags = IFF_UP;
        msg.header.change_mask = IFF_UP;

        let request: NetlinkMessage<RtnlMessage> = NetlinkMessage {
            header: NetlinkHeader {
                flags: NLM_F_REQUEST | NLM_F_ACK,
                ..Default::default()
            },
            payload: RtnlMessage::NewLink(msg).into(),
        };
        let mut response = self.handle.request(request, SocketAddr::new(0, 0))?;
        while response.next().await.is_some() {}
        Ok(())
    }

    pub async fn add_address(
        &mut self,
        interface_index: u32,
        address: IpAddr,
        prefix_len: u8,
    ) -> anyhow::Result<()> {
        let mut message = AddressMessage::default();
        let ip_bytes = match address {
            IpAddr::V4(v4) => {
                message.header.family = AF_INET as u8;
                v4.octets().to_vec()
            }
            IpAddr::V6(v6) => {
                message.header.family = AF_INET6 as u8;
                v6.octets().to_vec()
            }
        };
        message.header.prefix_len = prefix_len;
        message.header.scope = RT_SCOPE_UNIVERSE;
        message.header.index = interface_index;
        message.nlas.push(AddressNla::Local(ip_bytes.clone()));
        message.nlas.push(AddressNla::Address(ip_bytes));

        let request: NetlinkMessage<RtnlMessage> = NetlinkMessage {
            header: NetlinkHeader {
                flags: NLM_F_REQUEST | NLM_F_ACK | NLM_F_EXCL | NLM_F_CREATE,
                ..Default::default()
            },
            payload: RtnlMessage::NewAddress(message).into(),
        };
        let mut response = self.handle.request(request, SocketAddr::new(0, 0))?;
        while response.next().await.is_some() {}
        Ok(())
    }
}

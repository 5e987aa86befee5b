//! Socket setup and broadcast target selection
//!
//! Announcements go to the directed broadcast address of every IPv4,
//! non-loopback interface (`ip | !mask`). When no interface qualifies the
//! limited broadcast address `255.255.255.255` is used instead.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::error::{CollabError, CollabResult};

/// Compute the directed broadcast address of a subnet.
pub fn broadcast_address(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(mask))
}

/// One address assigned to a network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub name: String,
    pub is_loopback: bool,
    pub ip: IpAddr,
    /// Present for IPv4 addresses only
    pub netmask: Option<Ipv4Addr>,
}

impl From<if_addrs::Interface> for InterfaceAddr {
    fn from(iface: if_addrs::Interface) -> Self {
        let is_loopback = iface.is_loopback();
        let (ip, netmask) = match &iface.addr {
            if_addrs::IfAddr::V4(v4) => (IpAddr::V4(v4.ip), Some(v4.netmask)),
            if_addrs::IfAddr::V6(v6) => (IpAddr::V6(v6.ip), None),
        };
        Self {
            name: iface.name,
            is_loopback,
            ip,
            netmask,
        }
    }
}

/// Enumerate the host's interface addresses.
///
/// Enumeration failure is logged and treated as "no interfaces".
pub fn local_interfaces() -> Vec<InterfaceAddr> {
    match if_addrs::get_if_addrs() {
        Ok(ifaces) => ifaces.into_iter().map(InterfaceAddr::from).collect(),
        Err(e) => {
            warn!(error = ?e, "Failed to enumerate network interfaces");
            Vec::new()
        }
    }
}

/// Pick the broadcast addresses for `interfaces`: IPv4 only, loopback skipped,
/// duplicates removed, falling back to the limited broadcast address.
pub fn select_broadcast_addrs(interfaces: &[InterfaceAddr]) -> Vec<Ipv4Addr> {
    let mut addrs: Vec<Ipv4Addr> = Vec::new();

    for iface in interfaces.iter().filter(|i| !i.is_loopback) {
        let (IpAddr::V4(ip), Some(mask)) = (iface.ip, iface.netmask) else {
            continue;
        };
        let addr = broadcast_address(ip, mask);
        if !addrs.contains(&addr) {
            debug!(interface = %iface.name, %ip, broadcast = %addr, "Broadcast target");
            addrs.push(addr);
        }
    }

    if addrs.is_empty() {
        debug!("No usable IPv4 interfaces, falling back to limited broadcast");
        addrs.push(Ipv4Addr::BROADCAST);
    }
    addrs
}

/// Every address one announcement round is sent to.
pub fn announcement_targets(
    port: u16,
    broadcast: bool,
    static_peers: &[SocketAddr],
) -> Vec<SocketAddr> {
    let mut targets: Vec<SocketAddr> = Vec::new();
    if broadcast {
        targets.extend(
            select_broadcast_addrs(&local_interfaces())
                .into_iter()
                .map(|ip| SocketAddr::V4(SocketAddrV4::new(ip, port))),
        );
    }
    for peer in static_peers {
        if !targets.contains(peer) {
            targets.push(*peer);
        }
    }
    targets
}

/// Bind the receive socket on the discovery port.
///
/// `SO_REUSEADDR` lets several instances on one host share the port; each
/// of them receives every broadcast.
pub fn bind_listener(port: u16) -> CollabResult<UdpSocket> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    bind_udp(addr, true)
}

/// Bind an ephemeral, broadcast-enabled send socket.
pub fn bind_sender() -> CollabResult<UdpSocket> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    bind_udp(addr, false)
}

fn bind_udp(addr: SocketAddr, reuse: bool) -> CollabResult<UdpSocket> {
    let bind_err = |source: std::io::Error| CollabError::Bind { addr, source };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    if reuse {
        socket.set_reuse_address(true).map_err(bind_err)?;
    }
    socket.set_broadcast(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(bind_err)
}

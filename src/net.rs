use anyhow::{Error, Result};
use getifaddrs::{Address, Interface, InterfaceFlags, getifaddrs};
use ipnet::Ipv4Net;
use socket2::SockRef;
use std::{
    collections::BTreeSet,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket},
};

#[derive(Clone, Debug)]
pub struct NetworkInterface {
    pub name: String,
    #[cfg(target_os = "windows")]
    pub description: String,
    pub networks: Vec<Ipv4Net>,
    pub index: u32,
    pub flags: InterfaceFlags,
}

impl NetworkInterface {
    /// Directed broadcast address of the first IPv4 network on this interface.
    pub fn broadcast(&self) -> Option<Ipv4Addr> {
        self.networks
            .iter()
            .find(|net| net.prefix_len() < 31)
            .map(Ipv4Net::broadcast)
    }
}

fn ipv4_network(address: Ipv4Addr, netmask: Option<Ipv4Addr>) -> Ipv4Net {
    netmask
        .and_then(|mask| Ipv4Net::with_netmask(address, mask).ok())
        .unwrap_or_else(|| Ipv4Net::from(address))
}

pub fn get_interfaces() -> Result<Vec<NetworkInterface>> {
    let ifaces: Vec<Interface> = getifaddrs()?.collect();
    let mut tmp: BTreeSet<u32> = BTreeSet::new();
    let mut out: Vec<NetworkInterface> = Vec::new();
    for iface in ifaces.iter() {
        let index = match iface.index {
            Some(x) => x,
            None => continue,
        };
        if tmp.contains(&index) {
            continue;
        }
        tmp.insert(index);
        let networks: Vec<Ipv4Net> = ifaces
            .iter()
            .filter_map(|int| {
                if int.name != iface.name {
                    return None;
                }
                match int.address {
                    Address::V4(ref ip) => Some(ipv4_network(ip.address, ip.netmask)),
                    _ => None,
                }
            })
            .collect();
        out.push(NetworkInterface {
            name: iface.name.clone(),
            #[cfg(target_os = "windows")]
            description: iface.description.clone(),
            networks,
            index,
            flags: iface.flags,
        });
    }
    Ok(out)
}

/// Looks up an interface by name, or picks the first one that is up, not a
/// loopback, broadcast capable and carries an IPv4 address.
pub fn get_interface(name: Option<&str>) -> Result<Option<NetworkInterface>> {
    let ifaces = get_interfaces()?;
    Ok(match name {
        None => ifaces
            .iter()
            .find(|int| {
                int.flags.contains(InterfaceFlags::UP)
                    && !int.flags.contains(InterfaceFlags::LOOPBACK)
                    && int.flags.contains(InterfaceFlags::BROADCAST)
                    && !int.networks.is_empty()
            })
            .cloned(),
        Some(name) => ifaces.iter().find(|&int| int.name == name).cloned(),
    })
}

/// Resolves a host name or literal address, preferring IPv4 results since
/// broadcast only exists there.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let mut candidates: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    candidates.sort_by_key(|addr| addr.is_ipv6());
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::msg(format!("{host} did not resolve to any address")))
}

/// The subset of a UDP socket used to hand a datagram to the network stack.
pub trait DatagramSocket {
    fn set_broadcast(&self, broadcast: bool) -> io::Result<()>;
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
}

impl DatagramSocket for UdpSocket {
    fn set_broadcast(&self, broadcast: bool) -> io::Result<()> {
        SockRef::from(self).set_broadcast(broadcast)
    }

    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target)
    }
}

/// Constructs a fresh datagram socket for every send. The socket is closed
/// when the returned box is dropped.
pub trait SocketFactory: Send + Sync {
    fn create_socket(&self) -> Result<Box<dyn DatagramSocket>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UdpSocketFactory;

impl SocketFactory for UdpSocketFactory {
    fn create_socket(&self) -> Result<Box<dyn DatagramSocket>> {
        Ok(Box::new(new_sender_socket()?))
    }
}

pub fn new_sender_socket() -> Result<UdpSocket> {
    Ok(UdpSocket::bind(SocketAddr::new(
        IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        0,
    ))?)
}

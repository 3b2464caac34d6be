//! Wake-on-LAN magic packets.
//!
//! A magic packet is six `0xFF` bytes followed by the target's hardware
//! address repeated sixteen times, sent as a single UDP broadcast datagram
//! to port 9. There is no acknowledgement, so a send either reached the
//! network stack or it did not.

use std::{fmt, net::SocketAddr, str::FromStr};

use anyhow::{Result, ensure};
use log::{info, warn};

use crate::{
    Error,
    net::{SocketFactory, UdpSocketFactory, resolve},
};

/// Standard Wake-on-LAN destination port.
pub const WOL_PORT: u16 = 9;

const SYNC_STREAM: [u8; 6] = [0xFF; 6];
const REPETITIONS: usize = 16;

pub const MAGIC_PACKET_LEN: usize = SYNC_STREAM.len() + REPETITIONS * 6;

/// Accepts `xx:xx:xx:xx:xx:xx`, `xx-xx-xx-xx-xx-xx` or `xxxxxxxxxxxx`.
pub fn is_valid_mac_address(input: &str) -> bool {
    let bytes = input.as_bytes();
    match bytes.len() {
        12 => bytes.iter().all(u8::is_ascii_hexdigit),
        17 => bytes.chunks(3).all(|group| {
            group[0].is_ascii_hexdigit()
                && group[1].is_ascii_hexdigit()
                && (group.len() == 2 || matches!(group[2], b':' | b'-'))
        }),
        _ => false,
    }
}

/// Strips `:` and `-` separators. Does not validate.
pub fn clean_mac_address(input: &str) -> String {
    input.replace([':', '-'], "")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_valid_mac_address(s) {
            return Err(Error::InvalidMacAddress(s.to_owned()));
        }

        let clean = clean_mac_address(s);
        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&clean[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::InvalidMacAddress(s.to_owned()))?;
        }

        Ok(MacAddress(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MagicPacket([u8; MAGIC_PACKET_LEN]);

impl MagicPacket {
    pub fn new(mac: MacAddress) -> MagicPacket {
        let mut data = [0u8; MAGIC_PACKET_LEN];
        data[..SYNC_STREAM.len()].copy_from_slice(&SYNC_STREAM);
        for block in data[SYNC_STREAM.len()..].chunks_exact_mut(6) {
            block.copy_from_slice(&mac.octets());
        }
        MagicPacket(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl AsRef<[u8]> for MagicPacket {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

pub fn build_magic_packet(mac_address: &str) -> Result<MagicPacket, Error> {
    Ok(MagicPacket::new(mac_address.parse()?))
}

/// Sends magic packets through sockets obtained from `F`.
#[derive(Clone, Debug, Default)]
pub struct WakeOnLan<F = UdpSocketFactory> {
    factory: F,
}

impl WakeOnLan {
    pub fn new() -> WakeOnLan {
        Self::default()
    }
}

impl<F: SocketFactory> WakeOnLan<F> {
    pub fn with_socket_factory(factory: F) -> WakeOnLan<F> {
        WakeOnLan { factory }
    }

    /// Broadcasts one magic packet for `mac_address` to `broadcast_address`
    /// on port 9.
    ///
    /// A malformed MAC address is returned as an error before any socket is
    /// created. Every other failure is logged and reported as `Ok(false)`.
    pub fn send(&self, mac_address: &str, broadcast_address: &str) -> Result<bool, Error> {
        let packet = build_magic_packet(mac_address)?;

        match self.transmit(&packet, broadcast_address) {
            Ok(target) => {
                info!("Sent magic packet for {} to {}", mac_address, target);
                Ok(true)
            }
            Err(e) => {
                warn!(
                    "Unable to send magic packet to {} ({:#})",
                    broadcast_address, e
                );
                Ok(false)
            }
        }
    }

    fn transmit(&self, packet: &MagicPacket, broadcast_address: &str) -> Result<SocketAddr> {
        let target = resolve(broadcast_address, WOL_PORT)?;
        let socket = self.factory.create_socket()?;

        socket.set_broadcast(true)?;
        let sent = socket.send_to(packet.as_bytes(), target)?;
        ensure!(
            sent == packet.len(),
            "Short send ({} of {} bytes)",
            sent,
            packet.len()
        );

        Ok(target)
    }
}

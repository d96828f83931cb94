// network/packet.rs - Host packet record and checked header views

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::network::host::ProtocolId;
use crate::network::types::Direction;

const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;

/// A captured packet as handed over by the host.
///
/// The host owns the packet and fills in the buffer and offsets. Parsers only
/// write back the protocol tag, the direction and the session hash.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Raw captured bytes, starting at the link layer
    pub data: Vec<u8>,
    /// Offset of the network-layer header in `data`
    pub ip_offset: usize,
    /// Offset of the first byte after the network-layer header
    pub payload_offset: usize,
    /// Total packet length as seen on the wire
    pub pkt_len: usize,
    /// Length of the payload following `payload_offset`
    pub payload_len: usize,
    /// Network layer is IPv6
    pub v6: bool,
    /// Session protocol that claimed this packet
    pub protocol: Option<ProtocolId>,
    pub direction: Direction,
    /// Bucket hash of the session key
    pub hash: u32,
}

impl Packet {
    pub fn new(data: Vec<u8>, ip_offset: usize, payload_offset: usize, v6: bool) -> Self {
        let pkt_len = data.len();
        let payload_len = pkt_len.saturating_sub(payload_offset);
        Self {
            data,
            ip_offset,
            payload_offset,
            pkt_len,
            payload_len,
            v6,
            protocol: None,
            direction: Direction::Forward,
            hash: 0,
        }
    }

    /// IPv4 header view, if the buffer holds one at `ip_offset`
    pub fn ipv4_header(&self) -> Option<Ipv4Header<'_>> {
        self.data.get(self.ip_offset..).and_then(Ipv4Header::new)
    }

    /// IPv6 header view, if the buffer holds one at `ip_offset`
    pub fn ipv6_header(&self) -> Option<Ipv6Header<'_>> {
        self.data.get(self.ip_offset..).and_then(Ipv6Header::new)
    }

    /// Source and destination addresses according to the address-family flag
    pub fn addresses(&self) -> Option<(IpAddr, IpAddr)> {
        if self.v6 {
            let ip6 = self.ipv6_header()?;
            Some((IpAddr::V6(ip6.src()), IpAddr::V6(ip6.dst())))
        } else {
            let ip4 = self.ipv4_header()?;
            Some((IpAddr::V4(ip4.src()), IpAddr::V4(ip4.dst())))
        }
    }

    /// Payload bytes, clamped to what the buffer actually holds
    pub fn payload(&self) -> &[u8] {
        let start = self.payload_offset.min(self.data.len());
        let end = start.saturating_add(self.payload_len).min(self.data.len());
        &self.data[start..end]
    }
}

/// Zero-copy view over an IPv4 header
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Header<'a> {
    buf: &'a [u8],
}

impl<'a> Ipv4Header<'a> {
    /// Returns `None` unless `buf` holds at least a minimal IPv4 header
    pub fn new(buf: &'a [u8]) -> Option<Self> {
        if buf.len() < IPV4_MIN_HEADER_LEN {
            return None;
        }
        Some(Self { buf })
    }

    pub fn src_octets(&self) -> [u8; 4] {
        [self.buf[12], self.buf[13], self.buf[14], self.buf[15]]
    }

    pub fn dst_octets(&self) -> [u8; 4] {
        [self.buf[16], self.buf[17], self.buf[18], self.buf[19]]
    }

    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src_octets())
    }

    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst_octets())
    }
}

/// Zero-copy view over the fixed IPv6 header
#[derive(Debug, Clone, Copy)]
pub struct Ipv6Header<'a> {
    buf: &'a [u8],
}

impl<'a> Ipv6Header<'a> {
    /// Returns `None` unless `buf` holds the full 40-byte fixed header
    pub fn new(buf: &'a [u8]) -> Option<Self> {
        if buf.len() < IPV6_HEADER_LEN {
            return None;
        }
        Some(Self { buf })
    }

    pub fn src_octets(&self) -> [u8; 16] {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&self.buf[8..24]);
        octets
    }

    pub fn dst_octets(&self) -> [u8; 16] {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&self.buf[24..40]);
        octets
    }

    pub fn src(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.src_octets())
    }

    pub fn dst(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.dst_octets())
    }
}

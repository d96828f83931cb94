use std::fmt;

/// Direction of a packet relative to the session's first-seen address order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Source and destination match the session's addr1/addr2
    #[default]
    Forward = 0,
    Reverse = 1,
}

impl Direction {
    /// Index into per-direction counters
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Reverse => write!(f, "reverse"),
        }
    }
}

/// Address family of the network layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn from_v6_flag(v6: bool) -> Self {
        if v6 { AddressFamily::V6 } else { AddressFamily::V4 }
    }
}

/// Well-known ICMP (IPv4) message type names
pub fn icmp_type_name(icmp_type: u8) -> Option<&'static str> {
    let name = match icmp_type {
        0 => "Echo Reply",
        3 => "Destination Unreachable",
        4 => "Source Quench",
        5 => "Redirect",
        8 => "Echo Request",
        9 => "Router Advertisement",
        10 => "Router Solicitation",
        11 => "Time Exceeded",
        12 => "Parameter Problem",
        13 => "Timestamp",
        14 => "Timestamp Reply",
        17 => "Address Mask Request",
        18 => "Address Mask Reply",
        42 => "Extended Echo Request",
        43 => "Extended Echo Reply",
        _ => return None,
    };
    Some(name)
}

/// Well-known ICMPv6 message type names
pub fn icmpv6_type_name(icmp_type: u8) -> Option<&'static str> {
    let name = match icmp_type {
        1 => "Destination Unreachable",
        2 => "Packet Too Big",
        3 => "Time Exceeded",
        4 => "Parameter Problem",
        128 => "Echo Request",
        129 => "Echo Reply",
        130 => "Multicast Listener Query",
        131 => "Multicast Listener Report",
        132 => "Multicast Listener Done",
        133 => "Router Solicitation",
        134 => "Router Advertisement",
        135 => "Neighbor Solicitation",
        136 => "Neighbor Advertisement",
        137 => "Redirect",
        143 => "Multicast Listener Report v2",
        _ => return None,
    };
    Some(name)
}

/// Type name for the given family
pub fn type_name(family: AddressFamily, icmp_type: u8) -> Option<&'static str> {
    match family {
        AddressFamily::V4 => icmp_type_name(icmp_type),
        AddressFamily::V6 => icmpv6_type_name(icmp_type),
    }
}

//! Protocol session parsers
//!
//! Each parser registers itself with a [`ParserHost`](crate::network::host::ParserHost)
//! and then runs inside the host's packet path:
//! - ICMP (Internet Control Message Protocol)
//! - ICMPv6 (Internet Control Message Protocol for IPv6)

pub mod icmp;

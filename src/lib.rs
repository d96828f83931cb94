//! ICMP Sessions Library
//!
//! Classifies ICMP and ICMPv6 packets into bidirectional sessions for a
//! packet-capture host, and records the observed ICMP type and code values
//! against each session.

pub mod config;
pub mod network;

pub use config::Config;
pub use network::protocol::icmp::IcmpParser;

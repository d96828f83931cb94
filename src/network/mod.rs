//! Network-layer packet handling for the ICMP session parser

pub mod host;
pub mod packet;
pub mod protocol;
pub mod session;
pub mod types;

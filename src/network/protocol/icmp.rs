//! ICMP (Internet Control Message Protocol) session handling
//! Handles both ICMPv4 and ICMPv6
//!
//! ICMP has no ports, so a session is the unordered pair of endpoint
//! addresses. The first packet fixes the session's address order; every later
//! packet is classified as forward or reverse against it.

use anyhow::{Context, Result};
use log::{debug, info, trace};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::config::Config;
use crate::network::host::{
    FieldDefinition, FieldId, FieldStorage, IpCallback, PacketVerdict, ParserHost, ProtocolId,
    SessionProtocol,
};
use crate::network::packet::Packet;
use crate::network::session::{
    Session, SessionKey, session_hash, session_id4, session_id6, v4_to_v6, v6_to_v4,
};
use crate::network::types::{AddressFamily, Direction, type_name};

/// IP protocol number of ICMP
pub const IPPROTO_ICMP: u8 = 1;
/// IP protocol number of ICMPv6
pub const IPPROTO_ICMPV6: u8 = 58;

/// Tag added to every ICMP and ICMPv6 session
pub const PROTOCOL_NAME: &str = "icmp";

pub const TYPE_FIELD: &str = "icmp.type";
pub const CODE_FIELD: &str = "icmp.code";

/// Session key of an IPv4 address pair. Ports are always zero.
pub fn session_id_v4(src: Ipv4Addr, dst: Ipv4Addr) -> SessionKey {
    session_id4(src.octets(), 0, dst.octets(), 0)
}

/// Session key of an IPv6 address pair. Ports are always zero.
pub fn session_id_v6(src: &Ipv6Addr, dst: &Ipv6Addr) -> SessionKey {
    session_id6(&src.octets(), 0, &dst.octets(), 0)
}

/// Session key of an address pair, identical for (src, dst) and (dst, src)
///
/// Mixed families are keyed as IPv6 with the IPv4 side mapped.
pub fn derive_session_id(src: IpAddr, dst: IpAddr) -> SessionKey {
    match (src, dst) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => session_id_v4(src, dst),
        (IpAddr::V6(src), IpAddr::V6(dst)) => session_id_v6(&src, &dst),
        (IpAddr::V4(src), IpAddr::V6(dst)) => session_id_v6(&v4_to_v6(src), &dst),
        (IpAddr::V6(src), IpAddr::V4(dst)) => session_id_v6(&src, &v4_to_v6(dst)),
    }
}

/// Session key read from the packet's network header
fn packet_session_id(packet: &Packet, family: AddressFamily) -> Option<SessionKey> {
    match family {
        AddressFamily::V4 => {
            let ip4 = packet.ipv4_header()?;
            Some(session_id_v4(ip4.src(), ip4.dst()))
        }
        AddressFamily::V6 => {
            let ip6 = packet.ipv6_header()?;
            Some(session_id_v6(&ip6.src(), &ip6.dst()))
        }
    }
}

/// Classify a packet against the session's address order and count its bytes
///
/// Forward only when source and destination match addr1 and addr2 exactly;
/// everything else, including unreadable headers, is reverse.
pub fn classify_direction(
    session: &mut Session,
    packet: &mut Packet,
    family: AddressFamily,
) -> Direction {
    let forward = match family {
        AddressFamily::V4 => packet.ipv4_header().is_some_and(|ip4| {
            v6_to_v4(&session.addr1) == ip4.src_octets()
                && v6_to_v4(&session.addr2) == ip4.dst_octets()
        }),
        AddressFamily::V6 => packet.ipv6_header().is_some_and(|ip6| {
            session.addr1.octets() == ip6.src_octets() && session.addr2.octets() == ip6.dst_octets()
        }),
    };

    let direction = if forward {
        Direction::Forward
    } else {
        Direction::Reverse
    };
    packet.direction = direction;

    let bytes = packet.pkt_len.saturating_sub(packet.payload_offset) as u64;
    let counter = &mut session.databytes[direction.index()];
    *counter = counter.saturating_add(bytes);

    trace!("ICMP packet {} ({} bytes)", direction, bytes);
    direction
}

/// Handles of the fields the extractor writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpFields {
    pub type_field: FieldId,
    pub code_field: FieldId,
}

/// Record the ICMP type and code of a packet on its session
///
/// Payloads shorter than two bytes are skipped. Always returns true so the
/// host keeps feeding the session.
pub fn extract_fields(
    session: &mut Session,
    packet: &Packet,
    fields: &IcmpFields,
    family: AddressFamily,
) -> bool {
    if packet.payload_len < 2 {
        debug!("ICMP payload too short ({} bytes)", packet.payload_len);
        return true;
    }
    let Some(&[icmp_type, icmp_code]) = packet.payload().get(..2) else {
        debug!("ICMP payload extends past captured data");
        return true;
    };

    trace!(
        "ICMP type {} ({}) code {}",
        icmp_type,
        type_name(family, icmp_type).unwrap_or("unknown"),
        icmp_code
    );
    session.add_field_int(fields.type_field, u32::from(icmp_type));
    session.add_field_int(fields.code_field, u32::from(icmp_code));
    true
}

/// Session-binding callbacks for one address-family mode
///
/// `v6_only` is set for ICMPv6, where the header is always IPv6 regardless of
/// the packet's family flag.
struct IcmpSessionProtocol {
    name: &'static str,
    fields: IcmpFields,
    v6_only: bool,
}

impl IcmpSessionProtocol {
    fn family(&self, packet: &Packet) -> AddressFamily {
        if self.v6_only {
            AddressFamily::V6
        } else {
            AddressFamily::from_v6_flag(packet.v6)
        }
    }
}

impl SessionProtocol for IcmpSessionProtocol {
    fn name(&self) -> &str {
        self.name
    }

    fn create_session_id(&self, packet: &Packet) -> Option<SessionKey> {
        packet_session_id(packet, self.family(packet))
    }

    fn pre_process(&self, session: &mut Session, packet: &mut Packet, is_new_session: bool) {
        if is_new_session {
            session.add_protocol(PROTOCOL_NAME);
        }
        classify_direction(session, packet, self.family(packet));
    }

    fn process(&self, session: &mut Session, packet: &Packet) -> bool {
        extract_fields(session, packet, &self.fields, self.family(packet))
    }
}

/// Enqueue callback: tag the packet and hash its session key
struct IcmpEnqueue {
    protocol: ProtocolId,
    v6_only: bool,
}

impl IpCallback for IcmpEnqueue {
    /// Tags the packet and returns `Continue`. The single exception is a
    /// network header that cannot be read at `ip_offset`: the packet is left
    /// untagged and `Corrupt` is returned, since no session key exists for it.
    fn enqueue(&self, packet: &mut Packet) -> PacketVerdict {
        let family = if self.v6_only {
            AddressFamily::V6
        } else {
            AddressFamily::from_v6_flag(packet.v6)
        };

        let Some(key) = packet_session_id(packet, family) else {
            debug!(
                "ICMP: unreadable {:?} header at offset {} ({} bytes captured)",
                family,
                packet.ip_offset,
                packet.data.len()
            );
            return PacketVerdict::Corrupt;
        };

        packet.protocol = Some(self.protocol);
        packet.hash = session_hash(&key);
        trace!("ICMP: enqueued {:?} hash={:#010x}", key, packet.hash);
        PacketVerdict::Continue
    }
}

/// Handles obtained when the ICMP parser registered with its host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpParser {
    pub icmp: ProtocolId,
    pub icmpv6: ProtocolId,
    pub fields: IcmpFields,
}

impl IcmpParser {
    /// Declare the ICMP fields, register both session protocols and bind the
    /// enabled IP protocol numbers. Call once at startup, before any packet is
    /// dispatched.
    ///
    /// Registration is not rolled back: an error leaves the fields and session
    /// protocols declared on `host`, so a failure here ends startup and must
    /// not be retried against the same host.
    pub fn register<H: ParserHost>(host: &mut H, config: &Config) -> Result<Self> {
        let type_field = host
            .define_field(int_set_field(
                &config.field_category,
                TYPE_FIELD,
                "ICMP Type",
                "ICMP type field values",
            ))
            .context("Failed to define ICMP type field")?;
        let code_field = host
            .define_field(int_set_field(
                &config.field_category,
                CODE_FIELD,
                "ICMP Code",
                "ICMP code field values",
            ))
            .context("Failed to define ICMP code field")?;
        let fields = IcmpFields {
            type_field,
            code_field,
        };

        let icmp = host.register_session_protocol(Arc::new(IcmpSessionProtocol {
            name: "icmp",
            fields,
            v6_only: false,
        }));
        let icmpv6 = host.register_session_protocol(Arc::new(IcmpSessionProtocol {
            name: "icmpv6",
            fields,
            v6_only: true,
        }));

        if config.icmp {
            host.set_ip_callback(
                IPPROTO_ICMP,
                Arc::new(IcmpEnqueue {
                    protocol: icmp,
                    v6_only: false,
                }),
            )
            .context("Failed to bind ICMP")?;
        } else {
            info!("ICMP dispatch disabled by configuration");
        }

        if config.icmpv6 {
            host.set_ip_callback(
                IPPROTO_ICMPV6,
                Arc::new(IcmpEnqueue {
                    protocol: icmpv6,
                    v6_only: true,
                }),
            )
            .context("Failed to bind ICMPv6")?;
        } else {
            info!("ICMPv6 dispatch disabled by configuration");
        }

        Ok(Self {
            icmp,
            icmpv6,
            fields,
        })
    }
}

fn int_set_field(category: &str, expression: &str, label: &str, help: &str) -> FieldDefinition {
    FieldDefinition {
        category: category.to_string(),
        kind: "integer".to_string(),
        expression: expression.to_string(),
        friendly_name: label.to_string(),
        db_field: expression.to_string(),
        help: help.to_string(),
        storage: FieldStorage::IntSet,
        flags: 0,
    }
}

// network/session.rs - Session keys and the host-side session record

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::network::host::FieldId;

/// Size of the session key buffer, large enough for an IPv6 key
pub const SESSION_ID_LEN: usize = 37;

const SESSION_ID4_LEN: u8 = 13;
const SESSION_ID6_LEN: u8 = 37;

/// Canonical, order-independent session key
///
/// Byte 0 holds the used length. The lower (address, port) endpoint is
/// written first so both directions of a flow produce the same key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey([u8; SESSION_ID_LEN]);

impl SessionKey {
    /// The used portion of the key, including the length byte
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..self.0[0] as usize]
    }

    pub fn is_v6(&self) -> bool {
        self.0[0] == SESSION_ID6_LEN
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey(")?;
        for byte in &self.as_bytes()[1..] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// Build an IPv4 session key
pub fn session_id4(addr1: [u8; 4], port1: u16, addr2: [u8; 4], port2: u16) -> SessionKey {
    let mut key = [0u8; SESSION_ID_LEN];
    key[0] = SESSION_ID4_LEN;

    let ((lo_addr, lo_port), (hi_addr, hi_port)) = if (addr1, port1) <= (addr2, port2) {
        ((addr1, port1), (addr2, port2))
    } else {
        ((addr2, port2), (addr1, port1))
    };

    key[1..5].copy_from_slice(&lo_addr);
    key[5..7].copy_from_slice(&lo_port.to_be_bytes());
    key[7..11].copy_from_slice(&hi_addr);
    key[11..13].copy_from_slice(&hi_port.to_be_bytes());
    SessionKey(key)
}

/// Build an IPv6 session key
pub fn session_id6(addr1: &[u8; 16], port1: u16, addr2: &[u8; 16], port2: u16) -> SessionKey {
    let mut key = [0u8; SESSION_ID_LEN];
    key[0] = SESSION_ID6_LEN;

    let ((lo_addr, lo_port), (hi_addr, hi_port)) = if (addr1, port1) <= (addr2, port2) {
        ((addr1, port1), (addr2, port2))
    } else {
        ((addr2, port2), (addr1, port1))
    };

    key[1..17].copy_from_slice(lo_addr);
    key[17..19].copy_from_slice(&lo_port.to_be_bytes());
    key[19..35].copy_from_slice(hi_addr);
    key[35..37].copy_from_slice(&hi_port.to_be_bytes());
    SessionKey(key)
}

/// Bucket hash for a session key
///
/// Folds the used key bytes into 32-bit words. Only depends on the key, so
/// both directions of a flow land in the same bucket.
pub fn session_hash(key: &SessionKey) -> u32 {
    let bytes = &key.as_bytes()[1..];
    let mut hash: u32 = bytes.len() as u32;
    for chunk in bytes.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        hash = hash.rotate_left(5) ^ u32::from_be_bytes(word);
        hash = hash.wrapping_mul(0x9e37_79b1);
    }
    hash
}

/// IPv4 address stored in the IPv4-mapped IPv6 form sessions use
pub fn v4_to_v6(addr: Ipv4Addr) -> Ipv6Addr {
    addr.to_ipv6_mapped()
}

/// Lower 32 bits of a session address
pub fn v6_to_v4(addr: &Ipv6Addr) -> [u8; 4] {
    let octets = addr.octets();
    [octets[12], octets[13], octets[14], octets[15]]
}

/// Host session record
///
/// Only the fields parsers touch are modelled here. The host serializes
/// access to a session, so everything takes `&mut self`.
#[derive(Debug, Clone)]
pub struct Session {
    /// Source address of the first packet
    pub addr1: Ipv6Addr,
    /// Destination address of the first packet
    pub addr2: Ipv6Addr,
    pub databytes: [u64; 2],
    protocols: HashSet<String>,
    fields: HashMap<FieldId, BTreeSet<u32>>,
}

impl Session {
    /// Create a session with its reference address order. IPv4 addresses are
    /// stored IPv4-mapped.
    pub fn new(addr1: IpAddr, addr2: IpAddr) -> Self {
        let to_v6 = |addr: IpAddr| match addr {
            IpAddr::V4(v4) => v4_to_v6(v4),
            IpAddr::V6(v6) => v6,
        };
        Self {
            addr1: to_v6(addr1),
            addr2: to_v6(addr2),
            databytes: [0; 2],
            protocols: HashSet::new(),
            fields: HashMap::new(),
        }
    }

    /// Tag the session with a protocol name. Returns false if already present.
    pub fn add_protocol(&mut self, name: &str) -> bool {
        if self.protocols.contains(name) {
            return false;
        }
        self.protocols.insert(name.to_string())
    }

    pub fn has_protocol(&self, name: &str) -> bool {
        self.protocols.contains(name)
    }

    pub fn protocols(&self) -> impl Iterator<Item = &str> {
        self.protocols.iter().map(String::as_str)
    }

    /// Add a value to an integer-set field. Returns false if already present.
    pub fn add_field_int(&mut self, field: FieldId, value: u32) -> bool {
        self.fields.entry(field).or_default().insert(value)
    }

    /// Values recorded for a field, empty if none
    pub fn field_ints(&self, field: FieldId) -> Vec<u32> {
        self.fields
            .get(&field)
            .map(|values| values.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id4_order_independent() {
        let a = [10, 0, 0, 1];
        let b = [10, 0, 0, 2];
        assert_eq!(session_id4(a, 0, b, 0), session_id4(b, 0, a, 0));
        assert_eq!(session_id4(a, 0, b, 0).as_bytes().len(), 13);
    }

    #[test]
    fn test_session_id4_layout() {
        let key = session_id4([10, 0, 0, 2], 0, [10, 0, 0, 1], 0);
        assert_eq!(
            key.as_bytes(),
            &[13, 10, 0, 0, 1, 0, 0, 10, 0, 0, 2, 0, 0]
        );
    }

    #[test]
    fn test_session_id4_same_address_orders_by_port() {
        let a = [192, 168, 1, 1];
        assert_eq!(session_id4(a, 80, a, 1024), session_id4(a, 1024, a, 80));
        let key = session_id4(a, 1024, a, 80);
        assert_eq!(&key.as_bytes()[5..7], &80u16.to_be_bytes());
    }

    #[test]
    fn test_session_id6_order_independent() {
        let a = "2001:db8::1".parse::<Ipv6Addr>().unwrap().octets();
        let b = "2001:db8::2".parse::<Ipv6Addr>().unwrap().octets();
        let key = session_id6(&a, 0, &b, 0);
        assert_eq!(key, session_id6(&b, 0, &a, 0));
        assert!(key.is_v6());
        assert_eq!(key.as_bytes().len(), SESSION_ID_LEN);
    }

    #[test]
    fn test_v4_and_mapped_v6_keys_differ() {
        let a = Ipv4Addr::new(10, 0, 0, 1);
        let b = Ipv4Addr::new(10, 0, 0, 2);
        let key4 = session_id4(a.octets(), 0, b.octets(), 0);
        let key6 = session_id6(&v4_to_v6(a).octets(), 0, &v4_to_v6(b).octets(), 0);
        assert_ne!(key4, key6);
    }

    #[test]
    fn test_session_hash_follows_key() {
        let a = [10, 0, 0, 1];
        let b = [10, 0, 0, 2];
        let c = [10, 0, 0, 3];
        assert_eq!(
            session_hash(&session_id4(a, 0, b, 0)),
            session_hash(&session_id4(b, 0, a, 0))
        );
        assert_ne!(
            session_hash(&session_id4(a, 0, b, 0)),
            session_hash(&session_id4(a, 0, c, 0))
        );
    }

    #[test]
    fn test_v6_to_v4_round_trip() {
        let addr = Ipv4Addr::new(172, 16, 5, 4);
        assert_eq!(v6_to_v4(&v4_to_v6(addr)), addr.octets());
    }

    #[test]
    fn test_add_protocol_idempotent() {
        let mut session = Session::new("10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap());
        assert!(session.add_protocol("icmp"));
        assert!(!session.add_protocol("icmp"));
        assert_eq!(session.protocols().count(), 1);
        assert!(session.has_protocol("icmp"));
    }

    #[test]
    fn test_field_ints_accumulate_as_set() {
        let mut session = Session::new("10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap());
        let field = FieldId(0);
        assert!(session.field_ints(field).is_empty());
        assert!(session.add_field_int(field, 8));
        assert!(session.add_field_int(field, 0));
        assert!(!session.add_field_int(field, 8));
        assert_eq!(session.field_ints(field), vec![0, 8]);
    }

    #[test]
    fn test_session_stores_v4_mapped() {
        let session = Session::new("10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap());
        assert_eq!(session.addr1, "::ffff:10.0.0.1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(v6_to_v4(&session.addr2), [10, 0, 0, 2]);
    }
}

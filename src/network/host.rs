//! Host collaborator contract
//!
//! Protocol parsers plug into the capture host through three registration
//! points: an IP-protocol dispatch table consulted at enqueue time, a table of
//! session protocols driving session binding, and a field registry declaring
//! the attributes parsers record on sessions.
//!
//! [`Registry`] is an in-memory host implementing all three. It does not own
//! sessions; the caller keeps its own session table and hands sessions in.

use anyhow::{Result, bail};
use log::{debug, info};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::network::packet::Packet;
use crate::network::session::{Session, SessionKey};

/// Handle returned by session protocol registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolId(pub usize);

/// Handle returned by field declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub usize);

/// What the host should do with a packet after enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketVerdict {
    /// Continue with session binding
    Continue,
    /// Headers could not be read
    Corrupt,
    /// No callback for this IP protocol
    Unhandled,
}

/// How a field stores its values on a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStorage {
    /// Distinct integers, accumulated across packets
    IntSet,
}

impl fmt::Display for FieldStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldStorage::IntSet => write!(f, "int-set"),
        }
    }
}

/// Declaration of an output field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Grouping used by the output stage, e.g. "general"
    pub category: String,
    /// Value kind shown to users, e.g. "integer"
    pub kind: String,
    /// Stable external name, e.g. "icmp.type"
    pub expression: String,
    pub friendly_name: String,
    pub db_field: String,
    pub help: String,
    pub storage: FieldStorage,
    pub flags: u32,
}

/// Enqueue entry point bound to an IP protocol number
pub trait IpCallback: Send + Sync {
    fn enqueue(&self, packet: &mut Packet) -> PacketVerdict;
}

/// Session-binding entry points of a protocol
pub trait SessionProtocol: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Key the session this packet belongs to
    fn create_session_id(&self, packet: &Packet) -> Option<SessionKey>;

    /// Runs for every packet once the session is known, before `process`
    fn pre_process(&self, session: &mut Session, packet: &mut Packet, is_new_session: bool);

    /// Returns true while the protocol wants to keep seeing packets
    fn process(&self, session: &mut Session, packet: &Packet) -> bool;
}

/// Registration surface a host exposes to parsers
pub trait ParserHost {
    fn set_ip_callback(&mut self, ip_protocol: u8, callback: Arc<dyn IpCallback>) -> Result<()>;

    fn register_session_protocol(&mut self, protocol: Arc<dyn SessionProtocol>) -> ProtocolId;

    fn define_field(&mut self, definition: FieldDefinition) -> Result<FieldId>;
}

/// In-memory host
///
/// Built once at startup, then shared read-only between packet workers.
pub struct Registry {
    ip_callbacks: Vec<Option<Arc<dyn IpCallback>>>,
    protocols: Vec<Arc<dyn SessionProtocol>>,
    fields: Vec<FieldDefinition>,
    field_index: HashMap<String, FieldId>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            ip_callbacks: vec![None; 256],
            protocols: Vec::new(),
            fields: Vec::new(),
            field_index: HashMap::new(),
        }
    }

    /// Run the enqueue callback bound to `ip_protocol`
    pub fn enqueue(&self, ip_protocol: u8, packet: &mut Packet) -> PacketVerdict {
        match &self.ip_callbacks[ip_protocol as usize] {
            Some(callback) => callback.enqueue(packet),
            None => {
                debug!("No callback registered for IP protocol {}", ip_protocol);
                PacketVerdict::Unhandled
            }
        }
    }

    pub fn has_ip_callback(&self, ip_protocol: u8) -> bool {
        self.ip_callbacks[ip_protocol as usize].is_some()
    }

    pub fn protocol(&self, id: ProtocolId) -> Option<&Arc<dyn SessionProtocol>> {
        self.protocols.get(id.0)
    }

    /// Session key of a packet, using the protocol it was tagged with
    pub fn session_id(&self, packet: &Packet) -> Option<SessionKey> {
        let protocol = self.protocol(packet.protocol?)?;
        protocol.create_session_id(packet)
    }

    /// Run pre-process then process for a packet already bound to `session`.
    /// Returns the result of process, or false for an untagged packet.
    pub fn bind(&self, session: &mut Session, packet: &mut Packet, is_new_session: bool) -> bool {
        let Some(protocol) = packet.protocol.and_then(|id| self.protocol(id)) else {
            debug!("Packet carries no registered protocol, skipping bind");
            return false;
        };
        protocol.pre_process(session, packet, is_new_session);
        protocol.process(session, packet)
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldDefinition> {
        self.fields.get(id.0)
    }

    pub fn field_by_expression(&self, expression: &str) -> Option<FieldId> {
        self.field_index.get(expression).copied()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

impl ParserHost for Registry {
    fn set_ip_callback(&mut self, ip_protocol: u8, callback: Arc<dyn IpCallback>) -> Result<()> {
        let slot = &mut self.ip_callbacks[ip_protocol as usize];
        if slot.is_some() {
            bail!("IP protocol {} already has a callback", ip_protocol);
        }
        *slot = Some(callback);
        info!("Registered enqueue callback for IP protocol {}", ip_protocol);
        Ok(())
    }

    fn register_session_protocol(&mut self, protocol: Arc<dyn SessionProtocol>) -> ProtocolId {
        let id = ProtocolId(self.protocols.len());
        info!("Registered session protocol {} as {:?}", protocol.name(), id);
        self.protocols.push(protocol);
        id
    }

    fn define_field(&mut self, definition: FieldDefinition) -> Result<FieldId> {
        if self.field_index.contains_key(&definition.expression) {
            bail!("Field {} is already defined", definition.expression);
        }
        let id = FieldId(self.fields.len());
        info!(
            "Defined field {} ({}, {}) as {:?}",
            definition.expression, definition.kind, definition.storage, id
        );
        self.field_index.insert(definition.expression.clone(), id);
        self.fields.push(definition);
        Ok(id)
    }
}

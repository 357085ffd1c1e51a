//! DPVS data types: byte-order values, service keys and operator specs.

use common::{Error, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::commands::ipproto;

/// An IPv4 address held in network byte order.
///
/// The inner value is the big-endian byte sequence reinterpreted in host
/// order, which is how the engine keeps a `__be32` in memory. The raw bytes
/// of the inner value are therefore always `a.b.c.d` in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(u32);

impl Address {
    /// The "unset" sentinel used by list filters.
    pub const UNSET: Address = Address(0);

    pub fn from_ipv4(ip: Ipv4Addr) -> Self {
        Address(u32::from(ip).to_be())
    }

    pub fn to_ipv4(self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from_be(self.0))
    }

    /// Wrap a value that is already in network byte order.
    pub fn from_network(raw: u32) -> Self {
        Address(raw)
    }

    /// The network-order value, as transmitted to the engine.
    pub fn to_network(self) -> u32 {
        self.0
    }

    /// Address bytes in wire order.
    pub fn octets(self) -> [u8; 4] {
        self.0.to_ne_bytes()
    }

    pub fn is_unset(self) -> bool {
        self.0 == 0
    }

    /// Parse a concrete dotted-decimal address. Empty text is an error.
    pub fn parse(text: &str) -> Result<Self> {
        let mut octets = [0u8; 4];
        let mut parts = text.split('.');

        for octet in &mut octets {
            let part = parts
                .next()
                .ok_or_else(|| Error::syntax(format!("expect 192.168.0.1, got {text:?}")))?;
            *octet = parse_octet(part)
                .ok_or_else(|| Error::syntax(format!("expect 192.168.0.1, got {text:?}")))?;
        }

        if parts.next().is_some() {
            return Err(Error::syntax(format!("expect 192.168.0.1, got {text:?}")));
        }

        Ok(Address::from_ipv4(Ipv4Addr::from(octets)))
    }

    /// Parse an address for filter contexts, where empty text means unset.
    pub fn parse_filter(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Address::UNSET);
        }
        Address::parse(text)
    }
}

// Leading zeros are decimal, so "010" is ten.
fn parse_octet(part: &str) -> Option<u8> {
    if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse::<u16>().ok().and_then(|v| u8::try_from(v).ok())
}

impl From<Ipv4Addr> for Address {
    fn from(ip: Ipv4Addr) -> Self {
        Address::from_ipv4(ip)
    }
}

impl From<Address> for Ipv4Addr {
    fn from(addr: Address) -> Self {
        addr.to_ipv4()
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets();
        // pad() keeps width/alignment flags working for table columns
        f.pad(&format!("{a}.{b}.{c}.{d}"))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(WireIntVisitor { bits: 32 }).map(|v| Address(v as u32))
    }
}

/// A port held in network byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Port(u16);

impl Port {
    pub const UNSET: Port = Port(0);

    pub fn new(port: u16) -> Self {
        Port(port.to_be())
    }

    /// The port number in host order.
    pub fn get(self) -> u16 {
        u16::from_be(self.0)
    }

    pub fn from_network(raw: u16) -> Self {
        Port(raw)
    }

    pub fn to_network(self) -> u16 {
        self.0
    }

    pub fn octets(self) -> [u8; 2] {
        self.0.to_ne_bytes()
    }

    /// Parse a decimal port in 0..=65535. Empty text is an error.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::syntax(format!("expect a port number, got {text:?}")));
        }
        text.parse::<u16>()
            .map(Port::new)
            .map_err(|_| Error::syntax(format!("port out of range: {text}")))
    }

    pub fn parse_filter(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Port::UNSET);
        }
        Port::parse(text)
    }
}

impl From<u16> for Port {
    fn from(port: u16) -> Self {
        Port::new(port)
    }
}

impl FromStr for Port {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Port::parse(s)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.get(), f)
    }
}

impl Serialize for Port {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.0)
    }
}

impl<'de> Deserialize<'de> for Port {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(WireIntVisitor { bits: 16 }).map(|v| Port(v as u16))
    }
}

/// Accepts unsigned values that fit in `bits`, and negative values that fit
/// the signed type of the same width (the engine emits `__be32` as `int`).
struct WireIntVisitor {
    bits: u32,
}

impl Visitor<'_> for WireIntVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a {}-bit integer", self.bits)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<u64, E> {
        if v >> self.bits != 0 {
            return Err(E::custom(format!("{v} does not fit in {} bits", self.bits)));
        }
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<u64, E> {
        if v >= 0 {
            return self.visit_u64(v as u64);
        }
        let min = -(1i64 << (self.bits - 1));
        if v < min {
            return Err(E::custom(format!("{v} does not fit in {} bits", self.bits)));
        }
        Ok((v as u64) & ((1u64 << self.bits) - 1))
    }
}

/// An (address, port) pair. An unset address means "every endpoint".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Endpoint {
    pub addr: Address,
    pub port: Port,
}

impl Endpoint {
    pub const UNSET: Endpoint = Endpoint {
        addr: Address::UNSET,
        port: Port::UNSET,
    };

    pub fn new(addr: impl Into<Address>, port: impl Into<Port>) -> Self {
        Self {
            addr: addr.into(),
            port: port.into(),
        }
    }

    pub fn is_unset(&self) -> bool {
        self.addr.is_unset()
    }

    /// Parse `host[:port]`. A missing port is zero.
    pub fn parse(text: &str) -> Result<Self> {
        let (host, port) = match text.split_once(':') {
            Some((host, port)) => (host, Port::parse(port)?),
            None => (text, Port::UNSET),
        };
        let addr = Address::parse(host)
            .map_err(|_| Error::syntax(format!("expect 192.168.0.1 or 192.168.0.1:80, got {text:?}")))?;
        Ok(Self { addr, port })
    }

    /// Like [`Endpoint::parse`], with empty text meaning unset.
    pub fn parse_filter(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Endpoint::UNSET);
        }
        Endpoint::parse(text)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Endpoint::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{}:{}", self.addr, self.port))
    }
}

/// Transport protocol accepted on the command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// IANA protocol number.
    pub fn number(self) -> u8 {
        match self {
            Protocol::Tcp => ipproto::TCP,
            Protocol::Udp => ipproto::UDP,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            ipproto::TCP => Some(Protocol::Tcp),
            ipproto::UDP => Some(Protocol::Udp),
            _ => None,
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(Error::syntax(format!("expect tcp or udp, got {s:?}"))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(protocol_name(self.number()))
    }
}

/// Display name for a raw protocol number from a reply.
pub fn protocol_name(n: u8) -> &'static str {
    match Protocol::from_number(n) {
        Some(Protocol::Tcp) => "tcp",
        Some(Protocol::Udp) => "udp",
        None => "unknown",
    }
}

/// Identifies a virtual service: protocol plus virtual endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub protocol: Protocol,
    pub endpoint: Endpoint,
}

impl ServiceKey {
    pub fn new(protocol: Protocol, endpoint: Endpoint) -> Self {
        Self { protocol, endpoint }
    }
}

impl FromStr for ServiceKey {
    type Err = Error;

    /// Parse `protocol:address[:port]`, e.g. `tcp:10.0.0.1:80`.
    fn from_str(s: &str) -> Result<Self> {
        let (protocol, endpoint) = s
            .split_once(':')
            .ok_or_else(|| Error::syntax(format!("expect tcp:192.168.0.1[:80], got {s:?}")))?;
        Ok(Self {
            protocol: protocol.parse()?,
            endpoint: Endpoint::parse(endpoint)?,
        })
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.endpoint)
    }
}

/// Service flags for DPVS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceFlags(pub u32);

impl ServiceFlags {
    pub const PERSISTENT: u32 = 0x0001;
    pub const HASHED: u32 = 0x0002;
    pub const ONE_PACKET: u32 = 0x0004;
    pub const DSNAT: u32 = ConnFlags::DSNAT;
    pub const SYNPROXY: u32 = ConnFlags::SYNPROXY;
    pub const MASK: u32 = Self::PERSISTENT | Self::ONE_PACKET | Self::SYNPROXY | Self::DSNAT;
}

/// Connection flags for destinations. The low nibble selects the
/// forwarding method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnFlags(pub u32);

impl ConnFlags {
    pub const FWD_MASK: u32 = 0x000f;
    pub const MASQ: u32 = 0x0000;
    pub const LOCALNODE: u32 = 0x0001;
    pub const TUNNEL: u32 = 0x0002;
    pub const DROUTE: u32 = 0x0003;
    pub const BYPASS: u32 = 0x0004;
    pub const FULLNAT: u32 = 0x0005;
    pub const DSNAT: u32 = 0x0008;
    pub const SYNC: u32 = 0x0020;
    pub const HASHED: u32 = 0x0040;
    pub const NOOUTPUT: u32 = 0x0080;
    pub const INACTIVE: u32 = 0x0100;
    pub const OUT_SEQ: u32 = 0x0200;
    pub const IN_SEQ: u32 = 0x0400;
    pub const SEQ_MASK: u32 = 0x0600;
    pub const NO_CPORT: u32 = 0x0800;
    pub const TEMPLATE: u32 = 0x1000;
    pub const ONE_PACKET: u32 = 0x2000;
    pub const SYNPROXY: u32 = 0x8000;

    /// Forwarding method bits.
    pub fn forward_method(self) -> u32 {
        self.0 & Self::FWD_MASK
    }

    /// Apply FULLNAT when no forwarding method was chosen.
    pub fn with_default_forward(self) -> Self {
        if self.forward_method() == Self::MASQ {
            ConnFlags(self.0 | Self::FULLNAT)
        } else {
            self
        }
    }
}

/// Everything needed to add or edit a virtual service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub key: ServiceKey,
    /// Interface the service address is bound to.
    pub nic: u8,
    pub scheduler: String,
    pub flags: ServiceFlags,
    /// Persistence timeout in seconds.
    pub timeout: u32,
    pub netmask: Address,
}

impl ServiceSpec {
    pub fn new(key: ServiceKey) -> Self {
        Self {
            key,
            nic: 0,
            scheduler: "rr".to_string(),
            flags: ServiceFlags::default(),
            timeout: 0,
            netmask: Address::UNSET,
        }
    }
}

/// A real server behind a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestSpec {
    pub endpoint: Endpoint,
    pub nic: u8,
    pub conn_flags: ConnFlags,
    pub weight: i32,
    pub upper_threshold: u32,
    pub lower_threshold: u32,
}

impl DestSpec {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            nic: 0,
            conn_flags: ConnFlags::default(),
            weight: 0,
            upper_threshold: 0,
            lower_threshold: 0,
        }
    }
}

/// A local (NAT) address bound to an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaddrSpec {
    pub nic: u8,
    pub addr: Address,
}

/// TCP, TCP-FIN and UDP timeouts in seconds. Always read or set together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeoutSet {
    pub tcp: i32,
    pub tcp_fin: i32,
    pub udp: i32,
}

impl FromStr for TimeoutSet {
    type Err = Error;

    /// Parse `tcp,tcp_fin,udp`, e.g. `900,120,300`.
    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split(',').collect();
        let [tcp, tcp_fin, udp] = fields.as_slice() else {
            return Err(Error::syntax(format!("expect '1,3,5' (seconds), got {s:?}")));
        };
        let field = |v: &str| {
            v.trim()
                .parse::<i32>()
                .map_err(|_| Error::syntax(format!("expect '1,3,5' (seconds), got {s:?}")))
        };
        Ok(Self {
            tcp: field(tcp)?,
            tcp_fin: field(tcp_fin)?,
            udp: field(udp)?,
        })
    }
}

impl fmt::Display for TimeoutSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp:{} tcp_fin:{} udp:{}", self.tcp, self.tcp_fin, self.udp)
    }
}

/// Engine version information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub conn_table_size: i32,
}

impl VersionInfo {
    /// Unpack `major << 16 | minor << 8 | patch`.
    pub fn from_packed(version: i32, conn_table_size: i32) -> Self {
        let v = version as u32;
        Self {
            major: (v >> 16) & 0xff,
            minor: (v >> 8) & 0xff,
            patch: v & 0xff,
            conn_table_size,
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version\t\t{}.{}.{}\nconn table size\t{}",
            self.major, self.minor, self.patch, self.conn_table_size
        )
    }
}

//! Network-flow adapters: connection 5-tuples and per-connection counters.

use crate::object::{HashObject, ObjectType};
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::AddAssign;
use std::net::Ipv4Addr;

/// An undirected IPv4 connection 5-tuple.
///
/// `a:p -> b:q` and `b:q -> a:p` are the same connection: comparison,
/// equality, hashing and marshalling all go through the canonical form,
/// which places the lower (address, port) endpoint first.
#[derive(Copy, Clone, Debug, Default)]
pub struct Connection {
    pub src_addr: u32,
    pub dst_addr: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

impl Connection {
    pub fn new(src_addr: u32, src_port: u16, dst_addr: u32, dst_port: u16, protocol: u8) -> Self {
        Self {
            src_addr,
            dst_addr,
            src_port,
            dst_port,
            protocol,
        }
    }

    pub fn from_ipv4(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16, protocol: u8) -> Self {
        Self::new(src.into(), src_port, dst.into(), dst_port, protocol)
    }

    /// The same flow seen from the other side.
    pub fn reversed(&self) -> Self {
        Self::new(
            self.dst_addr,
            self.dst_port,
            self.src_addr,
            self.src_port,
            self.protocol,
        )
    }

    /// Whether source and destination must be exchanged to reach the
    /// canonical form.
    pub fn should_swap(&self) -> bool {
        match self.src_addr.cmp(&self.dst_addr) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.src_port > self.dst_port,
        }
    }

    /// `(low_addr, high_addr, low_port, high_port, protocol)`.
    pub fn canonical(&self) -> (u32, u32, u16, u16, u8) {
        if self.should_swap() {
            (
                self.dst_addr,
                self.src_addr,
                self.dst_port,
                self.src_port,
                self.protocol,
            )
        } else {
            (
                self.src_addr,
                self.dst_addr,
                self.src_port,
                self.dst_port,
                self.protocol,
            )
        }
    }
}

fn marshal_tuple(out: &mut [u8], (a1, a2, p1, p2, proto): (u32, u32, u16, u16, u8)) {
    let ports = (u32::from(p1) << 16) | u32::from(p2);
    out[0..4].copy_from_slice(&a1.to_be_bytes());
    out[4..8].copy_from_slice(&a2.to_be_bytes());
    out[8..12].copy_from_slice(&ports.to_be_bytes());
    out[12] = proto;
}

impl HashObject for Connection {
    const TYPE: ObjectType = ObjectType::Connection;

    fn compare(&self, other: &Self) -> Ordering {
        self.canonical().cmp(&other.canonical())
    }

    fn marshal_into(&self, out: &mut [u8]) {
        marshal_tuple(out, self.canonical());
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Connection {}

impl PartialOrd for Connection {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Connection {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            Ipv4Addr::from(self.src_addr),
            self.src_port,
            Ipv4Addr::from(self.dst_addr),
            self.dst_port,
            self.protocol
        )
    }
}

/// A directed connection: `a:p -> b:q` and `b:q -> a:p` are different keys.
#[derive(Copy, Clone, Debug, Default)]
pub struct OneSidedConnection(pub Connection);

impl OneSidedConnection {
    fn directed(&self) -> (u32, u32, u16, u16, u8) {
        let c = &self.0;
        (c.src_addr, c.dst_addr, c.src_port, c.dst_port, c.protocol)
    }
}

impl HashObject for OneSidedConnection {
    const TYPE: ObjectType = ObjectType::OneSidedConnection;

    fn compare(&self, other: &Self) -> Ordering {
        self.directed().cmp(&other.directed())
    }

    fn marshal_into(&self, out: &mut [u8]) {
        marshal_tuple(out, self.directed());
    }
}

impl PartialEq for OneSidedConnection {
    fn eq(&self, other: &Self) -> bool {
        self.directed() == other.directed()
    }
}

impl Eq for OneSidedConnection {}

impl From<Connection> for OneSidedConnection {
    fn from(c: Connection) -> Self {
        OneSidedConnection(c)
    }
}

impl fmt::Display for OneSidedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Aggregate packet and byte counters for one connection.
#[derive(Copy, Clone, Debug, Default)]
pub struct ConnectionInfo {
    pub pkts: u32,
    pub pkts_fwd: u32,
    pub pkts_bwd: u32,
    pub bytes: f64,
    pub bytes_fwd: f64,
    pub bytes_bwd: f64,
}

impl ConnectionInfo {
    /// Counters for a single packet of `bytes` bytes in one direction.
    pub fn packet(bytes: f64, forward: bool) -> Self {
        let mut info = ConnectionInfo {
            pkts: 1,
            bytes,
            ..Default::default()
        };
        if forward {
            info.pkts_fwd = 1;
            info.bytes_fwd = bytes;
        } else {
            info.pkts_bwd = 1;
            info.bytes_bwd = bytes;
        }
        info
    }

    /// Field-wise merge of `other` into `self`.
    pub fn add(&mut self, other: &ConnectionInfo) {
        self.pkts = self.pkts.wrapping_add(other.pkts);
        self.pkts_fwd = self.pkts_fwd.wrapping_add(other.pkts_fwd);
        self.pkts_bwd = self.pkts_bwd.wrapping_add(other.pkts_bwd);
        self.bytes += other.bytes;
        self.bytes_fwd += other.bytes_fwd;
        self.bytes_bwd += other.bytes_bwd;
    }
}

impl AddAssign<&ConnectionInfo> for ConnectionInfo {
    fn add_assign(&mut self, rhs: &ConnectionInfo) {
        self.add(rhs);
    }
}

impl AddAssign for ConnectionInfo {
    fn add_assign(&mut self, rhs: ConnectionInfo) {
        self.add(&rhs);
    }
}

impl HashObject for ConnectionInfo {
    const TYPE: ObjectType = ObjectType::ConnectionInfo;

    fn compare(&self, other: &Self) -> Ordering {
        self.pkts
            .cmp(&other.pkts)
            .then(self.pkts_fwd.cmp(&other.pkts_fwd))
            .then(self.pkts_bwd.cmp(&other.pkts_bwd))
            .then(self.bytes.total_cmp(&other.bytes))
            .then(self.bytes_fwd.total_cmp(&other.bytes_fwd))
            .then(self.bytes_bwd.total_cmp(&other.bytes_bwd))
    }

    fn marshal_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.pkts.to_ne_bytes());
        out[4..8].copy_from_slice(&self.pkts_fwd.to_ne_bytes());
        out[8..12].copy_from_slice(&self.pkts_bwd.to_ne_bytes());
        out[12..20].copy_from_slice(&self.bytes.to_ne_bytes());
        out[20..28].copy_from_slice(&self.bytes_fwd.to_ne_bytes());
        out[28..36].copy_from_slice(&self.bytes_bwd.to_ne_bytes());
    }
}

impl PartialEq for ConnectionInfo {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

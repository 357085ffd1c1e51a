//! Fixed-column rendering of services, destinations and local addresses.
//!
//! Replies render through `Display`. A reply with a nonzero status renders
//! as `NAME:message` and its payload is never looked at.

use std::fmt;

use common::Error;

use crate::errno;
use crate::messages::{
    CmdReply, DestEntry, DestsReply, EngineReply, LaddrEntry, LaddrsReply, ServiceEntry,
    ServiceReply, ServicesReply, TimeoutReply, VersionReply,
};
use crate::types::{Endpoint, protocol_name};

pub fn svc_title() -> String {
    format!(
        "{:>5} {:>21} {:>8} {:>8} {:>15} {:>6} {:>6} {:>5} {:>7} {:>10} {:>10} {:>10} {:>10}",
        "Proto",
        "Addr:Port ",
        "Flags",
        "Timeout",
        "Netmask",
        "dests",
        "laddrs",
        "Sched",
        "Conns",
        "Inpkts",
        "Outpkts",
        "Inbytes",
        "Outbytes",
    )
}

pub fn dest_title() -> String {
    format!(
        "{:>5} {:>21} {:>8} {:>8} {:>15} {:>12} {:>12} {:>12} {:>7} {:>10} {:>10} {:>10} {:>10}",
        "->",
        "Addr:Port",
        "Flags",
        "Weight",
        "threshold",
        "Activeconns",
        "Inactconns",
        "Persistent",
        "Conns",
        "Inpkts",
        "Outpkts",
        "Inbytes",
        "Outbytes",
    )
}

pub fn laddr_title() -> String {
    format!("    {:>15} {:>8} {:>8}", "Addr", "Conn_counts", "Port_conflict")
}

impl fmt::Display for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5} {:>21} {:08x} {:>8} {:>15} {:>6} {:>6} {:>5} {:>7} {:>10} {:>10} {:>10} {:>10}",
            protocol_name(self.protocol),
            Endpoint { addr: self.addr, port: self.port },
            self.flags,
            self.timeout,
            self.netmask,
            self.num_dests,
            self.num_laddrs,
            self.sched_name,
            self.conns,
            self.inpkts,
            self.outpkts,
            self.inbytes,
            self.outbytes,
        )
    }
}

impl fmt::Display for DestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let thresholds = format!("{}-{}", self.lower_threshold, self.upper_threshold);
        write!(
            f,
            "{:>5} {:>21} {:08x} {:>8} {:>15} {:>12} {:>12} {:>12} {:>7} {:>10} {:>10} {:>10} {:>10}",
            "->",
            self.endpoint(),
            self.conn_flags,
            self.weight,
            thresholds,
            self.active_conns,
            self.inactive_conns,
            self.persistent_conns,
            self.conns,
            self.inpkts,
            self.outpkts,
            self.inbytes,
            self.outbytes,
        )
    }
}

impl fmt::Display for LaddrEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "    {:>15} {:>8} {:>8}",
            self.addr, self.conn_counts, self.port_conflict
        )
    }
}

fn write_status(f: &mut fmt::Formatter<'_>, reply: &impl EngineReply) -> fmt::Result {
    write!(f, "{}:{}", errno::describe_status(reply.code()), reply.msg())
}

impl fmt::Display for CmdReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_ok() {
            return write_status(f, self);
        }
        f.write_str("done")
    }
}

impl fmt::Display for VersionReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_ok() {
            return write_status(f, self);
        }
        write!(f, "{}", self.info())
    }
}

impl fmt::Display for TimeoutReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_ok() {
            return write_status(f, self);
        }
        write!(f, "{}", self.timeouts())
    }
}

impl fmt::Display for ServiceReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_ok() {
            return write_status(f, self);
        }
        writeln!(f, "{}", svc_title())?;
        writeln!(f, "{}", self.service)
    }
}

impl fmt::Display for ServicesReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_ok() {
            return write_status(f, self);
        }
        writeln!(f, "{}", svc_title())?;
        for service in &self.services {
            writeln!(f, "{service}")?;
        }
        Ok(())
    }
}

impl fmt::Display for DestsReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_ok() {
            return write_status(f, self);
        }
        writeln!(f, "{}", dest_title())?;
        for dest in &self.dests {
            writeln!(f, "{dest}")?;
        }
        Ok(())
    }
}

impl fmt::Display for LaddrsReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_ok() {
            return write_status(f, self);
        }
        writeln!(f, "{}", laddr_title())?;
        for laddr in &self.laddrs {
            writeln!(f, "{laddr}")?;
        }
        Ok(())
    }
}

/// Caps on a listing; 0 leaves a count uncapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListLimits {
    /// Services fetched when no single service is selected
    pub services: i32,
    /// Destinations and local addresses fetched per service
    pub members: i32,
}

/// Destinations and local addresses attached to one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Members {
    pub dests: Vec<DestEntry>,
    pub laddrs: Vec<LaddrEntry>,
}

/// One service of a listing, with its members or the error that stopped
/// them from being fetched.
#[derive(Debug)]
pub struct ListedService {
    pub service: ServiceEntry,
    pub members: Result<Members, Error>,
}

/// Services with their members, fetched best effort.
///
/// Member failures with an engine status are kept per service and the
/// listing goes on. A failure that ends the session stops it: that error is
/// in `aborted` and the services never reached are in `unvisited`.
#[derive(Debug, Default)]
pub struct ServiceListing {
    pub entries: Vec<ListedService>,
    pub unvisited: Vec<ServiceEntry>,
    pub aborted: Option<Error>,
}

impl ServiceListing {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none() && self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ServiceEntry, &Error)> {
        self.entries
            .iter()
            .filter_map(|e| e.members.as_ref().err().map(|err| (&e.service, err)))
    }
}

impl fmt::Display for ServiceListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", svc_title())?;
        writeln!(f, "{}", dest_title())?;
        writeln!(f, "{}", laddr_title())?;
        for entry in &self.entries {
            writeln!(f, "{}", entry.service)?;
            match &entry.members {
                Ok(members) => {
                    for dest in &members.dests {
                        writeln!(f, "{dest}")?;
                    }
                    for laddr in &members.laddrs {
                        writeln!(f, "{laddr}")?;
                    }
                }
                Err(err) => writeln!(f, "    error: {err}")?,
            }
        }
        for service in &self.unvisited {
            writeln!(f, "{service}")?;
            writeln!(f, "    not visited")?;
        }
        Ok(())
    }
}

//! DPVS command numbers, statistics families and protocol constants.
//!
//! Numbering follows the engine's `dp_vs` control header, latest revision.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use common::Error;

/// Version of the canonical request/reply schema implemented here.
pub const SCHEMA_VERSION: u32 = 3;

/// Default engine socket.
pub const DEFAULT_SOCKET: &str = "/tmp/dpvs.sock";

/// DPVS control commands.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandId {
    Unspec = 0,
    /// Add a new virtual service
    NewService = 1,
    /// Modify an existing virtual service
    SetService = 2,
    /// Delete a virtual service
    DelService = 3,
    /// Get one virtual service
    GetService = 4,
    /// Get every virtual service
    GetServices = 5,
    /// Add a destination to a service
    NewDest = 6,
    /// Modify a destination
    SetDest = 7,
    /// Delete a destination
    DelDest = 8,
    /// List destinations of a service
    GetDest = 9,
    /// Start sync daemon
    NewDaemon = 10,
    /// Stop sync daemon
    DelDaemon = 11,
    /// Get sync daemon status
    GetDaemon = 12,
    /// Set timeout configuration
    SetConfig = 13,
    /// Get timeout configuration
    GetConfig = 14,
    /// Only used in GET_INFO replies
    SetInfo = 15,
    /// Get version and connection table size
    GetInfo = 16,
    /// Zero counters
    Zero = 17,
    /// Flush services and destinations
    Flush = 18,
    /// Add local address
    NewLaddr = 19,
    /// Delete local address
    DelLaddr = 20,
    /// List local addresses
    GetLaddr = 21,
    /// Dump worker/controller statistics
    GetStats = 22,
}

impl CommandId {
    const ALL: [CommandId; 23] = [
        CommandId::Unspec,
        CommandId::NewService,
        CommandId::SetService,
        CommandId::DelService,
        CommandId::GetService,
        CommandId::GetServices,
        CommandId::NewDest,
        CommandId::SetDest,
        CommandId::DelDest,
        CommandId::GetDest,
        CommandId::NewDaemon,
        CommandId::DelDaemon,
        CommandId::GetDaemon,
        CommandId::SetConfig,
        CommandId::GetConfig,
        CommandId::SetInfo,
        CommandId::GetInfo,
        CommandId::Zero,
        CommandId::Flush,
        CommandId::NewLaddr,
        CommandId::DelLaddr,
        CommandId::GetLaddr,
        CommandId::GetStats,
    ];

    pub fn from_number(n: u32) -> Option<Self> {
        Self::ALL.get(n as usize).copied()
    }
}

impl From<CommandId> for u32 {
    fn from(cmd: CommandId) -> u32 {
        cmd as u32
    }
}

impl Serialize for CommandId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(*self as u32)
    }
}

impl<'de> Deserialize<'de> for CommandId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = u32::deserialize(deserializer)?;
        CommandId::from_number(n)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown command {n}")))
    }
}

/// RPC procedure names exposed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    /// Service, destination, local address, timeout, flush, zero, info
    Api,
    /// Statistics retrieval
    Stats,
}

impl Procedure {
    pub fn as_str(self) -> &'static str {
        match self {
            Procedure::Api => "api",
            Procedure::Stats => "stats",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics families served by the `stats` procedure.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsFamily {
    /// Per-core I/O rings and queues
    Io = 0,
    /// Per-core worker protocol counters
    Worker = 1,
    /// Per-core extended counters, keyed by name
    ExtendedWorker = 2,
    /// Per-port NIC counters
    Dev = 3,
    /// Controller and sync state
    Ctl = 4,
    /// Memory pools per NUMA socket
    Mem = 5,
}

impl StatsFamily {
    pub const ALL: [StatsFamily; 6] = [
        StatsFamily::Io,
        StatsFamily::Worker,
        StatsFamily::ExtendedWorker,
        StatsFamily::Dev,
        StatsFamily::Ctl,
        StatsFamily::Mem,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StatsFamily::Io => "io",
            StatsFamily::Worker => "worker",
            StatsFamily::ExtendedWorker => "estats",
            StatsFamily::Dev => "dev",
            StatsFamily::Ctl => "ctl",
            StatsFamily::Mem => "mem",
        }
    }
}

impl fmt::Display for StatsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StatsFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        StatsFamily::ALL
            .into_iter()
            .find(|family| family.name() == s)
            .ok_or_else(|| Error::syntax(format!("expect io/worker/estats/dev/ctl/mem, got {s:?}")))
    }
}

/// Controller sync states reported per worker.
pub mod ctl_state {
    pub const SYNC: i32 = 0;
    pub const PENDING: i32 = 1;

    /// One-letter state marker used in reports.
    pub fn letter(state: i32) -> char {
        match state {
            SYNC => 's',
            PENDING => 'p',
            _ => '-',
        }
    }
}

/// IANA protocol numbers. Only TCP and UDP are settable.
pub mod ipproto {
    pub const IP: u8 = 0;
    pub const ICMP: u8 = 1;
    pub const IGMP: u8 = 2;
    pub const IPIP: u8 = 4;
    pub const TCP: u8 = 6;
    pub const EGP: u8 = 8;
    pub const PUP: u8 = 12;
    pub const UDP: u8 = 17;
    pub const IDP: u8 = 22;
    pub const DCCP: u8 = 33;
    pub const IPV6: u8 = 41;
    pub const RSVP: u8 = 46;
    pub const GRE: u8 = 47;
    pub const ESP: u8 = 50;
    pub const AH: u8 = 51;
    pub const BEETPH: u8 = 94;
    pub const PIM: u8 = 103;
    pub const COMP: u8 = 108;
    pub const SCTP: u8 = 132;
    pub const UDPLITE: u8 = 136;
    pub const RAW: u8 = 255;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_numbers() {
        assert_eq!(u32::from(CommandId::NewService), 1);
        assert_eq!(u32::from(CommandId::GetServices), 5);
        assert_eq!(u32::from(CommandId::GetConfig), 14);
        assert_eq!(u32::from(CommandId::Flush), 18);
        assert_eq!(u32::from(CommandId::GetStats), 22);
        for n in 0..23 {
            assert_eq!(CommandId::from_number(n).map(u32::from), Some(n));
        }
        assert_eq!(CommandId::from_number(23), None);
    }

    #[test]
    fn test_command_wire_form() {
        assert_eq!(serde_json::to_string(&CommandId::NewLaddr).unwrap(), "19");
        let cmd: CommandId = serde_json::from_str("9").unwrap();
        assert_eq!(cmd, CommandId::GetDest);
        assert!(serde_json::from_str::<CommandId>("99").is_err());
    }

    #[test]
    fn test_stats_family_names() {
        for family in StatsFamily::ALL {
            assert_eq!(family.name().parse::<StatsFamily>().unwrap(), family);
        }
        assert_eq!(StatsFamily::Dev as i32, 3);
        assert!("disk".parse::<StatsFamily>().is_err());
    }

    #[test]
    fn test_ctl_state_letters() {
        assert_eq!(ctl_state::letter(ctl_state::SYNC), 's');
        assert_eq!(ctl_state::letter(ctl_state::PENDING), 'p');
        assert_eq!(ctl_state::letter(7), '-');
    }
}

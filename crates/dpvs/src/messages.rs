//! DPVS request and reply wire structures.
//!
//! Field names match the engine's JSON keys. Requests are fixed-shape:
//! unused fields are sent as zero, never omitted. Replies tolerate missing
//! fields (they decode as zero) but not mistyped ones.

use serde::{Deserialize, Deserializer, Serialize};

use crate::commands::CommandId;
use crate::errno;
use crate::types::{
    Address, Endpoint, Port, Protocol, ServiceKey, TimeoutSet, VersionInfo,
};
use common::Result;

/// Decode `null` the same way as an absent field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// Request payloads

/// Service fields as sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceUser {
    pub nic: u8,
    pub protocol: u8,
    pub addr: Address,
    pub port: Port,
    #[serde(rename = "Sched_name")]
    pub sched_name: String,
    pub flags: u32,
    pub timeout: u32,
    pub netmask: Address,
    /// Max destinations or local addresses to list
    pub number: i32,
}

/// Destination fields as sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DestUser {
    pub nic: u8,
    pub addr: Address,
    pub port: Port,
    #[serde(rename = "Conn_flags")]
    pub conn_flags: u32,
    pub weight: i32,
    #[serde(rename = "U_threshold")]
    pub upper_threshold: u32,
    #[serde(rename = "L_threshold")]
    pub lower_threshold: u32,
}

/// Local address fields as sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LaddrUser {
    pub nic: u8,
    pub addr: Address,
}

/// Bare command: flush, get info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CmdQuery {
    pub cmd: CommandId,
}

/// Service add/edit/delete and zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceQuery {
    pub cmd: CommandId,
    pub service: ServiceUser,
}

/// Listing of services, destinations and local addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListQuery {
    pub cmd: CommandId,
    #[serde(rename = "Num_services")]
    pub num_services: i32,
    pub service: ServiceUser,
    pub dest: DestUser,
    pub laddr: LaddrUser,
}

impl ListQuery {
    pub fn new(cmd: CommandId) -> Self {
        Self {
            cmd,
            num_services: 0,
            service: ServiceUser::default(),
            dest: DestUser::default(),
            laddr: LaddrUser::default(),
        }
    }
}

/// Destination add/edit/delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DestQuery {
    pub cmd: CommandId,
    pub service: ServiceUser,
    pub dest: DestUser,
}

/// Local address add/delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaddrQuery {
    pub cmd: CommandId,
    pub service: ServiceUser,
    pub laddr: LaddrUser,
}

/// Timeout get/set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeoutQuery {
    pub cmd: CommandId,
    #[serde(rename = "Tcp_timeout")]
    pub tcp_timeout: i32,
    #[serde(rename = "Tcp_fin_timeout")]
    pub tcp_fin_timeout: i32,
    #[serde(rename = "Udp_timeout")]
    pub udp_timeout: i32,
}

/// Statistics request for the `stats` procedure. `id` is -1 for all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatsQuery {
    #[serde(rename = "Type")]
    pub family: i32,
    pub id: i32,
}

// Reply payloads

/// Common surface of every reply: status code first, payload after.
pub trait EngineReply: Sized {
    fn code(&self) -> i32;

    fn msg(&self) -> &str;

    fn is_ok(&self) -> bool {
        self.code() == 0
    }

    /// Fail with an engine status error unless the code is zero.
    fn check(self) -> Result<Self> {
        errno::check_status(self.code(), self.msg())?;
        Ok(self)
    }
}

macro_rules! engine_reply {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl EngineReply for $ty {
                fn code(&self) -> i32 {
                    self.code
                }

                fn msg(&self) -> &str {
                    &self.msg
                }
            }
        )+
    };
}

/// Reply to commands without a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CmdReply {
    pub code: i32,
    pub msg: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VersionReply {
    pub code: i32,
    pub msg: String,
    /// Packed as `major << 16 | minor << 8 | patch`
    pub version: i32,
    /// Connection table size
    pub size: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TimeoutReply {
    pub code: i32,
    pub msg: String,
    #[serde(rename = "Tcp_timeout")]
    pub tcp_timeout: i32,
    #[serde(rename = "Tcp_fin_timeout")]
    pub tcp_fin_timeout: i32,
    #[serde(rename = "Udp_timeout")]
    pub udp_timeout: i32,
}

/// A service as reported by the engine, with its counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceEntry {
    pub protocol: u8,
    pub addr: Address,
    pub port: Port,
    #[serde(rename = "Sched_name")]
    pub sched_name: String,
    pub flags: u32,
    pub timeout: u32,
    pub netmask: Address,
    pub conns: u64,
    pub inpkts: u64,
    pub outpkts: u64,
    pub inbytes: u64,
    pub outbytes: u64,
    #[serde(rename = "Num_dests")]
    pub num_dests: u32,
    #[serde(rename = "Num_laddrs")]
    pub num_laddrs: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceReply {
    pub code: i32,
    pub msg: String,
    pub service: ServiceEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServicesReply {
    pub code: i32,
    pub msg: String,
    #[serde(rename = "Num_services")]
    pub num_services: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub services: Vec<ServiceEntry>,
}

/// A destination as reported by the engine, with its counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DestEntry {
    pub addr: Address,
    pub port: Port,
    #[serde(rename = "Conn_flags")]
    pub conn_flags: u32,
    pub weight: i32,
    #[serde(rename = "U_threshold")]
    pub upper_threshold: u32,
    #[serde(rename = "L_threshold")]
    pub lower_threshold: u32,
    #[serde(rename = "Activeconns")]
    pub active_conns: u32,
    #[serde(rename = "Inactconns")]
    pub inactive_conns: u32,
    #[serde(rename = "Persistent")]
    pub persistent_conns: u32,
    pub conns: u64,
    pub inpkts: u64,
    pub outpkts: u64,
    pub inbytes: u64,
    pub outbytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DestsReply {
    pub code: i32,
    pub msg: String,
    #[serde(deserialize_with = "null_as_default")]
    pub dests: Vec<DestEntry>,
}

/// A local address as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LaddrEntry {
    pub addr: Address,
    #[serde(rename = "Conn_counts")]
    pub conn_counts: u32,
    #[serde(rename = "Port_conflict")]
    pub port_conflict: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LaddrsReply {
    pub code: i32,
    pub msg: String,
    #[serde(deserialize_with = "null_as_default")]
    pub laddrs: Vec<LaddrEntry>,
}

impl ServiceEntry {
    /// The key to address this service in follow-up requests. `None` for
    /// protocols the command surface cannot express.
    pub fn key(&self) -> Option<ServiceKey> {
        let protocol = Protocol::from_number(self.protocol)?;
        Some(ServiceKey::new(protocol, Endpoint { addr: self.addr, port: self.port }))
    }
}

impl DestEntry {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint { addr: self.addr, port: self.port }
    }
}

impl VersionReply {
    pub fn info(&self) -> VersionInfo {
        VersionInfo::from_packed(self.version, self.size)
    }
}

impl TimeoutReply {
    pub fn timeouts(&self) -> TimeoutSet {
        TimeoutSet {
            tcp: self.tcp_timeout,
            tcp_fin: self.tcp_fin_timeout,
            udp: self.udp_timeout,
        }
    }
}

engine_reply!(
    CmdReply,
    VersionReply,
    TimeoutReply,
    ServiceReply,
    ServicesReply,
    DestsReply,
    LaddrsReply,
);

pub(crate) use engine_reply;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_query_is_fixed_shape() {
        let query = ServiceQuery {
            cmd: CommandId::DelService,
            service: ServiceUser {
                protocol: 6,
                addr: Address::parse("10.0.0.1").unwrap(),
                port: Port::new(80),
                ..Default::default()
            },
        };
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["Cmd"], json!(3));
        let service = value["Service"].as_object().unwrap();
        for key in [
            "Nic", "Protocol", "Addr", "Port", "Sched_name", "Flags", "Timeout", "Netmask",
            "Number",
        ] {
            assert!(service.contains_key(key), "missing {key}");
        }
        assert_eq!(service["Sched_name"], json!(""));
        assert_eq!(
            service["Addr"],
            json!(Address::parse("10.0.0.1").unwrap().to_network())
        );
        assert_eq!(service["Port"], json!(80u16.to_be()));
    }

    #[test]
    fn test_dest_query_field_names() {
        let query = DestQuery {
            cmd: CommandId::NewDest,
            service: ServiceUser::default(),
            dest: DestUser {
                weight: 3,
                upper_threshold: 100,
                lower_threshold: 10,
                conn_flags: 5,
                ..Default::default()
            },
        };
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["Dest"]["U_threshold"], json!(100));
        assert_eq!(value["Dest"]["L_threshold"], json!(10));
        assert_eq!(value["Dest"]["Conn_flags"], json!(5));
        assert_eq!(value["Dest"]["Weight"], json!(3));
    }

    #[test]
    fn test_list_query_carries_every_section() {
        let value = serde_json::to_value(ListQuery::new(CommandId::GetServices)).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["Cmd", "Num_services", "Service", "Dest", "Laddr"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_stats_query_shape() {
        let value = serde_json::to_value(StatsQuery { family: 3, id: -1 }).unwrap();
        assert_eq!(value, json!({"Type": 3, "Id": -1}));
    }

    #[test]
    fn test_services_reply_decodes() {
        let reply: ServicesReply = serde_json::from_value(json!({
            "Code": 0,
            "Msg": "",
            "Num_services": 1,
            "Services": [{
                "Protocol": 17,
                "Addr": Address::parse("10.1.1.1").unwrap().to_network(),
                "Port": 53u16.to_be(),
                "Sched_name": "wrr",
                "Conns": 7,
                "Num_dests": 2
            }]
        }))
        .unwrap();
        assert!(reply.is_ok());
        let svc = &reply.services[0];
        assert_eq!(svc.protocol, 17);
        assert_eq!(svc.addr.to_string(), "10.1.1.1");
        assert_eq!(svc.port.get(), 53);
        assert_eq!(svc.sched_name, "wrr");
        assert_eq!(svc.conns, 7);
        assert_eq!(svc.num_dests, 2);
        assert_eq!(svc.inbytes, 0);
    }

    #[test]
    fn test_null_list_decodes_empty() {
        let reply: DestsReply =
            serde_json::from_value(json!({"Code": 0, "Msg": "", "Dests": null})).unwrap();
        assert!(reply.dests.is_empty());
    }

    #[test]
    fn test_mistyped_field_is_rejected() {
        let result = serde_json::from_value::<ServiceReply>(json!({
            "Code": 0,
            "Msg": "",
            "Service": {"Conns": "many"}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_check_nonzero_status() {
        let reply = CmdReply {
            code: 17,
            msg: "service exists".into(),
        };
        let err = reply.check().unwrap_err();
        assert_eq!(err.to_string(), "EEXIST:service exists");
    }
}

//! The closed set of engine operations and their decoded replies.

use common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commands::{CommandId, Procedure, StatsFamily};
use crate::errno;
use crate::messages::{
    CmdQuery, CmdReply, DestEntry, DestQuery, DestUser, DestsReply, LaddrEntry,
    LaddrQuery, LaddrUser, LaddrsReply, ListQuery, ServiceEntry, ServiceQuery, ServiceReply,
    ServiceUser, ServicesReply, StatsQuery, TimeoutQuery, TimeoutReply, VersionReply,
};
use crate::stats::{
    CtlReply, DevReply, EstatsReply, IoReply, MemReply, StatsSnapshot, WorkerReply,
};
use crate::types::{
    DestSpec, Endpoint, LaddrSpec, ServiceKey, ServiceSpec, TimeoutSet, VersionInfo,
};

/// An engine operation with exactly the inputs it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    NewService(ServiceSpec),
    SetService(ServiceSpec),
    DelService(ServiceKey),
    GetService(ServiceKey),
    /// `limit` caps the number of services returned, 0 for no cap
    GetServices { limit: i32 },
    NewDest { service: ServiceKey, dest: DestSpec },
    SetDest { service: ServiceKey, dest: DestSpec },
    DelDest { service: ServiceKey, dest: Endpoint },
    GetDests { service: ServiceKey, limit: i32 },
    NewLaddr { service: ServiceKey, laddr: LaddrSpec },
    DelLaddr { service: ServiceKey, laddr: LaddrSpec },
    GetLaddrs { service: ServiceKey, limit: i32 },
    GetTimeout,
    SetTimeout(TimeoutSet),
    /// Zero one service's counters, or every service's with `None`
    Zero(Option<ServiceKey>),
    Flush,
    GetVersion,
    /// `id` selects one core, port or socket; `None` for all
    GetStats { family: StatsFamily, id: Option<i32> },
}

/// A decoded zero-status reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Done,
    Version(VersionInfo),
    Timeout(TimeoutSet),
    Service(ServiceEntry),
    Services(Vec<ServiceEntry>),
    Dests(Vec<DestEntry>),
    Laddrs(Vec<LaddrEntry>),
    Stats(StatsSnapshot),
}

fn service_user(key: &ServiceKey) -> ServiceUser {
    ServiceUser {
        protocol: key.protocol.number(),
        addr: key.endpoint.addr,
        port: key.endpoint.port,
        ..Default::default()
    }
}

fn service_user_from_spec(spec: &ServiceSpec) -> ServiceUser {
    ServiceUser {
        nic: spec.nic,
        sched_name: spec.scheduler.clone(),
        flags: spec.flags.0,
        timeout: spec.timeout,
        netmask: spec.netmask,
        ..service_user(&spec.key)
    }
}

fn limited_service_user(key: &ServiceKey, limit: i32) -> ServiceUser {
    ServiceUser {
        number: limit,
        ..service_user(key)
    }
}

fn dest_user(spec: &DestSpec) -> DestUser {
    DestUser {
        nic: spec.nic,
        addr: spec.endpoint.addr,
        port: spec.endpoint.port,
        conn_flags: spec.conn_flags.with_default_forward().0,
        weight: spec.weight,
        upper_threshold: spec.upper_threshold,
        lower_threshold: spec.lower_threshold,
    }
}

fn laddr_user(spec: &LaddrSpec) -> LaddrUser {
    LaddrUser {
        nic: spec.nic,
        addr: spec.addr,
    }
}

fn to_params(query: &impl Serialize) -> Result<Value> {
    serde_json::to_value(query).map_err(|e| Error::transport(format!("failed to encode request: {e}")))
}

/// Leading status of a reply. Unlike the payload types, `Code` has no default.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReplyStatus {
    code: i32,
    #[serde(default)]
    msg: String,
}

/// Decode a reply payload. The status is checked first, so the payload of
/// a failed reply is never interpreted.
pub(crate) fn decode_payload<R: DeserializeOwned>(value: Value) -> Result<R> {
    let status = ReplyStatus::deserialize(&value)
        .map_err(|e| Error::decode(format!("reply has no status: {e}")))?;
    errno::check_status(status.code, &status.msg)?;
    serde_json::from_value(value).map_err(Error::decode)
}

impl Command {
    /// The command number carried on the wire.
    pub fn id(&self) -> CommandId {
        match self {
            Command::NewService(_) => CommandId::NewService,
            Command::SetService(_) => CommandId::SetService,
            Command::DelService(_) => CommandId::DelService,
            Command::GetService(_) => CommandId::GetService,
            Command::GetServices { .. } => CommandId::GetServices,
            Command::NewDest { .. } => CommandId::NewDest,
            Command::SetDest { .. } => CommandId::SetDest,
            Command::DelDest { .. } => CommandId::DelDest,
            Command::GetDests { .. } => CommandId::GetDest,
            Command::NewLaddr { .. } => CommandId::NewLaddr,
            Command::DelLaddr { .. } => CommandId::DelLaddr,
            Command::GetLaddrs { .. } => CommandId::GetLaddr,
            Command::GetTimeout => CommandId::GetConfig,
            Command::SetTimeout(_) => CommandId::SetConfig,
            Command::Zero(_) => CommandId::Zero,
            Command::Flush => CommandId::Flush,
            Command::GetVersion => CommandId::GetInfo,
            Command::GetStats { .. } => CommandId::GetStats,
        }
    }

    pub fn procedure(&self) -> Procedure {
        match self {
            Command::GetStats { .. } => Procedure::Stats,
            _ => Procedure::Api,
        }
    }

    /// Build the request parameters.
    pub fn encode(&self) -> Result<(Procedure, Value)> {
        let cmd = self.id();
        let params = match self {
            Command::NewService(spec) | Command::SetService(spec) => to_params(&ServiceQuery {
                cmd,
                service: service_user_from_spec(spec),
            })?,
            Command::DelService(key) => to_params(&ServiceQuery {
                cmd,
                service: service_user(key),
            })?,
            Command::GetService(key) => to_params(&ListQuery {
                service: service_user(key),
                ..ListQuery::new(cmd)
            })?,
            Command::Zero(key) => to_params(&ServiceQuery {
                cmd,
                service: key.as_ref().map(service_user).unwrap_or_default(),
            })?,
            Command::GetServices { limit } => to_params(&ListQuery {
                num_services: *limit,
                ..ListQuery::new(cmd)
            })?,
            Command::NewDest { service, dest } | Command::SetDest { service, dest } => {
                to_params(&DestQuery {
                    cmd,
                    service: service_user(service),
                    dest: dest_user(dest),
                })?
            }
            Command::DelDest { service, dest } => to_params(&DestQuery {
                cmd,
                service: service_user(service),
                dest: DestUser {
                    addr: dest.addr,
                    port: dest.port,
                    ..Default::default()
                },
            })?,
            Command::GetDests { service, limit } | Command::GetLaddrs { service, limit } => {
                to_params(&ListQuery {
                    service: limited_service_user(service, *limit),
                    ..ListQuery::new(cmd)
                })?
            }
            Command::NewLaddr { service, laddr } | Command::DelLaddr { service, laddr } => {
                to_params(&LaddrQuery {
                    cmd,
                    service: service_user(service),
                    laddr: laddr_user(laddr),
                })?
            }
            Command::GetTimeout => to_params(&TimeoutQuery {
                cmd,
                tcp_timeout: 0,
                tcp_fin_timeout: 0,
                udp_timeout: 0,
            })?,
            Command::SetTimeout(t) => to_params(&TimeoutQuery {
                cmd,
                tcp_timeout: t.tcp,
                tcp_fin_timeout: t.tcp_fin,
                udp_timeout: t.udp,
            })?,
            Command::Flush | Command::GetVersion => to_params(&CmdQuery { cmd })?,
            Command::GetStats { family, id } => to_params(&StatsQuery {
                family: *family as i32,
                id: id.unwrap_or(-1),
            })?,
        };
        Ok((self.procedure(), params))
    }

    /// Decode the reply to this command.
    pub fn decode_reply(&self, value: Value) -> Result<Reply> {
        let reply = match self {
            Command::NewService(_)
            | Command::SetService(_)
            | Command::DelService(_)
            | Command::NewDest { .. }
            | Command::SetDest { .. }
            | Command::DelDest { .. }
            | Command::NewLaddr { .. }
            | Command::DelLaddr { .. }
            | Command::SetTimeout(_)
            | Command::Zero(_)
            | Command::Flush => {
                decode_payload::<CmdReply>(value)?;
                Reply::Done
            }
            Command::GetService(_) => Reply::Service(decode_payload::<ServiceReply>(value)?.service),
            Command::GetServices { .. } => {
                Reply::Services(decode_payload::<ServicesReply>(value)?.services)
            }
            Command::GetDests { .. } => Reply::Dests(decode_payload::<DestsReply>(value)?.dests),
            Command::GetLaddrs { .. } => {
                Reply::Laddrs(decode_payload::<LaddrsReply>(value)?.laddrs)
            }
            Command::GetTimeout => Reply::Timeout(decode_payload::<TimeoutReply>(value)?.timeouts()),
            Command::GetVersion => Reply::Version(decode_payload::<VersionReply>(value)?.info()),
            Command::GetStats { family, .. } => Reply::Stats(decode_stats(*family, value)?),
        };
        Ok(reply)
    }
}

fn decode_stats(family: StatsFamily, value: Value) -> Result<StatsSnapshot> {
    let snapshot = match family {
        StatsFamily::Io => decode_payload::<IoReply>(value)?.into(),
        StatsFamily::Worker => decode_payload::<WorkerReply>(value)?.into(),
        StatsFamily::ExtendedWorker => decode_payload::<EstatsReply>(value)?.into(),
        StatsFamily::Dev => decode_payload::<DevReply>(value)?.into(),
        StatsFamily::Ctl => decode_payload::<CtlReply>(value)?.into(),
        StatsFamily::Mem => decode_payload::<MemReply>(value)?.into(),
    };
    Ok(snapshot)
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::display::{dest_title, laddr_title, svc_title};

        match self {
            Reply::Done => f.write_str("done"),
            Reply::Version(info) => write!(f, "{info}"),
            Reply::Timeout(t) => write!(f, "{t}"),
            Reply::Service(service) => {
                writeln!(f, "{}", svc_title())?;
                writeln!(f, "{service}")
            }
            Reply::Services(services) => {
                writeln!(f, "{}", svc_title())?;
                services.iter().try_for_each(|s| writeln!(f, "{s}"))
            }
            Reply::Dests(dests) => {
                writeln!(f, "{}", dest_title())?;
                dests.iter().try_for_each(|d| writeln!(f, "{d}"))
            }
            Reply::Laddrs(laddrs) => {
                writeln!(f, "{}", laddr_title())?;
                laddrs.iter().try_for_each(|l| writeln!(f, "{l}"))
            }
            Reply::Stats(snapshot) => write!(f, "{snapshot}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, ConnFlags, Port, Protocol};
    use serde_json::json;

    fn key() -> ServiceKey {
        "tcp:10.0.0.1:80".parse().unwrap()
    }

    #[test]
    fn test_every_command_encodes_on_its_procedure() {
        let commands = [
            Command::NewService(ServiceSpec::new(key())),
            Command::SetService(ServiceSpec::new(key())),
            Command::DelService(key()),
            Command::GetService(key()),
            Command::GetServices { limit: 0 },
            Command::NewDest { service: key(), dest: DestSpec::new(Endpoint::UNSET) },
            Command::SetDest { service: key(), dest: DestSpec::new(Endpoint::UNSET) },
            Command::DelDest { service: key(), dest: Endpoint::UNSET },
            Command::GetDests { service: key(), limit: 0 },
            Command::NewLaddr { service: key(), laddr: LaddrSpec { nic: 0, addr: Address::UNSET } },
            Command::DelLaddr { service: key(), laddr: LaddrSpec { nic: 0, addr: Address::UNSET } },
            Command::GetLaddrs { service: key(), limit: 0 },
            Command::GetTimeout,
            Command::SetTimeout(TimeoutSet::default()),
            Command::Zero(None),
            Command::Flush,
            Command::GetVersion,
        ];
        for command in commands {
            let (procedure, params) = command.encode().unwrap();
            assert_eq!(procedure, Procedure::Api);
            assert_eq!(params["Cmd"], json!(u32::from(command.id())), "{command:?}");
        }

        let (procedure, params) = Command::GetStats { family: StatsFamily::Mem, id: None }
            .encode()
            .unwrap();
        assert_eq!(procedure, Procedure::Stats);
        assert_eq!(params, json!({"Type": 5, "Id": -1}));
    }

    #[test]
    fn test_new_service_carries_service_fields() {
        let mut spec = ServiceSpec::new(key());
        spec.scheduler = "wlc".into();
        spec.timeout = 60;
        spec.nic = 2;
        let (_, params) = Command::NewService(spec).encode().unwrap();
        let service = &params["Service"];
        assert_eq!(service["Protocol"], json!(6));
        assert_eq!(service["Sched_name"], json!("wlc"));
        assert_eq!(service["Timeout"], json!(60));
        assert_eq!(service["Nic"], json!(2));
        assert_eq!(service["Port"], json!(Port::new(80).to_network()));
    }

    #[test]
    fn test_new_dest_defaults_to_fullnat() {
        let dest = DestSpec::new("192.168.0.2:8080".parse().unwrap());
        let (_, params) = Command::NewDest { service: key(), dest }.encode().unwrap();
        assert_eq!(params["Dest"]["Conn_flags"], json!(ConnFlags::FULLNAT));

        let mut dest = DestSpec::new("192.168.0.2:8080".parse().unwrap());
        dest.conn_flags = ConnFlags(ConnFlags::DROUTE);
        let (_, params) = Command::SetDest { service: key(), dest }.encode().unwrap();
        assert_eq!(params["Dest"]["Conn_flags"], json!(ConnFlags::DROUTE));
    }

    #[test]
    fn test_list_limits() {
        let (_, params) = Command::GetServices { limit: 16 }.encode().unwrap();
        assert_eq!(params["Num_services"], json!(16));
        let (_, params) = Command::GetDests { service: key(), limit: 8 }.encode().unwrap();
        assert_eq!(params["Service"]["Number"], json!(8));
    }

    #[test]
    fn test_get_service_uses_list_layout() {
        let (_, params) = Command::GetService(key()).encode().unwrap();
        let fields: Vec<&str> = params.as_object().unwrap().keys().map(String::as_str).collect();
        for field in ["Cmd", "Num_services", "Service", "Dest", "Laddr"] {
            assert!(fields.contains(&field), "missing {field} in {fields:?}");
        }
        assert_eq!(params["Cmd"], json!(4));
        assert_eq!(params["Num_services"], json!(0));
        assert_eq!(params["Service"]["Protocol"], json!(6));
        assert_eq!(params["Dest"]["Addr"], json!(0));
        assert_eq!(params["Laddr"]["Addr"], json!(0));
    }

    #[test]
    fn test_reply_without_status_is_decode_error() {
        let err = Command::Flush.decode_reply(json!({"Msg": ""})).unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "{err:?}");

        let err = Command::GetServices { limit: 0 }
            .decode_reply(json!({"Services": []}))
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "{err:?}");

        // Msg may be left out
        let reply = Command::Flush.decode_reply(json!({"Code": 0})).unwrap();
        assert_eq!(reply, Reply::Done);
    }

    #[test]
    fn test_zero_all_sends_unset_service() {
        let (_, params) = Command::Zero(None).encode().unwrap();
        assert_eq!(params["Service"]["Addr"], json!(0));
        assert_eq!(params["Service"]["Protocol"], json!(0));
    }

    #[test]
    fn test_status_checked_before_payload() {
        let err = Command::GetService(key())
            .decode_reply(json!({"Code": 5, "Msg": "msg", "Service": "garbage"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "EIO:msg");
        assert_eq!(err.status(), Some(5));
    }

    #[test]
    fn test_mistyped_payload_is_decode_error() {
        let err = Command::GetServices { limit: 0 }
            .decode_reply(json!({"Code": 0, "Msg": "", "Services": "garbage"}))
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "{err:?}");

        let err = Command::Flush.decode_reply(json!("not an object")).unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "{err:?}");
    }

    #[test]
    fn test_decode_replies() {
        let reply = Command::Flush.decode_reply(json!({"Code": 0, "Msg": ""})).unwrap();
        assert_eq!(reply, Reply::Done);
        assert_eq!(reply.to_string(), "done");

        let reply = Command::GetTimeout
            .decode_reply(json!({"Code": 0, "Tcp_timeout": 900, "Tcp_fin_timeout": 120, "Udp_timeout": 300}))
            .unwrap();
        assert_eq!(reply, Reply::Timeout(TimeoutSet { tcp: 900, tcp_fin: 120, udp: 300 }));

        let reply = Command::GetService(key())
            .decode_reply(json!({
                "Code": 0,
                "Service": {
                    "Protocol": 6,
                    "Addr": Address::parse("10.0.0.1").unwrap().to_network(),
                    "Port": Port::new(80).to_network(),
                }
            }))
            .unwrap();
        let Reply::Service(service) = reply else {
            panic!("expected a service reply");
        };
        assert_eq!(service.key(), Some(key()));
        assert_eq!(service.key().map(|k| k.protocol), Some(Protocol::Tcp));
    }

    #[test]
    fn test_decode_stats_by_family() {
        let reply = Command::GetStats { family: StatsFamily::Ctl, id: Some(0) }
            .decode_reply(json!({"Code": 0, "Seq": 3, "Num_services": 1, "Workers": null}))
            .unwrap();
        let Reply::Stats(snapshot) = reply else {
            panic!("expected stats");
        };
        assert_eq!(snapshot.family(), StatsFamily::Ctl);
    }
}

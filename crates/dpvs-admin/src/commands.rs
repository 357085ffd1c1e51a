//! Turns parsed command lines into engine commands and runs them.

use common::{Error, Result};
use dpvs::{
    Address, Client, Command, ConnFlags, DestSpec, Endpoint, LaddrSpec, ListLimits, Protocol,
    ServiceFlags, ServiceKey, ServiceSpec, StatsFamily, TimeoutSet, Transport,
};
use tracing::debug;

use crate::cli::{AddArgs, AdminCommand, DelArgs, DestArgs, EditArgs, ServiceArgs, TargetArgs};

/// What a command line asks of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Execute(Command),
    /// Services with their members; a `None` filter lists every service
    List {
        filter: Option<ServiceKey>,
        limits: ListLimits,
    },
}

fn service_key(target: &TargetArgs) -> Result<ServiceKey> {
    let protocol = match (target.tcp_service, target.udp_service) {
        (true, false) => Protocol::Tcp,
        (false, true) => Protocol::Udp,
        _ => return Err(Error::syntax("select the service with -t or -u")),
    };
    let text = target
        .target
        .as_deref()
        .ok_or_else(|| Error::syntax("missing service address host[:port]"))?;
    Ok(ServiceKey::new(protocol, Endpoint::parse(text)?))
}

/// A service filter: nothing selected means every service.
fn service_filter(target: &TargetArgs) -> Result<Option<ServiceKey>> {
    if !target.tcp_service && !target.udp_service && target.target.is_none() {
        return Ok(None);
    }
    service_key(target).map(Some)
}

fn service_spec(args: &ServiceArgs) -> Result<ServiceSpec> {
    let mut spec = ServiceSpec::new(service_key(&args.target)?);
    spec.nic = args.nic;
    spec.scheduler = args.sched.clone();
    spec.flags = ServiceFlags(args.flags);
    spec.timeout = args.persistent;
    spec.netmask = match &args.netmask {
        Some(mask) => Address::parse(mask)?,
        None => Address::UNSET,
    };
    Ok(spec)
}

fn dest_spec(args: &DestArgs, text: &str) -> Result<DestSpec> {
    let mut spec = DestSpec::new(Endpoint::parse(text)?);
    spec.nic = args.dest_nic;
    spec.conn_flags = ConnFlags(args.conn_flags);
    spec.weight = args.weight;
    spec.upper_threshold = args.upper_threshold;
    spec.lower_threshold = args.lower_threshold;
    Ok(spec)
}

fn build_add(args: &AddArgs) -> Result<Command> {
    let service = service_key(&args.service.target)?;
    if let Some(laddr) = &args.laddr {
        return Ok(Command::NewLaddr {
            service,
            laddr: LaddrSpec {
                nic: args.lnic,
                addr: Address::parse(laddr)?,
            },
        });
    }
    if let Some(dest) = &args.dest.dest {
        return Ok(Command::NewDest {
            service,
            dest: dest_spec(&args.dest, dest)?,
        });
    }
    Ok(Command::NewService(service_spec(&args.service)?))
}

fn build_edit(args: &EditArgs) -> Result<Command> {
    if let Some(dest) = &args.dest.dest {
        return Ok(Command::SetDest {
            service: service_key(&args.service.target)?,
            dest: dest_spec(&args.dest, dest)?,
        });
    }
    Ok(Command::SetService(service_spec(&args.service)?))
}

fn build_del(args: &DelArgs) -> Result<Command> {
    let service = service_key(&args.target)?;
    if let Some(laddr) = &args.laddr {
        return Ok(Command::DelLaddr {
            service,
            laddr: LaddrSpec {
                nic: args.lnic,
                addr: Address::parse(laddr)?,
            },
        });
    }
    if let Some(dest) = &args.dest {
        return Ok(Command::DelDest {
            service,
            dest: Endpoint::parse(dest)?,
        });
    }
    Ok(Command::DelService(service))
}

/// Parse every operand of `command`. Nothing is sent.
pub fn build(command: &AdminCommand) -> Result<Action> {
    let command = match command {
        AdminCommand::Version => Command::GetVersion,
        AdminCommand::List(args) => {
            return Ok(Action::List {
                filter: service_filter(&args.target)?,
                limits: ListLimits {
                    services: args.num_services,
                    members: args.number,
                },
            });
        }
        AdminCommand::Add(args) => build_add(args)?,
        AdminCommand::Edit(args) => build_edit(args)?,
        AdminCommand::Del(args) => build_del(args)?,
        AdminCommand::Flush => Command::Flush,
        AdminCommand::Zero(target) => Command::Zero(service_filter(target)?),
        AdminCommand::Timeout(args) => match &args.set {
            Some(text) => Command::SetTimeout(text.parse::<TimeoutSet>()?),
            None => Command::GetTimeout,
        },
        AdminCommand::Stats(args) => {
            let family: StatsFamily = args.family.parse()?;
            // The controller and memory families have no per-object view
            let id = match family {
                StatsFamily::Ctl | StatsFamily::Mem => None,
                _ => args.id,
            };
            Command::GetStats { family, id }
        }
    };
    Ok(Action::Execute(command))
}

fn push_block(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

/// Run `action`, appending rendered output to `out`.
///
/// Output produced before a failure stays in `out`.
pub fn run<T: Transport>(client: &mut Client<T>, action: &Action, out: &mut String) -> Result<()> {
    match action {
        Action::Execute(command) => {
            let reply = client.execute(command)?;
            push_block(out, &reply.to_string());
            Ok(())
        }
        Action::List { filter, limits } => {
            let listing = client.list_with_members(filter.as_ref(), *limits)?;
            push_block(out, &listing.to_string());

            if let Some(err) = listing.aborted {
                return Err(err);
            }
            match listing.entries.into_iter().find(|e| e.members.is_err()) {
                Some(failed) => failed.members.map(|_| ()),
                None => Ok(()),
            }
        }
    }
}

/// Parse and run one command line.
pub fn dispatch<T: Transport>(
    client: &mut Client<T>,
    command: &AdminCommand,
    out: &mut String,
) -> Result<()> {
    let action = build(command)?;
    debug!("Running {:?}", action);
    run(client, &action, out)
}

/// Process exit code for an error.
pub fn exit_code(err: &Error) -> u8 {
    match err {
        Error::Engine { .. } => 1,
        Error::Syntax(_) => 2,
        Error::Connectivity { .. } | Error::Transport(_) => 3,
        Error::Decode(_) => 4,
        Error::Config(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use dpvs::{Port, Procedure};
    use serde_json::{Value, json};

    mockall::mock! {
        Engine {}

        impl Transport for Engine {
            fn call(&mut self, procedure: Procedure, params: Value) -> common::Result<Value>;
            fn close(&mut self);
        }
    }

    fn parse(args: &[&str]) -> AdminCommand {
        let mut argv = vec!["dpvsadm"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    fn run_line(engine: MockEngine, args: &[&str]) -> (Result<()>, String) {
        let mut client = Client::with_transport(engine);
        let mut out = String::new();
        let result = dispatch(&mut client, &parse(args), &mut out);
        (result, out)
    }

    fn service_json() -> Value {
        json!({
            "Protocol": 6,
            "Addr": Address::parse("10.0.0.1").unwrap().to_network(),
            "Port": Port::new(80).to_network(),
            "Sched_name": "rr",
            "Conns": 4242,
            "Inpkts": 1001,
            "Outpkts": 2002,
            "Inbytes": 30303,
            "Outbytes": 40404,
        })
    }

    #[test]
    fn test_get_service_renders_counters() {
        let mut engine = MockEngine::new();
        engine.expect_call().returning(|_, params| match params["Cmd"].as_u64() {
            Some(4) => Ok(json!({"Code": 0, "Msg": "", "Service": service_json()})),
            Some(9) => Ok(json!({"Code": 0, "Msg": "", "Dests": []})),
            Some(21) => Ok(json!({"Code": 0, "Msg": "", "Laddrs": []})),
            other => panic!("unexpected command {other:?}"),
        });

        let (result, out) = run_line(engine, &["list", "-t", "10.0.0.1:80"]);
        result.unwrap();

        let line = out
            .lines()
            .find(|l| l.contains("10.0.0.1:80"))
            .expect("service line");
        assert!(line.contains("tcp"));
        for counter in ["4242", "1001", "2002", "30303", "40404"] {
            assert!(line.contains(counter), "missing {counter} in {line:?}");
        }
    }

    #[test]
    fn test_bad_destination_makes_no_call() {
        let mut engine = MockEngine::new();
        engine.expect_call().times(0);

        let (result, out) = run_line(engine, &["add", "-t", "10.0.0.1:80", "--dest", "not-an-ip"]);
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Syntax(_)), "{err:?}");
        assert_eq!(exit_code(&err), 2);
        assert!(out.is_empty());
    }

    #[test]
    fn test_syntax_errors_before_any_call() {
        for args in [
            &["add", "10.0.0.1:80"][..],
            &["add", "-t"][..],
            &["del", "-u", "10.0.0.256:53"][..],
            &["add", "-t", "10.0.0.1:80", "--laddr", "1.2.3"][..],
            &["timeout", "--set", "1,2"][..],
            &["stats", "-t", "disk"][..],
            &["zero", "-t", "10.0.0.1:99999"][..],
        ] {
            let mut engine = MockEngine::new();
            engine.expect_call().times(0);
            let (result, _) = run_line(engine, args);
            assert!(matches!(result, Err(Error::Syntax(_))), "{args:?}");
        }
    }

    #[test]
    fn test_add_service_defaults() {
        let mut engine = MockEngine::new();
        engine
            .expect_call()
            .times(1)
            .withf(|procedure, params| {
                *procedure == Procedure::Api
                    && params["Cmd"] == json!(1)
                    && params["Service"]["Protocol"] == json!(17)
                    && params["Service"]["Sched_name"] == json!("rr")
            })
            .returning(|_, _| Ok(json!({"Code": 0, "Msg": ""})));

        let (result, out) = run_line(engine, &["add", "-u", "10.0.0.53:53"]);
        result.unwrap();
        assert_eq!(out, "done\n");
    }

    #[test]
    fn test_add_destination_uses_fullnat() {
        let mut engine = MockEngine::new();
        engine
            .expect_call()
            .times(1)
            .withf(|_, params| {
                params["Cmd"] == json!(6)
                    && params["Dest"]["Conn_flags"] == json!(ConnFlags::FULLNAT)
                    && params["Dest"]["Weight"] == json!(3)
            })
            .returning(|_, _| Ok(json!({"Code": 0, "Msg": ""})));

        let (result, _) = run_line(
            engine,
            &["add", "-t", "10.0.0.1:80", "--dest", "192.168.0.2:8080", "--weight", "3"],
        );
        result.unwrap();
    }

    #[test]
    fn test_del_local_address() {
        let mut engine = MockEngine::new();
        engine
            .expect_call()
            .times(1)
            .withf(|_, params| {
                params["Cmd"] == json!(20)
                    && params["Laddr"]["Addr"] == json!(Address::parse("172.16.0.9").unwrap().to_network())
                    && params["Laddr"]["Nic"] == json!(1)
            })
            .returning(|_, _| Ok(json!({"Code": 0, "Msg": ""})));

        let (result, _) = run_line(
            engine,
            &["del", "-t", "10.0.0.1:80", "--laddr", "172.16.0.9", "--lnic", "1"],
        );
        result.unwrap();
    }

    #[test]
    fn test_engine_status_is_reported() {
        let mut engine = MockEngine::new();
        engine
            .expect_call()
            .times(1)
            .returning(|_, _| Ok(json!({"Code": 2, "Msg": "no such service", "Service": 17})));

        let (result, out) = run_line(engine, &["del", "-t", "10.0.0.1:80"]);
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "ENOENT:no such service");
        assert_eq!(exit_code(&err), 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_zero_without_target_zeroes_all() {
        let mut engine = MockEngine::new();
        engine
            .expect_call()
            .times(1)
            .withf(|_, params| params["Cmd"] == json!(17) && params["Service"]["Addr"] == json!(0))
            .returning(|_, _| Ok(json!({"Code": 0, "Msg": ""})));

        let (result, _) = run_line(engine, &["zero"]);
        result.unwrap();
    }

    #[test]
    fn test_ctl_stats_ignore_id() {
        let command = parse(&["stats", "-t", "ctl", "-i", "3"]);
        assert_eq!(
            build(&command).unwrap(),
            Action::Execute(Command::GetStats {
                family: StatsFamily::Ctl,
                id: None
            })
        );
        let command = parse(&["stats", "-t", "worker", "-i", "3"]);
        assert_eq!(
            build(&command).unwrap(),
            Action::Execute(Command::GetStats {
                family: StatsFamily::Worker,
                id: Some(3)
            })
        );
    }

    #[test]
    fn test_list_limits_reach_the_engine() {
        let command = parse(&["list", "--num-services", "3", "-n", "7"]);
        assert_eq!(
            build(&command).unwrap(),
            Action::List {
                filter: None,
                limits: ListLimits { services: 3, members: 7 },
            }
        );

        let mut engine = MockEngine::new();
        engine.expect_call().returning(|_, params| match params["Cmd"].as_u64() {
            Some(5) if params["Num_services"] == json!(3) => {
                Ok(json!({"Code": 0, "Num_services": 1, "Services": [service_json()]}))
            }
            Some(9) | Some(21) if params["Service"]["Number"] == json!(7) => {
                Ok(json!({"Code": 0, "Msg": ""}))
            }
            _ => panic!("unexpected request {params}"),
        });

        let (result, out) = run_line(engine, &["list", "--num-services", "3", "-n", "7"]);
        result.unwrap();
        assert!(out.contains("10.0.0.1:80"));
    }

    #[test]
    fn test_partial_listing_keeps_output() {
        let mut engine = MockEngine::new();
        engine.expect_call().returning(|_, params| match params["Cmd"].as_u64() {
            Some(5) => Ok(json!({"Code": 0, "Num_services": 1, "Services": [service_json()]})),
            Some(9) => Ok(json!({"Code": 12, "Msg": "out of memory"})),
            other => panic!("unexpected command {other:?}"),
        });

        let (result, out) = run_line(engine, &["list"]);
        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(12));
        assert!(out.contains("10.0.0.1:80"));
        assert!(out.contains("error: ENOMEM:out of memory"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Error::transport("closed")), 3);
        assert_eq!(
            exit_code(&Error::connectivity(
                "unix:/tmp/dpvs.sock",
                std::io::Error::from(std::io::ErrorKind::NotFound)
            )),
            3
        );
        assert_eq!(exit_code(&Error::decode("bad")), 4);
        assert_eq!(exit_code(&Error::config("bad")), 5);
    }
}

//! Command line surface of `dpvsadm`.
//!
//! Addresses stay text here. They are parsed when the engine command is
//! built, so a bad address fails before any connection is made.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Administer a DPVS load-balancing engine.
#[derive(Parser, Debug)]
#[command(name = "dpvsadm", version, about)]
pub struct Cli {
    /// Configuration file (default: standard search path)
    #[arg(long, global = true, env = "DPVSADM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Engine Unix socket, overrides the configuration
    #[arg(long, global = true, env = "DPVS_SOCKET", conflicts_with = "tcp_addr")]
    pub socket: Option<PathBuf>,

    /// Engine TCP address, overrides the configuration
    #[arg(long = "tcp", global = true, value_name = "HOST:PORT")]
    pub tcp_addr: Option<String>,

    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommand {
    /// Show engine version and connection table size
    Version,
    /// List one service, or every service, with destinations and local addresses
    List(ListArgs),
    /// Add a service, or a destination or local address to a service
    Add(AddArgs),
    /// Edit a service or one of its destinations
    Edit(EditArgs),
    /// Delete a service, or a destination or local address of a service
    Del(DelArgs),
    /// Remove every service
    Flush,
    /// Zero the counters of one service, or of all of them
    Zero(TargetArgs),
    /// Show or set tcp, tcp_fin and udp timeouts
    Timeout(TimeoutArgs),
    /// Show engine statistics
    Stats(StatsArgs),
}

/// Selects a service: `-t|-u host[:port]`.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// TCP service
    #[arg(short = 't', long = "tcp-service")]
    pub tcp_service: bool,

    /// UDP service
    #[arg(short = 'u', long = "udp-service", conflicts_with = "tcp_service")]
    pub udp_service: bool,

    /// Service address
    #[arg(value_name = "HOST[:PORT]")]
    pub target: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Most services to list, 0 for all
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub num_services: i32,

    /// Most destinations and local addresses per service, 0 for all
    #[arg(short = 'n', long, value_name = "N", default_value_t = 0)]
    pub number: i32,
}

#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Interface the service address is bound to
    #[arg(long, default_value_t = 0)]
    pub nic: u8,

    /// Scheduler name
    #[arg(long, default_value = "rr")]
    pub sched: String,

    /// Raw service flags
    #[arg(long, default_value_t = 0)]
    pub flags: u32,

    /// Persistence timeout in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    pub persistent: u32,

    /// Persistence netmask
    #[arg(long, value_name = "MASK")]
    pub netmask: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DestArgs {
    /// Destination (real server) address
    #[arg(long, value_name = "HOST[:PORT]")]
    pub dest: Option<String>,

    /// Outgoing interface of the destination
    #[arg(long, default_value_t = 0)]
    pub dest_nic: u8,

    /// Raw connection flags; FULLNAT when no forwarding method is set
    #[arg(long, default_value_t = 0)]
    pub conn_flags: u32,

    /// Capacity of the real server
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub weight: i32,

    /// Upper connection threshold
    #[arg(short = 'x', long, default_value_t = 0)]
    pub upper_threshold: u32,

    /// Lower connection threshold
    #[arg(short = 'y', long, default_value_t = 0)]
    pub lower_threshold: u32,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    #[command(flatten)]
    pub dest: DestArgs,

    /// Local address to add
    #[arg(long, value_name = "HOST", conflicts_with = "dest")]
    pub laddr: Option<String>,

    /// Interface the local address is bound to
    #[arg(long, default_value_t = 0)]
    pub lnic: u8,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    #[command(flatten)]
    pub dest: DestArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DelArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Destination to delete
    #[arg(long, value_name = "HOST[:PORT]")]
    pub dest: Option<String>,

    /// Local address to delete
    #[arg(long, value_name = "HOST", conflicts_with = "dest")]
    pub laddr: Option<String>,

    /// Interface the local address is bound to
    #[arg(long, default_value_t = 0)]
    pub lnic: u8,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TimeoutArgs {
    /// New timeouts in seconds
    #[arg(long, value_name = "TCP,TCP_FIN,UDP")]
    pub set: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// Statistics family: io, worker, estats, dev, ctl or mem
    #[arg(short = 't', long = "type", default_value = "io")]
    pub family: String,

    /// Core, port or socket id (default: all)
    #[arg(short = 'i', long, allow_negative_numbers = true)]
    pub id: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_destination() {
        let cli = Cli::try_parse_from([
            "dpvsadm", "add", "-t", "10.0.0.1:80", "--dest", "192.168.0.2:8080", "--weight", "5",
        ])
        .unwrap();
        let AdminCommand::Add(args) = cli.command else {
            panic!("expected add");
        };
        assert!(args.service.target.tcp_service);
        assert_eq!(args.service.target.target.as_deref(), Some("10.0.0.1:80"));
        assert_eq!(args.dest.dest.as_deref(), Some("192.168.0.2:8080"));
        assert_eq!(args.dest.weight, 5);
        assert_eq!(args.service.sched, "rr");
    }

    #[test]
    fn test_engine_overrides() {
        let cli = Cli::try_parse_from(["dpvsadm", "--tcp", "127.0.0.1:7000", "version"]).unwrap();
        assert_eq!(cli.tcp_addr.as_deref(), Some("127.0.0.1:7000"));
        assert!(
            Cli::try_parse_from(["dpvsadm", "--tcp", "h:1", "--socket", "/tmp/x.sock", "flush"])
                .is_err()
        );
    }

    #[test]
    fn test_tcp_and_udp_conflict() {
        assert!(Cli::try_parse_from(["dpvsadm", "list", "-t", "-u", "10.0.0.1"]).is_err());
    }

    #[test]
    fn test_list_limits() {
        let cli = Cli::try_parse_from(["dpvsadm", "list", "--num-services", "10", "-n", "5"]).unwrap();
        let AdminCommand::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.num_services, 10);
        assert_eq!(args.number, 5);
        assert_eq!(args.target.target, None);

        let cli = Cli::try_parse_from(["dpvsadm", "list", "-t", "10.0.0.1:80"]).unwrap();
        let AdminCommand::List(args) = cli.command else {
            panic!("expected list");
        };
        assert!(args.target.tcp_service);
        assert_eq!(args.number, 0);
    }

    #[test]
    fn test_stats_defaults() {
        let cli = Cli::try_parse_from(["dpvsadm", "stats"]).unwrap();
        let AdminCommand::Stats(args) = cli.command else {
            panic!("expected stats");
        };
        assert_eq!(args.family, "io");
        assert_eq!(args.id, None);
    }
}

//! Statistics families served by the `stats` procedure, and their reports.
//!
//! Every report is a fixed-column table. The extended worker family is keyed
//! by counter name on the wire, but always rendered from [`ESTATS_NAMES`] so
//! columns stay put when the engine adds or drops counters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::commands::{StatsFamily, ctl_state};
use crate::errno;
use crate::messages::{EngineReply, engine_reply, null_as_default};

/// Revision of [`ESTATS_NAMES`].
pub const ESTATS_VERSION: u32 = 1;

/// Canonical extended counter names, in report order.
pub const ESTATS_NAMES: &[&str] = &[
    "fullnat_add_toa_ok",
    "fullnat_add_toa_fail_len",
    "fullnat_add_toa_head_full",
    "fullnat_add_toa_fail_mem",
    "fullnat_add_toa_fail_proto",
    "fullnat_conn_reused",
    "fullnat_conn_reused_close",
    "fullnat_conn_reused_timewait",
    "fullnat_conn_reused_finwait",
    "fullnat_conn_reused_closewait",
    "fullnat_conn_reused_lastack",
    "fullnat_conn_reused_estab",
    "synproxy_rs_error",
    "synproxy_null_ack",
    "synproxy_bad_ack",
    "synproxy_ok_ack",
    "synproxy_syn_cnt",
    "synproxy_ackstorm",
    "synproxy_synsend_qlen",
    "synproxy_conn_reused",
    "synproxy_conn_reused_close",
    "synproxy_conn_reused_timewait",
    "synproxy_conn_reused_finwait",
    "synproxy_conn_reused_closewait",
    "synproxy_conn_reused_lastack",
    "defence_ip_frag_drop",
    "defence_ip_frag_gather",
    "defence_tcp_drop",
    "defence_udp_drop",
    "fast_xmit_reject",
    "fast_xmit_pass",
    "fast_xmit_skb_copy",
    "fast_xmit_no_mac",
    "fast_xmit_synproxy_save",
    "fast_xmit_dev_lost",
    "rst_in_syn_sent",
    "rst_out_syn_sent",
    "rst_in_established",
    "rst_out_established",
    "gro_pass",
    "lro_reject",
    "xmit_unexpected_mtu",
    "conn_sched_unreach",
];

/// Per-port KNI counters attached to an I/O core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KniStats {
    pub port: i32,
    #[serde(rename = "Rx_packets")]
    pub rx_packets: i64,
    #[serde(rename = "Rx_dropped")]
    pub rx_dropped: i64,
    #[serde(rename = "Tx_packets")]
    pub tx_packets: i64,
    #[serde(rename = "Tx_dropped")]
    pub tx_dropped: i64,
}

/// Ring, queue and port counters of one I/O core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IoEntry {
    pub core: i32,
    #[serde(rename = "Rx_rings_count", deserialize_with = "null_as_default")]
    pub rx_rings_count: Vec<i64>,
    #[serde(rename = "Rx_rings_iters", deserialize_with = "null_as_default")]
    pub rx_rings_iters: Vec<i64>,
    #[serde(rename = "Rx_nic_queues_count", deserialize_with = "null_as_default")]
    pub rx_nic_queues_count: Vec<i64>,
    #[serde(rename = "Rx_nic_queues_iters", deserialize_with = "null_as_default")]
    pub rx_nic_queues_iters: Vec<i64>,
    #[serde(rename = "Tx_nic_ports_count", deserialize_with = "null_as_default")]
    pub tx_nic_ports_count: Vec<i64>,
    #[serde(rename = "Tx_nic_ports_iters", deserialize_with = "null_as_default")]
    pub tx_nic_ports_iters: Vec<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub kni: Vec<KniStats>,
    #[serde(rename = "Kni_deq")]
    pub kni_deq: i64,
    #[serde(rename = "Kni_deq_err")]
    pub kni_deq_err: i64,
}

/// Protocol counters of one worker core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WorkerEntry {
    pub core: i32,
    pub ipmiss: i64,
    pub frag: i64,
    pub icmp: i64,
    pub v4pkt: i64,
    pub v4sctp: i64,
    pub v4ospf: i64,
    pub v4unknow: i64,
    pub v4drop: i64,
    #[serde(rename = "Kni_enq")]
    pub kni_enq: i64,
    #[serde(rename = "Kni_enq_err")]
    pub kni_enq_err: i64,
    pub arp: i64,
    pub ipv6: i64,
    pub unknow: i64,
}

/// Extended counters of one worker core, keyed by counter name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExtendedWorkerEntry {
    pub core: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub counters: HashMap<String, u64>,
}

impl ExtendedWorkerEntry {
    /// Value of a counter, zero when the engine did not report it.
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Counters in canonical order. Names outside the list are dropped.
    pub fn canonical(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        ESTATS_NAMES.iter().map(move |name| (*name, self.get(name)))
    }
}

/// NIC counters of one port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DevEntry {
    pub port: i32,
    pub ipackets: i64,
    pub opackets: i64,
    pub ibytes: i64,
    pub obytes: i64,
    pub imissed: i64,
    pub ierrors: i64,
    pub oerrors: i64,
    #[serde(rename = "Rx_nombuf")]
    pub rx_nombuf: i64,
}

/// Sync state of one worker as seen by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CtlWorker {
    #[serde(rename = "Worker_id")]
    pub worker_id: i32,
    #[serde(rename = "Num_services")]
    pub num_services: i32,
    pub seq: i32,
    pub state: i32,
}

/// Controller view: its own sequence plus every worker's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CtlState {
    pub num_services: i32,
    pub seq: i32,
    pub workers: Vec<CtlWorker>,
}

/// Memory pool sizes (or free counts, per socket).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MemPools {
    pub mbuf: i64,
    pub svc: i64,
    pub rs: i64,
    pub laddr: i64,
    pub conn: i64,
}

/// Free entries per pool on one NUMA socket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MemSocket {
    #[serde(rename = "Socket_id")]
    pub socket_id: i32,
    #[serde(flatten)]
    pub free: MemPools,
}

/// Pool sizes and per-socket availability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemUsage {
    pub size: MemPools,
    pub available: Vec<MemSocket>,
}

impl MemUsage {
    /// Entries in use on a socket: size minus free, wrapping on overflow.
    pub fn used(&self, socket: &MemSocket) -> MemPools {
        MemPools {
            mbuf: self.size.mbuf.wrapping_sub(socket.free.mbuf),
            svc: self.size.svc.wrapping_sub(socket.free.svc),
            rs: self.size.rs.wrapping_sub(socket.free.rs),
            laddr: self.size.laddr.wrapping_sub(socket.free.laddr),
            conn: self.size.conn.wrapping_sub(socket.free.conn),
        }
    }
}

// Raw replies, one per family.

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IoReply {
    pub code: i32,
    pub msg: String,
    #[serde(deserialize_with = "null_as_default")]
    pub io: Vec<IoEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WorkerReply {
    pub code: i32,
    pub msg: String,
    #[serde(deserialize_with = "null_as_default")]
    pub worker: Vec<WorkerEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EstatsReply {
    pub code: i32,
    pub msg: String,
    #[serde(deserialize_with = "null_as_default")]
    pub estats: Vec<ExtendedWorkerEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DevReply {
    pub code: i32,
    pub msg: String,
    #[serde(deserialize_with = "null_as_default")]
    pub dev: Vec<DevEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CtlReply {
    pub code: i32,
    pub msg: String,
    #[serde(rename = "Num_services")]
    pub num_services: i32,
    pub seq: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub workers: Vec<CtlWorker>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MemReply {
    pub code: i32,
    pub msg: String,
    pub size: MemPools,
    #[serde(deserialize_with = "null_as_default")]
    pub available: Vec<MemSocket>,
}

engine_reply!(IoReply, WorkerReply, EstatsReply, DevReply, CtlReply, MemReply);

/// A decoded statistics payload. Only built from zero-status replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsSnapshot {
    Io(Vec<IoEntry>),
    Worker(Vec<WorkerEntry>),
    ExtendedWorker(Vec<ExtendedWorkerEntry>),
    Dev(Vec<DevEntry>),
    Ctl(CtlState),
    Mem(MemUsage),
}

impl StatsSnapshot {
    pub fn family(&self) -> StatsFamily {
        match self {
            StatsSnapshot::Io(_) => StatsFamily::Io,
            StatsSnapshot::Worker(_) => StatsFamily::Worker,
            StatsSnapshot::ExtendedWorker(_) => StatsFamily::ExtendedWorker,
            StatsSnapshot::Dev(_) => StatsFamily::Dev,
            StatsSnapshot::Ctl(_) => StatsFamily::Ctl,
            StatsSnapshot::Mem(_) => StatsFamily::Mem,
        }
    }
}

impl From<IoReply> for StatsSnapshot {
    fn from(reply: IoReply) -> Self {
        StatsSnapshot::Io(reply.io)
    }
}

impl From<WorkerReply> for StatsSnapshot {
    fn from(reply: WorkerReply) -> Self {
        StatsSnapshot::Worker(reply.worker)
    }
}

impl From<EstatsReply> for StatsSnapshot {
    fn from(reply: EstatsReply) -> Self {
        StatsSnapshot::ExtendedWorker(reply.estats)
    }
}

impl From<DevReply> for StatsSnapshot {
    fn from(reply: DevReply) -> Self {
        StatsSnapshot::Dev(reply.dev)
    }
}

impl From<CtlReply> for StatsSnapshot {
    fn from(reply: CtlReply) -> Self {
        StatsSnapshot::Ctl(CtlState {
            num_services: reply.num_services,
            seq: reply.seq,
            workers: reply.workers,
        })
    }
}

impl From<MemReply> for StatsSnapshot {
    fn from(reply: MemReply) -> Self {
        StatsSnapshot::Mem(MemUsage {
            size: reply.size,
            available: reply.available,
        })
    }
}

// Reports

const CELL: usize = 10;

fn write_row(
    f: &mut fmt::Formatter<'_>,
    lead: &dyn fmt::Display,
    lead_width: usize,
    cells: &[&dyn fmt::Display],
) -> fmt::Result {
    write!(f, "{lead:<lead_width$}")?;
    for cell in cells {
        write!(f, " {cell:>CELL$}")?;
    }
    writeln!(f)
}

fn write_io(f: &mut fmt::Formatter<'_>, entries: &[IoEntry]) -> fmt::Result {
    for e in entries {
        write_row(f, &"core", CELL, &[&"kni_deq", &"kni_deq_err"])?;
        write_row(f, &e.core, CELL, &[&e.kni_deq, &e.kni_deq_err])?;
        writeln!(f)?;

        let rows = [
            e.rx_rings_count.len(),
            e.rx_nic_queues_count.len(),
            e.tx_nic_ports_count.len(),
            e.kni.len(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0);
        let at = |v: &[i64], i: usize| v.get(i).copied().unwrap_or(0);

        write_row(
            f,
            &"id",
            CELL,
            &[
                &"rx_ring_c",
                &"rx_ring_i",
                &"rx_nic_q_c",
                &"rx_nic_q_i",
                &"tx_nic_p_c",
                &"tx_nic_p_i",
                &"kni_port",
                &"kni_rx_pkt",
                &"kni_rx_drop",
                &"kni_tx_pkt",
                &"kni_tx_drop",
            ],
        )?;
        for i in 0..rows {
            let kni = e.kni.get(i).cloned().unwrap_or_default();
            write_row(
                f,
                &i,
                CELL,
                &[
                    &at(&e.rx_rings_count, i),
                    &at(&e.rx_rings_iters, i),
                    &at(&e.rx_nic_queues_count, i),
                    &at(&e.rx_nic_queues_iters, i),
                    &at(&e.tx_nic_ports_count, i),
                    &at(&e.tx_nic_ports_iters, i),
                    &kni.port,
                    &kni.rx_packets,
                    &kni.rx_dropped,
                    &kni.tx_packets,
                    &kni.tx_dropped,
                ],
            )?;
        }
        writeln!(f)?;
    }
    Ok(())
}

fn write_worker(f: &mut fmt::Formatter<'_>, entries: &[WorkerEntry]) -> fmt::Result {
    write_row(
        f,
        &"core",
        5,
        &[
            &"ipmiss",
            &"frag",
            &"icmp",
            &"pkt",
            &"v4sctp",
            &"ospf",
            &"unknow(v4)",
            &"drop",
            &"kni_enq",
            &"kni_err",
            &"arp",
            &"ipv6",
            &"unknow",
        ],
    )?;
    for e in entries {
        write_row(
            f,
            &e.core,
            5,
            &[
                &e.ipmiss,
                &e.frag,
                &e.icmp,
                &e.v4pkt,
                &e.v4sctp,
                &e.v4ospf,
                &e.v4unknow,
                &e.v4drop,
                &e.kni_enq,
                &e.kni_enq_err,
                &e.arp,
                &e.ipv6,
                &e.unknow,
            ],
        )?;
    }
    Ok(())
}

const ESTATS_NAME_WIDTH: usize = 32;
const ESTATS_CELL: usize = 14;

fn write_estats(f: &mut fmt::Formatter<'_>, entries: &[ExtendedWorkerEntry]) -> fmt::Result {
    write!(f, "{:<ESTATS_NAME_WIDTH$}", "counter")?;
    for e in entries {
        write!(f, " {:>ESTATS_CELL$}", format!("core{}", e.core))?;
    }
    writeln!(f)?;

    for name in ESTATS_NAMES {
        write!(f, "{name:<ESTATS_NAME_WIDTH$}")?;
        for e in entries {
            write!(f, " {:>ESTATS_CELL$}", e.get(name))?;
        }
        writeln!(f)?;
    }
    Ok(())
}

fn write_dev(f: &mut fmt::Formatter<'_>, entries: &[DevEntry]) -> fmt::Result {
    write_row(
        f,
        &"port",
        CELL,
        &[
            &"ipackets",
            &"opackets",
            &"ibytes",
            &"obytes",
            &"imissed",
            &"ierrors",
            &"oerrors",
            &"rx_nombuf",
        ],
    )?;
    for e in entries {
        write_row(
            f,
            &e.port,
            CELL,
            &[
                &e.ipackets,
                &e.opackets,
                &e.ibytes,
                &e.obytes,
                &e.imissed,
                &e.ierrors,
                &e.oerrors,
                &e.rx_nombuf,
            ],
        )?;
    }
    Ok(())
}

fn write_ctl(f: &mut fmt::Formatter<'_>, ctl: &CtlState) -> fmt::Result {
    write_row(f, &"id", CELL, &[&"seq", &"n_svc", &"state"])?;
    write_row(f, &"-", CELL, &[&ctl.seq, &ctl.num_services, &'-'])?;
    writeln!(f)?;
    for w in &ctl.workers {
        write_row(
            f,
            &w.worker_id,
            CELL,
            &[&w.seq, &w.num_services, &ctl_state::letter(w.state)],
        )?;
    }
    Ok(())
}

fn write_mem(f: &mut fmt::Formatter<'_>, mem: &MemUsage) -> fmt::Result {
    write_row(f, &"id", CELL, &[&"mbuf", &"svc", &"rs", &"laddr", &"conn"])?;
    let s = &mem.size;
    write_row(f, &"max", CELL, &[&s.mbuf, &s.svc, &s.rs, &s.laddr, &s.conn])?;
    writeln!(f)?;
    for socket in &mem.available {
        let u = mem.used(socket);
        write_row(
            f,
            &socket.socket_id,
            CELL,
            &[&u.mbuf, &u.svc, &u.rs, &u.laddr, &u.conn],
        )?;
    }
    Ok(())
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsSnapshot::Io(entries) => write_io(f, entries),
            StatsSnapshot::Worker(entries) => write_worker(f, entries),
            StatsSnapshot::ExtendedWorker(entries) => write_estats(f, entries),
            StatsSnapshot::Dev(entries) => write_dev(f, entries),
            StatsSnapshot::Ctl(ctl) => write_ctl(f, ctl),
            StatsSnapshot::Mem(mem) => write_mem(f, mem),
        }
    }
}

macro_rules! stats_reply_display {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    if !self.is_ok() {
                        return write!(f, "{}:{}", errno::describe_status(self.code), self.msg);
                    }
                    fmt::Display::fmt(&StatsSnapshot::from(self.clone()), f)
                }
            }
        )+
    };
}

stats_reply_display!(IoReply, WorkerReply, EstatsReply, DevReply, CtlReply, MemReply);

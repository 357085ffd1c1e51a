//! Administrative client for the DPVS load-balancing engine.
//!
//! The engine runs as a separate process and exposes a JSON-RPC control
//! socket. This crate models its command set, encodes addresses and ports
//! in network byte order the way the engine stores them, and decodes and
//! renders its replies.
//!
//! # Example
//!
//! ```no_run
//! use dpvs::{Client, EngineEndpoint, ServiceKey};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::connect(&EngineEndpoint::default())?;
//!
//! println!("{}", client.version()?);
//!
//! let key: ServiceKey = "tcp:10.0.0.1:80".parse()?;
//! for dest in client.destinations(&key, 0)? {
//!     println!("{dest}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod display;
pub mod errno;
pub mod messages;
pub mod request;
pub mod stats;
pub mod transport;
pub mod types;

pub use commands::{CommandId, DEFAULT_SOCKET, Procedure, SCHEMA_VERSION, StatsFamily};
pub use display::{ListLimits, ListedService, Members, ServiceListing};
pub use messages::{DestEntry, EngineReply, LaddrEntry, ServiceEntry};
pub use request::{Command, Reply};
pub use stats::StatsSnapshot;
pub use transport::{EngineEndpoint, JsonRpcTransport, Transport};
pub use types::{
    Address, ConnFlags, DestSpec, Endpoint, LaddrSpec, Port, Protocol, ServiceFlags, ServiceKey,
    ServiceSpec, TimeoutSet, VersionInfo,
};

use common::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use messages::{
    DestsReply, LaddrsReply, ServiceReply, ServicesReply, TimeoutReply, VersionReply,
};
use request::decode_payload;

/// A connection to one engine, owned by the caller.
pub struct Client<T: Transport = JsonRpcTransport> {
    transport: T,
}

impl Client<JsonRpcTransport> {
    /// Connect to the engine at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connectivity`] if the socket cannot be opened.
    pub fn connect(endpoint: &EngineEndpoint) -> Result<Self> {
        let transport = JsonRpcTransport::connect(endpoint)?;
        Ok(Self { transport })
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// Release the connection. Safe to call more than once.
    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Run one command and decode its reply.
    pub fn execute(&mut self, command: &Command) -> Result<Reply> {
        let (procedure, params) = command.encode()?;
        debug!("Executing {:?} via {}", command.id(), procedure);
        let value = self.transport.call(procedure, params)?;
        command.decode_reply(value)
    }

    /// Send a raw request and decode the raw reply. The status is left for
    /// the caller to inspect.
    pub fn call<Q, R>(&mut self, procedure: Procedure, query: &Q) -> Result<R>
    where
        Q: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(query)
            .map_err(|e| Error::transport(format!("failed to encode request: {e}")))?;
        let value = self.transport.call(procedure, params)?;
        serde_json::from_value(value).map_err(Error::decode)
    }

    fn request<R: DeserializeOwned>(&mut self, command: &Command) -> Result<R> {
        let (procedure, params) = command.encode()?;
        debug!("Executing {:?} via {}", command.id(), procedure);
        let value = self.transport.call(procedure, params)?;
        decode_payload(value)
    }

    fn done(&mut self, command: &Command) -> Result<()> {
        self.request::<messages::CmdReply>(command).map(|_| ())
    }

    /// Engine version and connection table size.
    pub fn version(&mut self) -> Result<VersionInfo> {
        self.request::<VersionReply>(&Command::GetVersion)
            .map(|r| r.info())
    }

    /// Every virtual service, at most `limit` of them when nonzero.
    pub fn services(&mut self, limit: i32) -> Result<Vec<ServiceEntry>> {
        self.request::<ServicesReply>(&Command::GetServices { limit })
            .map(|r| r.services)
    }

    pub fn service(&mut self, key: &ServiceKey) -> Result<ServiceEntry> {
        self.request::<ServiceReply>(&Command::GetService(*key))
            .map(|r| r.service)
    }

    pub fn add_service(&mut self, spec: &ServiceSpec) -> Result<()> {
        self.done(&Command::NewService(spec.clone()))
    }

    pub fn update_service(&mut self, spec: &ServiceSpec) -> Result<()> {
        self.done(&Command::SetService(spec.clone()))
    }

    pub fn delete_service(&mut self, key: &ServiceKey) -> Result<()> {
        self.done(&Command::DelService(*key))
    }

    pub fn destinations(&mut self, service: &ServiceKey, limit: i32) -> Result<Vec<DestEntry>> {
        self.request::<DestsReply>(&Command::GetDests {
            service: *service,
            limit,
        })
        .map(|r| r.dests)
    }

    /// Add a destination. FULLNAT is used when `dest` names no forwarding
    /// method.
    pub fn add_destination(&mut self, service: &ServiceKey, dest: &DestSpec) -> Result<()> {
        self.done(&Command::NewDest {
            service: *service,
            dest: dest.clone(),
        })
    }

    pub fn update_destination(&mut self, service: &ServiceKey, dest: &DestSpec) -> Result<()> {
        self.done(&Command::SetDest {
            service: *service,
            dest: dest.clone(),
        })
    }

    pub fn delete_destination(&mut self, service: &ServiceKey, dest: &Endpoint) -> Result<()> {
        self.done(&Command::DelDest {
            service: *service,
            dest: *dest,
        })
    }

    pub fn local_addresses(&mut self, service: &ServiceKey, limit: i32) -> Result<Vec<LaddrEntry>> {
        self.request::<LaddrsReply>(&Command::GetLaddrs {
            service: *service,
            limit,
        })
        .map(|r| r.laddrs)
    }

    pub fn add_local_address(&mut self, service: &ServiceKey, laddr: &LaddrSpec) -> Result<()> {
        self.done(&Command::NewLaddr {
            service: *service,
            laddr: *laddr,
        })
    }

    pub fn delete_local_address(&mut self, service: &ServiceKey, laddr: &LaddrSpec) -> Result<()> {
        self.done(&Command::DelLaddr {
            service: *service,
            laddr: *laddr,
        })
    }

    pub fn timeouts(&mut self) -> Result<TimeoutSet> {
        self.request::<TimeoutReply>(&Command::GetTimeout)
            .map(|r| r.timeouts())
    }

    pub fn set_timeouts(&mut self, timeouts: &TimeoutSet) -> Result<()> {
        self.done(&Command::SetTimeout(*timeouts))
    }

    /// Zero the counters of one service, or of all of them.
    pub fn zero(&mut self, service: Option<&ServiceKey>) -> Result<()> {
        self.done(&Command::Zero(service.copied()))
    }

    /// Remove every service, destination and local address.
    pub fn flush(&mut self) -> Result<()> {
        self.done(&Command::Flush)
    }

    pub fn statistics(&mut self, family: StatsFamily, id: Option<i32>) -> Result<StatsSnapshot> {
        match self.execute(&Command::GetStats { family, id })? {
            Reply::Stats(snapshot) => Ok(snapshot),
            other => Err(Error::decode(format!("expected {family} statistics, got {other:?}"))),
        }
    }

    fn members(&mut self, service: &ServiceKey, limit: i32) -> Result<Members> {
        Ok(Members {
            dests: self.destinations(service, limit)?,
            laddrs: self.local_addresses(service, limit)?,
        })
    }

    /// List one service, or every service, with destinations and local
    /// addresses.
    ///
    /// Fetching the services themselves is all or nothing. After that,
    /// member failures are collected per service; see [`ServiceListing`].
    pub fn list_with_members(
        &mut self,
        filter: Option<&ServiceKey>,
        limits: ListLimits,
    ) -> Result<ServiceListing> {
        let services = match filter {
            Some(key) => vec![self.service(key)?],
            None => self.services(limits.services)?,
        };

        let mut listing = ServiceListing::default();
        let mut pending = services.into_iter();
        while let Some(service) = pending.next() {
            let Some(key) = service.key() else {
                let err = Error::decode(format!("unsupported protocol {}", service.protocol));
                warn!("Skipping members of service: {}", err);
                listing.entries.push(ListedService {
                    service,
                    members: Err(err),
                });
                continue;
            };

            match self.members(&key, limits.members) {
                Ok(members) => listing.entries.push(ListedService {
                    service,
                    members: Ok(members),
                }),
                Err(err) if err.ends_session() => {
                    warn!("Listing stopped at {}: {}", key, err);
                    listing.unvisited.push(service);
                    listing.unvisited.extend(pending);
                    listing.aborted = Some(err);
                    break;
                }
                Err(err) => {
                    warn!("Members of {} unavailable: {}", key, err);
                    listing.entries.push(ListedService {
                        service,
                        members: Err(err),
                    });
                }
            }
        }
        Ok(listing)
    }
}

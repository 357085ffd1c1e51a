//! JSON-RPC transport to the DPVS engine.
//!
//! One request line out, one reply line back. The connection is a Unix
//! domain socket or a TCP stream; either way the framing is a JSON object
//! per line.

use common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, trace};

use crate::commands::{DEFAULT_SOCKET, Procedure};

/// A synchronous request/reply channel to the engine.
///
/// Calls on one transport are serialized by `&mut self`.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Send one request to `procedure` and wait for its reply payload.
    fn call(&mut self, procedure: Procedure, params: Value) -> Result<Value>;

    /// Release the connection. Calling it again is a no-op.
    fn close(&mut self);
}

/// Where the engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEndpoint {
    Unix(PathBuf),
    /// `host:port`
    Tcp(String),
}

impl Default for EngineEndpoint {
    fn default() -> Self {
        EngineEndpoint::Unix(PathBuf::from(DEFAULT_SOCKET))
    }
}

impl FromStr for EngineEndpoint {
    type Err = Error;

    /// Accepts `unix:PATH`, `tcp:HOST:PORT`, or a bare absolute or `./` path.
    fn from_str(s: &str) -> Result<Self> {
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(Error::syntax("unix endpoint needs a socket path"));
            }
            return Ok(EngineEndpoint::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp:") {
            return match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Ok(EngineEndpoint::Tcp(addr.to_string()))
                }
                _ => Err(Error::syntax(format!("expect tcp:HOST:PORT, got {s:?}"))),
            };
        }
        if s.starts_with('/') || s.starts_with('.') {
            return Ok(EngineEndpoint::Unix(PathBuf::from(s)));
        }
        Err(Error::syntax(format!(
            "expect unix:PATH, tcp:HOST:PORT or a socket path, got {s:?}"
        )))
    }
}

impl fmt::Display for EngineEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEndpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            EngineEndpoint::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    fn try_clone(&self) -> io::Result<Stream> {
        match self {
            Stream::Unix(s) => s.try_clone().map(Stream::Unix),
            Stream::Tcp(s) => s.try_clone().map(Stream::Tcp),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.read(buf),
            Stream::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.write(buf),
            Stream::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Unix(s) => s.flush(),
            Stream::Tcp(s) => s.flush(),
        }
    }
}

struct Connection {
    reader: BufReader<Stream>,
    writer: Stream,
}

impl Connection {
    /// Write one line and read one line back.
    fn exchange(&mut self, line: &str) -> io::Result<String> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "engine closed the connection",
            ));
        }
        Ok(reply)
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    params: [Value; 1],
    id: u64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

/// Line-delimited JSON-RPC 1.0 over a Unix or TCP stream.
pub struct JsonRpcTransport {
    endpoint: EngineEndpoint,
    conn: Option<Connection>,
    sequence: u64,
}

impl JsonRpcTransport {
    /// Open a connection to the engine.
    pub fn connect(endpoint: &EngineEndpoint) -> Result<Self> {
        debug!("Connecting to dpvs engine at {}", endpoint);

        let stream = match endpoint {
            EngineEndpoint::Unix(path) => UnixStream::connect(path).map(Stream::Unix),
            EngineEndpoint::Tcp(addr) => TcpStream::connect(addr.as_str()).map(Stream::Tcp),
        }
        .map_err(|e| Error::connectivity(endpoint, e))?;

        let writer = stream
            .try_clone()
            .map_err(|e| Error::connectivity(endpoint, e))?;

        Ok(Self {
            endpoint: endpoint.clone(),
            conn: Some(Connection {
                reader: BufReader::new(stream),
                writer,
            }),
            sequence: 0,
        })
    }

    pub fn endpoint(&self) -> &EngineEndpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }
}

impl Transport for JsonRpcTransport {
    fn call(&mut self, procedure: Procedure, params: Value) -> Result<Value> {
        if self.conn.is_none() {
            return Err(Error::transport("connection is closed"));
        }

        let id = self.next_sequence();
        let mut line = serde_json::to_string(&RpcRequest {
            method: procedure.as_str(),
            params: [params],
            id,
        })
        .map_err(|e| Error::transport(format!("failed to encode request: {e}")))?;
        line.push('\n');

        trace!("Sending request: {}", line.trim_end());

        let exchanged = match self.conn.as_mut() {
            Some(conn) => conn.exchange(&line),
            None => return Err(Error::transport("connection is closed")),
        };
        let reply = match exchanged {
            Ok(reply) => reply,
            Err(e) => {
                // The stream position is unknown now
                self.conn = None;
                return Err(Error::transport(format!("{procedure} call failed: {e}")));
            }
        };

        trace!("Received reply: {}", reply.trim_end());

        let response: RpcResponse = match serde_json::from_str(&reply) {
            Ok(response) => response,
            Err(e) => {
                self.conn = None;
                return Err(Error::transport(format!("unreadable reply: {e}")));
            }
        };

        if response.id != Value::from(id) {
            self.conn = None;
            return Err(Error::decode(format!(
                "reply id {} does not match request id {id}",
                response.id
            )));
        }
        if !response.error.is_null() {
            return Err(Error::decode(format!("rpc error: {}", response.error)));
        }
        Ok(response.result)
    }

    fn close(&mut self) {
        if self.conn.take().is_some() {
            debug!("Closing connection to {}", self.endpoint);
        }
    }
}

impl Drop for JsonRpcTransport {
    fn drop(&mut self) {
        self.close();
    }
}

//! Common error types for the dpvs administration crates.

use std::fmt;

/// A specialized Result type for dpvs administrative operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for dpvs administrative operations.
///
/// Every variant propagates unchanged to the immediate caller. Nothing in
/// the library retries or substitutes defaults on error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operator input did not parse. Raised before anything is sent.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The connection to the engine could not be established.
    #[error("cannot connect to dpvs engine at {endpoint}: {source}")]
    Connectivity {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The connection failed while a call was in flight.
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine answered with a nonzero status code.
    #[error("{name}:{message}")]
    Engine {
        code: i32,
        name: String,
        message: String,
    },

    /// The reply did not have the shape expected for the request.
    #[error("protocol decode error: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new syntax error.
    pub fn syntax(msg: impl fmt::Display) -> Self {
        Error::Syntax(msg.to_string())
    }

    /// Create a new connectivity error for `endpoint`.
    pub fn connectivity(endpoint: impl fmt::Display, source: std::io::Error) -> Self {
        Error::Connectivity {
            endpoint: endpoint.to_string(),
            source,
        }
    }

    /// Create a new transport error.
    pub fn transport(msg: impl fmt::Display) -> Self {
        Error::Transport(msg.to_string())
    }

    /// Create a new engine status error.
    pub fn engine(code: i32, name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Engine {
            code,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a new protocol decode error.
    pub fn decode(msg: impl fmt::Display) -> Self {
        Error::Decode(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Engine status code, if this error came from a reply.
    pub fn status(&self) -> Option<i32> {
        match self {
            Error::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True when the connection can no longer be trusted for further calls.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Error::Connectivity { .. } | Error::Transport(_) | Error::Decode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = Error::engine(13, "EACCES", "permission denied");
        assert_eq!(err.to_string(), "EACCES:permission denied");
        assert_eq!(err.status(), Some(13));
        assert!(!err.ends_session());
    }

    #[test]
    fn test_session_ending_errors() {
        assert!(Error::transport("closed").ends_session());
        assert!(Error::decode("bad reply").ends_session());
        assert!(
            Error::connectivity(
                "/tmp/dpvs.sock",
                std::io::Error::from(std::io::ErrorKind::NotFound)
            )
            .ends_session()
        );
        assert!(!Error::syntax("bad port").ends_session());
    }
}

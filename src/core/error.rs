//! Unified error handling for the request director
//!
//! Every failure that can leave `RequestDirector::execute` is a
//! [`DirectorError`]. Transport executors report attempt outcomes as a
//! [`Failure`], which separates failures the retry policy may absorb from
//! failures that end the logical request.

use std::{fmt, io, time::Duration};

use crate::route::{Route, RouteState};

/// Terminal errors surfaced to the caller of `execute`
#[derive(Debug)]
pub enum DirectorError {
    /// The connection manager could not supply a connection in time
    ConnectionTimeout { route: Route, timeout: Duration },

    /// The planned route cannot be reached from the connection's state
    IllegalRouteState {
        planned: Route,
        current: Option<RouteState>,
    },

    /// The proxy answered the tunnel request with a non-2xx status
    TunnelRefused { status: u16, status_line: String },

    /// Transport I/O failure that was not retried
    Io(io::Error),

    /// The request was aborted before it could be sent
    Aborted,

    /// Too many follow-up requests for one logical request
    FollowUpLimit(u32),

    /// Protocol processing failures (interceptors, follow-up handlers)
    Protocol(String),

    /// Invalid configuration or route layout
    Configuration(String),

    /// Internal invariant violations
    Internal(String),

    /// Errors from the pingora header types
    Pingora(Box<pingora_error::Error>),
}

impl fmt::Display for DirectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectorError::ConnectionTimeout { route, timeout } => write!(
                f,
                "Timeout waiting for connection to {route} after {}ms",
                timeout.as_millis()
            ),
            DirectorError::IllegalRouteState { planned, current } => match current {
                Some(current) => write!(
                    f,
                    "Unable to establish route: planned = {planned}, current = {current}"
                ),
                None => write!(
                    f,
                    "Unable to establish route: planned = {planned}, current = none"
                ),
            },
            DirectorError::TunnelRefused { status_line, .. } => {
                write!(f, "CONNECT refused by proxy: {status_line}")
            }
            DirectorError::Io(err) => write!(f, "I/O error: {err}"),
            DirectorError::Aborted => write!(f, "Request aborted"),
            DirectorError::FollowUpLimit(max) => {
                write!(f, "Maximum of {max} follow-up requests exceeded")
            }
            DirectorError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            DirectorError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            DirectorError::Internal(msg) => write!(f, "Internal error: {msg}"),
            DirectorError::Pingora(err) => write!(f, "Pingora error: {err}"),
        }
    }
}

impl std::error::Error for DirectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DirectorError::Io(err) => Some(err),
            DirectorError::Pingora(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl DirectorError {
    /// Status code carried by a refused tunnel, if this is one
    pub fn tunnel_status(&self) -> Option<u16> {
        match self {
            DirectorError::TunnelRefused { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<io::Error> for DirectorError {
    fn from(err: io::Error) -> Self {
        DirectorError::Io(err)
    }
}

impl From<Box<pingora_error::Error>> for DirectorError {
    fn from(err: Box<pingora_error::Error>) -> Self {
        DirectorError::Pingora(err)
    }
}

/// Result type alias for director operations
pub type DirectorResult<T> = std::result::Result<T, DirectorError>;

/// Outcome of a single execution attempt that did not produce a response
#[derive(Debug)]
pub enum Failure {
    /// Transport failure; the connection is closed and the retry policy decides
    Recoverable(io::Error),
    /// Ends the logical request without consulting the retry policy
    Fatal(DirectorError),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Recoverable(err) => write!(f, "recoverable: {err}"),
            Failure::Fatal(err) => write!(f, "fatal: {err}"),
        }
    }
}

impl From<io::Error> for Failure {
    fn from(err: io::Error) -> Self {
        Failure::Recoverable(err)
    }
}

impl From<DirectorError> for Failure {
    fn from(err: DirectorError) -> Self {
        Failure::Fatal(err)
    }
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> DirectorResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn with_context(self, context: &str) -> DirectorResult<T> {
        self.map_err(|e| DirectorError::Protocol(format!("{context}: {e}")))
    }
}

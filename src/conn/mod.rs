//! Exclusive hold on a pooled connection.
//!
//! A [`ConnectionLease`] pairs a borrowed connection with the manager it
//! came from. Settling the lease consumes it and hands the connection back
//! through exactly one of `release` or `discard`. A lease dropped without
//! being settled aborts the connection and discards it.
//!
//! A request's [`AbortSignal`] is bound through the lease, and settling
//! the lease detaches it, so a late abort never reaches a pooled
//! connection.

use std::{fmt, io, sync::Arc};

use crate::{
    core::{ConnectionManager, DirectorError, DirectorResult, ManagedConnection},
    message::AbortSignal,
    metrics,
};

pub struct ConnectionLease {
    conn: Option<Box<dyn ManagedConnection>>,
    manager: Arc<dyn ConnectionManager>,
    abort: Option<AbortSignal>,
}

impl ConnectionLease {
    pub fn new(conn: Box<dyn ManagedConnection>, manager: Arc<dyn ConnectionManager>) -> Self {
        Self {
            conn: Some(conn),
            manager,
            abort: None,
        }
    }

    /// Point `signal` at the leased connection until the lease is settled.
    /// Fails if the signal has already fired.
    pub fn bind_abort(&mut self, signal: &AbortSignal) -> io::Result<()> {
        let trigger = self.conn.as_ref().and_then(|c| c.abort_trigger());
        self.detach_abort();
        signal.bind(trigger)?;
        self.abort = Some(signal.clone());
        Ok(())
    }

    fn detach_abort(&mut self) {
        if let Some(signal) = self.abort.take() {
            signal.unbind();
        }
    }

    /// The leased connection.
    pub fn connection(&mut self) -> DirectorResult<&mut (dyn ManagedConnection + 'static)> {
        match self.conn.as_deref_mut() {
            Some(conn) => Ok(conn),
            None => Err(DirectorError::Internal(
                "connection lease already settled".to_string(),
            )),
        }
    }

    /// Give the connection back to the pool, reusable iff `reuse`.
    pub fn release(mut self, reuse: bool) {
        self.detach_abort();
        if let Some(mut conn) = self.conn.take() {
            if reuse {
                conn.mark_reusable();
            } else {
                conn.unmark_reusable();
            }
            log::debug!("Releasing connection (reusable: {reuse})");
            metrics::record_release(reuse);
            self.manager.release(conn);
        }
    }

    /// Close the connection gracefully and discard it.
    pub fn close(mut self) {
        self.detach_abort();
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close() {
                log::debug!("Error closing connection: {e}");
            }
            metrics::record_discard();
            self.manager.discard(conn);
        }
    }

    /// Shut the connection down hard and discard it. Abort errors are
    /// logged and swallowed.
    pub fn abort(mut self) {
        self.abort_inner();
    }

    fn abort_inner(&mut self) {
        self.detach_abort();
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.abort() {
                log::debug!("Ignoring error while aborting connection: {e}");
            }
            metrics::record_discard();
            self.manager.discard(conn);
        }
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if self.conn.is_some() {
            log::warn!("Connection lease dropped without release, aborting connection");
            self.abort_inner();
        }
    }
}

impl fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let route = self.conn.as_ref().and_then(|c| c.established_route());
        f.debug_struct("ConnectionLease")
            .field("settled", &self.conn.is_none())
            .field("route", &route)
            .field("abortable", &self.abort.is_some())
            .finish()
    }
}

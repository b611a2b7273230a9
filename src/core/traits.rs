//! Collaborator interfaces of the request director
//!
//! The director owns none of the I/O. Connections, the pool, the wire
//! executor and every policy decision come in through these traits.

use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;

use super::{
    context::ExecutionContext,
    error::{DirectorResult, Failure},
};
use crate::{
    conn::ConnectionLease,
    message::{Request, Response, RoutedRequest},
    route::{Route, RouteState},
};

/// Hands out pooled connections and takes them back
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    /// Obtain a connection for `route`, waiting at most `timeout` if given
    async fn acquire(
        &self,
        route: &Route,
        timeout: Option<Duration>,
    ) -> DirectorResult<Box<dyn ManagedConnection>>;

    /// Return a connection to the pool; it is kept only if marked reusable
    fn release(&self, conn: Box<dyn ManagedConnection>);

    /// Drop a connection from the pool for good
    fn discard(&self, conn: Box<dyn ManagedConnection>);
}

/// A pooled connection, borrowed for the duration of one logical request
#[async_trait]
pub trait ManagedConnection: Send + Sync {
    /// Established state, or `None` while the connection is not open
    fn established_route(&self) -> Option<RouteState>;

    /// Open the socket to the first hop of `route`
    async fn open(&mut self, route: &Route, ctx: &mut ExecutionContext) -> io::Result<()>;

    /// Record that a tunnel to the target now exists through the proxy
    fn create_tunnel(&mut self, secure: bool) -> DirectorResult<()>;

    /// Upgrade the open socket to a secure transport in place
    async fn layer_protocol(&mut self, ctx: &mut ExecutionContext) -> io::Result<()>;

    fn is_stale(&self) -> bool;

    fn is_open(&self) -> bool;

    fn mark_reusable(&mut self);

    fn unmark_reusable(&mut self);

    fn is_reusable(&self) -> bool;

    /// Graceful shutdown
    fn close(&mut self) -> io::Result<()>;

    /// Hard shutdown, safe to call from any state
    fn abort(&mut self) -> io::Result<()>;

    /// Handle that lets another task abort this connection
    fn abort_trigger(&self) -> Option<Arc<dyn AbortTrigger>>;
}

/// Forcibly shuts down a connection from outside the executing task
pub trait AbortTrigger: Send + Sync {
    fn abort_connection(&self) -> io::Result<()>;
}

/// Request/response interceptor pipeline
#[async_trait]
pub trait HttpProcessor: Send + Sync {
    async fn process_request(
        &self,
        request: &mut Request,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<()>;

    async fn process_response(
        &self,
        response: &mut Response,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<()>;
}

/// Sends a request and reads the response head over an established connection
#[async_trait]
pub trait TransportExecutor: Send + Sync {
    async fn preprocess(
        &self,
        request: &mut Request,
        processor: &dyn HttpProcessor,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<()> {
        processor.process_request(request, ctx).await
    }

    async fn execute(
        &self,
        request: &Request,
        conn: &mut dyn ManagedConnection,
        ctx: &mut ExecutionContext,
    ) -> Result<Response, Failure>;

    async fn postprocess(
        &self,
        response: &mut Response,
        processor: &dyn HttpProcessor,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<()> {
        processor.process_response(response, ctx).await
    }
}

/// Decides whether a failed attempt is tried again; must return quickly
pub trait RetryHandler: Send + Sync {
    fn should_retry(&self, error: &io::Error, attempt: u32, ctx: &ExecutionContext) -> bool;
}

/// Decides whether a connection may serve another request; must return quickly
pub trait ReuseStrategy: Send + Sync {
    fn keep_alive(&self, response: &Response, ctx: &ExecutionContext) -> bool;
}

/// Inspects a response and decides whether another request has to follow
#[async_trait]
pub trait FollowUpHandler: Send + Sync {
    async fn resolve(
        &self,
        original: &RoutedRequest,
        sent: &Request,
        response: &Response,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<Option<RoutedRequest>>;
}

/// Decides whether a freshly created tunnel is secure end to end
pub trait TunnelSecurity: Send + Sync {
    fn is_secure(&self, route: &Route, response: &Response) -> bool;
}

impl<F> TunnelSecurity for F
where
    F: Fn(&Route, &Response) -> bool + Send + Sync,
{
    fn is_secure(&self, route: &Route, response: &Response) -> bool {
        self(route, response)
    }
}

/// Installs the final response entity for a streaming body.
///
/// Implementations take over the lease and must settle it, or hand it to
/// the entity, before returning. On error the lease must not be leaked;
/// dropping it aborts the connection.
#[async_trait]
pub trait EntityPreparer: Send + Sync {
    async fn prepare(
        &self,
        response: &mut Response,
        lease: ConnectionLease,
        reuse: bool,
    ) -> DirectorResult<()>;
}

use http::{header, Uri};
use log::{debug, warn};

use super::RequestDirector;
use crate::{
    core::{
        DirectorError, DirectorResult, ErrorContext, ExecutionContext, Failure, ManagedConnection,
    },
    message::Request,
    metrics,
    route::Route,
};

impl RequestDirector {
    /// Build the tunnel request for `route` (RFC 2817, section 5.2).
    pub(super) fn create_connect_request(&self, route: &Route) -> DirectorResult<Request> {
        let authority = route.target().authority();

        let uri: Uri = authority.parse().with_context("Invalid tunnel target")?;

        let mut request = Request::build("CONNECT", &authority)?;
        request.header.set_uri(uri);
        request.header.set_version(self.config.tunnel_version.as_version());
        request.header.insert_header(header::HOST, &authority)?;

        Ok(request)
    }

    /// Send a tunnel request over the connection to the proxy and check the
    /// answer. Returns whether the tunnel is secure end to end; recording
    /// the tunnel on the connection is left to the caller.
    pub(super) async fn create_tunnel(
        &self,
        route: &Route,
        conn: &mut dyn ManagedConnection,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<bool> {
        let connect = self.create_connect_request(route)?;
        debug!("Tunnelling to {} through {route}", route.target());

        let connected = match self.executor.execute(&connect, conn, ctx).await {
            Ok(response) => response,
            Err(Failure::Recoverable(err)) => return Err(DirectorError::Io(err)),
            Err(Failure::Fatal(err)) => return Err(err),
        };
        conn.mark_reusable();

        let status = connected.status();
        if !status.is_success() {
            let status_line = connected.status_line();
            warn!("CONNECT refused by proxy for {route}: {status_line}");
            metrics::record_tunnel_refused();
            return Err(DirectorError::TunnelRefused {
                status: status.as_u16(),
                status_line,
            });
        }

        Ok(self.tunnel_security.is_secure(route, &connected))
    }
}

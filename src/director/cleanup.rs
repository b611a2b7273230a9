use log::debug;

use super::Execution;
use crate::{
    core::{DirectorResult, ExecutionContext},
    message::Response,
};

impl Execution<'_> {
    /// Settle the connection for a response about to be returned.
    ///
    /// Without a body still on the wire the connection goes back to the
    /// pool now. Otherwise the entity preparer takes over the lease and
    /// the connection follows the body's lifetime.
    pub(super) async fn finish(
        &mut self,
        mut response: Response,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<Response> {
        let Some(lease) = self.lease.take() else {
            return Ok(response);
        };

        let reuse = self.director.reuse_strategy.keep_alive(&response, ctx);

        if !response.entity.is_streaming() {
            lease.release(reuse);
            return Ok(response);
        }

        debug!("Deferring connection release to the response entity");
        self.director
            .entity_preparer
            .prepare(&mut response, lease, reuse)
            .await?;
        Ok(response)
    }

    /// Discard the connection after a failure. Never fails; abort errors
    /// are logged by the lease.
    pub(super) fn abandon(&mut self) {
        if let Some(lease) = self.lease.take() {
            debug!("Aborting connection after failed execution");
            lease.abort();
        }
    }
}

//! Request execution orchestration
//!
//! This module turns one logical request into connection acquisition,
//! route establishment, execution with retry, follow-up handling and
//! exactly one release or discard of the connection.

mod cleanup;
pub mod policy;
pub mod processor;
mod tunnel;

#[cfg(test)]
mod mock;

use std::sync::Arc;

use log::{debug, info};

use crate::{
    config::DirectorConfig,
    conn::ConnectionLease,
    core::{
        context, ConnectionManager, DirectorError, DirectorResult, EntityPreparer,
        ExecutionContext, Failure, FollowUpHandler, HttpProcessor, ManagedConnection,
        RetryHandler, ReuseStrategy, TransportExecutor, TunnelSecurity,
    },
    message::{Response, RoutedRequest},
    metrics,
    route::{Route, RouteDirector, Step},
};

use policy::{AutoReleaseEntity, DefaultRetryHandler, DefaultReuseStrategy, InsecureTunnel, NoFollowUp};
use processor::ProcessorChain;

// A route has at most one proxy, so establishment needs at most three
// actions followed by `Complete`.
const MAX_ESTABLISH_STEPS: usize = 4;

/// Executes routed requests over pooled connections.
///
/// The director itself holds no per-request state; every call to
/// [`execute`](Self::execute) owns its connection lease and attempt counter,
/// so one director may serve concurrent requests.
pub struct RequestDirector {
    manager: Arc<dyn ConnectionManager>,
    executor: Arc<dyn TransportExecutor>,
    processor: Arc<dyn HttpProcessor>,
    retry_handler: Arc<dyn RetryHandler>,
    reuse_strategy: Arc<dyn ReuseStrategy>,
    follow_up: Arc<dyn FollowUpHandler>,
    tunnel_security: Arc<dyn TunnelSecurity>,
    entity_preparer: Arc<dyn EntityPreparer>,
    route_director: RouteDirector,
    config: DirectorConfig,
}

impl RequestDirector {
    pub fn builder(
        manager: Arc<dyn ConnectionManager>,
        executor: Arc<dyn TransportExecutor>,
    ) -> RequestDirectorBuilder {
        RequestDirectorBuilder::new(manager, executor)
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    /// Execute `routed` and return the final response.
    ///
    /// On success the connection has either been released or is owned by
    /// the response entity. On error it has been aborted and discarded.
    pub async fn execute(
        &self,
        routed: RoutedRequest,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<Response> {
        ctx.begin_request();
        let mut execution = Execution {
            director: self,
            lease: None,
        };

        match execution.run(routed, ctx).await {
            Ok(response) => execution.finish(response, ctx).await,
            Err(err) => {
                execution.abandon();
                Err(err)
            }
        }
    }

    /// Drive the route director until the connection is on `route`.
    async fn establish_route(
        &self,
        route: &Route,
        conn: &mut dyn ManagedConnection,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<()> {
        for _ in 0..MAX_ESTABLISH_STEPS {
            let fact = conn.established_route();
            let step = self.route_director.next_step(route, fact.as_ref());
            if step.is_action() {
                debug!("Route step {step} for {route}");
            }

            match step {
                Step::ConnectTarget | Step::ConnectProxy => conn.open(route, ctx).await?,
                Step::CreateTunnel => {
                    let secure = self.create_tunnel(route, conn, ctx).await?;
                    conn.create_tunnel(secure)?;
                }
                Step::LayerProtocol => conn.layer_protocol(ctx).await?,
                Step::Unreachable => {
                    return Err(DirectorError::IllegalRouteState {
                        planned: route.clone(),
                        current: fact,
                    })
                }
                Step::Complete => return Ok(()),
            }
        }

        Err(DirectorError::IllegalRouteState {
            planned: route.clone(),
            current: conn.established_route(),
        })
    }
}

/// State of one `execute` call. Dropping it mid-flight drops the lease,
/// which aborts the connection.
struct Execution<'a> {
    director: &'a RequestDirector,
    lease: Option<ConnectionLease>,
}

impl Execution<'_> {
    async fn run(
        &mut self,
        mut routed: RoutedRequest,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<Response> {
        let director = self.director;
        let mut rechecked = false;

        loop {
            let route = routed.route.clone();

            let lease = match self.lease.take() {
                Some(lease) => lease,
                None => self.allocate_connection(&route).await?,
            };
            let lease = self.lease.insert(lease);
            let conn = lease.connection()?;

            director.establish_route(&route, conn, ctx).await?;
            ctx.set(context::TARGET_HOST, route.target().clone());
            if let Some(state) = conn.established_route() {
                ctx.set(context::ESTABLISHED_ROUTE, state);
            }

            if director.config.stale_checking {
                debug!("Stale connection check");
                let forced = ctx.tries == 1 && !rechecked;
                if conn.is_stale() || forced {
                    debug!("Stale connection detected");
                    rechecked |= forced;
                    if let Some(lease) = self.lease.take() {
                        lease.close();
                    }
                    continue;
                }
            }

            let mut prepared = routed.request.clone();
            director
                .executor
                .preprocess(&mut prepared, director.processor.as_ref(), ctx)
                .await?;
            if let Some(signal) = prepared.abort_signal() {
                if lease.bind_abort(signal).is_err() {
                    return Err(DirectorError::Aborted);
                }
            }
            let conn = lease.connection()?;
            ctx.set(context::REQUEST_LINE, prepared.request_line());
            ctx.remove(context::REQUEST_SENT);

            ctx.tries += 1;
            metrics::record_attempt();
            debug!("Attempt {} to execute request", ctx.tries);

            let mut response = match director.executor.execute(&prepared, conn, ctx).await {
                Ok(response) => response,
                Err(Failure::Recoverable(err)) => {
                    debug!("Closing the connection.");
                    if let Some(lease) = self.lease.take() {
                        lease.close();
                    }
                    if director.retry_handler.should_retry(&err, ctx.tries, ctx) {
                        info!(
                            "I/O error ({:?}) caught when processing request: {err}",
                            err.kind()
                        );
                        info!("Retrying request");
                        metrics::record_retry();
                        continue;
                    }
                    return Err(DirectorError::Io(err));
                }
                Err(Failure::Fatal(err)) => return Err(err),
            };

            director
                .executor
                .postprocess(&mut response, director.processor.as_ref(), ctx)
                .await?;

            let follow_up = director
                .follow_up
                .resolve(&routed, &prepared, &response, ctx)
                .await?;
            match follow_up {
                None => return Ok(response),
                Some(next) => {
                    ctx.follow_ups += 1;
                    if ctx.follow_ups > director.config.max_follow_ups {
                        return Err(DirectorError::FollowUpLimit(director.config.max_follow_ups));
                    }
                    debug!("Follow-up {} to {}", ctx.follow_ups, next.route);
                    self.prepare_follow_up(&route, &next.route, response, ctx)
                        .await?;
                    routed = next;
                }
            }
        }
    }

    async fn allocate_connection(&self, route: &Route) -> DirectorResult<ConnectionLease> {
        let director = self.director;
        let timeout = director.config.acquire_timeout();
        let acquire = director.manager.acquire(route, timeout);

        let conn = match timeout {
            Some(limit) => tokio::time::timeout(limit, acquire).await.map_err(|_| {
                DirectorError::ConnectionTimeout {
                    route: route.clone(),
                    timeout: limit,
                }
            })??,
            None => acquire.await?,
        };
        debug!("Connection allocated for {route}");

        Ok(ConnectionLease::new(conn, director.manager.clone()))
    }

    /// Get the held connection ready for the next request of a follow-up.
    async fn prepare_follow_up(
        &mut self,
        current: &Route,
        next: &Route,
        mut response: Response,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<()> {
        let keep_alive = self.director.reuse_strategy.keep_alive(&response, ctx);

        if next != current {
            // the old route's connection cannot serve the follow-up
            if let Some(lease) = self.lease.take() {
                lease.release(keep_alive && !response.entity.is_streaming());
            }
            return Ok(());
        }

        response.entity.consume().await?;
        if !keep_alive {
            if let Some(lease) = self.lease.take() {
                lease.close();
            }
        }
        Ok(())
    }
}

/// Wires a [`RequestDirector`] from its collaborators.
pub struct RequestDirectorBuilder {
    manager: Arc<dyn ConnectionManager>,
    executor: Arc<dyn TransportExecutor>,
    processor: Option<Arc<dyn HttpProcessor>>,
    retry_handler: Option<Arc<dyn RetryHandler>>,
    reuse_strategy: Option<Arc<dyn ReuseStrategy>>,
    follow_up: Option<Arc<dyn FollowUpHandler>>,
    tunnel_security: Option<Arc<dyn TunnelSecurity>>,
    entity_preparer: Option<Arc<dyn EntityPreparer>>,
    config: DirectorConfig,
}

impl RequestDirectorBuilder {
    pub fn new(manager: Arc<dyn ConnectionManager>, executor: Arc<dyn TransportExecutor>) -> Self {
        Self {
            manager,
            executor,
            processor: None,
            retry_handler: None,
            reuse_strategy: None,
            follow_up: None,
            tunnel_security: None,
            entity_preparer: None,
            config: DirectorConfig::default(),
        }
    }

    pub fn config(mut self, config: DirectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn processor(mut self, processor: Arc<dyn HttpProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn retry_handler(mut self, handler: Arc<dyn RetryHandler>) -> Self {
        self.retry_handler = Some(handler);
        self
    }

    pub fn reuse_strategy(mut self, strategy: Arc<dyn ReuseStrategy>) -> Self {
        self.reuse_strategy = Some(strategy);
        self
    }

    pub fn follow_up(mut self, handler: Arc<dyn FollowUpHandler>) -> Self {
        self.follow_up = Some(handler);
        self
    }

    pub fn tunnel_security(mut self, security: Arc<dyn TunnelSecurity>) -> Self {
        self.tunnel_security = Some(security);
        self
    }

    pub fn entity_preparer(mut self, preparer: Arc<dyn EntityPreparer>) -> Self {
        self.entity_preparer = Some(preparer);
        self
    }

    /// Build the director; unset strategies fall back to the defaults in
    /// [`policy`] and an empty [`ProcessorChain`].
    pub fn build(self) -> RequestDirector {
        let retry_config = self.config.retry.clone();
        RequestDirector {
            manager: self.manager,
            executor: self.executor,
            processor: self
                .processor
                .unwrap_or_else(|| Arc::new(ProcessorChain::default())),
            retry_handler: self
                .retry_handler
                .unwrap_or_else(|| Arc::new(DefaultRetryHandler::from_config(&retry_config))),
            reuse_strategy: self
                .reuse_strategy
                .unwrap_or_else(|| Arc::new(DefaultReuseStrategy)),
            follow_up: self.follow_up.unwrap_or_else(|| Arc::new(NoFollowUp)),
            tunnel_security: self
                .tunnel_security
                .unwrap_or_else(|| Arc::new(InsecureTunnel)),
            entity_preparer: self
                .entity_preparer
                .unwrap_or_else(|| Arc::new(AutoReleaseEntity)),
            route_director: RouteDirector,
            config: self.config,
        }
    }
}

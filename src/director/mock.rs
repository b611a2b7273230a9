//! In-memory collaborators for director tests.

use std::{
    collections::VecDeque,
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use http::Method;

use crate::{
    core::{
        context, AbortTrigger, ConnectionManager, DirectorResult, ExecutionContext, Failure,
        FollowUpHandler, ManagedConnection, RetryHandler, TransportExecutor,
    },
    message::{Entity, Request, Response, RoutedRequest},
    route::{Route, RouteState},
};

/// What happened to the connections handed out by a [`MockManager`].
#[derive(Default)]
pub(super) struct Journal {
    acquired: AtomicUsize,
    released: Mutex<Vec<bool>>,
    discarded: AtomicUsize,
    closed: AtomicUsize,
    aborted: AtomicUsize,
    triggered: AtomicUsize,
}

impl Journal {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Reusable flag of every released connection, in release order.
    pub fn released(&self) -> Vec<bool> {
        self.released.lock().unwrap().clone()
    }

    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn triggered(&self) -> usize {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Every acquired connection went back exactly once.
    pub fn assert_settled(&self) {
        assert_eq!(
            self.released().len() + self.discarded(),
            self.acquired(),
            "connections acquired and settled do not match"
        );
    }
}

pub(super) struct MockManager {
    pub journal: Arc<Journal>,
    delay: Option<Duration>,
    stale: Mutex<VecDeque<bool>>,
    preset: Mutex<Option<RouteState>>,
}

impl MockManager {
    pub fn new() -> Self {
        Self {
            journal: Arc::new(Journal::default()),
            delay: None,
            stale: Mutex::new(VecDeque::new()),
            preset: Mutex::new(None),
        }
    }

    /// Each acquisition waits `delay` before handing out a connection.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Staleness reported by the next connections, in acquisition order.
    pub fn with_stale(self, stale: &[bool]) -> Self {
        self.stale.lock().unwrap().extend(stale.iter().copied());
        self
    }

    /// The first connection comes out of the pool already in `state`.
    pub fn with_preset(self, state: RouteState) -> Self {
        *self.preset.lock().unwrap() = Some(state);
        self
    }
}

#[async_trait]
impl ConnectionManager for MockManager {
    async fn acquire(
        &self,
        _route: &Route,
        _timeout: Option<Duration>,
    ) -> DirectorResult<Box<dyn ManagedConnection>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.journal.acquired.fetch_add(1, Ordering::SeqCst);

        let stale = self.stale.lock().unwrap().pop_front().unwrap_or(false);
        let state = self.preset.lock().unwrap().take();
        Ok(Box::new(MockConnection {
            journal: self.journal.clone(),
            route: None,
            state,
            stale,
            reusable: false,
        }))
    }

    fn release(&self, conn: Box<dyn ManagedConnection>) {
        self.journal
            .released
            .lock()
            .unwrap()
            .push(conn.is_reusable());
    }

    fn discard(&self, _conn: Box<dyn ManagedConnection>) {
        self.journal.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockConnection {
    journal: Arc<Journal>,
    route: Option<Route>,
    state: Option<RouteState>,
    stale: bool,
    reusable: bool,
}

fn to_io(err: crate::core::DirectorError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[async_trait]
impl ManagedConnection for MockConnection {
    fn established_route(&self) -> Option<RouteState> {
        self.state.clone()
    }

    async fn open(&mut self, route: &Route, _ctx: &mut ExecutionContext) -> io::Result<()> {
        let mut state = RouteState::new(route.target().clone());
        match route.proxy() {
            Some(proxy) => state.connect_proxy(proxy.clone(), false).map_err(to_io)?,
            None => state.connect_target(route.is_secure()).map_err(to_io)?,
        }
        self.route = Some(route.clone());
        self.state = Some(state);
        Ok(())
    }

    fn create_tunnel(&mut self, secure: bool) -> DirectorResult<()> {
        match self.state.as_mut() {
            Some(state) => state.tunnel_target(secure),
            None => Err(crate::core::DirectorError::Internal(
                "tunnel on closed connection".to_string(),
            )),
        }
    }

    async fn layer_protocol(&mut self, _ctx: &mut ExecutionContext) -> io::Result<()> {
        let secure = self.route.as_ref().map(Route::is_secure).unwrap_or(true);
        match self.state.as_mut() {
            Some(state) => state.layer_protocol(secure).map_err(to_io),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "closed")),
        }
    }

    fn is_stale(&self) -> bool {
        self.stale
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn mark_reusable(&mut self) {
        self.reusable = true;
    }

    fn unmark_reusable(&mut self) {
        self.reusable = false;
    }

    fn is_reusable(&self) -> bool {
        self.reusable
    }

    fn close(&mut self) -> io::Result<()> {
        self.journal.closed.fetch_add(1, Ordering::SeqCst);
        self.state = None;
        Ok(())
    }

    fn abort(&mut self) -> io::Result<()> {
        self.journal.aborted.fetch_add(1, Ordering::SeqCst);
        self.state = None;
        Ok(())
    }

    fn abort_trigger(&self) -> Option<Arc<dyn AbortTrigger>> {
        Some(Arc::new(MockTrigger {
            journal: self.journal.clone(),
        }))
    }
}

struct MockTrigger {
    journal: Arc<Journal>,
}

impl AbortTrigger for MockTrigger {
    fn abort_connection(&self) -> io::Result<()> {
        self.journal.triggered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Answers tunnel requests with `connect_status` and everything else from
/// a script. An exhausted script answers `200` without a body.
pub(super) struct MockExecutor {
    script: Mutex<VecDeque<Result<Response, Failure>>>,
    connect_status: u16,
    delay: Option<Duration>,
    requests: Mutex<Vec<Request>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            connect_status: 200,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_connect_status(mut self, status: u16) -> Self {
        self.connect_status = status;
        self
    }

    /// Each non-tunnel request takes `delay` before it is answered.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond(self, response: Response) -> Self {
        self.script.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, kind: io::ErrorKind) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(Failure::Recoverable(io::Error::new(kind, "mock failure"))));
        self
    }

    pub fn fail_fatal(self, err: crate::core::DirectorError) -> Self {
        self.script.lock().unwrap().push_back(Err(Failure::Fatal(err)));
        self
    }

    /// Every request seen so far, tunnel requests included.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests other than tunnel requests.
    pub fn attempts(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.header.method != Method::CONNECT)
            .count()
    }
}

#[async_trait]
impl TransportExecutor for MockExecutor {
    async fn execute(
        &self,
        request: &Request,
        conn: &mut dyn ManagedConnection,
        ctx: &mut ExecutionContext,
    ) -> Result<Response, Failure> {
        assert!(conn.is_open(), "executing over a closed connection");
        self.requests.lock().unwrap().push(request.clone());

        if request.header.method == Method::CONNECT {
            return Ok(Response::build(self.connect_status, Entity::Empty)?);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => {
                ctx.set(context::REQUEST_SENT, true);
                Ok(response)
            }
            Some(Err(failure)) => Err(failure),
            None => {
                ctx.set(context::REQUEST_SENT, true);
                Ok(Response::build(200, Entity::Empty)?)
            }
        }
    }
}

/// Approves the first `budget` retries it is asked about.
pub(super) struct CountingRetry {
    budget: usize,
    pub asked: AtomicUsize,
}

impl CountingRetry {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            asked: AtomicUsize::new(0),
        }
    }
}

impl RetryHandler for CountingRetry {
    fn should_retry(&self, _error: &io::Error, _attempt: u32, _ctx: &ExecutionContext) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst) < self.budget
    }
}

/// Returns the scripted follow-ups in order, then `None`.
pub(super) struct ScriptedFollowUp {
    next: Mutex<VecDeque<RoutedRequest>>,
}

impl ScriptedFollowUp {
    pub fn new(next: Vec<RoutedRequest>) -> Self {
        Self {
            next: Mutex::new(next.into()),
        }
    }
}

#[async_trait]
impl FollowUpHandler for ScriptedFollowUp {
    async fn resolve(
        &self,
        _original: &RoutedRequest,
        _sent: &Request,
        _response: &Response,
        _ctx: &mut ExecutionContext,
    ) -> DirectorResult<Option<RoutedRequest>> {
        Ok(self.next.lock().unwrap().pop_front())
    }
}

/// Asks for the same request again, forever.
pub(super) struct EndlessFollowUp;

#[async_trait]
impl FollowUpHandler for EndlessFollowUp {
    async fn resolve(
        &self,
        original: &RoutedRequest,
        _sent: &Request,
        _response: &Response,
        _ctx: &mut ExecutionContext,
    ) -> DirectorResult<Option<RoutedRequest>> {
        Ok(Some(original.clone()))
    }
}

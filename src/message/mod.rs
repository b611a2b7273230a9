//! Requests and responses as seen by the director.

mod abort;
mod entity;

use bytes::Bytes;
use http::{StatusCode, Version};
use pingora_http::{RequestHeader, ResponseHeader};

use crate::{core::DirectorResult, route::Route};

pub use abort::AbortSignal;
pub use entity::{BodyStream, Entity, ManagedEntity};

/// An outgoing request: header, optional buffered body, optional abort signal.
#[derive(Clone, Debug)]
pub struct Request {
    pub header: RequestHeader,
    pub body: Option<Bytes>,
    abort: Option<AbortSignal>,
}

impl Request {
    pub fn new(header: RequestHeader) -> Self {
        Self {
            header,
            body: None,
            abort: None,
        }
    }

    /// Build a bodiless request for `method` and request target `path`.
    pub fn build(method: &str, path: &str) -> DirectorResult<Self> {
        let header = RequestHeader::build(method, path.as_bytes(), None)?;
        Ok(Self::new(header))
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Make the request abortable through `signal`.
    pub fn with_abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    pub fn abort_signal(&self) -> Option<&AbortSignal> {
        self.abort.as_ref()
    }

    /// `METHOD target VERSION`, for logs and the execution context.
    pub fn request_line(&self) -> String {
        format!(
            "{} {} {:?}",
            self.header.method, self.header.uri, self.header.version
        )
    }
}

/// A received response: header plus entity.
#[derive(Debug)]
pub struct Response {
    pub header: ResponseHeader,
    pub entity: Entity,
}

impl Response {
    pub fn new(header: ResponseHeader, entity: Entity) -> Self {
        Self { header, entity }
    }

    /// Build a response with `status` and the given entity.
    pub fn build(status: u16, entity: Entity) -> DirectorResult<Self> {
        let header = ResponseHeader::build(status, None)?;
        Ok(Self::new(header, entity))
    }

    pub fn status(&self) -> StatusCode {
        self.header.status
    }

    pub fn version(&self) -> Version {
        self.header.version
    }

    /// `VERSION code reason`, as the proxy sent it.
    pub fn status_line(&self) -> String {
        let status = self.status();
        format!(
            "{:?} {} {}",
            self.version(),
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .trim_end()
        .to_string()
    }
}

/// A request paired with the route it has to travel.
#[derive(Clone, Debug)]
pub struct RoutedRequest {
    pub request: Request,
    pub route: Route,
}

impl RoutedRequest {
    pub fn new(request: Request, route: Route) -> Self {
        Self { request, route }
    }
}

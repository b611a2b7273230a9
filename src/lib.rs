//! Request execution over pooled, proxied HTTP connections.
//!
//! [`RequestDirector`] takes a request together with its planned [`Route`],
//! acquires a connection, establishes the route hop by hop (tunnelling and
//! layering through a proxy where needed), executes the request with
//! retries and follow-ups, and settles the connection exactly once.

pub mod config;
pub mod conn;
pub mod core;
pub mod director;
pub mod message;
pub(crate) mod metrics;
pub mod route;

pub use config::{DirectorConfig, RetryConfig, TunnelVersion};
pub use conn::ConnectionLease;
pub use crate::core::{DirectorError, DirectorResult, ExecutionContext, Failure};
pub use director::{RequestDirector, RequestDirectorBuilder};
pub use message::{AbortSignal, Entity, ManagedEntity, Request, Response, RoutedRequest};
pub use route::{HttpHost, Route, RouteDirector, RouteState, Step};

//! Default strategies used when the builder is not given others.

use std::{io, mem};

use async_trait::async_trait;
use http::{header, HeaderMap, Version};

use crate::{
    config::RetryConfig,
    conn::ConnectionLease,
    core::{
        context, DirectorError, DirectorResult, EntityPreparer, ExecutionContext,
        FollowUpHandler, RetryHandler, ReuseStrategy, TunnelSecurity,
    },
    message::{Entity, ManagedEntity, Request, Response, RoutedRequest},
    route::Route,
};

/// Retries dropped connections a bounded number of times.
///
/// Timeouts, aborts, name resolution and TLS failures are never retried.
/// Other failures are retried only while the request cannot have reached
/// the server, unless `request_sent_enabled` is set.
#[derive(Clone, Debug)]
pub struct DefaultRetryHandler {
    count: u32,
    request_sent_enabled: bool,
}

impl Default for DefaultRetryHandler {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl DefaultRetryHandler {
    pub fn new(count: u32, request_sent_enabled: bool) -> Self {
        Self {
            count,
            request_sent_enabled,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.count, config.request_sent_enabled)
    }
}

impl RetryHandler for DefaultRetryHandler {
    fn should_retry(&self, error: &io::Error, attempt: u32, ctx: &ExecutionContext) -> bool {
        if attempt > self.count {
            return false;
        }

        match error.kind() {
            // the server dropped the connection without an answer
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => true,
            io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::NotFound
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::InvalidData
            | io::ErrorKind::PermissionDenied => false,
            _ => !ctx.get_flag(context::REQUEST_SENT) || self.request_sent_enabled,
        }
    }
}

/// Keep-alive decision from the response's protocol version and headers.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultReuseStrategy;

impl DefaultReuseStrategy {
    fn connection_tokens(headers: &HeaderMap) -> impl Iterator<Item = String> + '_ {
        headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|t| t.trim().to_ascii_lowercase())
    }

    fn is_chunked(headers: &HeaderMap) -> bool {
        headers
            .get_all(header::TRANSFER_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.to_ascii_lowercase().contains("chunked"))
    }
}

impl ReuseStrategy for DefaultReuseStrategy {
    fn keep_alive(&self, response: &Response, _ctx: &ExecutionContext) -> bool {
        let headers = &response.header.headers;

        // a body delimited by connection close leaves nothing to reuse
        if response.entity.is_streaming()
            && !headers.contains_key(header::CONTENT_LENGTH)
            && !Self::is_chunked(headers)
        {
            return false;
        }

        let mut tokens = Self::connection_tokens(headers);
        match response.version() {
            Version::HTTP_09 => false,
            Version::HTTP_10 => tokens.any(|t| t == "keep-alive"),
            _ => !tokens.any(|t| t == "close"),
        }
    }
}

/// Every response is final.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFollowUp;

#[async_trait]
impl FollowUpHandler for NoFollowUp {
    async fn resolve(
        &self,
        _original: &RoutedRequest,
        _sent: &Request,
        _response: &Response,
        _ctx: &mut ExecutionContext,
    ) -> DirectorResult<Option<RoutedRequest>> {
        Ok(None)
    }
}

/// The proxy's segment says nothing about the hop to the target, so a
/// tunnel is treated as not secure.
#[derive(Clone, Copy, Debug, Default)]
pub struct InsecureTunnel;

impl TunnelSecurity for InsecureTunnel {
    fn is_secure(&self, _route: &Route, _response: &Response) -> bool {
        false
    }
}

/// Wraps a streaming body so the connection is released when the body is.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoReleaseEntity;

#[async_trait]
impl EntityPreparer for AutoReleaseEntity {
    async fn prepare(
        &self,
        response: &mut Response,
        lease: ConnectionLease,
        reuse: bool,
    ) -> DirectorResult<()> {
        match mem::take(&mut response.entity) {
            Entity::Streaming(stream) => {
                response.entity = Entity::Managed(ManagedEntity::new(stream, lease, reuse));
            }
            Entity::Managed(_) => {
                return Err(DirectorError::Internal(
                    "response entity is already managed".to_string(),
                ));
            }
            other => {
                response.entity = other;
                lease.release(reuse);
            }
        }
        Ok(())
    }
}

/// Reads the whole body before returning and releases the connection at once.
#[derive(Clone, Copy, Debug, Default)]
pub struct BufferingEntity;

#[async_trait]
impl EntityPreparer for BufferingEntity {
    async fn prepare(
        &self,
        response: &mut Response,
        lease: ConnectionLease,
        reuse: bool,
    ) -> DirectorResult<()> {
        let entity = mem::take(&mut response.entity);
        match entity.collect().await {
            Ok(body) => {
                response.entity = Entity::from(body);
                lease.release(reuse);
                Ok(())
            }
            Err(e) => {
                lease.abort();
                Err(DirectorError::Io(e))
            }
        }
    }
}

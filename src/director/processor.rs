//! Request/response interceptor chain.

use std::sync::Arc;

use async_trait::async_trait;
use http::header;

use crate::{
    core::{context, DirectorResult, ErrorContext, ExecutionContext, HttpProcessor},
    message::{Request, Response},
    route::HttpHost,
};

/// Runs processors in insertion order for requests and in reverse order
/// for responses. The first error stops the chain.
#[derive(Default, Clone)]
pub struct ProcessorChain {
    processors: Vec<Arc<dyn HttpProcessor>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, processor: Arc<dyn HttpProcessor>) -> &mut Self {
        self.processors.push(processor);
        self
    }

    pub fn with(mut self, processor: Arc<dyn HttpProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[async_trait]
impl HttpProcessor for ProcessorChain {
    async fn process_request(
        &self,
        request: &mut Request,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<()> {
        for processor in self.processors.iter() {
            processor.process_request(request, ctx).await?;
        }
        Ok(())
    }

    async fn process_response(
        &self,
        response: &mut Response,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<()> {
        for processor in self.processors.iter().rev() {
            processor.process_response(response, ctx).await?;
        }
        Ok(())
    }
}

/// Sets the `Host` header from the route target when the request has none.
#[derive(Clone, Copy, Debug, Default)]
pub struct TargetHost;

#[async_trait]
impl HttpProcessor for TargetHost {
    async fn process_request(
        &self,
        request: &mut Request,
        ctx: &mut ExecutionContext,
    ) -> DirectorResult<()> {
        if request.header.headers.contains_key(header::HOST) {
            return Ok(());
        }

        if let Some(host) = ctx.get::<HttpHost>(context::TARGET_HOST) {
            let value = match host.port() {
                80 | 443 => host.name().to_string(),
                _ => host.authority(),
            };
            request
                .header
                .insert_header(header::HOST, value)
                .with_context("Invalid target host")?;
        }
        Ok(())
    }

    async fn process_response(
        &self,
        _response: &mut Response,
        _ctx: &mut ExecutionContext,
    ) -> DirectorResult<()> {
        Ok(())
    }
}

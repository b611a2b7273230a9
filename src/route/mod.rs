//! Routes and established connection state.
//!
//! A [`Route`] is the plan: the target, an optional proxy and how the
//! path through the proxy is tunnelled and layered. A [`RouteState`] is
//! what a connection has actually established so far.

pub mod director;

use std::fmt;

use http::Uri;

use crate::core::{DirectorError, DirectorResult};

pub use director::{RouteDirector, Step};

/// A host name and port, as addressed on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HttpHost {
    name: String,
    port: u16,
}

impl HttpHost {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Builds a host from an absolute URI, defaulting the port from the scheme.
    pub fn from_uri(uri: &Uri) -> DirectorResult<Self> {
        let host = uri.host().ok_or_else(|| {
            DirectorError::Configuration(format!("URI has no host: {uri}"))
        })?;

        let port = match uri.port_u16() {
            Some(port) => port,
            None => match uri.scheme_str() {
                Some("https") => 443,
                Some("http") | None => 80,
                Some(other) => {
                    return Err(DirectorError::Configuration(format!(
                        "Unknown scheme '{other}' without explicit port"
                    )))
                }
            },
        };

        Ok(Self::new(host, port))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, the request target of a tunnel request
    pub fn authority(&self) -> String {
        format!("{}:{}", self.name, self.port)
    }
}

impl fmt::Display for HttpHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TunnelType {
    Plain,
    Tunnelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerType {
    Plain,
    Layered,
}

/// The planned path to a target: direct or through a single proxy.
///
/// Routes compare by structure; two routes are the same route when the
/// hops, the tunnel and layer types and the security flag all match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    target: HttpHost,
    proxy: Option<HttpHost>,
    tunnel: TunnelType,
    layer: LayerType,
    secure: bool,
}

impl Route {
    /// A direct route. A secure direct route is secured when connecting.
    pub fn direct(target: HttpHost, secure: bool) -> Self {
        Self {
            target,
            proxy: None,
            tunnel: TunnelType::Plain,
            layer: LayerType::Plain,
            secure,
        }
    }

    /// A route through `proxy`. Secure routes are tunnelled and layered,
    /// plain routes are forwarded by the proxy without a tunnel.
    pub fn proxied(target: HttpHost, proxy: HttpHost, secure: bool) -> Self {
        let (tunnel, layer) = if secure {
            (TunnelType::Tunnelled, LayerType::Layered)
        } else {
            (TunnelType::Plain, LayerType::Plain)
        };

        Self {
            target,
            proxy: Some(proxy),
            tunnel,
            layer,
            secure,
        }
    }

    /// A route with an explicit layout.
    pub fn with_layout(
        target: HttpHost,
        proxy: Option<HttpHost>,
        tunnel: TunnelType,
        layer: LayerType,
        secure: bool,
    ) -> DirectorResult<Self> {
        if tunnel == TunnelType::Tunnelled && proxy.is_none() {
            return Err(DirectorError::Configuration(
                "a tunnelled route requires a proxy".to_string(),
            ));
        }
        if layer == LayerType::Layered && tunnel != TunnelType::Tunnelled {
            return Err(DirectorError::Configuration(
                "a layered route requires a tunnel".to_string(),
            ));
        }
        if secure && proxy.is_some() && layer != LayerType::Layered {
            return Err(DirectorError::Configuration(
                "a secure route through a proxy must be layered".to_string(),
            ));
        }

        Ok(Self {
            target,
            proxy,
            tunnel,
            layer,
            secure,
        })
    }

    pub fn target(&self) -> &HttpHost {
        &self.target
    }

    pub fn proxy(&self) -> Option<&HttpHost> {
        self.proxy.as_ref()
    }

    /// The host the socket connects to.
    pub fn first_hop(&self) -> &HttpHost {
        self.proxy.as_ref().unwrap_or(&self.target)
    }

    pub fn hop_count(&self) -> usize {
        if self.proxy.is_some() {
            2
        } else {
            1
        }
    }

    pub fn is_tunnelled(&self) -> bool {
        self.tunnel == TunnelType::Tunnelled
    }

    pub fn is_layered(&self) -> bool {
        self.layer == LayerType::Layered
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        if self.is_tunnelled() {
            write!(f, "t")?;
        }
        if self.is_layered() {
            write!(f, "l")?;
        }
        if self.secure {
            write!(f, "s")?;
        }
        write!(f, "}}->")?;
        if let Some(proxy) = &self.proxy {
            write!(f, "{proxy}->")?;
        }
        write!(f, "{}", self.target)
    }
}

/// What a connection has established towards its route so far.
///
/// Mutators only ever add hops, tunnels or layers; they never take
/// anything back. A closed connection has no state at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteState {
    target: HttpHost,
    proxy: Option<HttpHost>,
    connected: bool,
    tunnelled: bool,
    layered: bool,
    secure: bool,
}

impl RouteState {
    /// Starts tracking a route to `target`; nothing is connected yet.
    pub fn new(target: HttpHost) -> Self {
        Self {
            target,
            proxy: None,
            connected: false,
            tunnelled: false,
            layered: false,
            secure: false,
        }
    }

    pub fn connect_target(&mut self, secure: bool) -> DirectorResult<()> {
        if self.connected {
            return Err(self.illegal("already connected"));
        }
        self.connected = true;
        self.secure = secure;
        Ok(())
    }

    pub fn connect_proxy(&mut self, proxy: HttpHost, secure: bool) -> DirectorResult<()> {
        if self.connected {
            return Err(self.illegal("already connected"));
        }
        self.proxy = Some(proxy);
        self.connected = true;
        self.secure = secure;
        Ok(())
    }

    pub fn tunnel_target(&mut self, secure: bool) -> DirectorResult<()> {
        if !self.connected || self.proxy.is_none() {
            return Err(self.illegal("no proxy connection to tunnel through"));
        }
        if self.tunnelled {
            return Err(self.illegal("already tunnelled"));
        }
        self.tunnelled = true;
        self.secure = secure;
        Ok(())
    }

    pub fn layer_protocol(&mut self, secure: bool) -> DirectorResult<()> {
        if !self.connected {
            return Err(self.illegal("cannot layer on an unconnected route"));
        }
        if self.layered {
            return Err(self.illegal("already layered"));
        }
        self.layered = true;
        self.secure = secure;
        Ok(())
    }

    pub fn target(&self) -> &HttpHost {
        &self.target
    }

    pub fn proxy(&self) -> Option<&HttpHost> {
        self.proxy.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_tunnelled(&self) -> bool {
        self.tunnelled
    }

    pub fn is_layered(&self) -> bool {
        self.layered
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    fn illegal(&self, msg: &str) -> DirectorError {
        DirectorError::Internal(format!("{msg}: {self}"))
    }
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        if self.connected {
            write!(f, "c")?;
        }
        if self.tunnelled {
            write!(f, "t")?;
        }
        if self.layered {
            write!(f, "l")?;
        }
        if self.secure {
            write!(f, "s")?;
        }
        write!(f, "}}->")?;
        if let Some(proxy) = &self.proxy {
            write!(f, "{proxy}->")?;
        }
        write!(f, "{}", self.target)
    }
}

//! Execution context management
//!
//! This module provides the ExecutionContext that holds per-request state
//! shared between the director and its collaborators.

use std::{any::Any, collections::HashMap, time::Instant};

/// Target host of the route currently being executed (`HttpHost`)
pub const TARGET_HOST: &str = "http.target_host";

/// Established state of the held connection (`RouteState`)
pub const ESTABLISHED_ROUTE: &str = "http.established_route";

/// Request line of the prepared request (`String`)
pub const REQUEST_LINE: &str = "http.request_line";

/// Set by transport executors once the request has been written (`bool`)
pub const REQUEST_SENT: &str = "http.request_sent";

const REQUEST_START: &str = "request_start";

/// Context that holds per-request state and metadata
pub struct ExecutionContext {
    /// Number of execution attempts for the current logical request
    pub tries: u32,

    /// Number of follow-up requests issued for the current logical request
    pub follow_ups: u32,

    /// Custom variables available to collaborators (type-erased, thread-safe)
    vars: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        let mut vars: HashMap<String, Box<dyn Any + Send + Sync>> = HashMap::new();
        vars.insert(REQUEST_START.to_string(), Box::new(Instant::now()));

        Self {
            tries: 0,
            follow_ups: 0,
            vars,
        }
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a typed value into the context
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.vars.insert(key.into(), Box::new(value));
    }

    /// Get a typed reference from the context
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.vars.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Get a string slice if the stored value is a `String`
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get::<String>(key).map(|s| s.as_str())
    }

    /// Get a flag, treating a missing key as `false`
    pub fn get_flag(&self, key: &str) -> bool {
        self.get::<bool>(key).copied().unwrap_or(false)
    }

    /// Check if a key exists in the context
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Remove a value from the context
    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Any + Send + Sync>> {
        self.vars.remove(key)
    }

    /// Time at which this context was created
    pub fn request_start(&self) -> Option<Instant> {
        self.get::<Instant>(REQUEST_START).copied()
    }

    /// Reset per-request counters before a new logical request
    pub(crate) fn begin_request(&mut self) {
        self.tries = 0;
        self.follow_ups = 0;
        self.remove(REQUEST_SENT);
    }
}

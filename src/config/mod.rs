use std::{fmt, fs, time::Duration};

use http::Version;
use log::{debug, trace};
use pingora_error::{ErrorType::*, OrErr, Result};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Settings of a `RequestDirector`.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "DirectorConfig::validate_retry"))]
pub struct DirectorConfig {
    /// Milliseconds to wait for a pooled connection; 0 waits forever
    #[serde(default)]
    #[validate(range(max = 3_600_000))]
    pub connection_manager_timeout: u64,

    /// Check connections for staleness before each attempt
    #[serde(default = "DirectorConfig::default_stale_checking")]
    pub stale_checking: bool,

    /// Protocol version of tunnel requests
    #[serde(default)]
    pub tunnel_version: TunnelVersion,

    /// Follow-up requests allowed per logical request
    #[serde(default = "DirectorConfig::default_max_follow_ups")]
    #[validate(range(min = 1, max = 1000))]
    pub max_follow_ups: u32,

    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            connection_manager_timeout: 0,
            stale_checking: Self::default_stale_checking(),
            tunnel_version: TunnelVersion::default(),
            max_follow_ups: Self::default_max_follow_ups(),
            retry: RetryConfig::default(),
        }
    }
}

// Config file load and validation
impl DirectorConfig {
    pub fn load_from_yaml<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path> + fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).or_err_with(ReadError, || {
            format!("Unable to read conf file from {path}")
        })?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    pub fn from_yaml(conf_str: &str) -> Result<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: DirectorConfig = serde_yaml::from_str(conf_str).or_err_with(ReadError, || {
            format!("Unable to parse yaml conf {conf_str}")
        })?;

        trace!("Loaded conf: {conf:?}");

        conf.validate()
            .or_err_with(FileReadError, || "Conf file valid failed")?;

        Ok(conf)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).or_err(InternalError, "Unable to serialize conf")
    }

    /// Acquisition timeout, `None` meaning no limit.
    pub fn acquire_timeout(&self) -> Option<Duration> {
        match self.connection_manager_timeout {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    fn default_stale_checking() -> bool {
        true
    }

    fn default_max_follow_ups() -> u32 {
        100
    }

    fn validate_retry(&self) -> Result<(), ValidationError> {
        if self.retry.request_sent_enabled && self.retry.count == 0 {
            return Err(ValidationError::new("request_sent_retry_without_count"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TunnelVersion {
    #[serde(rename = "1.0")]
    Http10,
    #[default]
    #[serde(rename = "1.1")]
    Http11,
}

impl TunnelVersion {
    pub fn as_version(self) -> Version {
        match self {
            TunnelVersion::Http10 => Version::HTTP_10,
            TunnelVersion::Http11 => Version::HTTP_11,
        }
    }
}

/// Settings of the default retry handler.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt
    #[serde(default = "RetryConfig::default_count")]
    #[validate(range(max = 100))]
    pub count: u32,

    /// Retry even when the request may already have reached the server
    #[serde(default)]
    pub request_sent_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            count: Self::default_count(),
            request_sent_enabled: false,
        }
    }
}

impl RetryConfig {
    fn default_count() -> u32 {
        3
    }
}

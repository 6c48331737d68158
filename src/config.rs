use std::time::Duration;

use hyper::header::{HeaderValue, InvalidHeaderValue};
use hyper::http::uri::InvalidUri;
use hyper::Uri;
use thiserror::Error;
use url::Url;

use crate::catalog::{Catalog, Selection};
use crate::executor::ExecutorSettings;
use crate::pacer::CatchUp;

pub const DEFAULT_QPS: usize = 300;
pub const DEFAULT_DURATION_SECONDS: u64 = 60 * 20;
pub const DEFAULT_TIMEOUT_MS: u64 = 250;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Unsupported URL scheme '{scheme}', expected http or https.")]
    UnsupportedScheme { scheme: String },
    #[error("URL '{url}' is not a valid request target: {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: InvalidUri,
    },
    #[error("Invalid host header '{value}': {source}")]
    InvalidHostHeader {
        value: String,
        #[source]
        source: InvalidHeaderValue,
    },
    #[error("qps must be greater than zero.")]
    ZeroQps,
    #[error("duration must be at least one second.")]
    ZeroDuration,
    #[error("timeout must be greater than zero.")]
    ZeroTimeout,
    #[error("cycle ticks must be greater than zero.")]
    ZeroCycleTicks,
    #[error("tick interval must be greater than zero.")]
    ZeroTickInterval,
    #[error("Payload index {index} is out of range for a catalog of {len}.")]
    PayloadOutOfRange { index: usize, len: usize },
    #[error("Payload catalog is empty.")]
    EmptyCatalog,
}

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub target: Url,
    pub qps: usize,
    pub duration_seconds: u64,
    pub timeout: Duration,
    pub log_success: bool,
    pub log_error: bool,
    pub host_header: Option<String>,
    pub insecure: bool,
    pub selection: Selection,
    pub catch_up: CatchUp,
    /// Ticks supervised by each pacer cycle.
    pub cycle_ticks: u64,
    pub tick_interval: Duration,
}

impl CampaignConfig {
    /// Reference configuration against `target`.
    pub fn new(target: Url) -> Self {
        CampaignConfig {
            target,
            qps: DEFAULT_QPS,
            duration_seconds: DEFAULT_DURATION_SECONDS,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            log_success: false,
            log_error: false,
            host_header: None,
            insecure: false,
            selection: Selection::default(),
            catch_up: CatchUp::default(),
            cycle_ticks: 1,
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn parse_target(url: &str) -> Result<Url, ConfigError> {
        let target = Url::parse(url).map_err(|source| ConfigError::InvalidUrl {
            url: url.to_owned(),
            source,
        })?;
        match target.scheme() {
            "http" | "https" => Ok(target),
            scheme => Err(ConfigError::UnsupportedScheme {
                scheme: scheme.to_owned(),
            }),
        }
    }

    pub fn validate(&self, catalog: &Catalog) -> Result<(), ConfigError> {
        if self.qps == 0 {
            return Err(ConfigError::ZeroQps);
        }
        if self.duration_seconds == 0 {
            return Err(ConfigError::ZeroDuration);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.cycle_ticks == 0 {
            return Err(ConfigError::ZeroCycleTicks);
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        if catalog.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        if let Selection::Fixed(index) = self.selection {
            if index >= catalog.len() {
                return Err(ConfigError::PayloadOutOfRange {
                    index,
                    len: catalog.len(),
                });
            }
        }
        Ok(())
    }

    pub fn executor_settings(&self) -> Result<ExecutorSettings, ConfigError> {
        let target = self
            .target
            .as_str()
            .parse::<Uri>()
            .map_err(|source| ConfigError::InvalidTarget {
                url: self.target.to_string(),
                source,
            })?;
        if let Some(value) = &self.host_header {
            HeaderValue::from_str(value).map_err(|source| ConfigError::InvalidHostHeader {
                value: value.clone(),
                source,
            })?;
        }
        Ok(ExecutorSettings {
            target,
            timeout: self.timeout,
            host_header: self.host_header.clone(),
            insecure: self.insecure,
            log_success: self.log_success,
            log_error: self.log_error,
        })
    }
}

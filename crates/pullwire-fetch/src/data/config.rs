use std::sync::Arc;
use std::time::Duration;

use super::headers::{self, HeaderList};
use crate::error::{Error, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_secs(3);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_OUTAGE_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_OUTAGE_MAX_WAIT: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_PROBE_ENDPOINTS: [&str; 4] = [
    "https://www.google.com",
    "https://wikipedia.org",
    "https://twitter.com/home",
    "https://www.facebook.com",
];

// The SEC allows at most 10 automated requests per second.
const SEC_RATE_PER_SECOND: f64 = 10.0;
const SEC_BURST: u32 = 10;
const SEC_MAX_ATTEMPTS: u32 = 7;
const SEC_BACKOFF_FACTOR: Duration = Duration::from_secs(10);
const SEC_BACKOFF_ON_429: Duration = Duration::from_secs(601);

/// Token bucket parameters: `rate` tokens per second, `burst` capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub rate: f64,
    pub burst: u32,
}

/// How long to keep retrying once the whole network looks down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutageRecovery {
    /// Sleep between recovery attempts.
    pub interval: Duration,
    /// Total budget for the recovery phase.
    pub max_wait: Duration,
}

/// Endpoints used to tell a global outage from a target-specific failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub endpoints: Arc<[String]>,
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_PROBE_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Validated, immutable configuration of a [`RetryEngine`](crate::RetryEngine).
///
/// Build one with [`FetchConfig::builder`] or start from a preset.
///
/// # Examples
///
/// ```
/// use pullwire_fetch::FetchConfig;
/// use std::time::Duration;
///
/// let config = FetchConfig::builder()
///     .max_attempts(3)
///     .backoff_factor(Duration::from_millis(200))
///     .rate_limit(5.0, 5)
///     .no_retry_on_404(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct FetchConfig {
    headers: Arc<[(String, String)]>,
    max_attempts: u32,
    backoff_factor: Duration,
    request_timeout: Duration,
    rate_limit: Option<RateLimit>,
    no_retry_on_404: bool,
    no_retry_on_422: bool,
    long_backoff_on_429: Option<Duration>,
    outage_recovery: Option<OutageRecovery>,
    probe: ProbeConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            headers: Arc::from(headers::default_headers()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rate_limit: None,
            no_retry_on_404: false,
            no_retry_on_422: false,
            long_backoff_on_429: None,
            outage_recovery: None,
            probe: ProbeConfig::default(),
        }
    }
}

impl FetchConfig {
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::default()
    }

    /// Start a builder from this config, e.g. to adjust a preset.
    pub fn to_builder(&self) -> FetchConfigBuilder {
        FetchConfigBuilder {
            config: self.clone(),
        }
    }

    /// Policy for SEC EDGAR: identified bot headers, 10 req/s, 7 attempts,
    /// a 601s wait after a 429 and no retries on 404.
    pub fn sec(contact: &str) -> Result<Self> {
        Self::sec_builder(contact).build()
    }

    /// [`FetchConfig::sec`] plus outage recovery, for long-running bulk jobs
    /// that should sit out a lost connection instead of failing.
    pub fn sec_installer(contact: &str) -> Result<Self> {
        Self::sec_builder(contact)
            .outage_recovery(DEFAULT_OUTAGE_INTERVAL, DEFAULT_OUTAGE_MAX_WAIT)
            .build()
    }

    /// Policy for resolving link-shortener URLs: few attempts, no retries on
    /// 404/422 and a one minute wait after a 429.
    pub fn short_url() -> Result<Self> {
        Self::builder()
            .max_attempts(3)
            .backoff_factor(Duration::from_secs(5))
            .no_retry_on_404(true)
            .no_retry_on_422(true)
            .long_backoff_on_429(Duration::from_secs(60))
            .build()
    }

    fn sec_builder(contact: &str) -> FetchConfigBuilder {
        Self::builder()
            .headers(headers::sec_bot_headers(contact))
            .max_attempts(SEC_MAX_ATTEMPTS)
            .backoff_factor(SEC_BACKOFF_FACTOR)
            .rate_limit(SEC_RATE_PER_SECOND, SEC_BURST)
            .long_backoff_on_429(SEC_BACKOFF_ON_429)
            .no_retry_on_404(true)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub(crate) fn shared_headers(&self) -> Arc<[(String, String)]> {
        Arc::clone(&self.headers)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_factor(&self) -> Duration {
        self.backoff_factor
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }

    pub fn no_retry_on_404(&self) -> bool {
        self.no_retry_on_404
    }

    pub fn no_retry_on_422(&self) -> bool {
        self.no_retry_on_422
    }

    pub fn long_backoff_on_429(&self) -> Option<Duration> {
        self.long_backoff_on_429
    }

    pub fn outage_recovery(&self) -> Option<OutageRecovery> {
        self.outage_recovery
    }

    pub fn probe(&self) -> &ProbeConfig {
        &self.probe
    }
}

/// Builder for [`FetchConfig`]; [`build`](FetchConfigBuilder::build) validates.
#[derive(Debug, Clone, Default)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    /// Replace the header set.
    #[must_use]
    pub fn headers(mut self, headers: HeaderList) -> Self {
        self.config.headers = Arc::from(headers);
        self
    }

    /// Add or replace a single header (names compare case-insensitively).
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let mut headers: Vec<_> = self
            .config
            .headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case(&key))
            .cloned()
            .collect();
        headers.push((key, value.into()));
        self.config.headers = Arc::from(headers);
        self
    }

    /// Total number of scheduled attempts, including the first one.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    /// Base of the exponential backoff: attempt `i` waits `factor * 2^i`.
    #[must_use]
    pub fn backoff_factor(mut self, backoff_factor: Duration) -> Self {
        self.config.backoff_factor = backoff_factor;
        self
    }

    /// Shorthand for [`max_attempts`](Self::max_attempts) plus
    /// [`backoff_factor`](Self::backoff_factor).
    #[must_use]
    pub fn attempts_and_backoff(self, attempts: u32, backoff_factor: Duration) -> Self {
        self.max_attempts(attempts).backoff_factor(backoff_factor)
    }

    /// Upper bound for a single attempt, body included.
    #[must_use]
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.config.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, rate: f64, burst: u32) -> Self {
        self.config.rate_limit = Some(RateLimit { rate, burst });
        self
    }

    #[must_use]
    pub fn no_retry_on_404(mut self, enabled: bool) -> Self {
        self.config.no_retry_on_404 = enabled;
        self
    }

    #[must_use]
    pub fn no_retry_on_422(mut self, enabled: bool) -> Self {
        self.config.no_retry_on_422 = enabled;
        self
    }

    /// Fixed wait used after a 429 whenever it exceeds the exponential delay.
    #[must_use]
    pub fn long_backoff_on_429(mut self, backoff: Duration) -> Self {
        self.config.long_backoff_on_429 = Some(backoff);
        self
    }

    #[must_use]
    pub fn outage_recovery(mut self, interval: Duration, max_wait: Duration) -> Self {
        self.config.outage_recovery = Some(OutageRecovery { interval, max_wait });
        self
    }

    #[must_use]
    pub fn probe_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.config.probe.endpoints = Arc::from(endpoints);
        self
    }

    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<FetchConfig> {
        let config = self.config;

        if config.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if config.request_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "request_timeout must be non-zero".to_string(),
            ));
        }
        if let Some(limit) = config.rate_limit {
            if !(limit.rate.is_finite() && limit.rate > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "rate limit must be a positive number, got {}",
                    limit.rate
                )));
            }
            if limit.burst == 0 {
                return Err(Error::InvalidConfig(
                    "rate limit burst must be at least 1".to_string(),
                ));
            }
        }
        if let Some(recovery) = config.outage_recovery {
            if recovery.interval.is_zero() {
                return Err(Error::InvalidConfig(
                    "outage recovery interval must be non-zero".to_string(),
                ));
            }
            if config.probe.endpoints.is_empty() {
                return Err(Error::InvalidConfig(
                    "outage recovery needs at least one probe endpoint".to_string(),
                ));
            }
        }
        if config.probe.timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "probe timeout must be non-zero".to_string(),
            ));
        }

        Ok(config)
    }
}

//! File-based fetch settings.
//!
//! A TOML document mirroring [`FetchConfigBuilder`]. Every field is
//! optional; missing ones keep the builder defaults.
//!
//! ```toml
//! max_attempts = 7
//! backoff_factor_ms = 10000
//! request_timeout_secs = 60
//! no_retry_on_404 = true
//! long_backoff_on_429_secs = 601
//!
//! [headers]
//! User-Agent = "Example admin@example.com"
//!
//! [rate_limit]
//! rate = 10.0
//! burst = 10
//!
//! [outage_recovery]
//! interval_secs = 300
//! max_wait_secs = 21600
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::config::{FetchConfig, FetchConfigBuilder};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchSettings {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub max_attempts: Option<u32>,
    pub backoff_factor_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub no_retry_on_404: Option<bool>,
    pub no_retry_on_422: Option<bool>,
    pub long_backoff_on_429_secs: Option<u64>,
    pub rate_limit: Option<RateLimitSettings>,
    pub outage_recovery: Option<OutageRecoverySettings>,
    pub probe: Option<ProbeSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSettings {
    pub rate: f64,
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutageRecoverySettings {
    pub interval_secs: u64,
    pub max_wait_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeSettings {
    pub endpoints: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

impl FetchSettings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply these settings on top of `builder`.
    pub fn apply(self, mut builder: FetchConfigBuilder) -> FetchConfigBuilder {
        for (key, value) in self.headers {
            builder = builder.header(key, value);
        }
        if let Some(attempts) = self.max_attempts {
            builder = builder.max_attempts(attempts);
        }
        if let Some(ms) = self.backoff_factor_ms {
            builder = builder.backoff_factor(Duration::from_millis(ms));
        }
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(enabled) = self.no_retry_on_404 {
            builder = builder.no_retry_on_404(enabled);
        }
        if let Some(enabled) = self.no_retry_on_422 {
            builder = builder.no_retry_on_422(enabled);
        }
        if let Some(secs) = self.long_backoff_on_429_secs {
            builder = builder.long_backoff_on_429(Duration::from_secs(secs));
        }
        if let Some(limit) = self.rate_limit {
            builder = builder.rate_limit(limit.rate, limit.burst);
        }
        if let Some(recovery) = self.outage_recovery {
            builder = builder.outage_recovery(
                Duration::from_secs(recovery.interval_secs),
                Duration::from_secs(recovery.max_wait_secs),
            );
        }
        if let Some(probe) = self.probe {
            if let Some(endpoints) = probe.endpoints {
                builder = builder.probe_endpoints(endpoints);
            }
            if let Some(secs) = probe.timeout_secs {
                builder = builder.probe_timeout(Duration::from_secs(secs));
            }
        }
        builder
    }

    pub fn into_config(self) -> Result<FetchConfig> {
        self.apply(FetchConfig::builder()).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::config::{OutageRecovery, RateLimit};

    #[test]
    fn full_document() {
        let settings = FetchSettings::from_toml_str(
            r#"
            max_attempts = 7
            backoff_factor_ms = 10000
            no_retry_on_404 = true
            long_backoff_on_429_secs = 601

            [headers]
            User-Agent = "Example admin@example.com"

            [rate_limit]
            rate = 10.0
            burst = 10

            [outage_recovery]
            interval_secs = 300
            max_wait_secs = 21600

            [probe]
            endpoints = ["https://probe.example"]
            timeout_secs = 3
            "#,
        )
        .unwrap();

        let config = settings.into_config().unwrap();
        assert_eq!(config.max_attempts(), 7);
        assert_eq!(config.backoff_factor(), Duration::from_secs(10));
        assert!(config.no_retry_on_404());
        assert!(!config.no_retry_on_422());
        assert_eq!(config.long_backoff_on_429(), Some(Duration::from_secs(601)));
        assert_eq!(
            config.rate_limit(),
            Some(RateLimit {
                rate: 10.0,
                burst: 10
            })
        );
        assert_eq!(
            config.outage_recovery(),
            Some(OutageRecovery {
                interval: Duration::from_secs(300),
                max_wait: Duration::from_secs(21600),
            })
        );
        assert_eq!(config.probe().endpoints[..], ["https://probe.example"]);
        assert_eq!(config.probe().timeout, Duration::from_secs(3));
        assert!(config
            .headers()
            .iter()
            .any(|(k, v)| k == "User-Agent" && v == "Example admin@example.com"));
    }

    #[test]
    fn empty_document_keeps_defaults() {
        let config = FetchSettings::from_toml_str("").unwrap().into_config().unwrap();
        assert_eq!(config.max_attempts(), 5);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = FetchSettings::from_toml_str("retries = 3").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let settings = FetchSettings::from_toml_str("max_attempts = 0").unwrap();
        assert!(settings.into_config().is_err());
    }

    #[test]
    fn settings_can_disable_preset_flags() {
        let preset = FetchConfig::short_url().unwrap();
        assert!(preset.no_retry_on_404());

        let settings = FetchSettings::from_toml_str("no_retry_on_404 = false").unwrap();
        let config = settings.apply(preset.to_builder()).build().unwrap();
        assert!(!config.no_retry_on_404());
        assert!(config.no_retry_on_422());
    }
}

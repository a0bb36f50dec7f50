use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tracing::{debug, warn};

use crate::data::ProbeConfig;
use crate::effects::http::{HttpClient, HttpRequest};

/// Checks whether the machine can reach the internet at all.
///
/// Every endpoint is asked concurrently. Any HTTP response, whatever its
/// status, proves connectivity.
#[derive(Debug, Clone)]
pub struct NetworkProbe {
    endpoints: Arc<[String]>,
    timeout: Duration,
}

impl NetworkProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            endpoints: config.endpoints.clone(),
            timeout: config.timeout,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// `true` only when every endpoint fails. Returns `false` as soon as the
    /// first endpoint answers.
    pub async fn is_globally_unavailable<C: HttpClient>(&self, client: &C) -> bool {
        let mut probes: FuturesUnordered<_> = self
            .endpoints
            .iter()
            .map(|endpoint| async move {
                let request = HttpRequest::get(endpoint.as_str(), self.timeout);
                let outcome = tokio::time::timeout(self.timeout, client.execute(request)).await;
                (endpoint.as_str(), outcome)
            })
            .collect();

        while let Some((endpoint, outcome)) = probes.next().await {
            match outcome {
                Ok(Ok(response)) => {
                    debug!(endpoint, status = response.status, "probe reached endpoint");
                    return false;
                }
                Ok(Err(e)) => debug!(endpoint, error = %e, "probe failed"),
                Err(_) => debug!(endpoint, timeout = ?self.timeout, "probe timed out"),
            }
        }

        warn!(endpoints = self.endpoints.len(), "all connectivity probes failed");
        true
    }
}

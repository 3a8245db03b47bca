//! HTTP heartbeat probe

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SupervisorResult;
use crate::traits::HealthProbe;

/// Default per-probe timeout for the heartbeat
pub const HEARTBEAT_PROBE_TIMEOUT: Duration = Duration::from_millis(700);

/// Issues a HEAD request against the app's own endpoint
///
/// Healthy iff a response arrives within the timeout with a status below
/// 500. Connection failures and timeouts count as unhealthy.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> SupervisorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Probe `http://localhost:<port>/` with the default timeout
    pub fn for_port(port: u16) -> SupervisorResult<Self> {
        Self::new(format!("http://localhost:{port}/"), HEARTBEAT_PROBE_TIMEOUT)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => response.status().as_u16() < 500,
            Err(_) => false,
        }
    }
}

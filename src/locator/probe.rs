//! Bounded-time HTTP liveness probing.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Hard bound on one liveness probe; an elapsed probe counts as failed and
/// is not retried.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

/// Outbound proxy settings for the probe client.
///
/// `use_default_credentials` selects the ambient system credentials instead
/// of attaching explicit basic auth; when both are configured, default
/// credentials take precedence.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_default_credentials: bool,
}

/// HEAD-request prober with the timeout, redirect, and proxy behavior the
/// locator requires. Connections are not reused: each probe stands alone.
pub struct ProbeClient {
    client: Client,
}

impl ProbeClient {
    pub fn new(proxy: Option<&ProxyConfig>) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .pool_max_idle_per_host(0)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(config) = proxy {
            let mut proxy = reqwest::Proxy::all(&config.url)
                .with_context(|| format!("Invalid proxy URL {:?}", config.url))?;
            if !config.use_default_credentials
                && let (Some(user), Some(pass)) = (&config.username, &config.password)
            {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }

        let client = builder.build().context("Failed to build probe client")?;
        Ok(Self { client })
    }

    /// Issue one HEAD request and report the final status after redirects.
    #[tracing::instrument(skip(self))]
    pub async fn head(&self, url: &str) -> Result<StatusCode, reqwest::Error> {
        let response = self.client.head(url).send().await?;
        Ok(response.status())
    }
}

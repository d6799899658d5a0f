//! [`PeerClient`] over HTTP/JSON.

use crate::error::{ReplayError, Result};
use crate::farm::PeerClient;
use crate::notify::FarmNotification;
use crate::wire::{
    CHECK_PATH, CheckRequest, CheckResponse, NOTIFY_PATH, NotifyRequest, RESET_PATH, ResetRequest,
    WARMUP_PATH,
};
use std::time::Duration;

/// Reaches peers at `<scheme>://<server>:<port>`.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
    scheme: &'static str,
    port: u16,
}

impl HttpPeerClient {
    /// Plain HTTP client for peers listening on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Http`] if the client cannot be built.
    pub fn new(port: u16, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            scheme: "http",
            port,
        })
    }

    /// Use HTTPS instead of HTTP.
    #[must_use]
    pub const fn with_tls(mut self) -> Self {
        self.scheme = "https";
        self
    }

    fn url(&self, server: &str, path: &str) -> String {
        format!("{}://{}:{}{}", self.scheme, server, self.port, path)
    }

    fn ensure_success(url: String, response: &reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ReplayError::Status {
                url,
                status: status.as_u16(),
            })
        }
    }
}

impl PeerClient for HttpPeerClient {
    async fn check(&self, server: &str, request: &CheckRequest) -> Result<bool> {
        let url = self.url(server, CHECK_PATH);
        let response = self.client.post(&url).json(request).send().await?;
        Self::ensure_success(url, &response)?;
        Ok(response.json::<CheckResponse>().await?.accepted)
    }

    async fn reset(&self, server: &str, request: &ResetRequest) -> Result<()> {
        let url = self.url(server, RESET_PATH);
        let response = self.client.post(&url).json(request).send().await?;
        Self::ensure_success(url, &response)
    }

    async fn warm_up(&self, server: &str) -> Result<()> {
        let url = self.url(server, WARMUP_PATH);
        let response = self.client.get(&url).send().await?;
        Self::ensure_success(url, &response)
    }

    async fn notify(&self, server: &str, notification: FarmNotification) -> Result<()> {
        let url = self.url(server, NOTIFY_PATH);
        let response = self
            .client
            .post(&url)
            .json(&NotifyRequest { notification })
            .send()
            .await?;
        Self::ensure_success(url, &response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_server_and_port() {
        let client = HttpPeerClient::new(8443, Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("adfs2", CHECK_PATH), "http://adfs2:8443/replay/check");
        assert_eq!(client.with_tls().url("adfs3", NOTIFY_PATH), "https://adfs3:8443/notify");
    }
}

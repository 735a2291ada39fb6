//! Background token refresh
//!
//! The speech service issues short-lived bearer tokens and relay (ICE)
//! credentials. Each refresher is a background task publishing into a
//! watch channel; request handlers wait on the channel with a timeout
//! instead of polling, so a handler that races the first refresh blocks
//! briefly and then either gets a token or a clean error.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SpeechConfig;
use crate::engines::IceServer;
use crate::{Error, Result};

/// Refresh margin: speech tokens last 10 minutes
const SPEECH_REFRESH: Duration = Duration::from_secs(9 * 60);
/// Relay credentials last about a day
const RELAY_REFRESH: Duration = Duration::from_secs(24 * 60 * 60);
/// Retry delay after a failed refresh
const RETRY: Duration = Duration::from_secs(10);

/// Read side of a refreshed value
#[derive(Clone)]
pub struct TokenCache<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> TokenCache<T> {
    /// Cache reading from an externally managed channel
    #[must_use]
    pub fn from_receiver(rx: watch::Receiver<Option<T>>) -> Self {
        Self { rx }
    }

    /// Current value, if a refresh has succeeded yet
    #[must_use]
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Wait until a value is available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Token`] when no refresh succeeds within `timeout`
    /// or the refresher has shut down.
    pub async fn wait(&self, timeout: Duration) -> Result<T> {
        let mut rx = self.rx.clone();
        let value = tokio::time::timeout(timeout, rx.wait_for(Option::is_some))
            .await
            .map_err(|_| Error::Token("timed out waiting for token refresh".to_string()))?
            .map_err(|_| Error::Token("token refresher stopped".to_string()))?;
        value
            .clone()
            .ok_or_else(|| Error::Token("token unavailable".to_string()))
    }
}

/// Spawn the speech bearer-token refresher.
///
/// Without a subscription key the cache stays empty and callers get a
/// token error; key-less deployments must front their own auth.
pub fn spawn_speech_token_refresher(
    config: &SpeechConfig,
) -> (TokenCache<String>, Option<JoinHandle<()>>) {
    let (tx, rx) = watch::channel(None);
    let Some(key) = config.key.clone() else {
        tracing::warn!("no speech key configured, speech token refresh disabled");
        return (TokenCache { rx }, None);
    };
    let endpoint = config.token_endpoint();
    let client = reqwest::Client::new();

    let task = tokio::spawn(async move {
        loop {
            match fetch_speech_token(&client, &endpoint, &key).await {
                Ok(token) => {
                    tracing::debug!("speech token refreshed");
                    if tx.send(Some(token)).is_err() {
                        return;
                    }
                    tokio::time::sleep(SPEECH_REFRESH).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "speech token refresh failed");
                    tokio::time::sleep(RETRY).await;
                }
            }
        }
    });
    (TokenCache { rx }, Some(task))
}

async fn fetch_speech_token(
    client: &reqwest::Client,
    endpoint: &str,
    key: &str,
) -> Result<String> {
    let response = client
        .post(endpoint)
        .header("Ocp-Apim-Subscription-Key", key)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Token(format!("token endpoint returned {status}")));
    }
    Ok(response.text().await?)
}

/// Spawn the avatar relay (ICE) credential refresher
pub fn spawn_relay_token_refresher(
    config: &SpeechConfig,
) -> (TokenCache<IceServer>, Option<JoinHandle<()>>) {
    let (tx, rx) = watch::channel(None);
    let Some(key) = config.key.clone() else {
        tracing::warn!("no speech key configured, relay token refresh disabled");
        return (TokenCache { rx }, None);
    };
    let endpoint = config.relay_token_endpoint();
    let client = reqwest::Client::new();

    let task = tokio::spawn(async move {
        loop {
            match fetch_relay_token(&client, &endpoint, &key).await {
                Ok(server) => {
                    tracing::debug!("relay credentials refreshed");
                    if tx.send(Some(server)).is_err() {
                        return;
                    }
                    tokio::time::sleep(RELAY_REFRESH).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "relay credential refresh failed");
                    tokio::time::sleep(RETRY).await;
                }
            }
        }
    });
    (TokenCache { rx }, Some(task))
}

async fn fetch_relay_token(
    client: &reqwest::Client,
    endpoint: &str,
    key: &str,
) -> Result<IceServer> {
    let response = client
        .get(endpoint)
        .header("Ocp-Apim-Subscription-Key", key)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Token(format!("relay token endpoint returned {status}")));
    }

    #[derive(Deserialize)]
    struct RelayToken {
        #[serde(rename = "Urls")]
        urls: Vec<String>,
        #[serde(rename = "Username")]
        username: String,
        #[serde(rename = "Password")]
        password: String,
    }
    let token: RelayToken = response.json().await?;
    Ok(IceServer { urls: token.urls, username: token.username, credential: token.password })
}

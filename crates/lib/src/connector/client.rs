//! Connector REST client: POST activities to `{serviceUrl}/v3/conversations/...`.
//! Authenticates with a client-credentials token when an app id and password are configured.

use super::{ActivitySender, ConnectorError};
use crate::activity::Activity;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_TOKEN_ENDPOINT: &str =
    "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token";
const TOKEN_SCOPE: &str = "https://api.botframework.com/.default";
/// Refresh tokens this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Shortest lifetime assumed for a token, whatever `expires_in` says.
const MIN_TOKEN_LIFETIME_SECS: u64 = 120;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

struct Credentials {
    app_id: String,
    app_password: String,
    token_endpoint: String,
}

/// Connector client shared by all turns.
pub struct BotConnector {
    client: reqwest::Client,
    credentials: Option<Credentials>,
    token: Mutex<Option<CachedToken>>,
}

impl BotConnector {
    /// Without both an app id and password, requests go out unauthenticated (local emulator).
    pub fn new(
        app_id: Option<String>,
        app_password: Option<String>,
        token_endpoint: Option<String>,
    ) -> Self {
        let credentials = match (app_id, app_password) {
            (Some(app_id), Some(app_password)) => Some(Credentials {
                app_id,
                app_password,
                token_endpoint: token_endpoint
                    .unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.to_string()),
            }),
            _ => {
                log::info!(
                    "connector: no app credentials configured, outbound calls are unauthenticated"
                );
                None
            }
        };
        Self {
            client: reqwest::Client::new(),
            credentials,
            token: Mutex::new(None),
        }
    }

    /// Bearer token for outbound calls; None when running without credentials.
    async fn bearer(&self) -> Result<Option<String>, ConnectorError> {
        let Some(creds) = self.credentials.as_ref() else {
            return Ok(None);
        };
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref() {
            if Instant::now() < t.refresh_at {
                return Ok(Some(t.token.clone()));
            }
        }
        let res = self
            .client
            .post(&creds.token_endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", creds.app_id.as_str()),
                ("client_secret", creds.app_password.as_str()),
                ("scope", TOKEN_SCOPE),
            ])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ConnectorError::Auth(format!("{} {}", status, body)));
        }
        let data: TokenResponse = res
            .json()
            .await
            .map_err(|e| ConnectorError::Auth(e.to_string()))?;
        log::debug!("connector: obtained token valid for {}s", data.expires_in);
        *cached = Some(CachedToken {
            token: data.access_token.clone(),
            refresh_at: Instant::now() + token_lifetime(data.expires_in),
        });
        Ok(Some(data.access_token))
    }
}

/// How long a freshly issued token is reused before it is refreshed.
fn token_lifetime(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in.max(MIN_TOKEN_LIFETIME_SECS))
        .saturating_sub(TOKEN_REFRESH_MARGIN)
}

/// Target URL for an activity: reply when `replyToId` is set, plain send otherwise.
pub(crate) fn activity_url(activity: &Activity) -> Result<String, ConnectorError> {
    let service_url = activity
        .service_url
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(ConnectorError::Unroutable("serviceUrl"))?;
    let conversation_id = activity
        .conversation_id()
        .ok_or(ConnectorError::Unroutable("conversation.id"))?;
    let base = format!(
        "{}/v3/conversations/{}/activities",
        service_url.trim_end_matches('/'),
        urlencoding::encode(conversation_id)
    );
    Ok(match activity.reply_to_id.as_deref() {
        Some(id) if !id.is_empty() => format!("{}/{}", base, urlencoding::encode(id)),
        _ => base,
    })
}

#[async_trait]
impl ActivitySender for BotConnector {
    async fn send_activity(&self, activity: &Activity) -> Result<(), ConnectorError> {
        let url = activity_url(activity)?;
        let mut req = self.client.post(&url).json(activity);
        if let Some(token) = self.bearer().await? {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ConnectorError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

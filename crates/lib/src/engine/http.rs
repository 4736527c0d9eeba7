//! Engine HTTP client: form-encoded POST to the engine URL, JSON response.
//! The session travels as a `JSESSIONID` cookie.

use super::{EngineClient, EngineError, EngineResponse};
use crate::config::EngineConfig;
use crate::normalize::EngineInput;
use async_trait::async_trait;
use std::time::Duration;

const VIEW_TYPE: &str = "tieapi";

/// Client for the engine's input endpoint.
#[derive(Clone)]
pub struct HttpEngineClient {
    url: String,
    client: reqwest::Client,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpEngineClient {
    pub fn new(url: impl Into<String>, config: &EngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn end_session_url(&self) -> String {
        if self.url.ends_with('/') {
            format!("{}endsession", self.url)
        } else {
            format!("{}/endsession", self.url)
        }
    }

    fn form(input: &EngineInput) -> Vec<(String, String)> {
        let mut form = vec![
            ("userinput".to_string(), input.text.clone()),
            ("viewtype".to_string(), VIEW_TYPE.to_string()),
        ];
        form.extend(input.parameters());
        form
    }

    async fn post_once(
        &self,
        session_id: Option<&str>,
        form: &[(String, String)],
    ) -> Result<EngineResponse, EngineError> {
        let mut req = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form);
        if let Some(id) = session_id {
            req = req.header(reqwest::header::COOKIE, format!("JSESSIONID={}", id));
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(EngineError::Api(format!("{} {}", status, body)));
        }
        let body = res.text().await?;
        let data: EngineResponse =
            serde_json::from_str(&body).map_err(|e| EngineError::Decode(e.to_string()))?;
        if data.status != 0 {
            return Err(EngineError::Api(format!(
                "status {}: {}",
                data.status,
                data.message.as_deref().unwrap_or("no message")
            )));
        }
        Ok(data)
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    /// POST the input. Transport failures are retried `max_retries` times; API and decode
    /// errors are returned immediately.
    async fn send_input(
        &self,
        session_id: Option<&str>,
        input: &EngineInput,
    ) -> Result<EngineResponse, EngineError> {
        let form = Self::form(input);
        let mut attempt = 0;
        loop {
            match self.post_once(session_id, &form).await {
                Err(EngineError::Request(e)) if attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "engine request failed (attempt {}/{}): {}",
                        attempt,
                        self.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                other => return other,
            }
        }
    }

    async fn close_session(&self, session_id: &str) -> Result<(), EngineError> {
        let res = self
            .client
            .post(self.end_session_url())
            .header(reqwest::header::COOKIE, format!("JSESSIONID={}", session_id))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(EngineError::Api(format!("endsession: {} {}", status, body)));
        }
        Ok(())
    }
}

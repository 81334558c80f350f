//! Bot API over HTTP: `POST {api_url}/bot{token}/{method}` with a JSON body.

use std::time::Duration;

use async_trait::async_trait;
use desk_core::{ApiResponse, TelegramApi};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TelegramConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest-backed [`TelegramApi`]. Never returns transport errors as `Err`; they become
/// [`ApiResponse::network_error`].
#[derive(Clone)]
pub struct HttpTelegramApi {
    client: reqwest::Client,
    base: String,
}

impl HttpTelegramApi {
    pub fn new(config: &TelegramConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base: format!("{}/bot{}", config.api_url(), config.bot_token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }
}

#[async_trait]
impl TelegramApi for HttpTelegramApi {
    async fn send_query(&self, method: &str, params: Value) -> ApiResponse {
        let response = match self
            .client
            .post(self.method_url(method))
            .json(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(method, error = %e, "Telegram request failed");
                return ApiResponse::network_error(e.to_string());
            }
        };

        let status = response.status().as_u16();
        match response.json::<Value>().await {
            Ok(body) => {
                let answer = ApiResponse::from_body(status, body);
                if answer.ok {
                    debug!(method, "Telegram call succeeded");
                } else {
                    warn!(
                        method,
                        code = answer.code,
                        description = answer.description.as_deref().unwrap_or(""),
                        "Telegram call returned an error"
                    );
                }
                answer
            }
            Err(e) => {
                warn!(method, status, error = %e, "Telegram response body is not JSON");
                ApiResponse::network_error(format!("invalid response body (HTTP {}): {}", status, e))
            }
        }
    }
}

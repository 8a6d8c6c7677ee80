use crate::client::Config;
use crate::client::consts::API_KEY_HEADER;
use crate::error::GeminiError;
use crate::types::{GenerateContentRequest, GenerateContentResponse};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;

/// Request/response client for `models/{model}:generateContent`.
pub struct GenerateClient {
    http: reqwest::Client,
    config: Config,
}

impl GenerateClient {
    pub fn new(config: Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url(),
            self.config.text_model()
        )
    }

    pub async fn generate(&self, request: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        let api_key = self.config.api_key().ok_or(GeminiError::MissingApiKey)?;

        tracing::debug!(
            "generateContent: {} turns, model={}",
            request.contents.len(),
            self.config.text_model()
        );
        let resp = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, api_key.expose_secret())
            .json(request)
            .send()
            .await
            .context("Failed to reach Gemini generateContent")?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(GeminiError::from_status(status.as_u16(), message).into());
        }

        resp.json::<GenerateContentResponse>()
            .await
            .context("Failed to parse generateContent response")
    }
}

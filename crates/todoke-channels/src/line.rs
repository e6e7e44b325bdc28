//! LINE push delivery via the Messaging API.
//!
//! Two round trips per attempt: exchange the campaign's channel credentials
//! for a transient access token, then push the message. Campaign-level
//! credentials mirror the document store (each campaign owns its LINE
//! channel).

use async_trait::async_trait;
use serde::Deserialize;

use todoke_core::config::LineConfig;
use todoke_core::error::{Result, TodokeError};
use todoke_core::traits::DeliverySender;
use todoke_core::types::{Campaign, DeliveryChannel, Submission};

use crate::template;

/// Bound on each outbound API call.
const API_TIMEOUT_SECS: u64 = 20;

/// Messaging API limit for image message content.
const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// LINE push channel adapter.
pub struct LineSender {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushErrorResponse {
    message: Option<String>,
}

impl LineSender {
    pub fn new(config: LineConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Exchange channel credentials for a short-lived access token.
    async fn exchange_token(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/v2/oauth/accessToken", self.api_base))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .timeout(std::time::Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| TodokeError::Channel(format!("LINE token exchange: {e}")))?;

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| TodokeError::Channel(format!("Invalid LINE token response: {e}")))?;

        body.access_token.ok_or_else(|| {
            TodokeError::Channel(format!(
                "LINE token exchange rejected: {}",
                body.error_description
                    .or(body.error)
                    .unwrap_or_else(|| "unknown error".into())
            ))
        })
    }

    /// Push one or more message objects to a LINE user.
    async fn push_messages(
        &self,
        access_token: &str,
        to: &str,
        messages: Vec<serde_json::Value>,
    ) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/v2/bot/message/push", self.api_base))
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "to": to, "messages": messages }))
            .timeout(std::time::Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| TodokeError::Channel(format!("LINE push: {e}")))?;

        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let detail = resp
            .json::<PushErrorResponse>()
            .await
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_default();
        Err(TodokeError::Channel(format!(
            "LINE push error {status}: {detail}"
        )))
    }

    /// Check whether an image reference can be sent as a LINE image
    /// message: publicly reachable HTTPS, JPEG/PNG, within the size limit.
    /// Any uncertainty means "no" and the message goes text-only.
    async fn image_eligible(&self, url: &str) -> bool {
        if !url.starts_with("https://") {
            return false;
        }
        let resp = match self
            .http
            .head(url)
            .timeout(std::time::Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            _ => return false,
        };
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let content_length = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        probe_eligible(content_type, content_length)
    }
}

/// Pure eligibility check over HEAD probe results.
fn probe_eligible(content_type: Option<&str>, content_length: Option<u64>) -> bool {
    let supported = matches!(
        content_type.map(|ct| ct.split(';').next().unwrap_or(ct).trim()),
        Some("image/jpeg") | Some("image/png")
    );
    supported && content_length.is_some_and(|len| len > 0 && len <= MAX_IMAGE_BYTES)
}

#[async_trait]
impl DeliverySender for LineSender {
    fn channel(&self) -> DeliveryChannel {
        DeliveryChannel::Line
    }

    async fn send(&self, submission: &Submission, campaign: &Campaign) -> Result<()> {
        let user_id = submission
            .form_data
            .line_id()
            .ok_or_else(|| TodokeError::Channel("Submission has no LINE user id".into()))?;

        let (client_id, client_secret) = match (
            campaign.line_channel_id.as_deref().filter(|s| !s.is_empty()),
            campaign
                .line_channel_secret
                .as_deref()
                .filter(|s| !s.is_empty()),
        ) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                return Err(TodokeError::Channel(format!(
                    "Campaign {} has no LINE channel credentials",
                    campaign.id
                )));
            }
        };

        let text = template::render_or_message(campaign.line_message.as_deref(), submission);
        if text.trim().is_empty() {
            return Err(TodokeError::Channel(
                "Submission has no message content".into(),
            ));
        }

        let mut messages = vec![serde_json::json!({ "type": "text", "text": text })];
        if let Some(url) = submission.form_data.image_url() {
            if self.image_eligible(url).await {
                messages.push(serde_json::json!({
                    "type": "image",
                    "originalContentUrl": url,
                    "previewImageUrl": url,
                }));
            } else {
                tracing::warn!(
                    "⚠️ Image not eligible for LINE, sending text-only (submission {})",
                    submission.id
                );
            }
        }

        let token = self.exchange_token(client_id, client_secret).await?;
        self.push_messages(&token, user_id, messages).await?;

        tracing::info!("📤 LINE push sent for submission {}", submission.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_eligibility() {
        assert!(probe_eligible(Some("image/jpeg"), Some(1024)));
        assert!(probe_eligible(Some("image/png; charset=binary"), Some(1024)));
        assert!(!probe_eligible(Some("image/gif"), Some(1024)));
        assert!(!probe_eligible(Some("text/html"), Some(1024)));
        assert!(!probe_eligible(None, Some(1024)));
        // Over the platform limit, or unknown size
        assert!(!probe_eligible(Some("image/png"), Some(MAX_IMAGE_BYTES + 1)));
        assert!(!probe_eligible(Some("image/png"), None));
        assert!(!probe_eligible(Some("image/png"), Some(0)));
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let sender = LineSender::new(LineConfig {
            api_base: "https://api.line.me/".into(),
        });
        assert_eq!(sender.api_base, "https://api.line.me");
    }
}

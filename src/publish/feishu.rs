//! Feishu / Lark custom bot webhook publisher.

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use crate::models::PaperRecord;
use crate::publish::{DeliveryError, MessageStyle, PublishReceipt, Publisher};
use crate::utils::HttpClient;

type HmacSha256 = Hmac<Sha256>;

/// Feishu "frequency limited" business code
const CODE_RATE_LIMITED: i64 = 11232;
/// Signature mismatch, IP not allowed, keyword check failed
const AUTH_CODES: [i64; 3] = [19021, 19022, 19024];

/// Signs webhook payloads for bots that have "signature verification" enabled.
#[derive(Clone)]
pub struct FeishuSigner {
    secret: String,
}

impl std::fmt::Debug for FeishuSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeishuSigner").field("secret", &"***").finish()
    }
}

impl FeishuSigner {
    /// Create a signer for the bot's signing secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// `base64(HMAC-SHA256(key = "{timestamp}\n{secret}", message = ""))`
    pub fn sign(&self, timestamp: i64) -> Result<String, DeliveryError> {
        let string_to_sign = format!("{}\n{}", timestamp, self.secret);
        let mac = HmacSha256::new_from_slice(string_to_sign.as_bytes())
            .map_err(|e| DeliveryError::InvalidMessage(format!("HMAC key rejected: {}", e)))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// Publishes one interactive card per paper to a Feishu custom bot.
#[derive(Debug, Clone)]
pub struct FeishuPublisher {
    client: HttpClient,
    webhook_url: String,
    signer: Option<FeishuSigner>,
    style: MessageStyle,
}

impl FeishuPublisher {
    /// Create a publisher for `webhook_url`
    pub fn new(client: HttpClient, webhook_url: impl Into<String>, style: MessageStyle) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
            signer: None,
            style,
        }
    }

    /// Sign every request with `secret`
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.signer = Some(FeishuSigner::new(secret));
        self
    }

    /// Build the interactive card for a record
    pub fn build_card(&self, record: &PaperRecord) -> Value {
        let mut elements = vec![markdown_block(format!("**Title**\n{}", record.title))];

        if !record.authors.is_empty() {
            elements.push(markdown_block(format!("**Authors**\n{}", record.author_line())));
        }
        if let Some(summary) = self.style.summary(record) {
            elements.push(markdown_block(format!("**Summary**\n{}", summary)));
        }
        elements.push(markdown_block(format!(
            "**Published Time**\n{}",
            self.style.published_time(record)
        )));
        elements.push(json!({
            "tag": "action",
            "actions": [{
                "tag": "button",
                "text": { "content": "View Paper", "tag": "plain_text" },
                "url": record.url,
                "type": "primary"
            }]
        }));

        json!({
            "header": {
                "title": { "content": self.style.heading, "tag": "plain_text" },
                "template": "blue"
            },
            "elements": elements
        })
    }

    /// Full webhook payload, signed when a secret is configured
    pub fn build_payload(&self, record: &PaperRecord, timestamp: i64) -> Result<Value, DeliveryError> {
        let mut payload = json!({
            "msg_type": "interactive",
            "card": self.build_card(record),
        });

        if let Some(signer) = &self.signer {
            payload["timestamp"] = Value::String(timestamp.to_string());
            payload["sign"] = Value::String(signer.sign(timestamp)?);
        }

        Ok(payload)
    }
}

fn markdown_block(content: String) -> Value {
    json!({
        "tag": "div",
        "text": { "content": content, "tag": "lark_md" }
    })
}

/// Map the webhook's JSON answer to success or a delivery error.
///
/// The v2 hook answers `{"code": 0, "msg": "success"}`; older hooks use
/// `StatusCode` / `StatusMessage`.
fn check_response(body: &Value) -> Result<String, DeliveryError> {
    let code = body
        .get("code")
        .or_else(|| body.get("StatusCode"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let message = body
        .get("msg")
        .or_else(|| body.get("StatusMessage"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    match code {
        0 => Ok(message),
        CODE_RATE_LIMITED => Err(DeliveryError::RateLimited(message)),
        c if AUTH_CODES.contains(&c) => Err(DeliveryError::Auth(message)),
        c => Err(DeliveryError::Rejected { code: c, message }),
    }
}

#[async_trait]
impl Publisher for FeishuPublisher {
    fn name(&self) -> &str {
        "feishu"
    }

    async fn publish(&self, record: &PaperRecord) -> Result<PublishReceipt, DeliveryError> {
        let payload = self.build_payload(record, chrono::Utc::now().timestamp())?;

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DeliveryError::RateLimited(format!("HTTP {}", status)));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DeliveryError::Auth(format!("HTTP {}", status)));
        }
        if status.is_server_error() {
            return Err(DeliveryError::Network(format!("HTTP {}: {}", status, text)));
        }
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        // an empty or non-JSON 2xx body is taken as accepted
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let message = check_response(&body)?;

        tracing::debug!("Feishu accepted {}: {}", record.id, message);
        Ok(PublishReceipt::new(&record.id, self.name()).with_detail(message))
    }
}

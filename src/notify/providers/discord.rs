//! Discord webhooks (`discord://token@webhook_id`)

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::post_json;
use crate::notify::sender::{query_param, NotifySender, SendError};

const DISCORD_WEBHOOK_BASE: &str = "https://discord.com/api/webhooks";

/// Discord caps message content at this many characters
const MAX_CONTENT: usize = 2000;

#[derive(Debug)]
pub struct DiscordSender {
    webhook_id: String,
    token: String,
    username: Option<String>,
    avatar: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct DiscordPayload<'a> {
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
}

impl DiscordSender {
    pub fn from_url(url: &Url) -> Result<Self, SendError> {
        let token = url.username();
        if token.is_empty() {
            return Err(SendError::MissingParam("token"));
        }
        let webhook_id = url.host_str().unwrap_or_default();
        if webhook_id.is_empty() {
            return Err(SendError::MissingParam("webhook_id"));
        }

        Ok(Self {
            webhook_id: webhook_id.to_string(),
            token: token.to_string(),
            username: query_param(url, "username"),
            avatar: query_param(url, "avatar"),
            client: reqwest::Client::new(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/{}/{}", DISCORD_WEBHOOK_BASE, self.webhook_id, self.token)
    }

    fn payload(&self, message: &str) -> DiscordPayload<'_> {
        DiscordPayload {
            content: message.chars().take(MAX_CONTENT).collect(),
            username: self.username.as_deref(),
            avatar_url: self.avatar.as_deref(),
        }
    }
}

#[async_trait]
impl NotifySender for DiscordSender {
    fn scheme(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, message: &str) -> Result<(), SendError> {
        post_json(&self.client, "discord", &self.endpoint(), &self.payload(message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_and_payload() {
        let url = Url::parse("discord://AbCdEf@123456789?username=vigil").unwrap();
        let sender = DiscordSender::from_url(&url).unwrap();
        assert_eq!(
            sender.endpoint(),
            "https://discord.com/api/webhooks/123456789/AbCdEf"
        );

        let payload = serde_json::to_value(sender.payload("disk full")).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({"content": "disk full", "username": "vigil"})
        );
    }

    #[test]
    fn test_content_truncated() {
        let url = Url::parse("discord://t@1").unwrap();
        let sender = DiscordSender::from_url(&url).unwrap();
        let long = "x".repeat(MAX_CONTENT + 10);
        assert_eq!(sender.payload(&long).content.len(), MAX_CONTENT);
    }

    #[test]
    fn test_missing_token() {
        let url = Url::parse("discord://123456789").unwrap();
        assert!(matches!(
            DiscordSender::from_url(&url),
            Err(SendError::MissingParam("token"))
        ));
    }
}

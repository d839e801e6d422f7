//! Slack incoming webhooks (`slack://[botname@]hooks/T/B/X`)

use async_trait::async_trait;
use serde::Serialize;
use url::{Position, Url};

use super::post_json;
use crate::notify::sender::{query_param, NotifySender, SendError};

const SLACK_HOOKS_BASE: &str = "https://hooks.slack.com/services";

#[derive(Debug)]
pub struct SlackSender {
    tokens: [String; 3],
    channel: Option<String>,
    username: Option<String>,
    icon: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SlackPayload<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_emoji: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
}

impl SlackSender {
    pub fn from_url(url: &Url) -> Result<Self, SendError> {
        // Slice the serialized URL so the token case survives.
        let raw = &url[Position::BeforeHost..Position::AfterPath];
        let mut parts: Vec<&str> = raw.split('/').filter(|p| !p.is_empty()).collect();
        if parts.first().is_some_and(|p| p.eq_ignore_ascii_case("hooks")) {
            parts.remove(0);
        }

        let tokens: [String; 3] = match parts.as_slice() {
            [a, b, c] => [a.to_string(), b.to_string(), c.to_string()],
            _ => {
                return Err(SendError::InvalidUrl(
                    "slack URL needs three webhook tokens".to_string(),
                ))
            }
        };

        let botname = Some(url.username()).filter(|u| !u.is_empty()).map(str::to_string);

        Ok(Self {
            tokens,
            channel: query_param(url, "channel"),
            username: query_param(url, "username").or(botname),
            icon: query_param(url, "icon"),
            client: reqwest::Client::new(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/{}", SLACK_HOOKS_BASE, self.tokens.join("/"))
    }

    fn payload<'a>(&'a self, message: &'a str) -> SlackPayload<'a> {
        let icon = self.icon.as_deref();
        let is_url = icon.is_some_and(|i| i.starts_with("http://") || i.starts_with("https://"));
        SlackPayload {
            text: message,
            channel: self.channel.as_deref(),
            username: self.username.as_deref(),
            icon_emoji: icon.filter(|_| !is_url),
            icon_url: icon.filter(|_| is_url),
        }
    }
}

#[async_trait]
impl NotifySender for SlackSender {
    fn scheme(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, message: &str) -> Result<(), SendError> {
        post_json(&self.client, "slack", &self.endpoint(), &self.payload(message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(raw: &str) -> Result<SlackSender, SendError> {
        SlackSender::from_url(&Url::parse(raw).unwrap())
    }

    #[test]
    fn test_hooks_prefix_optional() {
        let with = sender("slack://hooks/T000/B000/XXXX").unwrap();
        let without = sender("slack://T000/B000/XXXX").unwrap();
        assert_eq!(with.endpoint(), "https://hooks.slack.com/services/T000/B000/XXXX");
        assert_eq!(with.endpoint(), without.endpoint());
    }

    #[test]
    fn test_params_shape_payload() {
        let s = sender("slack://vigil@hooks/a/b/c?channel=%23ops&icon=:fire:").unwrap();
        let payload = serde_json::to_value(s.payload("down")).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({
                "text": "down",
                "channel": "#ops",
                "username": "vigil",
                "icon_emoji": ":fire:",
            })
        );
    }

    #[test]
    fn test_icon_url() {
        let s = sender("slack://a/b/c?icon=https://example.com/i.png").unwrap();
        let payload = serde_json::to_value(s.payload("x")).unwrap();
        assert_eq!(payload["icon_url"], "https://example.com/i.png");
        assert!(payload.get("icon_emoji").is_none());
    }

    #[test]
    fn test_wrong_token_count() {
        assert!(sender("slack://hooks/a/b").is_err());
        assert!(sender("slack://hooks/a/b/c/d").is_err());
        assert!(sender("slack://hooks").is_err());
        assert!(sender("slack://a/b/c/d/e").is_err());
    }
}

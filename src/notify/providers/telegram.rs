//! Telegram bot API (`telegram://token@telegram?chats=a,b`)

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::{flag, post_json};
use crate::notify::sender::{query_param, NotifySender, SendError};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug)]
pub struct TelegramSender {
    token: String,
    chats: Vec<String>,
    parse_mode: Option<String>,
    silent: bool,
    preview: bool,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_notification: bool,
    disable_web_page_preview: bool,
}

impl TelegramSender {
    pub fn from_url(url: &Url) -> Result<Self, SendError> {
        if !url.host_str().unwrap_or_default().eq_ignore_ascii_case("telegram") {
            return Err(SendError::InvalidUrl(
                "telegram URL host must be \"telegram\"".to_string(),
            ));
        }

        // Bot tokens look like `123456:ABC-DEF`, which splits into user and password.
        let token = match (url.username(), url.password()) {
            ("", _) => return Err(SendError::MissingParam("token")),
            (user, Some(pass)) => format!("{}:{}", user, pass),
            (user, None) => user.to_string(),
        };

        let chats: Vec<String> = query_param(url, "chats")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if chats.is_empty() {
            return Err(SendError::MissingParam("chats"));
        }

        Ok(Self {
            token,
            chats,
            parse_mode: query_param(url, "parsemode"),
            silent: flag(query_param(url, "notification")).map(|n| !n).unwrap_or(false),
            preview: flag(query_param(url, "preview")).unwrap_or(true),
            client: reqwest::Client::new(),
        })
    }

    pub fn chats(&self) -> &[String] {
        &self.chats
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.token)
    }

    fn payload<'a>(&'a self, chat_id: &'a str, message: &'a str) -> SendMessage<'a> {
        SendMessage {
            chat_id,
            text: message,
            parse_mode: self.parse_mode.as_deref(),
            disable_notification: self.silent,
            disable_web_page_preview: !self.preview,
        }
    }
}

#[async_trait]
impl NotifySender for TelegramSender {
    fn scheme(&self) -> &'static str {
        "telegram"
    }

    /// Sends to every chat; failures are collected rather than stopping early.
    async fn send(&self, message: &str) -> Result<(), SendError> {
        let endpoint = self.endpoint();
        let mut errors = Vec::new();

        for chat in &self.chats {
            if let Err(e) = post_json(&self.client, "telegram", &endpoint, &self.payload(chat, message)).await {
                tracing::debug!(chat = %chat, error = %e, "telegram delivery failed");
                errors.push(e);
            }
        }

        SendError::from_many(errors)
    }
}

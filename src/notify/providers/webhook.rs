//! Generic JSON webhook (`generic+https://host/path`)

use async_trait::async_trait;
use url::{Position, Url};

use super::post_json;
use crate::notify::sender::{query_param, NotifySender, SendError};

/// Query keys consumed by the sender rather than forwarded
const RESERVED: &[&str] = &["title"];

/// Posts `{message, timestamp, title?}` to an HTTP endpoint
#[derive(Debug)]
pub struct WebhookSender {
    endpoint: Url,
    title: Option<String>,
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn from_url(url: &Url) -> Result<Self, SendError> {
        let transport = url
            .scheme()
            .strip_prefix("generic+")
            .ok_or_else(|| SendError::InvalidUrl(format!("unexpected scheme {}", url.scheme())))?;

        if url.host_str().unwrap_or_default().is_empty() {
            return Err(SendError::InvalidUrl("webhook URL has no host".to_string()));
        }
        let mut endpoint = Url::parse(&format!("{}{}", transport, &url[Position::AfterScheme..]))
            .map_err(|e| SendError::InvalidUrl(e.to_string()))?;

        let forwarded: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !RESERVED.contains(&k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        endpoint.set_query(None);
        if !forwarded.is_empty() {
            endpoint.query_pairs_mut().extend_pairs(forwarded);
        }

        Ok(Self {
            endpoint,
            title: query_param(url, "title"),
            client: reqwest::Client::new(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn payload(&self, message: &str) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(title) = &self.title {
            payload["title"] = serde_json::Value::String(title.clone());
        }
        payload
    }
}

#[async_trait]
impl NotifySender for WebhookSender {
    fn scheme(&self) -> &'static str {
        "generic"
    }

    async fn send(&self, message: &str) -> Result<(), SendError> {
        post_json(&self.client, "webhook", self.endpoint.as_str(), &self.payload(message)).await
    }
}

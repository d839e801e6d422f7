use async_trait::async_trait;
use url::Url;

use crate::notify::sender::{NotifySender, SendError};

/// Writes notifications to the log instead of delivering them
#[derive(Debug, Default)]
pub struct LoggerSender;

impl LoggerSender {
    pub fn from_url(_url: &Url) -> Result<Self, SendError> {
        Ok(Self)
    }
}

#[async_trait]
impl NotifySender for LoggerSender {
    fn scheme(&self) -> &'static str {
        "logger"
    }

    async fn send(&self, message: &str) -> Result<(), SendError> {
        tracing::warn!(provider = "logger", "Alert triggered: {}", message);
        Ok(())
    }
}

//! Built-in notification providers

mod discord;
mod logger;
mod slack;
mod telegram;
mod webhook;

pub use discord::DiscordSender;
pub use logger::LoggerSender;
pub use slack::SlackSender;
pub use telegram::TelegramSender;
pub use webhook::WebhookSender;

use serde::Serialize;

use super::sender::{NotifySender, SendError, SenderRegistry};

/// Register every built-in provider
pub fn register_defaults(registry: &mut SenderRegistry) {
    registry.register("logger", |url| boxed(LoggerSender::from_url(url)));
    registry.register("generic+https", |url| boxed(WebhookSender::from_url(url)));
    registry.register("generic+http", |url| boxed(WebhookSender::from_url(url)));
    registry.register("slack", |url| boxed(SlackSender::from_url(url)));
    registry.register("discord", |url| boxed(DiscordSender::from_url(url)));
    registry.register("telegram", |url| boxed(TelegramSender::from_url(url)));
}

fn boxed<S: NotifySender + 'static>(sender: Result<S, SendError>) -> Result<Box<dyn NotifySender>, SendError> {
    sender.map(|s| Box::new(s) as Box<dyn NotifySender>)
}

/// POST a JSON payload and require a 2xx answer
async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    provider: &'static str,
    endpoint: &str,
    payload: &T,
) -> Result<(), SendError> {
    let response = client.post(endpoint).json(payload).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(provider, status = %status, body = %body, "notification request failed");
        return Err(SendError::Transport(format!("{} returned status {}", provider, status)));
    }

    tracing::debug!(provider, "notification sent");
    Ok(())
}

/// Interpret a yes/no style query flag
fn flag(value: Option<String>) -> Option<bool> {
    match value?.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" | "on" => Some(true),
        "no" | "false" | "0" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schemes() {
        let registry = SenderRegistry::with_defaults();
        assert_eq!(
            registry.schemes(),
            vec!["discord", "generic+http", "generic+https", "logger", "slack", "telegram"]
        );
    }

    #[test]
    fn test_flag() {
        assert_eq!(flag(Some("Yes".into())), Some(true));
        assert_eq!(flag(Some("no".into())), Some(false));
        assert_eq!(flag(Some("maybe".into())), None);
        assert_eq!(flag(None), None);
    }
}

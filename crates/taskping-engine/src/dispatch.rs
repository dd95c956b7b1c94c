//! Notification delivery — best-effort push of a persisted notification to an
//! external channel. The notification row in the store is the durable record;
//! everything here is fire-and-forget, failures logged and swallowed upstream.

use async_trait::async_trait;
use taskping_core::config::TelegramConfig;
use taskping_core::error::{Result, TaskPingError};

/// Where fired notifications get pushed. Implementations must isolate their
/// own failures into `Err` — never panic, never block beyond their timeout.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, user_id: &str, task_id: &str, message: &str) -> Result<()>;
}

/// Telegram Bot API sink — `sendMessage` to a fixed chat.
/// TaskPing instances are single-user, so the chat id comes from config.
pub struct TelegramSink {
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramSink {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn deliver(&self, _user_id: &str, task_id: &str, message: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": escape_markdown(message),
                "parse_mode": "Markdown",
            }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| TaskPingError::Channel(format!("Telegram send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("✅ Telegram notification sent for task {task_id}");
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(TaskPingError::Channel(format!(
                "Telegram API error {status}: {body}"
            )))
        }
    }
}

/// Sink for deployments with no channel configured. The notification record
/// in the store is still written; there is just nowhere to push it.
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn deliver(&self, _user_id: &str, task_id: &str, _message: &str) -> Result<()> {
        tracing::debug!("📪 No delivery channel configured, task {task_id} notification stored only");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for Box<dyn NotificationSink> {
    async fn deliver(&self, user_id: &str, task_id: &str, message: &str) -> Result<()> {
        (**self).deliver(user_id, task_id, message).await
    }
}

/// Escape Telegram MarkdownV1 special characters.
fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(
            escape_markdown("Reminder: Task \"demo\" - before_1h"),
            "Reminder: Task \"demo\" - before\\_1h"
        );
        assert_eq!(escape_markdown("a*b[c]`d"), "a\\*b\\[c]\\`d");
    }

    #[tokio::test]
    async fn test_null_sink_always_ok() {
        let sink = NullSink;
        assert!(sink.deliver("u1", "t1", "hello").await.is_ok());
    }
}

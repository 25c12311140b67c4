// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Telegram bot notifications over plain HTTPS form posts.

use std::time::Duration;

use super::{AlertEvent, AlertTransport};

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    agent: ureq::Agent,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str, timeout: Duration) -> Self {
        Self::with_api_base(TELEGRAM_API, bot_token, chat_id, timeout)
    }

    /// Point at a different Bot API host (self-hosted bot API server, proxies).
    pub fn with_api_base(api_base: &str, bot_token: &str, chat_id: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            url: format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                bot_token
            ),
            chat_id: chat_id.to_string(),
        }
    }
}

impl AlertTransport for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    fn deliver(&self, event: &AlertEvent) -> anyhow::Result<()> {
        self.agent
            .post(&self.url)
            .send_form(&[("chat_id", self.chat_id.as_str()), ("text", event.message.as_str())])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertCategory;

    #[test]
    fn test_send_message_url() {
        let n = TelegramNotifier::with_api_base(
            "http://127.0.0.1:9/",
            "123:abc",
            "42",
            Duration::from_millis(200),
        );
        assert_eq!(n.url, "http://127.0.0.1:9/bot123:abc/sendMessage");
    }

    #[test]
    fn test_unreachable_host_returns_error() {
        // port 9 (discard) is closed on test machines; the call must fail fast, not hang
        let n = TelegramNotifier::with_api_base(
            "http://127.0.0.1:9",
            "t",
            "c",
            Duration::from_millis(500),
        );
        assert!(n
            .deliver(&AlertEvent::new(AlertCategory::System, "ping"))
            .is_err());
    }
}

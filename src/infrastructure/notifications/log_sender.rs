//! Default `NotificationSender`: logs the subject/body at `warn` level
//! instead of dialing out over SMTP. The notification service is a
//! black-box collaborator per the contract; this is the adapter used when
//! no outbound mail transport is configured, and is swapped for a real SMTP
//! client by substituting a different `NotificationSender` impl.

use async_trait::async_trait;
use tracing::warn;

use crate::config::NotificationEnvConfig;
use crate::domain::ports::NotificationSender;

pub struct LogNotificationSender {
    recipient: String,
}

impl LogNotificationSender {
    pub fn new(config: &NotificationEnvConfig) -> Self {
        Self { recipient: config.recipient.clone() }
    }
}

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        warn!(recipient = %self.recipient, subject, body, "notification dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_never_fails() {
        let sender = LogNotificationSender::new(&NotificationEnvConfig {
            recipient: "ops@example.com".into(),
            ..Default::default()
        });
        sender.send("subject", "body").await.unwrap();
    }
}

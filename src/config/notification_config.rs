//! Notification configuration parsing from environment variables.

use std::env;

#[derive(Debug, Clone, Default)]
pub struct NotificationEnvConfig {
    pub recipient: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub rate_limit_per_hour: usize,
}

impl NotificationEnvConfig {
    pub fn from_env() -> Self {
        Self {
            recipient: env::var("NOTIFICATION_RECIPIENT").unwrap_or_default(),
            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: env::var("SMTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(587),
            smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            rate_limit_per_hour: env::var("NOTIFICATION_RATE_LIMIT_PER_HOUR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_config_defaults() {
        let config = NotificationEnvConfig::from_env();
        assert_eq!(config.smtp_port, 587);
        assert_eq!(config.rate_limit_per_hour, 10);
    }
}

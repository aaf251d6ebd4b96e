use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

use crate::domain::services::code_issuer::DEFAULT_MAX_CODE_ATTEMPTS;
use crate::domain::services::customer_stats::DEFAULT_ELIGIBLE_MIN_ORDERS;
use crate::domain::services::promo_sweep::DEFAULT_SWEEP_BATCH_SIZE;
use crate::domain::value_objects::reward_percentage::RewardPercentage;
use crate::infrastructure::mail_relay::MailRelayConfig;

/// Settings of the referral program
#[derive(Debug, Clone)]
pub struct ReferralConfig {
    pub reward_percentage: f64,       // Default reward share for new referrals, in percent
    pub code_max_attempts: u32,       // Candidates drawn before giving up on a unique code
    pub eligible_min_orders: i64,     // Completed orders needed to receive the referral email
    pub sweep_enabled: bool,          // Run the referral email sweep in the background
    pub sweep_batch_size: i64,        // Customers mailed per sweep run
    pub sweep_interval_seconds: u64,  // Delay between sweep runs
    pub mail_relay_url: Option<Url>,  // Mail relay endpoint, disabled when unset
    pub mail_subject: String,
    pub mail_template: String,
    pub mail_timeout_milliseconds: u64,
    pub listen_addr: SocketAddr,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        ReferralConfig {
            reward_percentage: RewardPercentage::DEFAULT,
            code_max_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
            eligible_min_orders: DEFAULT_ELIGIBLE_MIN_ORDERS,
            sweep_enabled: true,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            sweep_interval_seconds: 86_400, // Once a day
            mail_relay_url: None,
            mail_subject: "Your referral code".to_string(),
            mail_template: "referral_code".to_string(),
            mail_timeout_milliseconds: 10_000,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

impl ReferralConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ReferralConfig {
        let mut config = ReferralConfig::default();

        if let Ok(percentage) = std::env::var("REFERRAL_REWARD_PERCENTAGE") {
            match percentage.parse::<f64>().map(RewardPercentage::new) {
                Ok(Ok(value)) => config.reward_percentage = value.value(),
                Ok(Err(e)) => {
                    tracing::warn!(
                        "Invalid REFERRAL_REWARD_PERCENTAGE value: {} ({}), using default: {}",
                        percentage,
                        e,
                        config.reward_percentage
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse REFERRAL_REWARD_PERCENTAGE '{}': {}, using default: {}",
                        percentage,
                        e,
                        config.reward_percentage
                    );
                }
            }
        }

        if let Ok(attempts) = std::env::var("REFERRAL_CODE_MAX_ATTEMPTS") {
            if let Ok(value) = attempts.parse::<u32>() {
                if (1..=1000).contains(&value) {
                    config.code_max_attempts = value;
                }
            }
        }

        if let Ok(min_orders) = std::env::var("REFERRAL_ELIGIBLE_MIN_ORDERS") {
            if let Ok(value) = min_orders.parse::<i64>() {
                if value >= 0 {
                    config.eligible_min_orders = value;
                }
            }
        }

        if let Ok(enabled) = std::env::var("REFERRAL_SWEEP_ENABLED") {
            config.sweep_enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }

        if let Ok(batch) = std::env::var("REFERRAL_SWEEP_BATCH_SIZE") {
            if let Ok(value) = batch.parse::<i64>() {
                if (1..=10_000).contains(&value) {
                    config.sweep_batch_size = value;
                }
            }
        }

        if let Ok(interval) = std::env::var("REFERRAL_SWEEP_INTERVAL_SECONDS") {
            if let Ok(value) = interval.parse::<u64>() {
                if (60..=604_800).contains(&value) {
                    config.sweep_interval_seconds = value;
                }
            }
        }

        if let Ok(relay) = std::env::var("REFERRAL_MAIL_RELAY_URL") {
            match Url::parse(&relay) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                    config.mail_relay_url = Some(url);
                }
                Ok(url) => {
                    tracing::warn!(
                        "Unsupported REFERRAL_MAIL_RELAY_URL scheme '{}', referral emails disabled",
                        url.scheme()
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse REFERRAL_MAIL_RELAY_URL '{}': {}, referral emails disabled",
                        relay,
                        e
                    );
                }
            }
        }

        if let Ok(subject) = std::env::var("REFERRAL_MAIL_SUBJECT") {
            if !subject.trim().is_empty() {
                config.mail_subject = subject;
            }
        }

        if let Ok(template) = std::env::var("REFERRAL_MAIL_TEMPLATE") {
            if !template.trim().is_empty() {
                config.mail_template = template;
            }
        }

        if let Ok(timeout) = std::env::var("REFERRAL_MAIL_TIMEOUT_MILLISECONDS") {
            if let Ok(value) = timeout.parse::<u64>() {
                if (100..=120_000).contains(&value) {
                    config.mail_timeout_milliseconds = value;
                }
            }
        }

        if let Ok(addr) = std::env::var("REFERRAL_LISTEN_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(value) => config.listen_addr = value,
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse REFERRAL_LISTEN_ADDR '{}': {}, using default: {}",
                        addr,
                        e,
                        config.listen_addr
                    );
                }
            }
        }

        config
    }

    /// Relay settings, when a relay is configured
    pub fn mail_relay(&self) -> Option<MailRelayConfig> {
        self.mail_relay_url.clone().map(|endpoint| MailRelayConfig {
            endpoint,
            subject: self.mail_subject.clone(),
            template: self.mail_template.clone(),
            timeout: Duration::from_millis(self.mail_timeout_milliseconds),
        })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

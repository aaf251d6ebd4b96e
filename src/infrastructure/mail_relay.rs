//! Referral email delivery through an HTTP mail relay
//!
//! The relay receives a JSON message naming the template to render and the
//! values to render it with; the QR image travels as a base64 PNG attachment.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::domain::entities::customer::Customer;
use crate::domain::repositories::{MailError, ReferralMailer};

const QR_ATTACHMENT_NAME: &str = "referral-qr.png";

#[derive(Debug, Clone)]
pub struct MailRelayConfig {
    pub endpoint: Url,
    pub subject: String,
    pub template: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content_base64: String,
}

/// Message posted to the relay
#[derive(Debug, Serialize)]
pub struct ReferralMessage {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub customer_name: String,
    pub referral_code: String,
    pub attachments: Vec<MailAttachment>,
}

impl ReferralMessage {
    pub fn for_customer(customer: &Customer, config: &MailRelayConfig) -> Result<Self, MailError> {
        let to = customer
            .email
            .as_deref()
            .filter(|email| !email.is_empty())
            .ok_or(MailError::MissingRecipient(customer.id))?;
        let referral_code = customer
            .referral_code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or(MailError::MissingReferralCode(customer.id))?;

        let attachments = customer
            .referral_qr_image
            .as_ref()
            .filter(|png| !png.is_empty())
            .map(|png| MailAttachment {
                filename: QR_ATTACHMENT_NAME.to_string(),
                content_type: "image/png".to_string(),
                content_base64: general_purpose::STANDARD.encode(png),
            })
            .into_iter()
            .collect();

        Ok(Self {
            to: to.to_string(),
            subject: config.subject.clone(),
            template: config.template.clone(),
            customer_name: customer.name.clone(),
            referral_code: referral_code.to_string(),
            attachments,
        })
    }
}

pub struct HttpMailer {
    client: Client,
    config: MailRelayConfig,
}

impl HttpMailer {
    pub fn new(config: MailRelayConfig) -> Result<Self, MailError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MailError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ReferralMailer for HttpMailer {
    async fn send_referral_code(&self, customer: &Customer) -> Result<(), MailError> {
        let message = ReferralMessage::for_customer(customer, &self.config)?;
        debug!("Posting referral email for customer {} to relay", customer.id);

        let response = self
            .client
            .post(self.config.endpoint.clone())
            .json(&message)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected { status, body });
        }

        info!("Referral email queued for customer {}", customer.id);
        Ok(())
    }
}

/// Stand-in used when no relay is configured
#[derive(Debug, Clone, Default)]
pub struct DisabledMailer;

#[async_trait]
impl ReferralMailer for DisabledMailer {
    async fn send_referral_code(&self, customer: &Customer) -> Result<(), MailError> {
        debug!("Mail relay not configured, skipping customer {}", customer.id);
        Err(MailError::NotConfigured)
    }
}

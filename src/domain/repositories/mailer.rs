use async_trait::async_trait;

use crate::domain::entities::customer::Customer;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MailError {
    #[error("Mail delivery is not configured")]
    NotConfigured,

    #[error("Customer {0} has no email address")]
    MissingRecipient(i64),

    #[error("Customer {0} has no referral code to send")]
    MissingReferralCode(i64),

    #[error("Mail transport error: {0}")]
    Transport(String),

    #[error("Mail relay rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Sends the referral email carrying a customer's code and QR image
#[async_trait]
pub trait ReferralMailer: Send + Sync {
    async fn send_referral_code(&self, customer: &Customer) -> Result<(), MailError>;
}

use thiserror::Error;

use crate::domain::entities::tracking::TrackingState;
use crate::domain::repositories::mailer::MailError;
use crate::domain::repositories::RepositoryError;

/// Errors surfaced by the referral services
#[derive(Debug, Error)]
pub enum ReferralError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Cannot {action} referral {reference} in state {from}")]
    InvalidTransition {
        reference: String,
        from: TrackingState,
        action: &'static str,
    },

    #[error("Referral already tracked for sponsor {sponsor_id} and referred {referred_id}")]
    AlreadyTracked { sponsor_id: i64, referred_id: i64 },

    #[error("A customer cannot refer themselves (customer {customer_id})")]
    SelfReferral { customer_id: i64 },

    #[error("No unique referral code found after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),
}

impl ReferralError {
    /// Whether the error is a user-facing validation failure rather than an infrastructure fault
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReferralError::InvalidTransition { .. }
                | ReferralError::AlreadyTracked { .. }
                | ReferralError::SelfReferral { .. }
                | ReferralError::InvalidInput(_)
        )
    }
}

//! Database Models
//!
//! Row shapes of the referral tables and their conversion into domain entities.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::entities::customer::Customer;
use crate::domain::entities::order::PosOrder;
use crate::domain::entities::tracking::ReferralTracking;
use crate::domain::repositories::RepositoryError;

/// Customer record in database
#[derive(Debug, Clone, FromRow)]
pub struct CustomerRecord {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub customer_rank: i64,
    pub referral_code: Option<String>,
    pub referral_qr_image: Option<Vec<u8>>,
    pub referred_by_id: Option<i64>,
    pub referral_email_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl From<CustomerRecord> for Customer {
    fn from(record: CustomerRecord) -> Self {
        Customer {
            id: record.id,
            name: record.name,
            email: record.email,
            customer_rank: record.customer_rank,
            referral_code: record.referral_code,
            referral_qr_image: record.referral_qr_image,
            referred_by_id: record.referred_by_id,
            referral_email_sent: record.referral_email_sent,
            created_at: record.created_at,
        }
    }
}

/// POS order record in database
#[derive(Debug, Clone, FromRow)]
pub struct OrderRecord {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub state: String, // "draft", "paid", "done", "invoiced" or "cancelled"
    pub amount_total: f64,
    pub currency: String,
    pub date_order: DateTime<Utc>,
    pub referral_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<OrderRecord> for PosOrder {
    type Error = RepositoryError;

    fn try_from(record: OrderRecord) -> Result<Self, Self::Error> {
        Ok(PosOrder {
            id: record.id,
            customer_id: record.customer_id,
            state: record.state.parse().map_err(RepositoryError::Decode)?,
            amount_total: record.amount_total,
            currency: record.currency,
            date_order: record.date_order,
            referral_code: record.referral_code,
        })
    }
}

/// Referral tracking record in database
#[derive(Debug, Clone, FromRow)]
pub struct TrackingRecord {
    pub id: i64,
    pub name: String,
    pub sponsor_id: i64,
    pub referred_id: i64,
    pub referral_code_used: String,
    pub pos_order_id: Option<i64>,
    pub order_date: Option<DateTime<Utc>>,
    pub order_amount: f64,
    pub currency: Option<String>,
    pub state: String, // "pending", "validated", "rewarded" or "cancelled"
    pub reward_percentage: f64,
    pub reward_amount: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TrackingRecord> for ReferralTracking {
    type Error = RepositoryError;

    fn try_from(record: TrackingRecord) -> Result<Self, Self::Error> {
        Ok(ReferralTracking {
            id: record.id,
            name: record.name,
            sponsor_id: record.sponsor_id,
            referred_id: record.referred_id,
            code_used: record.referral_code_used,
            source_order_id: record.pos_order_id,
            order_date: record.order_date,
            order_amount: record.order_amount,
            currency: record.currency,
            state: record.state.parse().map_err(RepositoryError::Decode)?,
            reward_percentage: record.reward_percentage,
            reward_amount: record.reward_amount,
            notes: record.notes,
            created_at: record.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::tracking::TrackingState;

    fn tracking_record(state: &str) -> TrackingRecord {
        TrackingRecord {
            id: 3,
            name: "RT/00003".to_string(),
            sponsor_id: 1,
            referred_id: 2,
            referral_code_used: "REF-ALICE-1234".to_string(),
            pos_order_id: None,
            order_date: None,
            order_amount: 0.0,
            currency: None,
            state: state.to_string(),
            reward_percentage: 10.0,
            reward_amount: 0.0,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_tracking_record_conversion() {
        let tracking = ReferralTracking::try_from(tracking_record("validated")).unwrap();
        assert_eq!(tracking.state, TrackingState::Validated);
        assert_eq!(tracking.code_used, "REF-ALICE-1234");
    }

    #[test]
    fn test_unknown_state_is_a_decode_error() {
        let err = ReferralTracking::try_from(tracking_record("archived")).unwrap_err();
        assert!(matches!(err, RepositoryError::Decode(_)));
    }
}

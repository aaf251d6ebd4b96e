//! Derived referral figures for a customer

use serde::Serialize;
use std::sync::Arc;

use crate::domain::entities::tracking::{ReferralTracking, TrackingState};
use crate::domain::errors::ReferralError;
use crate::domain::repositories::{OrderRepository, TrackingRepository};

/// Completed purchases needed before a customer receives referral promotions
pub const DEFAULT_ELIGIBLE_MIN_ORDERS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerReferralSummary {
    pub customer_id: i64,
    /// Referrals in the validated state
    pub referral_count: i64,
    /// Sum of rewards over rewarded referrals
    pub reward_total: f64,
    pub is_eligible: bool,
}

pub struct CustomerReferralStats {
    trackings: Arc<dyn TrackingRepository>,
    orders: Arc<dyn OrderRepository>,
    eligible_min_orders: i64,
}

impl CustomerReferralStats {
    pub fn new(
        trackings: Arc<dyn TrackingRepository>,
        orders: Arc<dyn OrderRepository>,
        eligible_min_orders: i64,
    ) -> Self {
        Self {
            trackings,
            orders,
            eligible_min_orders,
        }
    }

    pub async fn referral_count(&self, customer_id: i64) -> Result<i64, ReferralError> {
        Ok(self
            .trackings
            .count_by_sponsor(customer_id, TrackingState::Validated)
            .await?)
    }

    pub async fn reward_total(&self, customer_id: i64) -> Result<f64, ReferralError> {
        Ok(self
            .trackings
            .sum_reward_by_sponsor(customer_id, TrackingState::Rewarded)
            .await?)
    }

    pub async fn is_eligible(&self, customer_id: i64) -> Result<bool, ReferralError> {
        let finalized = self.orders.count_finalized_for_customer(customer_id).await?;
        Ok(finalized >= self.eligible_min_orders)
    }

    /// The sponsor's referrals, newest first
    pub async fn referrals_of(&self, sponsor_id: i64) -> Result<Vec<ReferralTracking>, ReferralError> {
        Ok(self.trackings.list_by_sponsor(sponsor_id).await?)
    }

    pub async fn summary(&self, customer_id: i64) -> Result<CustomerReferralSummary, ReferralError> {
        Ok(CustomerReferralSummary {
            customer_id,
            referral_count: self.referral_count(customer_id).await?,
            reward_total: self.reward_total(customer_id).await?,
            is_eligible: self.is_eligible(customer_id).await?,
        })
    }
}

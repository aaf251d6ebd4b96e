//! Staff actions on referral tracking entries and reward computation

use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::entities::tracking::{NewTracking, OrderSnapshot, ReferralTracking, TrackingState};
use crate::domain::errors::ReferralError;
use crate::domain::repositories::{CustomerRepository, OrderRepository, TrackingRepository};
use crate::domain::value_objects::reward_percentage::RewardPercentage;

/// Staff-entered referral, created in the pending state
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ManualTracking {
    pub sponsor_id: i64,
    pub referred_id: i64,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub reward_percentage: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub struct TrackingLifecycle {
    trackings: Arc<dyn TrackingRepository>,
    customers: Arc<dyn CustomerRepository>,
    orders: Arc<dyn OrderRepository>,
    default_reward_percentage: f64,
}

impl TrackingLifecycle {
    pub fn new(
        trackings: Arc<dyn TrackingRepository>,
        customers: Arc<dyn CustomerRepository>,
        orders: Arc<dyn OrderRepository>,
        default_reward_percentage: f64,
    ) -> Self {
        Self {
            trackings,
            customers,
            orders,
            default_reward_percentage,
        }
    }

    pub async fn get(&self, id: i64) -> Result<ReferralTracking, ReferralError> {
        self.trackings
            .get(id)
            .await?
            .ok_or(ReferralError::NotFound { entity: "referral", id })
    }

    /// pending -> validated
    pub async fn validate(&self, id: i64) -> Result<ReferralTracking, ReferralError> {
        let mut tracking = self.get(id).await?;
        if tracking.validate()? {
            self.trackings.update(&tracking).await?;
            info!("Referral {} validated", tracking.name);
        }
        Ok(tracking)
    }

    /// validated -> rewarded, recording the amount owed to the sponsor.
    ///
    /// Issuing the actual coupon or credit is left to the caller.
    pub async fn reward(&self, id: i64) -> Result<ReferralTracking, ReferralError> {
        let mut tracking = self.get(id).await?;
        let amount = tracking.reward()?;

        let sponsor_name = match self.customers.get(tracking.sponsor_id).await? {
            Some(sponsor) => sponsor.name,
            None => format!("#{}", tracking.sponsor_id),
        };
        let note = tracking.reward_note(&sponsor_name);
        tracking.append_note(&note);

        self.trackings.update(&tracking).await?;
        info!("Referral {} rewarded: {:.2} owed to {}", tracking.name, amount, sponsor_name);
        Ok(tracking)
    }

    /// pending/validated -> cancelled
    pub async fn cancel(&self, id: i64) -> Result<ReferralTracking, ReferralError> {
        let mut tracking = self.get(id).await?;
        if tracking.cancel()? {
            self.trackings.update(&tracking).await?;
            info!("Referral {} cancelled", tracking.name);
        }
        Ok(tracking)
    }

    pub async fn set_reward_percentage(
        &self,
        id: i64,
        percentage: f64,
    ) -> Result<ReferralTracking, ReferralError> {
        let mut tracking = self.get(id).await?;
        tracking.set_reward_percentage(percentage)?;
        self.trackings.update(&tracking).await?;
        debug!("Referral {} reward percentage set to {}", tracking.name, percentage);
        Ok(tracking)
    }

    /// Re-read the source order and recompute the reward from it
    pub async fn refresh_order_snapshot(&self, id: i64) -> Result<ReferralTracking, ReferralError> {
        let mut tracking = self.get(id).await?;
        let order_id = match tracking.source_order_id {
            Some(order_id) => order_id,
            None => return Ok(tracking),
        };

        let order = match self.orders.get(order_id).await? {
            Some(order) => order,
            None => return Ok(tracking),
        };

        tracking.apply_order_snapshot(&OrderSnapshot {
            order_id: order.id,
            order_date: order.date_order,
            amount: order.amount_total,
            currency: order.currency,
        });
        self.trackings.update(&tracking).await?;
        debug!("Referral {} snapshot refreshed from order {}", tracking.name, order_id);
        Ok(tracking)
    }

    /// Refresh every entry sourced from `order_id`
    pub async fn refresh_for_order(&self, order_id: i64) -> Result<Vec<ReferralTracking>, ReferralError> {
        let mut refreshed = Vec::new();
        for tracking in self.trackings.list_by_order(order_id).await? {
            refreshed.push(self.refresh_order_snapshot(tracking.id).await?);
        }
        Ok(refreshed)
    }

    /// Create a pending entry on behalf of staff
    pub async fn create_manual(&self, manual: ManualTracking) -> Result<ReferralTracking, ReferralError> {
        if manual.sponsor_id == manual.referred_id {
            return Err(ReferralError::SelfReferral {
                customer_id: manual.sponsor_id,
            });
        }

        let sponsor = self
            .customers
            .get(manual.sponsor_id)
            .await?
            .ok_or(ReferralError::NotFound {
                entity: "customer",
                id: manual.sponsor_id,
            })?;
        if self.customers.get(manual.referred_id).await?.is_none() {
            return Err(ReferralError::NotFound {
                entity: "customer",
                id: manual.referred_id,
            });
        }

        let code_used = sponsor.referral_code.clone().ok_or_else(|| {
            ReferralError::InvalidInput(format!("Customer {} has no referral code", sponsor.id))
        })?;

        let reward_percentage = RewardPercentage::new(
            manual.reward_percentage.unwrap_or(self.default_reward_percentage),
        )
        .map_err(ReferralError::InvalidInput)?;

        let order = match manual.order_id {
            Some(order_id) => {
                let order = self
                    .orders
                    .get(order_id)
                    .await?
                    .ok_or(ReferralError::NotFound { entity: "order", id: order_id })?;
                Some(OrderSnapshot {
                    order_id: order.id,
                    order_date: order.date_order,
                    amount: order.amount_total,
                    currency: order.currency,
                })
            }
            None => None,
        };

        let already_tracked = ReferralError::AlreadyTracked {
            sponsor_id: manual.sponsor_id,
            referred_id: manual.referred_id,
        };
        if self.trackings.exists_for_pair(manual.sponsor_id, manual.referred_id).await? {
            return Err(already_tracked);
        }

        let tracking = self
            .trackings
            .create(NewTracking {
                sponsor_id: manual.sponsor_id,
                referred_id: manual.referred_id,
                code_used,
                order,
                state: TrackingState::Pending,
                reward_percentage: reward_percentage.value(),
                notes: manual.notes,
            })
            .await?
            .ok_or(already_tracked)?;

        info!("Referral {} created manually", tracking.name);
        Ok(tracking)
    }
}

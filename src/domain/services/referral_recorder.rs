//! Referral recorder - turns a finalized order carrying a referral code into a
//! sponsor/referred tracking entry

use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::entities::order::PosOrder;
use crate::domain::entities::tracking::{NewTracking, OrderSnapshot, ReferralTracking, TrackingState};
use crate::domain::errors::ReferralError;
use crate::domain::repositories::{CustomerRepository, TrackingRepository};

/// What a call to [`ReferralRecorder::on_order_finalized`] did
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Recorded(ReferralTracking),
    /// Order carries no referral code or is not in a paid state
    NoCode,
    /// No customer owns the entered code
    UnknownCode,
    /// Order is not linked to a customer
    NoCustomer,
    SelfReferral,
    AlreadyTracked,
}

impl RecordOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded(_))
    }
}

pub struct ReferralRecorder {
    customers: Arc<dyn CustomerRepository>,
    trackings: Arc<dyn TrackingRepository>,
    reward_percentage: f64,
}

impl ReferralRecorder {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        trackings: Arc<dyn TrackingRepository>,
        reward_percentage: f64,
    ) -> Self {
        Self {
            customers,
            trackings,
            reward_percentage,
        }
    }

    /// Record the referral carried by a paid order.
    ///
    /// Safe to call any number of times for the same order: the pair check and
    /// the storage-level unique pair both turn repeats into `AlreadyTracked`.
    /// The entry and the referred customer's sponsor link are written together;
    /// an already tracked pair whose referred customer has no sponsor gets one.
    /// Unknown codes and self-referrals are ignored, not reported as errors.
    pub async fn on_order_finalized(&self, order: &PosOrder) -> Result<RecordOutcome, ReferralError> {
        let code = match order.entered_referral_code() {
            Some(code) if order.state.is_finalized() => code,
            _ => return Ok(RecordOutcome::NoCode),
        };

        let sponsor = match self.customers.find_by_referral_code(code).await? {
            Some(sponsor) => sponsor,
            None => {
                debug!("Order {} carries unknown referral code {}", order.id, code);
                return Ok(RecordOutcome::UnknownCode);
            }
        };

        let referred_id = match order.customer_id {
            Some(id) => id,
            None => {
                debug!("Order {} has referral code {} but no customer", order.id, code);
                return Ok(RecordOutcome::NoCustomer);
            }
        };

        if sponsor.id == referred_id {
            debug!("Ignoring self-referral of customer {} on order {}", referred_id, order.id);
            return Ok(RecordOutcome::SelfReferral);
        }

        if self.trackings.exists_for_pair(sponsor.id, referred_id).await? {
            debug!(
                "Referral {} -> {} already tracked, order {} ignored",
                sponsor.id, referred_id, order.id
            );
            self.link_if_unlinked(referred_id, sponsor.id).await?;
            return Ok(RecordOutcome::AlreadyTracked);
        }

        let created = self
            .trackings
            .record_referral(NewTracking {
                sponsor_id: sponsor.id,
                referred_id,
                code_used: code.to_string(),
                order: Some(OrderSnapshot {
                    order_id: order.id,
                    order_date: order.date_order,
                    amount: order.amount_total,
                    currency: order.currency.clone(),
                }),
                state: TrackingState::Validated,
                reward_percentage: self.reward_percentage,
                notes: None,
            })
            .await?;

        let tracking = match created {
            Some(tracking) => tracking,
            None => {
                self.link_if_unlinked(referred_id, sponsor.id).await?;
                return Ok(RecordOutcome::AlreadyTracked);
            }
        };

        info!(
            "Recorded referral {}: sponsor {} referred {} via order {}",
            tracking.name, sponsor.id, referred_id, order.id
        );
        Ok(RecordOutcome::Recorded(tracking))
    }

    /// Point a tracked referred customer at its sponsor when no sponsor is set
    /// yet, e.g. after a manually created entry
    async fn link_if_unlinked(&self, referred_id: i64, sponsor_id: i64) -> Result<(), ReferralError> {
        let referred = match self.customers.get(referred_id).await? {
            Some(referred) => referred,
            None => return Ok(()),
        };
        if referred.referred_by_id.is_none() {
            self.customers.set_referred_by(referred_id, sponsor_id).await?;
            info!("Linked customer {} to sponsor {}", referred_id, sponsor_id);
        }
        Ok(())
    }
}

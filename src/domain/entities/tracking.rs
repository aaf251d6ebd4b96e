//! Referral tracking entry and its reward state machine
//!
//! ```text
//! pending --validate--> validated --reward--> rewarded
//!                           \
//!                            --cancel--> cancelled
//! ```
//!
//! `rewarded` and `cancelled` are terminal. The reward amount is derived from
//! the order snapshot, the percentage and the state, and is zero unless the
//! entry is rewarded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::errors::ReferralError;
use crate::domain::value_objects::reward_percentage::RewardPercentage;

/// Reference given to an entry before it has been stored
pub const UNASSIGNED_REFERENCE: &str = "New";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingState {
    Pending,
    Validated,
    Rewarded,
    Cancelled,
}

impl TrackingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingState::Pending => "pending",
            TrackingState::Validated => "validated",
            TrackingState::Rewarded => "rewarded",
            TrackingState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TrackingState::Pending),
            "validated" => Ok(TrackingState::Validated),
            "rewarded" => Ok(TrackingState::Rewarded),
            "cancelled" => Ok(TrackingState::Cancelled),
            other => Err(format!("Unknown referral state: {}", other)),
        }
    }
}

/// Values copied from the referred customer's order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: i64,
    pub order_date: DateTime<Utc>,
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralTracking {
    pub id: i64,
    /// Human readable sequence reference, e.g. `RT/00012`
    pub name: String,
    pub sponsor_id: i64,
    pub referred_id: i64,
    pub code_used: String,
    pub source_order_id: Option<i64>,
    pub order_date: Option<DateTime<Utc>>,
    pub order_amount: f64,
    pub currency: Option<String>,
    pub state: TrackingState,
    pub reward_percentage: f64,
    pub reward_amount: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reward owed for an entry; zero unless the entry is rewarded
pub fn compute_reward_amount(order_amount: f64, reward_percentage: f64, state: TrackingState) -> f64 {
    if state != TrackingState::Rewarded || order_amount == 0.0 {
        return 0.0;
    }
    order_amount * (reward_percentage / 100.0)
}

/// Sequence reference for a stored entry
pub fn reference_for(id: i64) -> String {
    format!("RT/{:05}", id)
}

impl ReferralTracking {
    pub fn recompute_reward(&mut self) {
        self.reward_amount =
            compute_reward_amount(self.order_amount, self.reward_percentage, self.state);
    }

    fn transition_error(&self, action: &'static str) -> ReferralError {
        ReferralError::InvalidTransition {
            reference: self.name.clone(),
            from: self.state,
            action,
        }
    }

    /// Returns `true` when the state changed
    pub fn validate(&mut self) -> Result<bool, ReferralError> {
        match self.state {
            TrackingState::Pending => {
                self.state = TrackingState::Validated;
                self.recompute_reward();
                Ok(true)
            }
            TrackingState::Validated => Ok(false),
            _ => Err(self.transition_error("validate")),
        }
    }

    /// Moves a validated entry to rewarded and returns the amount owed
    pub fn reward(&mut self) -> Result<f64, ReferralError> {
        if self.state != TrackingState::Validated {
            return Err(self.transition_error("reward"));
        }
        self.state = TrackingState::Rewarded;
        self.recompute_reward();
        Ok(self.reward_amount)
    }

    /// Returns `true` when the state changed
    pub fn cancel(&mut self) -> Result<bool, ReferralError> {
        match self.state {
            TrackingState::Pending | TrackingState::Validated => {
                self.state = TrackingState::Cancelled;
                self.recompute_reward();
                Ok(true)
            }
            TrackingState::Cancelled => Ok(false),
            TrackingState::Rewarded => Err(self.transition_error("cancel")),
        }
    }

    pub fn set_reward_percentage(&mut self, percentage: f64) -> Result<(), ReferralError> {
        let percentage = RewardPercentage::new(percentage).map_err(ReferralError::InvalidInput)?;
        self.reward_percentage = percentage.value();
        self.recompute_reward();
        Ok(())
    }

    pub fn apply_order_snapshot(&mut self, snapshot: &OrderSnapshot) {
        self.source_order_id = Some(snapshot.order_id);
        self.order_date = Some(snapshot.order_date);
        self.order_amount = snapshot.amount;
        self.currency = Some(snapshot.currency.clone());
        self.recompute_reward();
    }

    pub fn append_note(&mut self, note: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, note),
            _ => note.to_string(),
        });
    }

    /// Audit line recorded when the reward is granted
    pub fn reward_note(&self, sponsor_name: &str) -> String {
        match self.currency.as_deref() {
            Some(currency) => format!(
                "Reward of {:.2} {} granted to sponsor {}",
                self.reward_amount, currency, sponsor_name
            ),
            None => format!(
                "Reward of {:.2} granted to sponsor {}",
                self.reward_amount, sponsor_name
            ),
        }
    }
}

/// Create tracking input
#[derive(Debug, Clone)]
pub struct NewTracking {
    pub sponsor_id: i64,
    pub referred_id: i64,
    pub code_used: String,
    pub order: Option<OrderSnapshot>,
    pub state: TrackingState,
    pub reward_percentage: f64,
    pub notes: Option<String>,
}

impl NewTracking {
    pub fn reward_amount(&self) -> f64 {
        compute_reward_amount(
            self.order.as_ref().map_or(0.0, |o| o.amount),
            self.reward_percentage,
            self.state,
        )
    }
}

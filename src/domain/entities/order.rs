use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Point-of-sale order state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Draft,
    Paid,
    Done,
    Invoiced,
    Cancelled,
}

impl OrderState {
    /// States in which a sale counts as completed
    pub const FINALIZED: [OrderState; 3] = [OrderState::Paid, OrderState::Done, OrderState::Invoiced];

    pub fn is_finalized(&self) -> bool {
        Self::FINALIZED.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Draft => "draft",
            OrderState::Paid => "paid",
            OrderState::Done => "done",
            OrderState::Invoiced => "invoiced",
            OrderState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(OrderState::Draft),
            "paid" => Ok(OrderState::Paid),
            "done" => Ok(OrderState::Done),
            "invoiced" => Ok(OrderState::Invoiced),
            "cancelled" | "cancel" => Ok(OrderState::Cancelled),
            other => Err(format!("Unknown order state: {}", other)),
        }
    }
}

/// Point-of-sale order with the referral code typed in at checkout
#[derive(Debug, Clone, PartialEq)]
pub struct PosOrder {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub state: OrderState,
    pub amount_total: f64,
    pub currency: String,
    pub date_order: DateTime<Utc>,
    pub referral_code: Option<String>,
}

impl PosOrder {
    /// The entered referral code, ignoring surrounding whitespace
    pub fn entered_referral_code(&self) -> Option<&str> {
        self.referral_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }

    pub fn is_referred(&self) -> bool {
        self.entered_referral_code().is_some()
    }
}

/// Create order input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    #[serde(default)]
    pub customer_id: Option<i64>,
    pub amount_total: f64,
    pub currency: String,
    #[serde(default)]
    pub referral_code: Option<String>,
    #[serde(default = "default_state")]
    pub state: OrderState,
}

fn default_state() -> OrderState {
    OrderState::Draft
}

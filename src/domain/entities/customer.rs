use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Customer record extended with referral fields
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    /// Tier of the customer, anything above zero is a paying customer
    pub customer_rank: i64,
    pub referral_code: Option<String>,
    /// PNG bytes of the QR image for `referral_code`
    pub referral_qr_image: Option<Vec<u8>>,
    pub referred_by_id: Option<i64>,
    pub referral_email_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn is_paying(&self) -> bool {
        self.customer_rank > 0
    }

    /// A code is issued once, and only to paying customers
    pub fn needs_referral_code(&self) -> bool {
        self.is_paying() && self.referral_code.as_deref().map_or(true, str::is_empty)
    }

    pub fn has_qr_image(&self) -> bool {
        self.referral_qr_image.as_ref().map_or(false, |img| !img.is_empty())
    }
}

/// Create customer input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub customer_rank: i64,
}

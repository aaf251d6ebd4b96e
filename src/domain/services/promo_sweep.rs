//! Referral promotion sweep
//!
//! Emails eligible customers their referral code and QR image, once. A
//! customer is picked when they own a code and an email address, have not
//! been mailed yet and have enough completed orders. Each run handles a
//! bounded batch; a failed send is logged and counted against the customer,
//! who moves behind everyone not yet attempted and is retried on a later run
//! until the failure cap is reached. Without a configured mail relay the run
//! stops before touching any customer.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::errors::ReferralError;
use crate::domain::repositories::{CustomerRepository, MailError, ReferralMailer};

/// Upper bound of customers handled per run
pub const DEFAULT_SWEEP_BATCH_SIZE: i64 = 200;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub selected: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct PromoSweep {
    customers: Arc<dyn CustomerRepository>,
    mailer: Arc<dyn ReferralMailer>,
    batch_size: i64,
    eligible_min_orders: i64,
}

impl PromoSweep {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        mailer: Arc<dyn ReferralMailer>,
        batch_size: i64,
        eligible_min_orders: i64,
    ) -> Self {
        Self {
            customers,
            mailer,
            batch_size: batch_size.max(1),
            eligible_min_orders,
        }
    }

    pub async fn run(&self) -> Result<SweepReport, ReferralError> {
        let candidates = self
            .customers
            .list_promo_candidates(self.eligible_min_orders, self.batch_size)
            .await?;

        let mut report = SweepReport {
            selected: candidates.len(),
            ..SweepReport::default()
        };

        for customer in &candidates {
            match self.mailer.send_referral_code(customer).await {
                Ok(()) => {}
                Err(MailError::NotConfigured) => {
                    warn!("Referral email sweep stopped: no mail relay configured");
                    return Err(MailError::NotConfigured.into());
                }
                Err(e) => {
                    warn!("Referral email to customer {} failed: {}", customer.id, e);
                    report.failed += 1;
                    if let Err(e) = self.customers.record_referral_email_failure(customer.id).await {
                        warn!(
                            "Failed referral email to customer {} not recorded: {}",
                            customer.id, e
                        );
                    }
                    continue;
                }
            }

            match self.customers.mark_referral_email_sent(customer.id).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    warn!(
                        "Referral email sent to customer {} but marker not stored: {}",
                        customer.id, e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "Referral email sweep: {} selected, {} sent, {} failed",
            report.selected, report.sent, report.failed
        );
        Ok(report)
    }
}

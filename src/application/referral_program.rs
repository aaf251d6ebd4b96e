//! Referral program façade
//!
//! Wires the referral services together and exposes the operations the HTTP
//! layer and the background sweep call: customer and order writes with their
//! referral side effects, staff actions on tracking entries, per-customer
//! figures and the promotion sweep.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ReferralConfig;
use crate::domain::entities::customer::{Customer, NewCustomer};
use crate::domain::entities::order::{NewOrder, OrderState, PosOrder};
use crate::domain::entities::tracking::ReferralTracking;
use crate::domain::errors::ReferralError;
use crate::domain::repositories::{
    CustomerRepository, OrderRepository, QrRenderer, ReferralMailer, TrackingRepository,
};
use crate::domain::services::code_issuer::CodeIssuer;
use crate::domain::services::customer_stats::{CustomerReferralStats, CustomerReferralSummary};
use crate::domain::services::promo_sweep::{PromoSweep, SweepReport};
use crate::domain::services::referral_recorder::{RecordOutcome, ReferralRecorder};
use crate::domain::services::tracking_lifecycle::{ManualTracking, TrackingLifecycle};
use crate::infrastructure::mail_relay::{DisabledMailer, HttpMailer};
use crate::infrastructure::qr_png::PngQrRenderer;
use crate::persistence::repository::{
    SqliteCustomerRepository, SqliteOrderRepository, SqliteTrackingRepository,
};
use crate::persistence::DbPool;

/// Order write together with the referral it produced, if any
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub order: PosOrder,
    pub referral: Option<ReferralTracking>,
}

pub struct ReferralProgram {
    customers: Arc<dyn CustomerRepository>,
    orders: Arc<dyn OrderRepository>,
    issuer: CodeIssuer,
    recorder: ReferralRecorder,
    lifecycle: TrackingLifecycle,
    stats: CustomerReferralStats,
    sweep: PromoSweep,
}

impl ReferralProgram {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        orders: Arc<dyn OrderRepository>,
        trackings: Arc<dyn TrackingRepository>,
        renderer: Arc<dyn QrRenderer>,
        mailer: Arc<dyn ReferralMailer>,
        config: &ReferralConfig,
    ) -> Self {
        Self {
            issuer: CodeIssuer::new(customers.clone(), renderer, config.code_max_attempts),
            recorder: ReferralRecorder::new(
                customers.clone(),
                trackings.clone(),
                config.reward_percentage,
            ),
            lifecycle: TrackingLifecycle::new(
                trackings.clone(),
                customers.clone(),
                orders.clone(),
                config.reward_percentage,
            ),
            stats: CustomerReferralStats::new(trackings, orders.clone(), config.eligible_min_orders),
            sweep: PromoSweep::new(
                customers.clone(),
                mailer,
                config.sweep_batch_size,
                config.eligible_min_orders,
            ),
            customers,
            orders,
        }
    }

    /// Build the program on top of a SQLite pool with the PNG renderer and
    /// the mailer selected by the configuration
    pub fn from_pool(pool: DbPool, config: &ReferralConfig) -> Self {
        let mailer: Arc<dyn ReferralMailer> = match config.mail_relay() {
            Some(relay) => {
                let endpoint = relay.endpoint.clone();
                match HttpMailer::new(relay) {
                    Ok(mailer) => {
                        info!("Referral emails delivered through {}", endpoint);
                        Arc::new(mailer)
                    }
                    Err(e) => {
                        error!("Mail relay unavailable, referral emails disabled: {}", e);
                        Arc::new(DisabledMailer)
                    }
                }
            }
            None => {
                warn!("No mail relay configured, referral emails disabled");
                Arc::new(DisabledMailer)
            }
        };

        Self::new(
            Arc::new(SqliteCustomerRepository::new(pool.clone())),
            Arc::new(SqliteOrderRepository::new(pool.clone())),
            Arc::new(SqliteTrackingRepository::new(pool)),
            Arc::new(PngQrRenderer::new()),
            mailer,
            config,
        )
    }

    /// Create a customer and, for paying customers, issue their referral code.
    ///
    /// A failed issuance never fails the creation; the customer is returned
    /// without a code.
    pub async fn create_customer(&self, new_customer: NewCustomer) -> Result<Customer, ReferralError> {
        let name = new_customer.name.trim().to_string();
        if name.is_empty() {
            return Err(ReferralError::InvalidInput("Customer name is required".to_string()));
        }
        let new_customer = NewCustomer { name, ..new_customer };

        let customer = self.customers.create(new_customer).await?;
        debug!("Customer {} created with rank {}", customer.id, customer.customer_rank);

        match self.issuer.issue(&customer).await {
            Ok(Some(_)) => self.customer(customer.id).await,
            Ok(None) => Ok(customer),
            Err(e) => {
                error!(
                    "Failed to issue referral code for customer {}: {}",
                    customer.id, e
                );
                Ok(customer)
            }
        }
    }

    pub async fn customer(&self, id: i64) -> Result<Customer, ReferralError> {
        self.customers
            .get(id)
            .await?
            .ok_or(ReferralError::NotFound { entity: "customer", id })
    }

    pub async fn order(&self, id: i64) -> Result<PosOrder, ReferralError> {
        self.orders
            .get(id)
            .await?
            .ok_or(ReferralError::NotFound { entity: "order", id })
    }

    /// Create an order; one created directly in a paid state is recorded
    pub async fn create_order(&self, new_order: NewOrder) -> Result<OrderUpdate, ReferralError> {
        if !new_order.amount_total.is_finite() {
            return Err(ReferralError::InvalidInput("Order amount must be a number".to_string()));
        }
        if let Some(customer_id) = new_order.customer_id {
            self.customer(customer_id).await?;
        }

        let order = self.orders.create(new_order).await?;
        debug!("Order {} created in state {}", order.id, order.state);
        let referral = self.record(&order).await?;
        Ok(OrderUpdate { order, referral })
    }

    /// Move an order to `state`; reaching a paid state records its referral
    pub async fn set_order_state(&self, order_id: i64, state: OrderState) -> Result<OrderUpdate, ReferralError> {
        self.order(order_id).await?;
        let order = self.orders.set_state(order_id, state).await?;
        info!("Order {} moved to {}", order.id, order.state);
        let referral = self.record(&order).await?;
        Ok(OrderUpdate { order, referral })
    }

    /// Change an order total and refresh the referrals sourced from it
    pub async fn set_order_amount(
        &self,
        order_id: i64,
        amount_total: f64,
    ) -> Result<(PosOrder, Vec<ReferralTracking>), ReferralError> {
        if !amount_total.is_finite() {
            return Err(ReferralError::InvalidInput("Order amount must be a number".to_string()));
        }
        self.order(order_id).await?;
        let order = self.orders.set_amount(order_id, amount_total).await?;
        let refreshed = self.lifecycle.refresh_for_order(order_id).await?;
        debug!(
            "Order {} amount set to {:.2}, {} referral(s) refreshed",
            order.id,
            order.amount_total,
            refreshed.len()
        );
        Ok((order, refreshed))
    }

    async fn record(&self, order: &PosOrder) -> Result<Option<ReferralTracking>, ReferralError> {
        if !order.state.is_finalized() {
            return Ok(None);
        }
        match self.recorder.on_order_finalized(order).await? {
            RecordOutcome::Recorded(tracking) => Ok(Some(tracking)),
            outcome => {
                debug!("Order {} produced no referral: {:?}", order.id, outcome);
                Ok(None)
            }
        }
    }

    pub async fn referral(&self, id: i64) -> Result<ReferralTracking, ReferralError> {
        self.lifecycle.get(id).await
    }

    pub async fn validate_referral(&self, id: i64) -> Result<ReferralTracking, ReferralError> {
        self.lifecycle.validate(id).await
    }

    pub async fn reward_referral(&self, id: i64) -> Result<ReferralTracking, ReferralError> {
        self.lifecycle.reward(id).await
    }

    pub async fn cancel_referral(&self, id: i64) -> Result<ReferralTracking, ReferralError> {
        self.lifecycle.cancel(id).await
    }

    pub async fn set_reward_percentage(
        &self,
        id: i64,
        percentage: f64,
    ) -> Result<ReferralTracking, ReferralError> {
        self.lifecycle.set_reward_percentage(id, percentage).await
    }

    pub async fn create_manual_tracking(
        &self,
        manual: ManualTracking,
    ) -> Result<ReferralTracking, ReferralError> {
        self.lifecycle.create_manual(manual).await
    }

    pub async fn referral_summary(&self, customer_id: i64) -> Result<CustomerReferralSummary, ReferralError> {
        self.customer(customer_id).await?;
        self.stats.summary(customer_id).await
    }

    /// The customer's referrals as sponsor, newest first
    pub async fn referrals_of(&self, customer_id: i64) -> Result<Vec<ReferralTracking>, ReferralError> {
        self.customer(customer_id).await?;
        self.stats.referrals_of(customer_id).await
    }

    pub async fn run_referral_email_sweep(&self) -> Result<SweepReport, ReferralError> {
        self.sweep.run().await
    }
}

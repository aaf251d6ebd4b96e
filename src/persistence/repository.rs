//! Database Repository
//!
//! SQLite implementations of the customer, order and referral tracking
//! repositories.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

use super::models::*;
use super::DbPool;
use crate::domain::entities::customer::{Customer, NewCustomer};
use crate::domain::entities::order::{NewOrder, OrderState, PosOrder};
use crate::domain::entities::tracking::{
    reference_for, NewTracking, ReferralTracking, TrackingState,
};
use crate::domain::repositories::customer_repository::MAX_REFERRAL_EMAIL_FAILURES;
use crate::domain::repositories::{
    CustomerRepository, OrderRepository, RepositoryError, RepositoryResult, TrackingRepository,
};

fn query_error(context: &str, e: sqlx::Error) -> RepositoryError {
    error!("{}: {}", context, e);
    RepositoryError::Query(format!("{}: {}", context, e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

/// Customer repository
pub struct SqliteCustomerRepository {
    pool: DbPool,
}

impl SqliteCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerRepository for SqliteCustomerRepository {
    async fn create(&self, customer: NewCustomer) -> RepositoryResult<Customer> {
        let record = sqlx::query_as::<_, CustomerRecord>(
            r#"
            INSERT INTO customers (name, email, customer_rank, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING *
            "#,
        )
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(customer.customer_rank)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_error("Failed to create customer", e))?;

        debug!("Created customer: {} ({})", record.id, record.name);
        Ok(record.into())
    }

    async fn get(&self, id: i64) -> RepositoryResult<Option<Customer>> {
        let record = sqlx::query_as::<_, CustomerRecord>("SELECT * FROM customers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("Failed to get customer", e))?;

        Ok(record.map(Customer::from))
    }

    async fn find_by_referral_code(&self, code: &str) -> RepositoryResult<Option<Customer>> {
        let record = sqlx::query_as::<_, CustomerRecord>(
            "SELECT * FROM customers WHERE referral_code = ?1 ORDER BY id LIMIT 1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("Failed to look up referral code", e))?;

        Ok(record.map(Customer::from))
    }

    async fn referral_code_exists(&self, code: &str) -> RepositoryResult<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM customers WHERE referral_code = ?1")
                .bind(code)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| query_error("Failed to check referral code", e))?;

        Ok(count > 0)
    }

    async fn set_referral_code(
        &self,
        id: i64,
        code: &str,
        qr_image: Option<&[u8]>,
    ) -> RepositoryResult<()> {
        let rows_affected = sqlx::query(
            "UPDATE customers SET referral_code = ?1, referral_qr_image = ?2 WHERE id = ?3",
        )
        .bind(code)
        .bind(qr_image)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                debug!("Referral code {} already owned by another customer", code);
                RepositoryError::Conflict(format!("referral code {} is taken", code))
            } else {
                query_error("Failed to store referral code", e)
            }
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "customer",
                id,
            });
        }

        debug!("Stored referral code {} for customer {}", code, id);
        Ok(())
    }

    async fn set_referred_by(&self, id: i64, sponsor_id: i64) -> RepositoryResult<()> {
        let rows_affected = sqlx::query("UPDATE customers SET referred_by_id = ?1 WHERE id = ?2")
            .bind(sponsor_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error("Failed to store sponsor", e))?
            .rows_affected();

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "customer",
                id,
            });
        }

        Ok(())
    }

    async fn list_promo_candidates(
        &self,
        min_finalized_orders: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<Customer>> {
        let records = sqlx::query_as::<_, CustomerRecord>(
            r#"
            SELECT c.* FROM customers c
            WHERE c.referral_code IS NOT NULL AND c.referral_code <> ''
              AND c.email IS NOT NULL AND c.email <> ''
              AND c.referral_email_sent = 0
              AND c.referral_email_failures < ?3
              AND (
                SELECT COUNT(*) FROM pos_orders o
                WHERE o.customer_id = c.id AND o.state IN ('paid', 'done', 'invoiced')
              ) >= ?1
            ORDER BY c.referral_email_attempted_at IS NOT NULL,
                     c.referral_email_attempted_at,
                     c.id
            LIMIT ?2
            "#,
        )
        .bind(min_finalized_orders)
        .bind(limit)
        .bind(MAX_REFERRAL_EMAIL_FAILURES)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list referral email candidates", e))?;

        Ok(records.into_iter().map(Customer::from).collect())
    }

    async fn mark_referral_email_sent(&self, id: i64) -> RepositoryResult<()> {
        let rows_affected =
            sqlx::query("UPDATE customers SET referral_email_sent = 1 WHERE id = ?1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| query_error("Failed to mark referral email sent", e))?
                .rows_affected();

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "customer",
                id,
            });
        }

        Ok(())
    }

    async fn record_referral_email_failure(&self, id: i64) -> RepositoryResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE customers
            SET referral_email_failures = referral_email_failures + 1,
                referral_email_attempted_at = ?1
            WHERE id = ?2
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("Failed to record referral email failure", e))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "customer",
                id,
            });
        }

        Ok(())
    }
}

/// POS order repository
pub struct SqliteOrderRepository {
    pool: DbPool,
}

impl SqliteOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn create(&self, order: NewOrder) -> RepositoryResult<PosOrder> {
        let now = Utc::now();
        let referral_code = order
            .referral_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty());

        let record = sqlx::query_as::<_, OrderRecord>(
            r#"
            INSERT INTO pos_orders (
                customer_id, state, amount_total, currency, date_order, referral_code, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?5)
            RETURNING *
            "#,
        )
        .bind(order.customer_id)
        .bind(order.state.as_str())
        .bind(order.amount_total)
        .bind(&order.currency)
        .bind(now)
        .bind(referral_code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_error("Failed to create order", e))?;

        debug!("Created order: {} in state {}", record.id, record.state);
        record.try_into()
    }

    async fn get(&self, id: i64) -> RepositoryResult<Option<PosOrder>> {
        let record = sqlx::query_as::<_, OrderRecord>("SELECT * FROM pos_orders WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("Failed to get order", e))?;

        record.map(PosOrder::try_from).transpose()
    }

    async fn set_state(&self, id: i64, state: OrderState) -> RepositoryResult<PosOrder> {
        let record = sqlx::query_as::<_, OrderRecord>(
            "UPDATE pos_orders SET state = ?1 WHERE id = ?2 RETURNING *",
        )
        .bind(state.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("Failed to update order state", e))?
        .ok_or(RepositoryError::NotFound { entity: "order", id })?;

        debug!("Order {} moved to {}", id, state);
        record.try_into()
    }

    async fn set_amount(&self, id: i64, amount_total: f64) -> RepositoryResult<PosOrder> {
        let record = sqlx::query_as::<_, OrderRecord>(
            "UPDATE pos_orders SET amount_total = ?1 WHERE id = ?2 RETURNING *",
        )
        .bind(amount_total)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("Failed to update order amount", e))?
        .ok_or(RepositoryError::NotFound { entity: "order", id })?;

        record.try_into()
    }

    async fn count_finalized_for_customer(&self, customer_id: i64) -> RepositoryResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM pos_orders
            WHERE customer_id = ?1 AND state IN ('paid', 'done', 'invoiced')
            "#,
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_error("Failed to count orders", e))?;

        Ok(count)
    }
}

/// Referral tracking repository
pub struct SqliteTrackingRepository {
    pool: DbPool,
}

impl SqliteTrackingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert an entry, name it and optionally point the referred customer at
    /// the sponsor, all in one transaction
    async fn insert(
        &self,
        tracking: NewTracking,
        link_referred: bool,
    ) -> RepositoryResult<Option<ReferralTracking>> {
        let reward_amount = tracking.reward_amount();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_error("Failed to begin transaction", e))?;

        let inserted = sqlx::query_as::<_, TrackingRecord>(
            r#"
            INSERT INTO referral_tracking (
                sponsor_id, referred_id, referral_code_used, pos_order_id, order_date,
                order_amount, currency, state, reward_percentage, reward_amount, notes, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT (sponsor_id, referred_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(tracking.sponsor_id)
        .bind(tracking.referred_id)
        .bind(&tracking.code_used)
        .bind(tracking.order.as_ref().map(|o| o.order_id))
        .bind(tracking.order.as_ref().map(|o| o.order_date))
        .bind(tracking.order.as_ref().map_or(0.0, |o| o.amount))
        .bind(tracking.order.as_ref().map(|o| o.currency.clone()))
        .bind(tracking.state.as_str())
        .bind(tracking.reward_percentage)
        .bind(reward_amount)
        .bind(&tracking.notes)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| query_error("Failed to create referral tracking", e))?;

        let mut record = match inserted {
            Some(record) => record,
            None => {
                debug!(
                    "Referral already tracked for sponsor {} and referred {}",
                    tracking.sponsor_id, tracking.referred_id
                );
                return Ok(None);
            }
        };

        record.name = reference_for(record.id);
        sqlx::query("UPDATE referral_tracking SET name = ?1 WHERE id = ?2")
            .bind(&record.name)
            .bind(record.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("Failed to assign referral reference", e))?;

        if link_referred {
            let rows_affected =
                sqlx::query("UPDATE customers SET referred_by_id = ?1 WHERE id = ?2")
                    .bind(record.sponsor_id)
                    .bind(record.referred_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| query_error("Failed to store sponsor", e))?
                    .rows_affected();
            if rows_affected == 0 {
                return Err(RepositoryError::NotFound {
                    entity: "customer",
                    id: record.referred_id,
                });
            }
        }

        tx.commit()
            .await
            .map_err(|e| query_error("Failed to commit referral tracking", e))?;

        debug!(
            "Created referral tracking {} ({} -> {})",
            record.name, record.sponsor_id, record.referred_id
        );
        record.try_into().map(Some)
    }
}

#[async_trait]
impl TrackingRepository for SqliteTrackingRepository {
    async fn create(&self, tracking: NewTracking) -> RepositoryResult<Option<ReferralTracking>> {
        self.insert(tracking, false).await
    }

    async fn record_referral(
        &self,
        tracking: NewTracking,
    ) -> RepositoryResult<Option<ReferralTracking>> {
        self.insert(tracking, true).await
    }

    async fn get(&self, id: i64) -> RepositoryResult<Option<ReferralTracking>> {
        let record =
            sqlx::query_as::<_, TrackingRecord>("SELECT * FROM referral_tracking WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| query_error("Failed to get referral tracking", e))?;

        record.map(ReferralTracking::try_from).transpose()
    }

    async fn exists_for_pair(&self, sponsor_id: i64, referred_id: i64) -> RepositoryResult<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM referral_tracking WHERE sponsor_id = ?1 AND referred_id = ?2",
        )
        .bind(sponsor_id)
        .bind(referred_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_error("Failed to check referral pair", e))?;

        Ok(count > 0)
    }

    async fn update(&self, tracking: &ReferralTracking) -> RepositoryResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE referral_tracking
            SET state = ?1, reward_percentage = ?2, reward_amount = ?3,
                pos_order_id = ?4, order_date = ?5, order_amount = ?6, currency = ?7,
                notes = ?8
            WHERE id = ?9
            "#,
        )
        .bind(tracking.state.as_str())
        .bind(tracking.reward_percentage)
        .bind(tracking.reward_amount)
        .bind(tracking.source_order_id)
        .bind(tracking.order_date)
        .bind(tracking.order_amount)
        .bind(&tracking.currency)
        .bind(&tracking.notes)
        .bind(tracking.id)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("Failed to update referral tracking", e))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "referral",
                id: tracking.id,
            });
        }

        debug!("Updated referral tracking {} ({})", tracking.name, tracking.state);
        Ok(())
    }

    async fn list_by_sponsor(&self, sponsor_id: i64) -> RepositoryResult<Vec<ReferralTracking>> {
        let records = sqlx::query_as::<_, TrackingRecord>(
            "SELECT * FROM referral_tracking WHERE sponsor_id = ?1 ORDER BY created_at DESC, id DESC",
        )
        .bind(sponsor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list referrals", e))?;

        records.into_iter().map(ReferralTracking::try_from).collect()
    }

    async fn list_by_order(&self, order_id: i64) -> RepositoryResult<Vec<ReferralTracking>> {
        let records = sqlx::query_as::<_, TrackingRecord>(
            "SELECT * FROM referral_tracking WHERE pos_order_id = ?1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list referrals for order", e))?;

        records.into_iter().map(ReferralTracking::try_from).collect()
    }

    async fn count_by_sponsor(
        &self,
        sponsor_id: i64,
        state: TrackingState,
    ) -> RepositoryResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM referral_tracking WHERE sponsor_id = ?1 AND state = ?2",
        )
        .bind(sponsor_id)
        .bind(state.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_error("Failed to count referrals", e))?;

        Ok(count)
    }

    async fn sum_reward_by_sponsor(
        &self,
        sponsor_id: i64,
        state: TrackingState,
    ) -> RepositoryResult<f64> {
        let (total,): (f64,) = sqlx::query_as(
            r#"
            SELECT CAST(COALESCE(SUM(reward_amount), 0.0) AS REAL) FROM referral_tracking
            WHERE sponsor_id = ?1 AND state = ?2
            "#,
        )
        .bind(sponsor_id)
        .bind(state.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_error("Failed to sum rewards", e))?;

        Ok(total)
    }
}

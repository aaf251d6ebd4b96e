use async_trait::async_trait;

use super::RepositoryResult;
use crate::domain::entities::customer::{Customer, NewCustomer};

/// Failed referral email sends after which a customer is no longer selected
pub const MAX_REFERRAL_EMAIL_FAILURES: i64 = 5;

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn create(&self, customer: NewCustomer) -> RepositoryResult<Customer>;

    async fn get(&self, id: i64) -> RepositoryResult<Option<Customer>>;

    /// First customer owning `code`, if any
    async fn find_by_referral_code(&self, code: &str) -> RepositoryResult<Option<Customer>>;

    async fn referral_code_exists(&self, code: &str) -> RepositoryResult<bool>;

    /// Fails with `RepositoryError::Conflict` when another customer already
    /// owns `code`
    async fn set_referral_code(
        &self,
        id: i64,
        code: &str,
        qr_image: Option<&[u8]>,
    ) -> RepositoryResult<()>;

    async fn set_referred_by(&self, id: i64, sponsor_id: i64) -> RepositoryResult<()>;

    /// Customers with a code and an email address that were never sent the
    /// referral email and have at least `min_finalized_orders` completed orders.
    ///
    /// Customers never attempted come first, then the ones whose last failed
    /// attempt is oldest. Customers with `MAX_REFERRAL_EMAIL_FAILURES` failed
    /// sends are left out.
    async fn list_promo_candidates(
        &self,
        min_finalized_orders: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<Customer>>;

    async fn mark_referral_email_sent(&self, id: i64) -> RepositoryResult<()>;

    /// Count a failed referral email send and stamp its time
    async fn record_referral_email_failure(&self, id: i64) -> RepositoryResult<()>;
}

use async_trait::async_trait;

use super::RepositoryResult;
use crate::domain::entities::order::{NewOrder, OrderState, PosOrder};

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: NewOrder) -> RepositoryResult<PosOrder>;

    async fn get(&self, id: i64) -> RepositoryResult<Option<PosOrder>>;

    async fn set_state(&self, id: i64, state: OrderState) -> RepositoryResult<PosOrder>;

    async fn set_amount(&self, id: i64, amount_total: f64) -> RepositoryResult<PosOrder>;

    /// Number of the customer's orders in a paid, done or invoiced state
    async fn count_finalized_for_customer(&self, customer_id: i64) -> RepositoryResult<i64>;
}

use async_trait::async_trait;

use super::RepositoryResult;
use crate::domain::entities::tracking::{NewTracking, ReferralTracking, TrackingState};

#[async_trait]
pub trait TrackingRepository: Send + Sync {
    /// Store a new entry and assign its sequence reference.
    ///
    /// Returns `None` when the (sponsor, referred) pair is already tracked.
    async fn create(&self, tracking: NewTracking) -> RepositoryResult<Option<ReferralTracking>>;

    /// Like [`TrackingRepository::create`], and in the same transaction link
    /// the referred customer to the sponsor.
    ///
    /// Nothing is written when the pair is already tracked.
    async fn record_referral(
        &self,
        tracking: NewTracking,
    ) -> RepositoryResult<Option<ReferralTracking>>;

    async fn get(&self, id: i64) -> RepositoryResult<Option<ReferralTracking>>;

    async fn exists_for_pair(&self, sponsor_id: i64, referred_id: i64) -> RepositoryResult<bool>;

    /// Persist state, percentage, reward amount, order snapshot and notes
    async fn update(&self, tracking: &ReferralTracking) -> RepositoryResult<()>;

    /// Newest first
    async fn list_by_sponsor(&self, sponsor_id: i64) -> RepositoryResult<Vec<ReferralTracking>>;

    async fn list_by_order(&self, order_id: i64) -> RepositoryResult<Vec<ReferralTracking>>;

    async fn count_by_sponsor(
        &self,
        sponsor_id: i64,
        state: TrackingState,
    ) -> RepositoryResult<i64>;

    async fn sum_reward_by_sponsor(
        &self,
        sponsor_id: i64,
        state: TrackingState,
    ) -> RepositoryResult<f64>;
}

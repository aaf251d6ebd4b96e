//! Collaborator interfaces used by the referral services
//!
//! The services never reach for storage, mail or image rendering directly:
//! each one receives the implementations it needs through its constructor.
//! This keeps the referral logic testable with in-memory databases and
//! hand-written mocks.

pub mod customer_repository;
pub mod mailer;
pub mod order_repository;
pub mod qr_renderer;
pub mod tracking_repository;

pub use customer_repository::CustomerRepository;
pub use mailer::{MailError, ReferralMailer};
pub use order_repository::OrderRepository;
pub use qr_renderer::QrRenderer;
pub use tracking_repository::TrackingRepository;

/// Common result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors that can occur while reading or writing records
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("Query failed: {0}")]
    Query(String),

    /// A unique constraint rejected the write
    #[error("Conflicting record: {0}")]
    Conflict(String),

    #[error("Record not found: {entity} {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Stored value could not be decoded: {0}")]
    Decode(String),
}

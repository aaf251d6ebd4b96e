//! Persistence Layer
//!
//! SQLite storage for customers, point-of-sale orders and referral tracking
//! entries, accessed asynchronously through sqlx.
//!
//! # Database Schema
//!
//! ## Customers Table
//! - id: Integer primary key
//! - name: Display name
//! - email: Optional address used by the referral email sweep
//! - customer_rank: Tier, > 0 for paying customers
//! - referral_code: Unique code, NULL until issued
//! - referral_qr_image: PNG bytes of the code
//! - referred_by_id: Sponsoring customer
//! - referral_email_sent: Durable "already mailed" marker
//! - referral_email_failures, referral_email_attempted_at: failed sends so far
//!   and the time of the last one
//!
//! ## POS Orders Table
//! - id, customer_id, state ("draft", "paid", "done", "invoiced", "cancelled")
//! - amount_total, currency, date_order
//! - referral_code: Code typed in at checkout
//!
//! ## Referral Tracking Table
//! - id, name (sequence reference "RT/00001")
//! - sponsor_id, referred_id: unique pair, cascade on customer delete
//! - referral_code_used, pos_order_id (set null on order delete)
//! - order_date, order_amount, currency: snapshot of the source order
//! - state ("pending", "validated", "rewarded", "cancelled")
//! - reward_percentage, reward_amount, notes, created_at

pub mod models;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::domain::entities::tracking::UNASSIGNED_REFERENCE;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

/// Initialize the database connection pool with default settings
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    let config = DatabaseConfig {
        url: database_url.to_string(),
        ..DatabaseConfig::default()
    };
    init_database_with(&config).await
}

/// Initialize the database connection pool and run migrations
///
/// # Errors
/// Returns error if the database cannot be opened or a migration fails
pub async fn init_database_with(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    // Ensure data directory exists
    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let mut options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true);
    if !config.log_queries {
        options = options.disable_statement_logging();
    }

    // An in-memory database lives as long as its connection
    let pool = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?
    };

    run_migrations(&pool).await?;

    info!("Database initialized");

    Ok(pool)
}

async fn migrate(pool: &DbPool, what: &str, statement: &str) -> Result<(), DatabaseError> {
    sqlx::query(statement)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create {}: {}", what, e)))?;
    Ok(())
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    migrate(
        pool,
        "customers table",
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT,
            customer_rank INTEGER NOT NULL DEFAULT 0,
            referral_code TEXT UNIQUE,
            referral_qr_image BLOB,
            referred_by_id INTEGER REFERENCES customers(id) ON DELETE SET NULL,
            referral_email_sent BOOLEAN NOT NULL DEFAULT 0,
            referral_email_failures INTEGER NOT NULL DEFAULT 0,
            referral_email_attempted_at DATETIME,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .await?;

    migrate(
        pool,
        "pos_orders table",
        r#"
        CREATE TABLE IF NOT EXISTS pos_orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id INTEGER REFERENCES customers(id) ON DELETE SET NULL,
            state TEXT NOT NULL CHECK(state IN ('draft', 'paid', 'done', 'invoiced', 'cancelled')),
            amount_total REAL NOT NULL DEFAULT 0.0,
            currency TEXT NOT NULL,
            date_order DATETIME NOT NULL,
            referral_code TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .await?;

    // The unique pair closes the race between two finalizations of orders
    // for the same sponsor and referred customer
    migrate(
        pool,
        "referral_tracking table",
        &format!(
            r#"
        CREATE TABLE IF NOT EXISTS referral_tracking (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL DEFAULT '{}',
            sponsor_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
            referred_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
            referral_code_used TEXT NOT NULL,
            pos_order_id INTEGER REFERENCES pos_orders(id) ON DELETE SET NULL,
            order_date DATETIME,
            order_amount REAL NOT NULL DEFAULT 0.0,
            currency TEXT,
            state TEXT NOT NULL DEFAULT 'pending'
                CHECK(state IN ('pending', 'validated', 'rewarded', 'cancelled')),
            reward_percentage REAL NOT NULL DEFAULT 10.0,
            reward_amount REAL NOT NULL DEFAULT 0.0,
            notes TEXT,
            created_at DATETIME NOT NULL,
            UNIQUE (sponsor_id, referred_id),
            CHECK (sponsor_id <> referred_id)
        )
        "#,
            UNASSIGNED_REFERENCE
        ),
    )
    .await?;

    migrate(
        pool,
        "index",
        "CREATE INDEX IF NOT EXISTS idx_pos_orders_customer_state ON pos_orders(customer_id, state)",
    )
    .await?;

    migrate(
        pool,
        "index",
        "CREATE INDEX IF NOT EXISTS idx_referral_tracking_order ON referral_tracking(pos_order_id)",
    )
    .await?;

    migrate(
        pool,
        "index",
        "CREATE INDEX IF NOT EXISTS idx_referral_tracking_created ON referral_tracking(created_at)",
    )
    .await?;

    info!("Database migrations completed");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/referrals.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Enable query logging
    pub log_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/referrals.db".to_string(),
            max_connections: 5,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data/referrals.db".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(5);

        let log_queries = std::env::var("DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(cfg!(debug_assertions));

        Self {
            url,
            max_connections,
            log_queries,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_init() {
        let pool = init_database("sqlite::memory:").await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_migrations() {
        let pool = init_database("sqlite::memory:").await.unwrap();

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('customers', 'pos_orders', 'referral_tracking')"
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(result.0, 3);
    }

    #[tokio::test]
    async fn test_unnamed_tracking_row_gets_placeholder_reference() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        for name in ["Alice", "Bob"] {
            sqlx::query("INSERT INTO customers (name, created_at) VALUES (?1, CURRENT_TIMESTAMP)")
                .bind(name)
                .execute(&pool)
                .await
                .unwrap();
        }
        sqlx::query(
            "INSERT INTO referral_tracking (sponsor_id, referred_id, referral_code_used, created_at) \
             VALUES (1, 2, 'REF-ALICE-1234', CURRENT_TIMESTAMP)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let (name,): (String,) = sqlx::query_as("SELECT name FROM referral_tracking")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, UNASSIGNED_REFERENCE);
    }

    #[tokio::test]
    async fn test_migrations_are_repeatable() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        assert!(run_migrations(&pool).await.is_ok());
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, "sqlite://data/referrals.db");
        assert_eq!(config.max_connections, 5);
        assert!(!config.is_in_memory());
    }
}

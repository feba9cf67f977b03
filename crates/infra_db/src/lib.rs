//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the add-on payment engine, built on SQLx.
//!
//! # Architecture
//!
//! Repositories own the SQL and map rows to domain records. Adapters wrap
//! the repositories and implement the `domain_bonus` ports, so the engine
//! never sees a database type.
//!
//! - **definitions**: the versioned add-on catalog
//! - **visits**: visits, patients, facilities and staff (read side)
//! - **history**: calculation history, written inside a transaction
//! - **billing_codes**: billing code suggestions per add-on code
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PostgresHistoryAdapter, MIGRATOR};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/bonus")).await?;
//! MIGRATOR.run(&pool).await?;
//! let history = PostgresHistoryAdapter::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::{
    PostgresBillingCodeAdapter, PostgresDefinitionAdapter, PostgresHistoryAdapter,
    PostgresHistoryTransaction, PostgresVisitAdapter,
};
pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, DatabaseConfig, DatabasePool};

/// Embedded schema migrations
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

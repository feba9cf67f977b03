//! Domain Adapters
//!
//! PostgreSQL implementations of the `domain_bonus` ports. Each adapter
//! wraps one repository, converts `DatabaseError` into `PortError`, and
//! reports its health through a `SELECT 1` probe on the pool.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresVisitAdapter;
//! use domain_bonus::ports::VisitRecordPort;
//!
//! let adapter = PostgresVisitAdapter::new(pool);
//! let visit = adapter.get_visit(visit_id).await?;
//! ```

pub mod billing;
pub mod definition;
pub mod history;
pub mod visit;

pub use billing::PostgresBillingCodeAdapter;
pub use definition::PostgresDefinitionAdapter;
pub use history::{PostgresHistoryAdapter, PostgresHistoryTransaction};
pub use visit::PostgresVisitAdapter;

use sqlx::PgPool;

use core_kernel::HealthCheckResult;

/// Runs `SELECT 1` against the pool and reports the round trip
pub(crate) async fn probe(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = std::time::Instant::now();
    let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await;
    let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(_) => HealthCheckResult::healthy(adapter_id, latency_ms),
        Err(e) => HealthCheckResult::unhealthy(adapter_id, latency_ms, format!("Database error: {}", e)),
    }
}

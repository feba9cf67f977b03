//! Repository implementations
//!
//! Repositories hold the SQL for one aggregate each and map between
//! database rows and domain records.
//!
//! # Conventions
//!
//! - Queries use `sqlx::query_as` with `FromRow` row structs
//! - JSON documents (definition values, conditions, trails) live in JSONB
//!   columns and are decoded after the row is fetched, so one malformed
//!   document surfaces as a `SerializationError` for that row only
//! - Functions that must run inside a caller's transaction take a
//!   `PgExecutor` instead of using the pool

pub mod billing_codes;
pub mod definitions;
pub mod history;
pub mod visits;

pub use billing_codes::{BillingCodeRepository, BillingCodeRow};
pub use definitions::{DefinitionRepository, DefinitionRow};
pub use history::{HistoryRepository, HistoryRow};
pub use visits::{FacilityRow, PatientRow, StaffRow, VisitRepository, VisitRow};

use std::str::FromStr;

use crate::error::DatabaseError;

/// Parses a TEXT column holding a domain enum
pub(crate) fn parse_column<T>(column: &str, value: &str) -> Result<T, DatabaseError>
where
    T: FromStr,
{
    value
        .parse()
        .map_err(|_| DatabaseError::invalid_column(column, value))
}

/// Converts a COUNT(*) result to the u32 the ports expose
pub(crate) fn count_to_u32(count: i64) -> u32 {
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}

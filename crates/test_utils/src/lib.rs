//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! visit bonus test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built dates, ids and a standard add-on catalog
//! - `builders`: Builder patterns for visit, patient, facility and staff records
//! - `scenario`: An in-memory store pre-wired into a `BonusService`
//! - `database`: Database test helpers and container management
//! - `assertions`: Assertion helpers for calculation outcomes
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod scenario;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use scenario::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;

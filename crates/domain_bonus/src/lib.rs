//! Visit Bonus (Add-on) Calculation Domain
//!
//! Given one completed visit, this crate decides which billing add-ons
//! apply, computes the points of each, enforces combination constraints
//! between add-ons and persists an auditable calculation trail.
//!
//! # Architecture
//!
//! The domain layer depends only on port traits; storage lives in `infra_db`
//! (PostgreSQL) or in the in-memory adapters behind the `mock` feature.
//!
//! - **Definitions**: versioned add-on rules with validity windows and scope
//! - **Selector**: effective definitions for a visit date, facility and category
//! - **Conditions**: declarative gates, some backed by historical lookups
//! - **Patterns**: variable point values (time bucket, duration, age, ...)
//! - **Combination**: allow-list / deny-list checks against accepted codes
//! - **Calculator**: dependency-ordered evaluation producing results and skips
//! - **History**: transactional replacement that keeps operator link decisions
//!
//! # Calculation Flow
//!
//! ```text
//! ContextAssembler -> BonusCalculator -> DefinitionSelector
//!        for each candidate (dependency + priority order):
//!            combination gate -> condition gates -> pattern value
//!        -> CalculationOutcome -> HistoryPersister (when saving)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_bonus::{BonusService, EngineSettings};
//!
//! let service = BonusService::new(definitions, visits, history, billing, EngineSettings::default());
//! let calculation = service.calculate_visit(visit_id, true).await?;
//! for result in &calculation.outcome.results {
//!     println!("{} {} points", result.code, result.points);
//! }
//! ```

pub mod definition;
pub mod records;
pub mod context;
pub mod settings;
pub mod selector;
pub mod condition;
pub mod pattern;
pub mod combination;
pub mod calculator;
pub mod history;
pub mod assembler;
pub mod services;
pub mod ports;
pub mod error;

#[cfg(any(test, feature = "mock"))]
pub mod memory;

pub use definition::{AddOnDefinition, ConditionSpec, InsuranceCategory, ValueType};
pub use records::{FacilityRecord, PatientRecord, StaffRecord, VisitRecord, VisitStatus};
pub use context::{CalculationContext, CalculationContextBuilder, FacilityCapabilities, TimeBucket, VisitFlags};
pub use settings::EngineSettings;
pub use selector::{select_definitions, DefinitionSelector};
pub use condition::{ComparisonOperator, ConditionEvaluator, ConditionKind, ConditionOutcome, EvaluationScope};
pub use pattern::{PatternEvaluator, PatternKind, PatternOutcome};
pub use combination::{check_combination, CombinationCheck};
pub use calculator::{
    dependency_order, BonusCalculator, CalculationOutcome, CalculationResult, CalculationTrail,
    ConditionTrace, SkipReason, SkippedDefinition,
};
pub use history::{CalculationHistoryRecord, HistoryPersister, LinkState};
pub use assembler::ContextAssembler;
pub use services::{BatchSummary, BonusService, VisitCalculation, VisitFailure};
pub use ports::{
    BillingCodePort, DefinitionPort, HistoryPort, HistoryTransaction, VisitQuery, VisitRecordPort,
};
pub use error::BonusError;

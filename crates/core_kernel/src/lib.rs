//! Core Kernel - Foundational types for the visit bonus engine
//!
//! This crate provides the building blocks used across the workspace:
//! - Strongly-typed identifiers for visits, patients, facilities and rules
//! - Date helpers for validity windows, calendar months and civic time
//! - Port abstractions shared by every adapter

pub mod temporal;
pub mod identifiers;
pub mod ports;

pub use temporal::{DateRange, ValidityWindow, Timezone, TemporalError};
pub use identifiers::{
    VisitId, PatientId, FacilityId, StaffId, SiteId,
    DefinitionId, HistoryId,
};
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};

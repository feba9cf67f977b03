//! Read-side records supplied by the visit, patient, facility and staff stores
//!
//! These are the shapes the engine needs from collaborating systems, not
//! the full records those systems keep.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{FacilityId, PatientId, SiteId, StaffId, Timezone, VisitId};

use crate::definition::InsuranceCategory;

/// Lifecycle status of a visit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Scheduled,
    Completed,
    Reviewed,
    Cancelled,
}

impl VisitStatus {
    /// Completed and reviewed visits count toward billing
    pub fn is_billable(&self) -> bool {
        matches!(self, VisitStatus::Completed | VisitStatus::Reviewed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Scheduled => "scheduled",
            VisitStatus::Completed => "completed",
            VisitStatus::Reviewed => "reviewed",
            VisitStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses that count toward billing
    pub fn billable() -> Vec<VisitStatus> {
        vec![VisitStatus::Completed, VisitStatus::Reviewed]
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(VisitStatus::Scheduled),
            "completed" => Ok(VisitStatus::Completed),
            "reviewed" => Ok(VisitStatus::Reviewed),
            "cancelled" => Ok(VisitStatus::Cancelled),
            other => Err(format!("unknown visit status: {other}")),
        }
    }
}

/// A recorded visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: VisitId,
    pub patient_id: PatientId,
    pub facility_id: FacilityId,
    pub staff_id: Option<StaffId>,
    pub visit_date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: VisitStatus,
    pub is_deleted: bool,
    pub has_collaboration_note: bool,
    pub is_terminal_care: bool,
    pub is_emergency: bool,
}

impl VisitRecord {
    /// True when the visit may be calculated and counted
    pub fn is_calculable(&self) -> bool {
        !self.is_deleted && self.status.is_billable()
    }
}

/// Patient attributes relevant to add-on rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: PatientId,
    pub birth_date: NaiveDate,
    pub site_id: Option<SiteId>,
    pub insurance_category: InsuranceCategory,
    #[serde(default)]
    pub special_management: Vec<String>,
    pub discharge_date: Option<NaiveDate>,
    pub plan_start_date: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
    pub death_location: Option<String>,
}

/// Facility capabilities relevant to add-on rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub id: FacilityId,
    pub name: String,
    /// None means the engine default zone applies
    pub timezone: Option<Timezone>,
    pub support_24h: bool,
    pub enhanced_24h: bool,
    pub emergency_support: bool,
    pub emergency_enhanced: bool,
    #[serde(default)]
    pub burden_reduction_measures: Vec<String>,
}

/// Staff attributes relevant to add-on rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffRecord {
    pub id: StaffId,
    pub name: String,
    #[serde(default)]
    pub qualifications: Vec<String>,
}

//! Calculation context
//!
//! Everything the engine knows about one visit, assembled once before
//! evaluation and only ever read afterwards. Evaluators receive a shared
//! reference, so no rule can change what the next rule sees.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use core_kernel::{FacilityId, PatientId, SiteId, StaffId, Timezone, VisitId};

use crate::definition::InsuranceCategory;
use crate::error::BonusError;

/// Derived per-visit facts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitFlags {
    /// The visit is the patient's second (or later) calculable visit of the day
    pub second_visit: bool,
    /// The visit date equals the patient's hospital discharge date
    pub discharge_date: bool,
    /// No calculable visit precedes this one since the care plan started
    pub first_visit_of_plan: bool,
    pub collaboration_note: bool,
    pub terminal_care: bool,
    pub emergency: bool,
}

/// What the facility is registered to provide
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityCapabilities {
    pub support_24h: bool,
    pub enhanced_24h: bool,
    pub emergency_support: bool,
    pub emergency_enhanced: bool,
    pub burden_reduction_measures: Vec<String>,
}

/// Local time-of-day bucket of a visit start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    /// [22:00, 06:00)
    LateNight,
    /// [06:00, 08:00)
    EarlyMorning,
    /// [18:00, 22:00)
    Night,
    Daytime,
}

impl TimeBucket {
    /// Classifies a local wall-clock time
    pub fn of(time: NaiveTime) -> Self {
        match time.hour() {
            22..=23 | 0..=5 => TimeBucket::LateNight,
            6..=7 => TimeBucket::EarlyMorning,
            18..=21 => TimeBucket::Night,
            _ => TimeBucket::Daytime,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBucket::LateNight => "late_night",
            TimeBucket::EarlyMorning => "early_morning",
            TimeBucket::Night => "night",
            TimeBucket::Daytime => "daytime",
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "late_night" => Ok(TimeBucket::LateNight),
            "early_morning" => Ok(TimeBucket::EarlyMorning),
            "night" => Ok(TimeBucket::Night),
            "daytime" => Ok(TimeBucket::Daytime),
            other => Err(format!("unknown time bucket: {other}")),
        }
    }
}

/// Immutable snapshot of one visit for rule evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationContext {
    pub visit_id: VisitId,
    pub patient_id: PatientId,
    pub facility_id: FacilityId,
    pub staff_id: Option<StaffId>,
    pub visit_date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Zone used to derive local wall-clock time
    pub timezone: Timezone,
    pub insurance_category: InsuranceCategory,
    /// Whole years on the visit date
    pub patient_age: u32,
    pub site_id: Option<SiteId>,
    /// 1-based position among the patient's calculable visits that day
    pub visit_ordinal: u32,
    pub flags: VisitFlags,
    pub facility: FacilityCapabilities,
    pub date_of_death: Option<NaiveDate>,
    pub death_location: Option<String>,
    pub special_management: Vec<String>,
    pub staff_qualifications: Vec<String>,
}

impl CalculationContext {
    /// Starts a builder with the required identity fields
    pub fn builder(
        visit_id: VisitId,
        patient_id: PatientId,
        facility_id: FacilityId,
        visit_date: NaiveDate,
    ) -> CalculationContextBuilder {
        CalculationContextBuilder::new(visit_id, patient_id, facility_id, visit_date)
    }

    /// Whole minutes between start and end, if both are recorded
    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_minutes()),
            _ => None,
        }
    }

    /// Local wall-clock start time
    pub fn local_start_time(&self) -> Option<NaiveTime> {
        self.start_time.map(|start| self.timezone.local_time(start))
    }

    pub fn time_bucket(&self) -> Option<TimeBucket> {
        self.local_start_time().map(TimeBucket::of)
    }

    /// Looks up a named field for generic conditions
    ///
    /// Returns `None` when the name is not a known field and `Some(Value::Null)`
    /// when the field is known but absent.
    pub fn field_value(&self, name: &str) -> Option<Value> {
        let value = match name {
            "visit_id" => json!(self.visit_id),
            "patient_id" => json!(self.patient_id),
            "facility_id" => json!(self.facility_id),
            "staff_id" => json!(self.staff_id),
            "visit_date" => json!(self.visit_date),
            "start_time" => json!(self.start_time),
            "end_time" => json!(self.end_time),
            "duration_minutes" => json!(self.duration_minutes()),
            "time_bucket" => json!(self.time_bucket().map(|b| b.as_str())),
            "timezone" => json!(self.timezone.name()),
            "insurance_category" => json!(self.insurance_category.as_str()),
            "patient_age" => json!(self.patient_age),
            "site_id" => json!(self.site_id),
            "visit_ordinal" => json!(self.visit_ordinal),
            "second_visit" => json!(self.flags.second_visit),
            "discharge_date" => json!(self.flags.discharge_date),
            "first_visit_of_plan" => json!(self.flags.first_visit_of_plan),
            "collaboration_note" => json!(self.flags.collaboration_note),
            "terminal_care" => json!(self.flags.terminal_care),
            "emergency" => json!(self.flags.emergency),
            "support_24h" => json!(self.facility.support_24h),
            "enhanced_24h" => json!(self.facility.enhanced_24h),
            "emergency_support" => json!(self.facility.emergency_support),
            "emergency_enhanced" => json!(self.facility.emergency_enhanced),
            "burden_reduction_measures" => json!(self.facility.burden_reduction_measures),
            "date_of_death" => json!(self.date_of_death),
            "death_location" => json!(self.death_location),
            "special_management" => json!(self.special_management),
            "staff_qualifications" => json!(self.staff_qualifications),
            _ => return None,
        };
        Some(value)
    }
}

/// Builder for [`CalculationContext`]
#[derive(Debug, Clone)]
pub struct CalculationContextBuilder {
    context: CalculationContext,
}

impl CalculationContextBuilder {
    pub fn new(
        visit_id: VisitId,
        patient_id: PatientId,
        facility_id: FacilityId,
        visit_date: NaiveDate,
    ) -> Self {
        Self {
            context: CalculationContext {
                visit_id,
                patient_id,
                facility_id,
                staff_id: None,
                visit_date,
                start_time: None,
                end_time: None,
                timezone: Timezone::default(),
                insurance_category: InsuranceCategory::Medical,
                patient_age: 0,
                site_id: None,
                visit_ordinal: 1,
                flags: VisitFlags::default(),
                facility: FacilityCapabilities::default(),
                date_of_death: None,
                death_location: None,
                special_management: Vec::new(),
                staff_qualifications: Vec::new(),
            },
        }
    }

    pub fn staff(mut self, staff_id: StaffId) -> Self {
        self.context.staff_id = Some(staff_id);
        self
    }

    pub fn times(mut self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        self.context.start_time = Some(start);
        self.context.end_time = end;
        self
    }

    pub fn timezone(mut self, timezone: Timezone) -> Self {
        self.context.timezone = timezone;
        self
    }

    pub fn insurance_category(mut self, category: InsuranceCategory) -> Self {
        self.context.insurance_category = category;
        self
    }

    pub fn patient_age(mut self, age: u32) -> Self {
        self.context.patient_age = age;
        self
    }

    pub fn site(mut self, site_id: Option<SiteId>) -> Self {
        self.context.site_id = site_id;
        self
    }

    pub fn visit_ordinal(mut self, ordinal: u32) -> Self {
        self.context.visit_ordinal = ordinal;
        self.context.flags.second_visit = ordinal >= 2;
        self
    }

    pub fn flags(mut self, flags: VisitFlags) -> Self {
        self.context.flags = flags;
        self
    }

    pub fn facility(mut self, capabilities: FacilityCapabilities) -> Self {
        self.context.facility = capabilities;
        self
    }

    pub fn death(mut self, date_of_death: NaiveDate, location: Option<String>) -> Self {
        self.context.date_of_death = Some(date_of_death);
        self.context.death_location = location;
        self
    }

    pub fn special_management(mut self, categories: Vec<String>) -> Self {
        self.context.special_management = categories;
        self
    }

    pub fn staff_qualifications(mut self, qualifications: Vec<String>) -> Self {
        self.context.staff_qualifications = qualifications;
        self
    }

    /// Validates and returns the context
    pub fn build(self) -> Result<CalculationContext, BonusError> {
        let context = self.context;

        if context.visit_ordinal == 0 {
            return Err(BonusError::invalid_context("visit ordinal is 1-based"));
        }
        match (context.start_time, context.end_time) {
            (None, Some(_)) => {
                return Err(BonusError::invalid_context("end time recorded without start time"));
            }
            (Some(start), Some(end)) if end < start => {
                return Err(BonusError::invalid_context(format!(
                    "end time {end} precedes start time {start}"
                )));
            }
            _ => {}
        }

        Ok(context)
    }
}

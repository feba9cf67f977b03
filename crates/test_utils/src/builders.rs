//! Test Data Builders
//!
//! Builder patterns for the records the engine reads. Tests specify only
//! the relevant fields and get sensible defaults for everything else.

use chrono::{DateTime, NaiveDate, Utc};

use core_kernel::{FacilityId, PatientId, SiteId, StaffId, Timezone, VisitId};
use domain_bonus::{
    FacilityRecord, InsuranceCategory, PatientRecord, StaffRecord, VisitRecord, VisitStatus,
};

use crate::fixtures::TemporalFixtures;

/// Builder for visit records
#[derive(Debug, Clone)]
pub struct VisitRecordBuilder {
    visit: VisitRecord,
}

impl VisitRecordBuilder {
    /// A completed daytime visit (10:00-10:45 Tokyo) on the standard date
    pub fn new(patient_id: PatientId, facility_id: FacilityId) -> Self {
        let date = TemporalFixtures::visit_date();
        Self {
            visit: VisitRecord {
                id: VisitId::new(),
                patient_id,
                facility_id,
                staff_id: None,
                visit_date: date,
                start_time: Some(TemporalFixtures::tokyo_time(date, 10, 0)),
                end_time: Some(TemporalFixtures::tokyo_time(date, 10, 45)),
                status: VisitStatus::Completed,
                is_deleted: false,
                has_collaboration_note: false,
                is_terminal_care: false,
                is_emergency: false,
            },
        }
    }

    pub fn with_id(mut self, id: VisitId) -> Self {
        self.visit.id = id;
        self
    }

    /// Moves the visit to another date, keeping its Tokyo wall-clock times
    pub fn on(mut self, date: NaiveDate) -> Self {
        let shift = date - self.visit.visit_date;
        self.visit.visit_date = date;
        self.visit.start_time = self.visit.start_time.map(|t| t + shift);
        self.visit.end_time = self.visit.end_time.map(|t| t + shift);
        self
    }

    /// Sets Tokyo start time and duration in minutes
    pub fn at(mut self, hour: u32, minute: u32, minutes: i64) -> Self {
        let start = TemporalFixtures::tokyo_time(self.visit.visit_date, hour, minute);
        self.visit.start_time = Some(start);
        self.visit.end_time = Some(start + chrono::Duration::minutes(minutes));
        self
    }

    pub fn times(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.visit.start_time = start;
        self.visit.end_time = end;
        self
    }

    pub fn status(mut self, status: VisitStatus) -> Self {
        self.visit.status = status;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.visit.is_deleted = true;
        self
    }

    pub fn staff(mut self, staff_id: StaffId) -> Self {
        self.visit.staff_id = Some(staff_id);
        self
    }

    pub fn emergency(mut self) -> Self {
        self.visit.is_emergency = true;
        self
    }

    pub fn terminal_care(mut self) -> Self {
        self.visit.is_terminal_care = true;
        self
    }

    pub fn collaboration_note(mut self) -> Self {
        self.visit.has_collaboration_note = true;
        self
    }

    pub fn build(self) -> VisitRecord {
        self.visit
    }
}

/// Builder for patient records
#[derive(Debug, Clone)]
pub struct PatientRecordBuilder {
    patient: PatientRecord,
}

impl Default for PatientRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PatientRecordBuilder {
    /// A 79-year-old medical-insurance patient without site assignment
    pub fn new() -> Self {
        Self {
            patient: PatientRecord {
                id: PatientId::new(),
                birth_date: TemporalFixtures::date(1945, 1, 20),
                site_id: None,
                insurance_category: InsuranceCategory::Medical,
                special_management: Vec::new(),
                discharge_date: None,
                plan_start_date: None,
                date_of_death: None,
                death_location: None,
            },
        }
    }

    pub fn with_id(mut self, id: PatientId) -> Self {
        self.patient.id = id;
        self
    }

    pub fn born(mut self, birth_date: NaiveDate) -> Self {
        self.patient.birth_date = birth_date;
        self
    }

    pub fn site(mut self, site_id: SiteId) -> Self {
        self.patient.site_id = Some(site_id);
        self
    }

    pub fn category(mut self, category: InsuranceCategory) -> Self {
        self.patient.insurance_category = category;
        self
    }

    pub fn special_management(mut self, category: impl Into<String>) -> Self {
        self.patient.special_management.push(category.into());
        self
    }

    pub fn discharged(mut self, date: NaiveDate) -> Self {
        self.patient.discharge_date = Some(date);
        self
    }

    pub fn plan_started(mut self, date: NaiveDate) -> Self {
        self.patient.plan_start_date = Some(date);
        self
    }

    pub fn died(mut self, date: NaiveDate, location: impl Into<String>) -> Self {
        self.patient.date_of_death = Some(date);
        self.patient.death_location = Some(location.into());
        self
    }

    pub fn build(self) -> PatientRecord {
        self.patient
    }
}

/// Builder for facility records
#[derive(Debug, Clone)]
pub struct FacilityRecordBuilder {
    facility: FacilityRecord,
}

impl Default for FacilityRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FacilityRecordBuilder {
    /// A Tokyo facility registered for emergency support
    pub fn new() -> Self {
        Self {
            facility: FacilityRecord {
                id: FacilityId::new(),
                name: "Test Home Nursing Station".to_string(),
                timezone: Some(TemporalFixtures::tokyo()),
                support_24h: true,
                enhanced_24h: false,
                emergency_support: true,
                emergency_enhanced: false,
                burden_reduction_measures: Vec::new(),
            },
        }
    }

    pub fn with_id(mut self, id: FacilityId) -> Self {
        self.facility.id = id;
        self
    }

    pub fn timezone(mut self, timezone: Option<Timezone>) -> Self {
        self.facility.timezone = timezone;
        self
    }

    pub fn emergency_support(mut self, enabled: bool) -> Self {
        self.facility.emergency_support = enabled;
        self
    }

    pub fn emergency_enhanced(mut self, enabled: bool) -> Self {
        self.facility.emergency_enhanced = enabled;
        self
    }

    pub fn enhanced_24h(mut self, enabled: bool) -> Self {
        self.facility.enhanced_24h = enabled;
        self
    }

    pub fn burden_reduction(mut self, measure: impl Into<String>) -> Self {
        self.facility.burden_reduction_measures.push(measure.into());
        self
    }

    pub fn build(self) -> FacilityRecord {
        self.facility
    }
}

/// Creates a staff record with the given qualifications
pub fn staff_with(qualifications: &[&str]) -> StaffRecord {
    StaffRecord {
        id: StaffId::new(),
        name: "Test Nurse".to_string(),
        qualifications: qualifications.iter().map(|q| q.to_string()).collect(),
    }
}

//! Context assembly
//!
//! Builds the [`CalculationContext`] of one visit from the visit, patient,
//! facility and staff records plus the patient's other visits.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, instrument};

use core_kernel::{DateRange, VisitId};

use crate::context::{CalculationContext, FacilityCapabilities, VisitFlags};
use crate::error::BonusError;
use crate::ports::{VisitQuery, VisitRecordPort};
use crate::records::VisitRecord;
use crate::settings::EngineSettings;

/// Whole years between birth and the given date, birthday-aware
///
/// A 29 February birthday is reached on 1 March in non-leap years.
pub fn age_on(birth_date: NaiveDate, on: NaiveDate) -> u32 {
    if on < birth_date {
        return 0;
    }
    let mut years = on.year() - birth_date.year();
    if (on.month(), on.day()) < (birth_date.month(), birth_date.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// Chronological key: start time (unrecorded last), then id
fn chronological_key(visit: &VisitRecord) -> (bool, Option<chrono::DateTime<chrono::Utc>>, VisitId) {
    (visit.start_time.is_none(), visit.start_time, visit.id)
}

/// 1-based position of `visit` among the same-day visits
pub fn visit_ordinal(visit: &VisitRecord, same_day: &[VisitRecord]) -> u32 {
    let key = chronological_key(visit);
    let earlier = same_day
        .iter()
        .filter(|v| v.id != visit.id && chronological_key(v) < key)
        .count();
    earlier as u32 + 1
}

/// Assembles calculation contexts from the visit store
#[derive(Clone)]
pub struct ContextAssembler {
    visits: Arc<dyn VisitRecordPort>,
    settings: EngineSettings,
}

impl ContextAssembler {
    pub fn new(visits: Arc<dyn VisitRecordPort>, settings: EngineSettings) -> Self {
        Self { visits, settings }
    }

    /// Builds the context of a calculable visit
    #[instrument(skip(self), fields(visit_id = %visit_id))]
    pub async fn assemble(&self, visit_id: VisitId) -> Result<CalculationContext, BonusError> {
        let visit = self.visits.get_visit(visit_id).await.map_err(BonusError::Lookup)?;
        self.assemble_for(&visit).await
    }

    /// Builds the context of an already-loaded visit
    pub async fn assemble_for(&self, visit: &VisitRecord) -> Result<CalculationContext, BonusError> {
        if visit.is_deleted {
            return Err(BonusError::NotCalculable {
                visit_id: visit.id,
                reason: "visit is deleted".to_string(),
            });
        }
        if !visit.status.is_billable() {
            return Err(BonusError::NotCalculable {
                visit_id: visit.id,
                reason: format!("visit status is {}", visit.status),
            });
        }

        let patient = self
            .visits
            .get_patient(visit.patient_id)
            .await
            .map_err(BonusError::Lookup)?;
        let facility = self
            .visits
            .get_facility(visit.facility_id)
            .await
            .map_err(BonusError::Lookup)?;
        let staff_qualifications = match visit.staff_id {
            Some(staff_id) => {
                self.visits
                    .get_staff(staff_id)
                    .await
                    .map_err(BonusError::Lookup)?
                    .qualifications
            }
            None => Vec::new(),
        };

        let same_day = self
            .visits
            .list_patient_visits(&VisitQuery::billable(
                patient.id,
                DateRange::single_day(visit.visit_date),
            ))
            .await
            .map_err(BonusError::Lookup)?;
        let ordinal = visit_ordinal(visit, &same_day);

        let first_visit_of_plan = match patient.plan_start_date {
            Some(plan_start) if plan_start <= visit.visit_date => {
                let since_plan = self
                    .visits
                    .list_patient_visits(&VisitQuery::billable(
                        patient.id,
                        DateRange::new(plan_start, visit.visit_date)?,
                    ))
                    .await
                    .map_err(BonusError::Lookup)?;
                !since_plan.iter().any(|v| {
                    v.id != visit.id
                        && (v.visit_date < visit.visit_date
                            || (v.visit_date == visit.visit_date
                                && chronological_key(v) < chronological_key(visit)))
                })
            }
            _ => false,
        };

        let flags = VisitFlags {
            second_visit: ordinal >= 2,
            discharge_date: patient.discharge_date == Some(visit.visit_date),
            first_visit_of_plan,
            collaboration_note: visit.has_collaboration_note,
            terminal_care: visit.is_terminal_care,
            emergency: visit.is_emergency,
        };
        let capabilities = FacilityCapabilities {
            support_24h: facility.support_24h,
            enhanced_24h: facility.enhanced_24h,
            emergency_support: facility.emergency_support,
            emergency_enhanced: facility.emergency_enhanced,
            burden_reduction_measures: facility.burden_reduction_measures.clone(),
        };

        let mut builder = CalculationContext::builder(
            visit.id,
            patient.id,
            facility.id,
            visit.visit_date,
        )
        .timezone(facility.timezone.unwrap_or(self.settings.default_timezone))
        .insurance_category(patient.insurance_category)
        .patient_age(age_on(patient.birth_date, visit.visit_date))
        .site(patient.site_id)
        .visit_ordinal(ordinal)
        .flags(flags)
        .facility(capabilities)
        .special_management(patient.special_management.clone())
        .staff_qualifications(staff_qualifications);

        if let Some(staff_id) = visit.staff_id {
            builder = builder.staff(staff_id);
        }
        if let Some(start) = visit.start_time {
            builder = builder.times(start, visit.end_time);
        }
        if let Some(date_of_death) = patient.date_of_death {
            builder = builder.death(date_of_death, patient.death_location.clone());
        }

        let context = builder.build()?;
        debug!(
            ordinal = context.visit_ordinal,
            age = context.patient_age,
            timezone = context.timezone.name(),
            "Context assembled"
        );
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_before_and_on_birthday() {
        let birth = date(2018, 6, 10);
        assert_eq!(age_on(birth, date(2024, 6, 9)), 5);
        assert_eq!(age_on(birth, date(2024, 6, 10)), 6);
    }

    #[test]
    fn test_age_leap_day_birth() {
        let birth = date(2020, 2, 29);
        assert_eq!(age_on(birth, date(2023, 2, 28)), 2);
        assert_eq!(age_on(birth, date(2023, 3, 1)), 3);
        assert_eq!(age_on(birth, date(2024, 2, 29)), 4);
    }

    #[test]
    fn test_age_before_birth_is_zero() {
        assert_eq!(age_on(date(2024, 1, 1), date(2023, 1, 1)), 0);
    }
}

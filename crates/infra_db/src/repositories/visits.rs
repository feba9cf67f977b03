//! Visit record repository
//!
//! Read access to visits and the patient, facility and staff records the
//! calculation context is assembled from. The insert helpers exist for
//! seeding and integration tests; visit capture itself is owned elsewhere.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{DateRange, FacilityId, PatientId, SiteId, StaffId, Timezone, VisitId};
use domain_bonus::ports::VisitQuery;
use domain_bonus::{FacilityRecord, PatientRecord, StaffRecord, VisitRecord, VisitStatus};

use super::{count_to_u32, parse_column};
use crate::error::DatabaseError;

const SELECT_VISIT: &str = r#"
    SELECT
        visit_id, patient_id, facility_id, staff_id, visit_date, start_time, end_time,
        status, is_deleted, has_collaboration_note, is_terminal_care, is_emergency
    FROM visits
"#;

/// Row from `visits`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VisitRow {
    pub visit_id: Uuid,
    pub patient_id: Uuid,
    pub facility_id: Uuid,
    pub staff_id: Option<Uuid>,
    pub visit_date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: String,
    pub is_deleted: bool,
    pub has_collaboration_note: bool,
    pub is_terminal_care: bool,
    pub is_emergency: bool,
}

impl TryFrom<VisitRow> for VisitRecord {
    type Error = DatabaseError;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        Ok(VisitRecord {
            id: VisitId::from_uuid(row.visit_id),
            patient_id: PatientId::from_uuid(row.patient_id),
            facility_id: FacilityId::from_uuid(row.facility_id),
            staff_id: row.staff_id.map(StaffId::from_uuid),
            visit_date: row.visit_date,
            start_time: row.start_time,
            end_time: row.end_time,
            status: parse_column("visits.status", &row.status)?,
            is_deleted: row.is_deleted,
            has_collaboration_note: row.has_collaboration_note,
            is_terminal_care: row.is_terminal_care,
            is_emergency: row.is_emergency,
        })
    }
}

/// Row from `patients`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PatientRow {
    pub patient_id: Uuid,
    pub birth_date: NaiveDate,
    pub site_id: Option<Uuid>,
    pub insurance_category: String,
    pub special_management: Vec<String>,
    pub discharge_date: Option<NaiveDate>,
    pub plan_start_date: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
    pub death_location: Option<String>,
}

impl TryFrom<PatientRow> for PatientRecord {
    type Error = DatabaseError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        Ok(PatientRecord {
            id: PatientId::from_uuid(row.patient_id),
            birth_date: row.birth_date,
            site_id: row.site_id.map(SiteId::from_uuid),
            insurance_category: parse_column("patients.insurance_category", &row.insurance_category)?,
            special_management: row.special_management,
            discharge_date: row.discharge_date,
            plan_start_date: row.plan_start_date,
            date_of_death: row.date_of_death,
            death_location: row.death_location,
        })
    }
}

/// Row from `facilities`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FacilityRow {
    pub facility_id: Uuid,
    pub name: String,
    pub timezone: Option<String>,
    pub support_24h: bool,
    pub enhanced_24h: bool,
    pub emergency_support: bool,
    pub emergency_enhanced: bool,
    pub burden_reduction_measures: Vec<String>,
}

impl TryFrom<FacilityRow> for FacilityRecord {
    type Error = DatabaseError;

    fn try_from(row: FacilityRow) -> Result<Self, Self::Error> {
        let timezone = row
            .timezone
            .as_deref()
            .map(|tz| parse_column::<Timezone>("facilities.timezone", tz))
            .transpose()?;

        Ok(FacilityRecord {
            id: FacilityId::from_uuid(row.facility_id),
            name: row.name,
            timezone,
            support_24h: row.support_24h,
            enhanced_24h: row.enhanced_24h,
            emergency_support: row.emergency_support,
            emergency_enhanced: row.emergency_enhanced,
            burden_reduction_measures: row.burden_reduction_measures,
        })
    }
}

/// Row from `staff`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StaffRow {
    pub staff_id: Uuid,
    pub name: String,
    pub qualifications: Vec<String>,
}

impl From<StaffRow> for StaffRecord {
    fn from(row: StaffRow) -> Self {
        StaffRecord {
            id: StaffId::from_uuid(row.staff_id),
            name: row.name,
            qualifications: row.qualifications,
        }
    }
}

fn status_labels(statuses: &[VisitStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Repository for visits and their reference records
#[derive(Debug, Clone)]
pub struct VisitRepository {
    pool: PgPool,
}

impl VisitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_visit(&self, id: VisitId) -> Result<VisitRecord, DatabaseError> {
        sqlx::query_as::<_, VisitRow>(&format!("{SELECT_VISIT} WHERE visit_id = $1"))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Visit", id))?
            .try_into()
    }

    pub async fn get_patient(&self, id: PatientId) -> Result<PatientRecord, DatabaseError> {
        sqlx::query_as::<_, PatientRow>(
            r#"
            SELECT
                patient_id, birth_date, site_id, insurance_category, special_management,
                discharge_date, plan_start_date, date_of_death, death_location
            FROM patients
            WHERE patient_id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Patient", id))?
        .try_into()
    }

    pub async fn get_facility(&self, id: FacilityId) -> Result<FacilityRecord, DatabaseError> {
        sqlx::query_as::<_, FacilityRow>(
            r#"
            SELECT
                facility_id, name, timezone, support_24h, enhanced_24h,
                emergency_support, emergency_enhanced, burden_reduction_measures
            FROM facilities
            WHERE facility_id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Facility", id))?
        .try_into()
    }

    pub async fn get_staff(&self, id: StaffId) -> Result<StaffRecord, DatabaseError> {
        let row = sqlx::query_as::<_, StaffRow>(
            "SELECT staff_id, name, qualifications FROM staff WHERE staff_id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Staff", id))?;

        Ok(row.into())
    }

    /// Visits of a patient matching the query, in chronological order
    pub async fn list_patient_visits(&self, query: &VisitQuery) -> Result<Vec<VisitRecord>, DatabaseError> {
        sqlx::query_as::<_, VisitRow>(&format!(
            r#"{SELECT_VISIT}
            WHERE patient_id = $1
              AND visit_date BETWEEN $2 AND $3
              AND ($4 OR NOT is_deleted)
              AND (cardinality($5::text[]) = 0 OR status = ANY($5))
            ORDER BY visit_date, start_time NULLS LAST, visit_id"#
        ))
        .bind(*query.patient_id.as_uuid())
        .bind(query.range.start)
        .bind(query.range.end)
        .bind(query.include_deleted)
        .bind(status_labels(&query.statuses))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(VisitRecord::try_from)
        .collect()
    }

    /// Distinct site patients with a billable visit at the facility that day
    pub async fn count_site_patients(
        &self,
        visit_date: NaiveDate,
        facility_id: FacilityId,
        site_id: SiteId,
    ) -> Result<u32, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT v.patient_id)
            FROM visits v
            JOIN patients p ON p.patient_id = v.patient_id
            WHERE v.visit_date = $1
              AND v.facility_id = $2
              AND p.site_id = $3
              AND NOT v.is_deleted
              AND v.status = ANY($4)
            "#,
        )
        .bind(visit_date)
        .bind(*facility_id.as_uuid())
        .bind(*site_id.as_uuid())
        .bind(status_labels(&VisitStatus::billable()))
        .fetch_one(&self.pool)
        .await?;

        Ok(count_to_u32(count))
    }

    /// Billable, non-deleted visits of the facility in the range
    pub async fn list_facility_visits(
        &self,
        facility_id: FacilityId,
        range: DateRange,
    ) -> Result<Vec<VisitRecord>, DatabaseError> {
        sqlx::query_as::<_, VisitRow>(&format!(
            r#"{SELECT_VISIT}
            WHERE facility_id = $1
              AND visit_date BETWEEN $2 AND $3
              AND NOT is_deleted
              AND status = ANY($4)
            ORDER BY visit_date, start_time NULLS LAST, visit_id"#
        ))
        .bind(*facility_id.as_uuid())
        .bind(range.start)
        .bind(range.end)
        .bind(status_labels(&VisitStatus::billable()))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(VisitRecord::try_from)
        .collect()
    }

    /// Inserts or replaces a visit
    pub async fn upsert_visit(&self, visit: &VisitRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO visits (
                visit_id, patient_id, facility_id, staff_id, visit_date, start_time, end_time,
                status, is_deleted, has_collaboration_note, is_terminal_care, is_emergency
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (visit_id) DO UPDATE SET
                staff_id = EXCLUDED.staff_id,
                visit_date = EXCLUDED.visit_date,
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time,
                status = EXCLUDED.status,
                is_deleted = EXCLUDED.is_deleted,
                has_collaboration_note = EXCLUDED.has_collaboration_note,
                is_terminal_care = EXCLUDED.is_terminal_care,
                is_emergency = EXCLUDED.is_emergency,
                updated_at = NOW()
            "#,
        )
        .bind(*visit.id.as_uuid())
        .bind(*visit.patient_id.as_uuid())
        .bind(*visit.facility_id.as_uuid())
        .bind(visit.staff_id.map(|s| *s.as_uuid()))
        .bind(visit.visit_date)
        .bind(visit.start_time)
        .bind(visit.end_time)
        .bind(visit.status.as_str())
        .bind(visit.is_deleted)
        .bind(visit.has_collaboration_note)
        .bind(visit.is_terminal_care)
        .bind(visit.is_emergency)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_patient(&self, patient: &PatientRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO patients (
                patient_id, birth_date, site_id, insurance_category, special_management,
                discharge_date, plan_start_date, date_of_death, death_location
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*patient.id.as_uuid())
        .bind(patient.birth_date)
        .bind(patient.site_id.map(|s| *s.as_uuid()))
        .bind(patient.insurance_category.as_str())
        .bind(&patient.special_management)
        .bind(patient.discharge_date)
        .bind(patient.plan_start_date)
        .bind(patient.date_of_death)
        .bind(&patient.death_location)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_facility(&self, facility: &FacilityRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO facilities (
                facility_id, name, timezone, support_24h, enhanced_24h,
                emergency_support, emergency_enhanced, burden_reduction_measures
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(*facility.id.as_uuid())
        .bind(&facility.name)
        .bind(facility.timezone.map(|tz| tz.name()))
        .bind(facility.support_24h)
        .bind(facility.enhanced_24h)
        .bind(facility.emergency_support)
        .bind(facility.emergency_enhanced)
        .bind(&facility.burden_reduction_measures)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_staff(&self, staff: &StaffRecord) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO staff (staff_id, name, qualifications) VALUES ($1, $2, $3)")
            .bind(*staff.id.as_uuid())
            .bind(&staff.name)
            .bind(&staff.qualifications)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

//! PostgreSQL adapter for visit records

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{
    DateRange, DomainPort, FacilityId, HealthCheckResult, HealthCheckable, PatientId, PortError,
    SiteId, StaffId, VisitId,
};
use domain_bonus::ports::{VisitQuery, VisitRecordPort};
use domain_bonus::{FacilityRecord, PatientRecord, StaffRecord, VisitRecord};

use super::probe;
use crate::repositories::VisitRepository;

/// PostgreSQL-backed implementation of `VisitRecordPort`
#[derive(Debug, Clone)]
pub struct PostgresVisitAdapter {
    repository: VisitRepository,
    pool: PgPool,
}

impl PostgresVisitAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: VisitRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn repository(&self) -> &VisitRepository {
        &self.repository
    }
}

impl DomainPort for PostgresVisitAdapter {}

#[async_trait]
impl HealthCheckable for PostgresVisitAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-visit-adapter").await
    }
}

#[async_trait]
impl VisitRecordPort for PostgresVisitAdapter {
    #[instrument(skip(self), fields(visit_id = %id))]
    async fn get_visit(&self, id: VisitId) -> Result<VisitRecord, PortError> {
        Ok(self.repository.get_visit(id).await?)
    }

    #[instrument(skip(self), fields(patient_id = %id))]
    async fn get_patient(&self, id: PatientId) -> Result<PatientRecord, PortError> {
        Ok(self.repository.get_patient(id).await?)
    }

    #[instrument(skip(self), fields(facility_id = %id))]
    async fn get_facility(&self, id: FacilityId) -> Result<FacilityRecord, PortError> {
        Ok(self.repository.get_facility(id).await?)
    }

    #[instrument(skip(self), fields(staff_id = %id))]
    async fn get_staff(&self, id: StaffId) -> Result<StaffRecord, PortError> {
        Ok(self.repository.get_staff(id).await?)
    }

    #[instrument(skip(self, query), fields(patient_id = %query.patient_id))]
    async fn list_patient_visits(&self, query: &VisitQuery) -> Result<Vec<VisitRecord>, PortError> {
        Ok(self.repository.list_patient_visits(query).await?)
    }

    #[instrument(skip(self))]
    async fn count_site_patients(
        &self,
        visit_date: NaiveDate,
        facility_id: FacilityId,
        site_id: SiteId,
    ) -> Result<u32, PortError> {
        Ok(self
            .repository
            .count_site_patients(visit_date, facility_id, site_id)
            .await?)
    }

    #[instrument(skip(self))]
    async fn list_facility_visits(
        &self,
        facility_id: FacilityId,
        range: DateRange,
    ) -> Result<Vec<VisitRecord>, PortError> {
        Ok(self.repository.list_facility_visits(facility_id, range).await?)
    }
}

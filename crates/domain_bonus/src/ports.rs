//! Bonus Domain Ports
//!
//! Port interfaces the engine needs from its surroundings, so the same
//! calculation runs against PostgreSQL (infra_db) or in-memory adapters.
//!
//! # Architecture
//!
//! - **DefinitionPort**: the versioned add-on rule catalog
//! - **VisitRecordPort**: visits, patients, facilities and staff (read only)
//! - **HistoryPort**: persisted calculation history, with a transactional
//!   write path used to replace a visit's rows atomically
//! - **BillingCodePort**: best-effort billing code suggestion
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_bonus::ports::VisitRecordPort;
//! use std::sync::Arc;
//!
//! pub struct ContextAssembler {
//!     visits: Arc<dyn VisitRecordPort>,
//! }
//!
//! impl ContextAssembler {
//!     pub async fn visit(&self, id: VisitId) -> Result<VisitRecord, PortError> {
//!         self.visits.get_visit(id).await
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;

use core_kernel::{
    DateRange, DefinitionId, DomainPort, FacilityId, HistoryId, PatientId, PortError, SiteId,
    StaffId, VisitId,
};

use crate::definition::{AddOnDefinition, InsuranceCategory};
use crate::history::{CalculationHistoryRecord, LinkState};
use crate::records::{FacilityRecord, PatientRecord, StaffRecord, VisitRecord, VisitStatus};

/// Query parameters for listing a patient's visits
#[derive(Debug, Clone)]
pub struct VisitQuery {
    pub patient_id: PatientId,
    /// Inclusive visit-date range
    pub range: DateRange,
    /// Allowed statuses; empty means any status
    pub statuses: Vec<VisitStatus>,
    pub include_deleted: bool,
}

impl VisitQuery {
    /// Completed and reviewed, non-deleted visits in the range
    pub fn billable(patient_id: PatientId, range: DateRange) -> Self {
        Self {
            patient_id,
            range,
            statuses: VisitStatus::billable(),
            include_deleted: false,
        }
    }

    /// Returns true if a visit satisfies this query
    pub fn matches(&self, visit: &VisitRecord) -> bool {
        visit.patient_id == self.patient_id
            && self.range.contains(visit.visit_date)
            && (self.include_deleted || !visit.is_deleted)
            && (self.statuses.is_empty() || self.statuses.contains(&visit.status))
    }
}

/// Port for the add-on definition catalog
#[async_trait]
pub trait DefinitionPort: DomainPort {
    /// Active definitions effective on the date for the facility (or global)
    /// and insurance category
    async fn find_effective(
        &self,
        visit_date: NaiveDate,
        facility_id: FacilityId,
        insurance_category: InsuranceCategory,
    ) -> Result<Vec<AddOnDefinition>, PortError>;

    async fn get_definition(&self, id: DefinitionId) -> Result<AddOnDefinition, PortError>;
}

/// Port for visit, patient, facility and staff lookups
#[async_trait]
pub trait VisitRecordPort: DomainPort {
    async fn get_visit(&self, id: VisitId) -> Result<VisitRecord, PortError>;

    async fn get_patient(&self, id: PatientId) -> Result<PatientRecord, PortError>;

    async fn get_facility(&self, id: FacilityId) -> Result<FacilityRecord, PortError>;

    async fn get_staff(&self, id: StaffId) -> Result<StaffRecord, PortError>;

    async fn list_patient_visits(&self, query: &VisitQuery) -> Result<Vec<VisitRecord>, PortError>;

    /// Distinct patients assigned to the site with a billable visit at the
    /// facility on the date
    async fn count_site_patients(
        &self,
        visit_date: NaiveDate,
        facility_id: FacilityId,
        site_id: SiteId,
    ) -> Result<u32, PortError>;

    /// Billable, non-deleted visits of the facility in the range
    async fn list_facility_visits(
        &self,
        facility_id: FacilityId,
        range: DateRange,
    ) -> Result<Vec<VisitRecord>, PortError>;
}

/// A unit of work replacing one visit's history rows
///
/// Nothing is visible to other readers until `commit`; dropping the
/// transaction discards every staged change.
#[async_trait]
pub trait HistoryTransaction: Send {
    async fn load_for_visit(
        &mut self,
        visit_id: VisitId,
    ) -> Result<Vec<CalculationHistoryRecord>, PortError>;

    async fn delete_for_visit(&mut self, visit_id: VisitId) -> Result<u64, PortError>;

    async fn insert(&mut self, record: &CalculationHistoryRecord) -> Result<(), PortError>;

    async fn commit(self: Box<Self>) -> Result<(), PortError>;
}

/// Port for persisted calculation history
#[async_trait]
pub trait HistoryPort: DomainPort {
    async fn begin(&self) -> Result<Box<dyn HistoryTransaction>, PortError>;

    async fn find_by_visit(&self, visit_id: VisitId) -> Result<Vec<CalculationHistoryRecord>, PortError>;

    /// Billable, non-deleted visits of the patient within `month`, other than
    /// `exclude_visit`, whose history carries `code`
    async fn count_monthly_occurrences(
        &self,
        patient_id: PatientId,
        code: &str,
        month: DateRange,
        exclude_visit: VisitId,
    ) -> Result<u32, PortError>;

    /// Overwrites the billing link of one history row
    async fn set_billing_link(
        &self,
        id: HistoryId,
        billing_code_id: Option<String>,
        link_state: LinkState,
    ) -> Result<CalculationHistoryRecord, PortError>;
}

/// Port for billing code suggestion
#[async_trait]
pub trait BillingCodePort: DomainPort {
    /// Suggests the billing code for an accepted add-on, if one is known
    async fn select_billing_code(
        &self,
        add_on_code: &str,
        insurance_category: InsuranceCategory,
        visit_date: NaiveDate,
    ) -> Result<Option<String>, PortError>;
}

//! In-memory adapters
//!
//! A single store implementing the definition, visit and history ports,
//! plus a static billing code table. Used by tests and local tooling; the
//! store can be told to fail commits or history lookups to exercise error
//! paths.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use core_kernel::{
    DateRange, DefinitionId, DomainPort, FacilityId, HealthCheckResult,
    HealthCheckable, HistoryId, PatientId, PortError, SiteId, StaffId, VisitId,
};

use crate::definition::{AddOnDefinition, InsuranceCategory};
use crate::history::{CalculationHistoryRecord, LinkState};
use crate::ports::{
    BillingCodePort, DefinitionPort, HistoryPort, HistoryTransaction, VisitQuery, VisitRecordPort,
};
use crate::records::{FacilityRecord, PatientRecord, StaffRecord, VisitRecord};

#[derive(Debug, Default)]
struct StoreState {
    definitions: HashMap<DefinitionId, AddOnDefinition>,
    visits: HashMap<VisitId, VisitRecord>,
    patients: HashMap<PatientId, PatientRecord>,
    facilities: HashMap<FacilityId, FacilityRecord>,
    staff: HashMap<StaffId, StaffRecord>,
    /// Insertion ordered
    history: Vec<CalculationHistoryRecord>,
    fail_next_commit: bool,
    fail_history_lookups: bool,
}

fn chronological(visits: &mut [VisitRecord]) {
    visits.sort_by_key(|v| (v.visit_date, v.start_time.is_none(), v.start_time, v.id));
}

/// In-memory implementation of the definition, visit and history ports
#[derive(Debug, Clone, Default)]
pub struct InMemoryBonusStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryBonusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_definition(&self, definition: AddOnDefinition) {
        self.state.write().await.definitions.insert(definition.id, definition);
    }

    pub async fn insert_visit(&self, visit: VisitRecord) {
        self.state.write().await.visits.insert(visit.id, visit);
    }

    pub async fn insert_patient(&self, patient: PatientRecord) {
        self.state.write().await.patients.insert(patient.id, patient);
    }

    pub async fn insert_facility(&self, facility: FacilityRecord) {
        self.state.write().await.facilities.insert(facility.id, facility);
    }

    pub async fn insert_staff(&self, staff: StaffRecord) {
        self.state.write().await.staff.insert(staff.id, staff);
    }

    /// Seeds a history row directly, bypassing the persister
    pub async fn insert_history(&self, record: CalculationHistoryRecord) {
        self.state.write().await.history.push(record);
    }

    /// Every stored history row, in insertion order
    pub async fn history_rows(&self) -> Vec<CalculationHistoryRecord> {
        self.state.read().await.history.clone()
    }

    /// Makes the next transaction commit fail
    pub async fn fail_next_commit(&self) {
        self.state.write().await.fail_next_commit = true;
    }

    /// Makes history reads used by conditions fail until reset
    pub async fn set_fail_history_lookups(&self, fail: bool) {
        self.state.write().await.fail_history_lookups = fail;
    }
}

impl DomainPort for InMemoryBonusStore {}

#[async_trait]
impl HealthCheckable for InMemoryBonusStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("memory-bonus-store", 0)
    }
}

#[async_trait]
impl DefinitionPort for InMemoryBonusStore {
    async fn find_effective(
        &self,
        visit_date: NaiveDate,
        facility_id: FacilityId,
        insurance_category: InsuranceCategory,
    ) -> Result<Vec<AddOnDefinition>, PortError> {
        let state = self.state.read().await;
        Ok(state
            .definitions
            .values()
            .filter(|d| d.applies_to(visit_date, facility_id, insurance_category))
            .cloned()
            .collect())
    }

    async fn get_definition(&self, id: DefinitionId) -> Result<AddOnDefinition, PortError> {
        self.state
            .read()
            .await
            .definitions
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("AddOnDefinition", id))
    }
}

#[async_trait]
impl VisitRecordPort for InMemoryBonusStore {
    async fn get_visit(&self, id: VisitId) -> Result<VisitRecord, PortError> {
        self.state
            .read()
            .await
            .visits
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Visit", id))
    }

    async fn get_patient(&self, id: PatientId) -> Result<PatientRecord, PortError> {
        self.state
            .read()
            .await
            .patients
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Patient", id))
    }

    async fn get_facility(&self, id: FacilityId) -> Result<FacilityRecord, PortError> {
        self.state
            .read()
            .await
            .facilities
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Facility", id))
    }

    async fn get_staff(&self, id: StaffId) -> Result<StaffRecord, PortError> {
        self.state
            .read()
            .await
            .staff
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Staff", id))
    }

    async fn list_patient_visits(&self, query: &VisitQuery) -> Result<Vec<VisitRecord>, PortError> {
        let state = self.state.read().await;
        let mut visits: Vec<_> = state
            .visits
            .values()
            .filter(|v| query.matches(v))
            .cloned()
            .collect();
        chronological(&mut visits);
        Ok(visits)
    }

    async fn count_site_patients(
        &self,
        visit_date: NaiveDate,
        facility_id: FacilityId,
        site_id: SiteId,
    ) -> Result<u32, PortError> {
        let state = self.state.read().await;
        let patients: HashSet<PatientId> = state
            .visits
            .values()
            .filter(|v| v.is_calculable() && v.visit_date == visit_date && v.facility_id == facility_id)
            .filter(|v| {
                state
                    .patients
                    .get(&v.patient_id)
                    .is_some_and(|p| p.site_id == Some(site_id))
            })
            .map(|v| v.patient_id)
            .collect();
        Ok(patients.len() as u32)
    }

    async fn list_facility_visits(
        &self,
        facility_id: FacilityId,
        range: DateRange,
    ) -> Result<Vec<VisitRecord>, PortError> {
        let state = self.state.read().await;
        let mut visits: Vec<_> = state
            .visits
            .values()
            .filter(|v| v.facility_id == facility_id && v.is_calculable() && range.contains(v.visit_date))
            .cloned()
            .collect();
        chronological(&mut visits);
        Ok(visits)
    }
}

/// Staged changes applied to the store on commit
pub struct InMemoryHistoryTransaction {
    state: Arc<RwLock<StoreState>>,
    deleted: HashSet<VisitId>,
    inserted: Vec<CalculationHistoryRecord>,
}

#[async_trait]
impl HistoryTransaction for InMemoryHistoryTransaction {
    async fn load_for_visit(
        &mut self,
        visit_id: VisitId,
    ) -> Result<Vec<CalculationHistoryRecord>, PortError> {
        let mut rows: Vec<_> = if self.deleted.contains(&visit_id) {
            Vec::new()
        } else {
            self.state
                .read()
                .await
                .history
                .iter()
                .filter(|r| r.visit_id == visit_id)
                .cloned()
                .collect()
        };
        rows.extend(self.inserted.iter().filter(|r| r.visit_id == visit_id).cloned());
        Ok(rows)
    }

    async fn delete_for_visit(&mut self, visit_id: VisitId) -> Result<u64, PortError> {
        let existing = self.load_for_visit(visit_id).await?.len() as u64;
        self.deleted.insert(visit_id);
        self.inserted.retain(|r| r.visit_id != visit_id);
        Ok(existing)
    }

    async fn insert(&mut self, record: &CalculationHistoryRecord) -> Result<(), PortError> {
        let duplicate = self
            .inserted
            .iter()
            .any(|r| r.visit_id == record.visit_id && r.definition_id == record.definition_id);
        if duplicate {
            return Err(PortError::conflict(format!(
                "history for visit {} already holds definition {}",
                record.visit_id, record.definition_id
            )));
        }
        self.inserted.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let this = *self;
        let mut state = this.state.write().await;
        if state.fail_next_commit {
            state.fail_next_commit = false;
            return Err(PortError::transaction("simulated commit failure"));
        }
        state.history.retain(|r| !this.deleted.contains(&r.visit_id));
        state.history.extend(this.inserted);
        Ok(())
    }
}

#[async_trait]
impl HistoryPort for InMemoryBonusStore {
    async fn begin(&self) -> Result<Box<dyn HistoryTransaction>, PortError> {
        Ok(Box::new(InMemoryHistoryTransaction {
            state: self.state.clone(),
            deleted: HashSet::new(),
            inserted: Vec::new(),
        }))
    }

    async fn find_by_visit(&self, visit_id: VisitId) -> Result<Vec<CalculationHistoryRecord>, PortError> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|r| r.visit_id == visit_id)
            .cloned()
            .collect())
    }

    async fn count_monthly_occurrences(
        &self,
        patient_id: PatientId,
        code: &str,
        month: DateRange,
        exclude_visit: VisitId,
    ) -> Result<u32, PortError> {
        let state = self.state.read().await;
        if state.fail_history_lookups {
            return Err(PortError::connection("simulated history lookup failure"));
        }
        let visits: BTreeSet<VisitId> = state
            .history
            .iter()
            .filter(|r| r.patient_id == patient_id && r.code == code && r.visit_id != exclude_visit)
            .filter(|r| month.contains(r.visit_date))
            .filter(|r| state.visits.get(&r.visit_id).is_some_and(VisitRecord::is_calculable))
            .map(|r| r.visit_id)
            .collect();
        Ok(visits.len() as u32)
    }

    async fn set_billing_link(
        &self,
        id: HistoryId,
        billing_code_id: Option<String>,
        link_state: LinkState,
    ) -> Result<CalculationHistoryRecord, PortError> {
        let mut state = self.state.write().await;
        let record = state
            .history
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| PortError::not_found("CalculationHistory", id))?;
        record.billing_code_id = billing_code_id;
        record.link_state = link_state;
        Ok(record.clone())
    }
}

/// Billing code table keyed by add-on code
#[derive(Debug, Clone, Default)]
pub struct StaticBillingCodes {
    codes: HashMap<String, String>,
    failing: HashSet<String>,
}

impl StaticBillingCodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(mut self, add_on_code: impl Into<String>, billing_code_id: impl Into<String>) -> Self {
        self.codes.insert(add_on_code.into(), billing_code_id.into());
        self
    }

    /// Makes lookups for the add-on code fail
    pub fn failing_for(mut self, add_on_code: impl Into<String>) -> Self {
        self.failing.insert(add_on_code.into());
        self
    }
}

impl DomainPort for StaticBillingCodes {}

#[async_trait]
impl BillingCodePort for StaticBillingCodes {
    async fn select_billing_code(
        &self,
        add_on_code: &str,
        _insurance_category: InsuranceCategory,
        _visit_date: NaiveDate,
    ) -> Result<Option<String>, PortError> {
        if self.failing.contains(add_on_code) {
            return Err(PortError::unavailable("billing-codes"));
        }
        Ok(self.codes.get(add_on_code).cloned())
    }
}

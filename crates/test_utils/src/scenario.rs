//! In-memory calculation scenarios
//!
//! A [`BonusScenario`] owns an in-memory store seeded with one facility and
//! one patient and hands out a [`BonusService`] wired to it.

use std::sync::Arc;

use domain_bonus::memory::{InMemoryBonusStore, StaticBillingCodes};
use domain_bonus::{
    AddOnDefinition, BonusService, EngineSettings, FacilityRecord, PatientRecord, StaffRecord,
    VisitRecord,
};

use crate::builders::{FacilityRecordBuilder, PatientRecordBuilder, VisitRecordBuilder};
use crate::fixtures::TemporalFixtures;

pub struct BonusScenario {
    pub store: InMemoryBonusStore,
    pub billing: StaticBillingCodes,
    pub facility: FacilityRecord,
    pub patient: PatientRecord,
    pub settings: EngineSettings,
}

impl BonusScenario {
    /// Default facility and patient, no definitions
    pub async fn new() -> Self {
        Self::with(FacilityRecordBuilder::new().build(), PatientRecordBuilder::new().build()).await
    }

    pub async fn with(facility: FacilityRecord, patient: PatientRecord) -> Self {
        let store = InMemoryBonusStore::new();
        store.insert_facility(facility.clone()).await;
        store.insert_patient(patient.clone()).await;
        Self {
            store,
            billing: StaticBillingCodes::new(),
            facility,
            patient,
            settings: EngineSettings::default().with_timezone(TemporalFixtures::tokyo()),
        }
    }

    pub fn with_billing(mut self, billing: StaticBillingCodes) -> Self {
        self.billing = billing;
        self
    }

    pub async fn define(&self, definitions: impl IntoIterator<Item = AddOnDefinition>) {
        for definition in definitions {
            self.store.insert_definition(definition).await;
        }
    }

    /// A builder for a visit of the scenario's patient at its facility
    pub fn visit(&self) -> VisitRecordBuilder {
        VisitRecordBuilder::new(self.patient.id, self.facility.id)
    }

    pub async fn record(&self, visit: VisitRecord) -> VisitRecord {
        self.store.insert_visit(visit.clone()).await;
        visit
    }

    pub async fn add_patient(&self, patient: PatientRecord) -> PatientRecord {
        self.store.insert_patient(patient.clone()).await;
        patient
    }

    pub async fn add_staff(&self, staff: StaffRecord) -> StaffRecord {
        self.store.insert_staff(staff.clone()).await;
        staff
    }

    pub fn service(&self) -> BonusService {
        let store = Arc::new(self.store.clone());
        BonusService::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(self.billing.clone()),
            self.settings.clone(),
        )
    }
}

//! Bonus application service
//!
//! Ties context assembly, calculation and history persistence together
//! behind the operations the API exposes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use core_kernel::{DateRange, DefinitionId, FacilityId, HistoryId, VisitId};

use crate::assembler::ContextAssembler;
use crate::calculator::{BonusCalculator, CalculationOutcome};
use crate::context::CalculationContext;
use crate::definition::AddOnDefinition;
use crate::error::BonusError;
use crate::history::{CalculationHistoryRecord, HistoryPersister};
use crate::ports::{BillingCodePort, DefinitionPort, HistoryPort, VisitRecordPort};
use crate::settings::EngineSettings;

/// Result of calculating one visit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitCalculation {
    pub context: CalculationContext,
    pub outcome: CalculationOutcome,
    /// Rows written, when the calculation was saved
    pub history: Option<Vec<CalculationHistoryRecord>>,
}

/// A visit that could not be recalculated in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitFailure {
    pub visit_id: VisitId,
    pub error: String,
}

/// Summary of a period recalculation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: Vec<VisitId>,
    pub failed: Vec<VisitFailure>,
    pub total_points: i64,
}

/// Entry point for bonus calculation
#[derive(Clone)]
pub struct BonusService {
    assembler: ContextAssembler,
    calculator: BonusCalculator,
    persister: HistoryPersister,
    definitions: Arc<dyn DefinitionPort>,
    visits: Arc<dyn VisitRecordPort>,
}

impl BonusService {
    pub fn new(
        definitions: Arc<dyn DefinitionPort>,
        visits: Arc<dyn VisitRecordPort>,
        history: Arc<dyn HistoryPort>,
        billing: Arc<dyn BillingCodePort>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            assembler: ContextAssembler::new(visits.clone(), settings.clone()),
            calculator: BonusCalculator::new(definitions.clone(), visits.clone(), history.clone(), settings),
            persister: HistoryPersister::new(history, billing),
            definitions,
            visits,
        }
    }

    /// Calculates one visit, optionally replacing its saved history
    #[instrument(skip(self), fields(visit_id = %visit_id))]
    pub async fn calculate_visit(
        &self,
        visit_id: VisitId,
        save: bool,
    ) -> Result<VisitCalculation, BonusError> {
        let context = self.assembler.assemble(visit_id).await?;
        let outcome = self.calculator.calculate(&context).await?;

        let history = if save {
            Some(self.persister.persist(&context, &outcome).await?)
        } else {
            None
        };

        info!(
            accepted = outcome.results.len(),
            total_points = outcome.total_points(),
            saved = save,
            "Visit calculated"
        );
        Ok(VisitCalculation {
            context,
            outcome,
            history,
        })
    }

    /// Recalculates and saves every billable visit of a facility in a range
    ///
    /// A failing visit is reported in the summary and does not stop the batch.
    #[instrument(skip(self), fields(facility_id = %facility_id))]
    pub async fn recalculate_period(
        &self,
        facility_id: FacilityId,
        range: DateRange,
    ) -> Result<BatchSummary, BonusError> {
        let visits = self
            .visits
            .list_facility_visits(facility_id, range)
            .await
            .map_err(BonusError::Lookup)?;

        let mut summary = BatchSummary::default();
        for visit in visits {
            summary.processed += 1;
            match self.calculate_visit(visit.id, true).await {
                Ok(calculation) => {
                    summary.total_points += calculation.outcome.total_points();
                    summary.succeeded.push(visit.id);
                }
                Err(e) => {
                    warn!(visit_id = %visit.id, error = %e, "Visit recalculation failed");
                    summary.failed.push(VisitFailure {
                        visit_id: visit.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            processed = summary.processed,
            failed = summary.failed.len(),
            "Period recalculation complete"
        );
        Ok(summary)
    }

    /// One stored definition version, e.g. the one a history row cites
    pub async fn definition(&self, id: DefinitionId) -> Result<AddOnDefinition, BonusError> {
        self.definitions.get_definition(id).await.map_err(BonusError::Lookup)
    }

    pub async fn history_for_visit(
        &self,
        visit_id: VisitId,
    ) -> Result<Vec<CalculationHistoryRecord>, BonusError> {
        self.persister.find_by_visit(visit_id).await
    }

    pub async fn set_manual_link(
        &self,
        history_id: HistoryId,
        billing_code_id: String,
    ) -> Result<CalculationHistoryRecord, BonusError> {
        self.persister.set_manual_link(history_id, billing_code_id).await
    }

    pub async fn clear_link(
        &self,
        history_id: HistoryId,
    ) -> Result<CalculationHistoryRecord, BonusError> {
        self.persister.clear_link(history_id).await
    }
}

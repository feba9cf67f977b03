//! Calculation history
//!
//! Saving a calculation replaces the visit's previous history rows inside
//! one transaction. Operator decisions about billing links survive the
//! replacement: a manually linked or manually cleared row keeps its link
//! state when the same definition is accepted again. Rows still in the
//! automatic state get a fresh, best-effort billing code suggestion.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use core_kernel::{DefinitionId, HistoryId, PatientId, VisitId};

use crate::calculator::{CalculationOutcome, CalculationResult, CalculationTrail};
use crate::context::CalculationContext;
use crate::error::BonusError;
use crate::ports::{BillingCodePort, HistoryPort};

/// Who decided a history row's billing link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Suggested by the engine, replaced on every recalculation
    Auto,
    /// Chosen by an operator
    Manual,
    /// Removed by an operator; must not be auto-filled again
    ManuallyCleared,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Auto => "auto",
            LinkState::Manual => "manual",
            LinkState::ManuallyCleared => "manually_cleared",
        }
    }

    pub fn is_operator_decision(&self) -> bool {
        !matches!(self, LinkState::Auto)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(LinkState::Auto),
            "manual" => Ok(LinkState::Manual),
            "manually_cleared" => Ok(LinkState::ManuallyCleared),
            other => Err(format!("unknown link state: {other}")),
        }
    }
}

/// One persisted add-on result of a visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationHistoryRecord {
    pub id: HistoryId,
    pub visit_id: VisitId,
    pub patient_id: PatientId,
    pub visit_date: NaiveDate,
    pub definition_id: DefinitionId,
    pub code: String,
    pub name: String,
    pub definition_version: i32,
    pub points: i32,
    pub explanations: Vec<String>,
    pub trail: CalculationTrail,
    pub billing_code_id: Option<String>,
    pub link_state: LinkState,
    pub calculated_at: DateTime<Utc>,
}

impl CalculationHistoryRecord {
    pub fn from_result(
        result: &CalculationResult,
        context: &CalculationContext,
        billing_code_id: Option<String>,
        link_state: LinkState,
        calculated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryId::new_v7(),
            visit_id: context.visit_id,
            patient_id: context.patient_id,
            visit_date: context.visit_date,
            definition_id: result.definition_id,
            code: result.code.clone(),
            name: result.name.clone(),
            definition_version: result.definition_version,
            points: result.points,
            explanations: result.explanations.clone(),
            trail: result.trail.clone(),
            billing_code_id,
            link_state,
            calculated_at,
        }
    }

    /// The result this row was written from
    pub fn to_result(&self) -> CalculationResult {
        CalculationResult {
            definition_id: self.definition_id,
            code: self.code.clone(),
            name: self.name.clone(),
            definition_version: self.definition_version,
            points: self.points,
            explanations: self.explanations.clone(),
            trail: self.trail.clone(),
        }
    }
}

/// Writes calculation outcomes to the history store
#[derive(Clone)]
pub struct HistoryPersister {
    history: Arc<dyn HistoryPort>,
    billing: Arc<dyn BillingCodePort>,
}

impl HistoryPersister {
    pub fn new(history: Arc<dyn HistoryPort>, billing: Arc<dyn BillingCodePort>) -> Self {
        Self { history, billing }
    }

    /// Replaces the visit's history with the outcome's results
    ///
    /// All-or-nothing: on any store error the previous rows stay in place.
    #[instrument(skip(self, context, outcome), fields(visit_id = %context.visit_id))]
    pub async fn persist(
        &self,
        context: &CalculationContext,
        outcome: &CalculationOutcome,
    ) -> Result<Vec<CalculationHistoryRecord>, BonusError> {
        let mut tx = self.history.begin().await.map_err(BonusError::Persistence)?;

        let carried: HashMap<DefinitionId, (Option<String>, LinkState)> = tx
            .load_for_visit(context.visit_id)
            .await
            .map_err(BonusError::Persistence)?
            .into_iter()
            .filter(|r| r.link_state.is_operator_decision())
            .map(|r| (r.definition_id, (r.billing_code_id, r.link_state)))
            .collect();

        let removed = tx
            .delete_for_visit(context.visit_id)
            .await
            .map_err(BonusError::Persistence)?;

        let mut written = HashSet::new();
        let mut records = Vec::with_capacity(outcome.results.len());
        for result in &outcome.results {
            if !written.insert(result.definition_id) {
                debug!(code = %result.code, "Duplicate result for definition ignored");
                continue;
            }

            let (billing_code_id, link_state) = match carried.get(&result.definition_id) {
                Some((code, state)) => (code.clone(), *state),
                None => (self.suggest_billing_code(result, context).await, LinkState::Auto),
            };

            let record = CalculationHistoryRecord::from_result(
                result,
                context,
                billing_code_id,
                link_state,
                outcome.calculated_at,
            );
            tx.insert(&record).await.map_err(BonusError::Persistence)?;
            records.push(record);
        }

        tx.commit().await.map_err(BonusError::Persistence)?;

        info!(
            removed,
            written = records.len(),
            carried = carried.len(),
            "Calculation history replaced"
        );
        Ok(records)
    }

    async fn suggest_billing_code(
        &self,
        result: &CalculationResult,
        context: &CalculationContext,
    ) -> Option<String> {
        match self
            .billing
            .select_billing_code(&result.code, context.insurance_category, context.visit_date)
            .await
        {
            Ok(code) => code,
            Err(e) => {
                warn!(code = %result.code, error = %e, "Billing code suggestion failed");
                None
            }
        }
    }

    /// Links a history row to an operator-chosen billing code
    #[instrument(skip(self))]
    pub async fn set_manual_link(
        &self,
        history_id: HistoryId,
        billing_code_id: String,
    ) -> Result<CalculationHistoryRecord, BonusError> {
        self.history
            .set_billing_link(history_id, Some(billing_code_id), LinkState::Manual)
            .await
            .map_err(BonusError::Persistence)
    }

    /// Removes a history row's billing link and keeps it removed
    #[instrument(skip(self))]
    pub async fn clear_link(
        &self,
        history_id: HistoryId,
    ) -> Result<CalculationHistoryRecord, BonusError> {
        self.history
            .set_billing_link(history_id, None, LinkState::ManuallyCleared)
            .await
            .map_err(BonusError::Persistence)
    }

    pub async fn find_by_visit(
        &self,
        visit_id: VisitId,
    ) -> Result<Vec<CalculationHistoryRecord>, BonusError> {
        self.history
            .find_by_visit(visit_id)
            .await
            .map_err(BonusError::Lookup)
    }
}

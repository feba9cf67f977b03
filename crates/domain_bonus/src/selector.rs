//! Definition selection
//!
//! Picks the add-on definitions that are candidates for one visit and
//! puts them in evaluation priority order. Selection is pure; the
//! [`DefinitionSelector`] only adds the catalog lookup in front of it.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, instrument};

use core_kernel::FacilityId;

use crate::definition::{AddOnDefinition, InsuranceCategory};
use crate::error::BonusError;
use crate::ports::DefinitionPort;

/// Filters candidates to those applicable on the date and sorts them by
/// `(evaluation_order, id)`
pub fn select_definitions<I>(
    candidates: I,
    visit_date: NaiveDate,
    facility_id: FacilityId,
    insurance_category: InsuranceCategory,
) -> Vec<AddOnDefinition>
where
    I: IntoIterator<Item = AddOnDefinition>,
{
    let mut selected: Vec<AddOnDefinition> = candidates
        .into_iter()
        .filter(|d| d.applies_to(visit_date, facility_id, insurance_category))
        .collect();
    selected.sort_by(|a, b| {
        a.evaluation_order
            .cmp(&b.evaluation_order)
            .then_with(|| a.id.cmp(&b.id))
    });
    selected
}

/// Loads candidate definitions from the catalog
#[derive(Clone)]
pub struct DefinitionSelector {
    definitions: Arc<dyn DefinitionPort>,
}

impl DefinitionSelector {
    pub fn new(definitions: Arc<dyn DefinitionPort>) -> Self {
        Self { definitions }
    }

    /// Effective definitions for the visit, in priority order
    #[instrument(skip(self), fields(facility_id = %facility_id))]
    pub async fn select(
        &self,
        visit_date: NaiveDate,
        facility_id: FacilityId,
        insurance_category: InsuranceCategory,
    ) -> Result<Vec<AddOnDefinition>, BonusError> {
        let candidates = self
            .definitions
            .find_effective(visit_date, facility_id, insurance_category)
            .await
            .map_err(BonusError::Lookup)?;

        // Adapters may over-fetch; the filter is re-applied here.
        let selected = select_definitions(candidates, visit_date, facility_id, insurance_category);
        debug!(count = selected.len(), "Selected candidate definitions");
        Ok(selected)
    }
}

//! Definition DTOs

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use domain_bonus::{AddOnDefinition, ValueType};

/// One definition version as stored
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionResponse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub version: i32,
    pub facility_id: Option<Uuid>,
    pub insurance_category: String,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
    /// `fixed` or the pattern kind
    pub value_kind: String,
    pub fixed_points: Option<i32>,
    pub pattern_config: Option<Value>,
    pub conditions: Vec<String>,
    pub can_combine_with_only: Option<Vec<String>>,
    pub cannot_combine_with: Option<Vec<String>>,
    pub depends_on: Vec<String>,
    pub evaluation_order: i32,
    pub is_active: bool,
}

impl From<AddOnDefinition> for DefinitionResponse {
    fn from(definition: AddOnDefinition) -> Self {
        let value_kind = definition.value.kind_label().to_string();
        let (fixed_points, pattern_config) = match definition.value {
            ValueType::Fixed { points } => (Some(points), None),
            ValueType::Conditional { pattern_config, .. } => (None, Some(pattern_config)),
        };

        Self {
            id: *definition.id.as_uuid(),
            code: definition.code,
            name: definition.name,
            version: definition.version,
            facility_id: definition.facility_id.map(|f| *f.as_uuid()),
            insurance_category: definition.insurance_category.as_str().to_string(),
            valid_from: definition.validity.from,
            valid_to: definition.validity.to,
            value_kind,
            fixed_points,
            pattern_config,
            conditions: definition.conditions.into_iter().map(|c| c.kind).collect(),
            can_combine_with_only: definition.can_combine_with_only,
            cannot_combine_with: definition.cannot_combine_with,
            depends_on: definition.depends_on,
            evaluation_order: definition.evaluation_order,
            is_active: definition.is_active,
        }
    }
}

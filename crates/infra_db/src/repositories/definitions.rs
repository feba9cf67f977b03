//! Add-on definition repository
//!
//! Reads and writes the versioned add-on catalog in `addon_definitions`.

use chrono::NaiveDate;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use core_kernel::{DefinitionId, FacilityId, ValidityWindow};
use domain_bonus::{AddOnDefinition, ConditionSpec, InsuranceCategory, ValueType};

use super::parse_column;
use crate::error::DatabaseError;

const SELECT_DEFINITION: &str = r#"
    SELECT
        definition_id, code, name, version, facility_id, insurance_category,
        valid_from, valid_to, value, conditions, can_combine_with_only,
        cannot_combine_with, depends_on, evaluation_order, is_active
    FROM addon_definitions
"#;

/// Row from `addon_definitions`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DefinitionRow {
    pub definition_id: Uuid,
    pub code: String,
    pub name: String,
    pub version: i32,
    pub facility_id: Option<Uuid>,
    pub insurance_category: String,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
    pub value: Json<Value>,
    pub conditions: Json<Value>,
    pub can_combine_with_only: Option<Vec<String>>,
    pub cannot_combine_with: Option<Vec<String>>,
    pub depends_on: Vec<String>,
    pub evaluation_order: i32,
    pub is_active: bool,
}

impl TryFrom<DefinitionRow> for AddOnDefinition {
    type Error = DatabaseError;

    fn try_from(row: DefinitionRow) -> Result<Self, Self::Error> {
        let value: ValueType = serde_json::from_value(row.value.0).map_err(|e| {
            DatabaseError::SerializationError(format!("definition {} value: {}", row.code, e))
        })?;
        let conditions: Vec<ConditionSpec> = serde_json::from_value(row.conditions.0).map_err(|e| {
            DatabaseError::SerializationError(format!("definition {} conditions: {}", row.code, e))
        })?;
        let validity = ValidityWindow::new(row.valid_from, row.valid_to)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

        Ok(AddOnDefinition {
            id: DefinitionId::from_uuid(row.definition_id),
            insurance_category: parse_column("addon_definitions.insurance_category", &row.insurance_category)?,
            code: row.code,
            name: row.name,
            version: row.version,
            facility_id: row.facility_id.map(FacilityId::from_uuid),
            validity,
            value,
            conditions,
            can_combine_with_only: row.can_combine_with_only,
            cannot_combine_with: row.cannot_combine_with,
            depends_on: row.depends_on,
            evaluation_order: row.evaluation_order,
            is_active: row.is_active,
        })
    }
}

/// Repository for the add-on catalog
#[derive(Debug, Clone)]
pub struct DefinitionRepository {
    pool: PgPool,
}

impl DefinitionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Active definitions effective on the date, global or scoped to the
    /// facility, for the category, ordered by evaluation order then id
    ///
    /// Rows whose JSON documents do not decode are logged and left out.
    pub async fn find_effective(
        &self,
        visit_date: NaiveDate,
        facility_id: FacilityId,
        insurance_category: InsuranceCategory,
    ) -> Result<Vec<AddOnDefinition>, DatabaseError> {
        let rows = sqlx::query_as::<_, DefinitionRow>(&format!(
            r#"{SELECT_DEFINITION}
            WHERE is_active
              AND insurance_category = $1
              AND valid_from <= $2
              AND (valid_to IS NULL OR valid_to >= $2)
              AND (facility_id IS NULL OR facility_id = $3)
            ORDER BY evaluation_order, definition_id"#
        ))
        .bind(insurance_category.as_str())
        .bind(visit_date)
        .bind(*facility_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), %visit_date, "Loaded effective definition rows");

        let mut definitions = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.definition_id;
            match AddOnDefinition::try_from(row) {
                Ok(definition) => definitions.push(definition),
                Err(e) => warn!(definition_id = %id, error = %e, "Skipping unreadable definition"),
            }
        }
        Ok(definitions)
    }

    pub async fn get(&self, id: DefinitionId) -> Result<AddOnDefinition, DatabaseError> {
        let row = sqlx::query_as::<_, DefinitionRow>(&format!(
            "{SELECT_DEFINITION} WHERE definition_id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("AddOnDefinition", id))?;

        row.try_into()
    }

    /// Inserts a definition version
    ///
    /// Versions are immutable once written; a second insert of the same
    /// code, scope, category and version is a duplicate.
    pub async fn insert(&self, definition: &AddOnDefinition) -> Result<(), DatabaseError> {
        let value = serde_json::to_value(&definition.value)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;
        let conditions = serde_json::to_value(&definition.conditions)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO addon_definitions (
                definition_id, code, name, version, facility_id, insurance_category,
                valid_from, valid_to, value, conditions, can_combine_with_only,
                cannot_combine_with, depends_on, evaluation_order, is_active
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(*definition.id.as_uuid())
        .bind(&definition.code)
        .bind(&definition.name)
        .bind(definition.version)
        .bind(definition.facility_id.map(|f| *f.as_uuid()))
        .bind(definition.insurance_category.as_str())
        .bind(definition.validity.from)
        .bind(definition.validity.to)
        .bind(Json(value))
        .bind(Json(conditions))
        .bind(&definition.can_combine_with_only)
        .bind(&definition.cannot_combine_with)
        .bind(&definition.depends_on)
        .bind(definition.evaluation_order)
        .bind(definition.is_active)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match DatabaseError::from(e) {
                DatabaseError::DuplicateEntry(_) => Err(DatabaseError::duplicate(
                    "AddOnDefinition",
                    "version",
                    format!("{} v{}", definition.code, definition.version),
                )),
                other => Err(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value, conditions: Value) -> DefinitionRow {
        DefinitionRow {
            definition_id: Uuid::new_v4(),
            code: "LONG_VISIT".to_string(),
            name: "Long visit".to_string(),
            version: 2,
            facility_id: None,
            insurance_category: "medical".to_string(),
            valid_from: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            valid_to: None,
            value: Json(value),
            conditions: Json(conditions),
            can_combine_with_only: None,
            cannot_combine_with: Some(vec!["CHILD".to_string()]),
            depends_on: vec![],
            evaluation_order: 20,
            is_active: true,
        }
    }

    #[test]
    fn test_row_maps_to_definition() {
        let definition = AddOnDefinition::try_from(row(
            json!({"value_type": "fixed", "points": 500}),
            json!([{"kind": "is_emergency", "value": true}]),
        ))
        .unwrap();

        assert_eq!(definition.version, 2);
        assert_eq!(definition.insurance_category, InsuranceCategory::Medical);
        assert_eq!(definition.value, ValueType::Fixed { points: 500 });
        assert_eq!(definition.conditions.len(), 1);
        assert!(definition.validity.is_open_ended());
        assert_eq!(definition.cannot_combine_with, Some(vec!["CHILD".to_string()]));
    }

    #[test]
    fn test_malformed_value_is_serialization_error() {
        let result = AddOnDefinition::try_from(row(json!({"value_type": "sliding"}), json!([])));
        assert!(matches!(result, Err(DatabaseError::SerializationError(_))));
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let mut bad = row(json!({"value_type": "fixed", "points": 1}), json!([]));
        bad.insurance_category = "private".to_string();
        assert!(matches!(
            AddOnDefinition::try_from(bad),
            Err(DatabaseError::SerializationError(_))
        ));
    }
}

//! Calculation history repository
//!
//! Rows in `calculation_history` are written only through a transaction
//! that replaces all rows of one visit. The functions taking an executor
//! run on whatever connection the caller holds, pool or transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use core_kernel::{DateRange, DefinitionId, HistoryId, PatientId, VisitId};
use domain_bonus::{CalculationHistoryRecord, CalculationTrail, LinkState, VisitStatus};

use super::{count_to_u32, parse_column};
use crate::error::DatabaseError;

const SELECT_HISTORY: &str = r#"
    SELECT
        history_id, visit_id, patient_id, visit_date, definition_id, code, name,
        definition_version, points, explanations, trail, billing_code_id,
        link_state, calculated_at
    FROM calculation_history
"#;

/// Row from `calculation_history`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryRow {
    pub history_id: Uuid,
    pub visit_id: Uuid,
    pub patient_id: Uuid,
    pub visit_date: NaiveDate,
    pub definition_id: Uuid,
    pub code: String,
    pub name: String,
    pub definition_version: i32,
    pub points: i32,
    pub explanations: Vec<String>,
    pub trail: Json<Value>,
    pub billing_code_id: Option<String>,
    pub link_state: String,
    pub calculated_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for CalculationHistoryRecord {
    type Error = DatabaseError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let trail: CalculationTrail = serde_json::from_value(row.trail.0).map_err(|e| {
            DatabaseError::SerializationError(format!("history {} trail: {}", row.history_id, e))
        })?;

        Ok(CalculationHistoryRecord {
            id: HistoryId::from_uuid(row.history_id),
            visit_id: VisitId::from_uuid(row.visit_id),
            patient_id: PatientId::from_uuid(row.patient_id),
            visit_date: row.visit_date,
            definition_id: DefinitionId::from_uuid(row.definition_id),
            code: row.code,
            name: row.name,
            definition_version: row.definition_version,
            points: row.points,
            explanations: row.explanations,
            trail,
            billing_code_id: row.billing_code_id,
            link_state: parse_column::<LinkState>("calculation_history.link_state", &row.link_state)?,
            calculated_at: row.calculated_at,
        })
    }
}

fn decode_all(rows: Vec<HistoryRow>) -> Result<Vec<CalculationHistoryRecord>, DatabaseError> {
    rows.into_iter().map(CalculationHistoryRecord::try_from).collect()
}

/// Repository for calculation history
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    pool: PgPool,
}

impl HistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Rows of one visit, in the order they were written
    ///
    /// History ids are UUIDv7, so ordering by id follows insertion order.
    pub async fn fetch_for_visit<'e, E>(
        executor: E,
        visit_id: VisitId,
    ) -> Result<Vec<CalculationHistoryRecord>, DatabaseError>
    where
        E: PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "{SELECT_HISTORY} WHERE visit_id = $1 ORDER BY history_id"
        ))
        .bind(*visit_id.as_uuid())
        .fetch_all(executor)
        .await?;

        decode_all(rows)
    }

    /// Locks the visit's rows for the rest of the transaction
    pub async fn lock_for_visit<'e, E>(
        executor: E,
        visit_id: VisitId,
    ) -> Result<Vec<CalculationHistoryRecord>, DatabaseError>
    where
        E: PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "{SELECT_HISTORY} WHERE visit_id = $1 ORDER BY history_id FOR UPDATE"
        ))
        .bind(*visit_id.as_uuid())
        .fetch_all(executor)
        .await?;

        decode_all(rows)
    }

    pub async fn delete_for_visit<'e, E>(executor: E, visit_id: VisitId) -> Result<u64, DatabaseError>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM calculation_history WHERE visit_id = $1")
            .bind(*visit_id.as_uuid())
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn insert<'e, E>(executor: E, record: &CalculationHistoryRecord) -> Result<(), DatabaseError>
    where
        E: PgExecutor<'e>,
    {
        let trail = serde_json::to_value(&record.trail)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO calculation_history (
                history_id, visit_id, patient_id, visit_date, definition_id, code, name,
                definition_version, points, explanations, trail, billing_code_id,
                link_state, calculated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(*record.id.as_uuid())
        .bind(*record.visit_id.as_uuid())
        .bind(*record.patient_id.as_uuid())
        .bind(record.visit_date)
        .bind(*record.definition_id.as_uuid())
        .bind(&record.code)
        .bind(&record.name)
        .bind(record.definition_version)
        .bind(record.points)
        .bind(&record.explanations)
        .bind(Json(trail))
        .bind(&record.billing_code_id)
        .bind(record.link_state.as_str())
        .bind(record.calculated_at)
        .execute(executor)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match DatabaseError::from(e) {
                DatabaseError::DuplicateEntry(_) => Err(DatabaseError::duplicate(
                    "CalculationHistory",
                    "definition_id",
                    format!("{} for visit {}", record.definition_id, record.visit_id),
                )),
                other => Err(other),
            },
        }
    }

    pub async fn find_by_visit(&self, visit_id: VisitId) -> Result<Vec<CalculationHistoryRecord>, DatabaseError> {
        Self::fetch_for_visit(&self.pool, visit_id).await
    }

    /// Other billable visits of the patient in the month carrying the code
    pub async fn count_monthly_occurrences(
        &self,
        patient_id: PatientId,
        code: &str,
        month: DateRange,
        exclude_visit: VisitId,
    ) -> Result<u32, DatabaseError> {
        let billable: Vec<String> = VisitStatus::billable()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT h.visit_id)
            FROM calculation_history h
            JOIN visits v ON v.visit_id = h.visit_id
            WHERE h.patient_id = $1
              AND h.code = $2
              AND h.visit_date BETWEEN $3 AND $4
              AND h.visit_id <> $5
              AND NOT v.is_deleted
              AND v.status = ANY($6)
            "#,
        )
        .bind(*patient_id.as_uuid())
        .bind(code)
        .bind(month.start)
        .bind(month.end)
        .bind(*exclude_visit.as_uuid())
        .bind(billable)
        .fetch_one(&self.pool)
        .await?;

        Ok(count_to_u32(count))
    }

    /// Overwrites the billing link of one row and returns the updated row
    pub async fn set_billing_link(
        &self,
        id: HistoryId,
        billing_code_id: Option<&str>,
        link_state: LinkState,
    ) -> Result<CalculationHistoryRecord, DatabaseError> {
        sqlx::query_as::<_, HistoryRow>(
            r#"
            UPDATE calculation_history
            SET billing_code_id = $2, link_state = $3
            WHERE history_id = $1
            RETURNING
                history_id, visit_id, patient_id, visit_date, definition_id, code, name,
                definition_version, points, explanations, trail, billing_code_id,
                link_state, calculated_at
            "#,
        )
        .bind(*id.as_uuid())
        .bind(billing_code_id)
        .bind(link_state.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("CalculationHistory", id))?
        .try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(link_state: &str, trail: Value) -> HistoryRow {
        HistoryRow {
            history_id: Uuid::now_v7(),
            visit_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            visit_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            definition_id: Uuid::new_v4(),
            code: "NIGHT_VISIT".to_string(),
            name: "Night visit".to_string(),
            definition_version: 1,
            points: 4200,
            explanations: vec!["late_night".to_string()],
            trail: Json(trail),
            billing_code_id: None,
            link_state: link_state.to_string(),
            calculated_at: Utc::now(),
        }
    }

    fn trail() -> Value {
        json!({
            "value_kind": "time_of_day",
            "matched_bucket": "late_night",
            "conditions": [],
            "evaluated_at": "2024-06-03T14:10:00Z"
        })
    }

    #[test]
    fn test_row_maps_link_state_and_trail() {
        let record = CalculationHistoryRecord::try_from(row("manually_cleared", trail())).unwrap();
        assert_eq!(record.link_state, LinkState::ManuallyCleared);
        assert_eq!(record.trail.matched_bucket, "late_night");
        assert_eq!(record.points, 4200);
    }

    #[test]
    fn test_unknown_link_state_is_rejected() {
        assert!(matches!(
            CalculationHistoryRecord::try_from(row("pending", trail())),
            Err(DatabaseError::SerializationError(_))
        ));
    }

    #[test]
    fn test_malformed_trail_is_rejected() {
        assert!(CalculationHistoryRecord::try_from(row("auto", json!("not a trail"))).is_err());
    }
}

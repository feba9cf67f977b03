//! Calculation DTOs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use domain_bonus::{BatchSummary, CalculationResult, SkippedDefinition, VisitCalculation};

use super::history::HistoryRecordResponse;

/// Longest period one recalculation request may cover
pub const MAX_RECALCULATION_DAYS: i64 = 92;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CalculateRequest {
    /// Replace the visit's stored history with the result
    #[serde(default)]
    pub save: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_period"))]
pub struct RecalculateRequest {
    pub facility_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

fn validate_period(request: &RecalculateRequest) -> Result<(), ValidationError> {
    if request.from > request.to {
        let mut error = ValidationError::new("period_order");
        error.message = Some("from must not be after to".into());
        return Err(error);
    }
    if (request.to - request.from).num_days() + 1 > MAX_RECALCULATION_DAYS {
        let mut error = ValidationError::new("period_length");
        error.message = Some(format!("period must not exceed {} days", MAX_RECALCULATION_DAYS).into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusResultResponse {
    pub definition_id: Uuid,
    pub code: String,
    pub name: String,
    pub definition_version: i32,
    pub points: i32,
    pub explanations: Vec<String>,
    pub matched_bucket: String,
    pub trail: Value,
}

impl From<&CalculationResult> for BonusResultResponse {
    fn from(result: &CalculationResult) -> Self {
        Self {
            definition_id: *result.definition_id.as_uuid(),
            code: result.code.clone(),
            name: result.name.clone(),
            definition_version: result.definition_version,
            points: result.points,
            explanations: result.explanations.clone(),
            matched_bucket: result.trail.matched_bucket.clone(),
            trail: serde_json::to_value(&result.trail).unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedResponse {
    pub definition_id: Uuid,
    pub code: String,
    pub reason: String,
}

impl From<&SkippedDefinition> for SkippedResponse {
    fn from(skip: &SkippedDefinition) -> Self {
        Self {
            definition_id: *skip.definition_id.as_uuid(),
            code: skip.code.clone(),
            reason: skip.reason.describe(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResponse {
    pub visit_id: Uuid,
    pub visit_date: NaiveDate,
    pub total_points: i64,
    pub results: Vec<BonusResultResponse>,
    pub skipped: Vec<SkippedResponse>,
    pub calculated_at: DateTime<Utc>,
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryRecordResponse>>,
}

impl From<VisitCalculation> for CalculationResponse {
    fn from(calculation: VisitCalculation) -> Self {
        let outcome = &calculation.outcome;
        Self {
            visit_id: *outcome.visit_id.as_uuid(),
            visit_date: calculation.context.visit_date,
            total_points: outcome.total_points(),
            results: outcome.results.iter().map(Into::into).collect(),
            skipped: outcome.skipped.iter().map(Into::into).collect(),
            calculated_at: outcome.calculated_at,
            saved: calculation.history.is_some(),
            history: calculation
                .history
                .map(|rows| rows.iter().map(Into::into).collect()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitFailureResponse {
    pub visit_id: Uuid,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculateResponse {
    pub processed: usize,
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<VisitFailureResponse>,
    pub total_points: i64,
}

impl From<BatchSummary> for RecalculateResponse {
    fn from(summary: BatchSummary) -> Self {
        Self {
            processed: summary.processed,
            succeeded: summary.succeeded.iter().map(|id| *id.as_uuid()).collect(),
            failed: summary
                .failed
                .into_iter()
                .map(|f| VisitFailureResponse {
                    visit_id: *f.visit_id.as_uuid(),
                    error: f.error,
                })
                .collect(),
            total_points: summary.total_points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(from: (i32, u32, u32), to: (i32, u32, u32)) -> RecalculateRequest {
        RecalculateRequest {
            facility_id: Uuid::new_v4(),
            from: NaiveDate::from_ymd_opt(from.0, from.1, from.2).unwrap(),
            to: NaiveDate::from_ymd_opt(to.0, to.1, to.2).unwrap(),
        }
    }

    #[test]
    fn test_one_month_period_is_valid() {
        assert!(request((2024, 6, 1), (2024, 6, 30)).validate().is_ok());
    }

    #[test]
    fn test_reversed_period_is_invalid() {
        assert!(request((2024, 6, 30), (2024, 6, 1)).validate().is_err());
    }

    #[test]
    fn test_overlong_period_is_invalid() {
        assert!(request((2024, 1, 1), (2024, 12, 31)).validate().is_err());
    }

    #[test]
    fn test_calculate_request_defaults_to_dry_run() {
        let request: CalculateRequest = serde_json::from_str("{}").unwrap();
        assert!(!request.save);
    }
}

//! History and billing link DTOs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_bonus::CalculationHistoryRecord;

/// Body of a billing link update; a null code clears the link
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BillingLinkRequest {
    #[validate(length(min = 1, max = 64, message = "billing code must be 1 to 64 characters"))]
    pub billing_code_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecordResponse {
    pub id: Uuid,
    pub visit_id: Uuid,
    pub visit_date: NaiveDate,
    pub definition_id: Uuid,
    pub code: String,
    pub name: String,
    pub definition_version: i32,
    pub points: i32,
    pub explanations: Vec<String>,
    pub billing_code_id: Option<String>,
    pub link_state: String,
    pub calculated_at: DateTime<Utc>,
}

impl From<&CalculationHistoryRecord> for HistoryRecordResponse {
    fn from(record: &CalculationHistoryRecord) -> Self {
        Self {
            id: *record.id.as_uuid(),
            visit_id: *record.visit_id.as_uuid(),
            visit_date: record.visit_date,
            definition_id: *record.definition_id.as_uuid(),
            code: record.code.clone(),
            name: record.name.clone(),
            definition_version: record.definition_version,
            points: record.points,
            explanations: record.explanations.clone(),
            billing_code_id: record.billing_code_id.clone(),
            link_state: record.link_state.as_str().to_string(),
            calculated_at: record.calculated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitBonusesResponse {
    pub visit_id: Uuid,
    pub total_points: i64,
    pub records: Vec<HistoryRecordResponse>,
}

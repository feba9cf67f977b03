//! Add-on calculation handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{DateRange, DefinitionId, FacilityId, HistoryId, VisitId};

use crate::dto::*;
use crate::{error::ApiError, AppState};

/// Unwraps a JSON body and runs its validation rules
fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    let Json(request) = payload?;
    request.validate()?;
    Ok(request)
}

/// Calculates a visit's add-ons, replacing stored history when `save` is set
#[instrument(skip(state, payload), fields(visit_id = %visit_id))]
pub async fn calculate_visit(
    State(state): State<AppState>,
    Path(visit_id): Path<Uuid>,
    payload: Result<Json<CalculateRequest>, JsonRejection>,
) -> Result<Json<CalculationResponse>, ApiError> {
    let request = validated(payload)?;
    let calculation = state
        .service
        .calculate_visit(VisitId::from_uuid(visit_id), request.save)
        .await?;

    info!(
        save = request.save,
        accepted = calculation.outcome.results.len(),
        total_points = calculation.outcome.total_points(),
        "Visit calculated"
    );
    Ok(Json(calculation.into()))
}

/// One definition version, as cited by history rows
#[instrument(skip(state), fields(definition_id = %definition_id))]
pub async fn get_definition(
    State(state): State<AppState>,
    Path(definition_id): Path<Uuid>,
) -> Result<Json<DefinitionResponse>, ApiError> {
    let definition = state
        .service
        .definition(DefinitionId::from_uuid(definition_id))
        .await?;
    Ok(Json(definition.into()))
}

/// Stored add-ons of a visit
#[instrument(skip(state), fields(visit_id = %visit_id))]
pub async fn list_visit_bonuses(
    State(state): State<AppState>,
    Path(visit_id): Path<Uuid>,
) -> Result<Json<VisitBonusesResponse>, ApiError> {
    let records = state
        .service
        .history_for_visit(VisitId::from_uuid(visit_id))
        .await?;

    Ok(Json(VisitBonusesResponse {
        visit_id,
        total_points: records.iter().map(|r| i64::from(r.points)).sum(),
        records: records.iter().map(Into::into).collect(),
    }))
}

/// Sets or clears the billing code of one history row by operator decision
#[instrument(skip(state, payload), fields(history_id = %history_id))]
pub async fn set_billing_link(
    State(state): State<AppState>,
    Path(history_id): Path<Uuid>,
    payload: Result<Json<BillingLinkRequest>, JsonRejection>,
) -> Result<Json<HistoryRecordResponse>, ApiError> {
    let request = validated(payload)?;
    let id = HistoryId::from_uuid(history_id);

    let record = match request.billing_code_id {
        Some(code) => state.service.set_manual_link(id, code).await?,
        None => state.service.clear_link(id).await?,
    };

    info!(link_state = record.link_state.as_str(), "Billing link updated");
    Ok(Json((&record).into()))
}

/// Recalculates and saves every billable visit of a facility in a period
#[instrument(skip(state, payload))]
pub async fn recalculate_period(
    State(state): State<AppState>,
    payload: Result<Json<RecalculateRequest>, JsonRejection>,
) -> Result<Json<RecalculateResponse>, ApiError> {
    let request = validated(payload)?;
    let range = DateRange::new(request.from, request.to)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let summary = state
        .service
        .recalculate_period(FacilityId::from_uuid(request.facility_id), range)
        .await?;

    info!(
        facility_id = %request.facility_id,
        processed = summary.processed,
        failed = summary.failed.len(),
        "Period recalculated"
    );
    Ok(Json(summary.into()))
}

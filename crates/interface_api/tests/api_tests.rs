//! HTTP API tests over the in-memory store

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use domain_bonus::memory::StaticBillingCodes;
use domain_bonus::VisitStatus;
use interface_api::{create_router, AppState};
use test_utils::{BonusScenario, DefinitionFixtures, TemporalFixtures};

fn app(scenario: &BonusScenario) -> Router {
    let state = AppState::new(scenario.service()).with_health_check(Arc::new(scenario.store.clone()));
    create_router(state)
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn catalog_scenario() -> BonusScenario {
    let scenario = BonusScenario::new()
        .await
        .with_billing(StaticBillingCodes::new().with_code("NIGHT_VISIT", "BC-NIGHT"));
    scenario.define(DefinitionFixtures::standard_catalog()).await;
    scenario
}

// ============================================================================
// Health
// ============================================================================

mod health {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let scenario = BonusScenario::new().await;
        let (status, body) = send(app(&scenario), Method::GET, "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_reports_adapters() {
        let scenario = BonusScenario::new().await;
        let (status, body) = send(app(&scenario), Method::GET, "/health/ready", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"].as_array().map(Vec::len), Some(1));
    }
}

// ============================================================================
// Calculation
// ============================================================================

mod calculation {
    use super::*;

    #[tokio::test]
    async fn test_calculate_and_save() {
        let scenario = catalog_scenario().await;
        let visit = scenario.record(scenario.visit().at(23, 10, 100).build()).await;
        let uri = format!("/api/v1/visits/{}/bonuses/calculate", visit.id.as_uuid());

        let (status, body) = send(app(&scenario), Method::POST, &uri, Some(json!({"save": true}))).await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["saved"], true);
        assert_eq!(body["totalPoints"], 4200 + 500);
        let codes: Vec<&str> = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|r| r["code"].as_str())
            .collect();
        assert_eq!(codes, vec!["NIGHT_VISIT", "LONG_VISIT"]);
        assert_eq!(body["results"][0]["matchedBucket"], "late_night");
        assert_eq!(body["history"].as_array().map(Vec::len), Some(2));
        assert_eq!(scenario.store.history_rows().await.len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let scenario = catalog_scenario().await;
        let visit = scenario.record(scenario.visit().at(23, 10, 100).build()).await;
        let uri = format!("/api/v1/visits/{}/bonuses/calculate", visit.id.as_uuid());

        let (status, body) = send(app(&scenario), Method::POST, &uri, Some(json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["saved"], false);
        assert!(body.get("history").is_none());
        assert!(scenario.store.history_rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_skipped_definitions_carry_reasons() {
        let scenario = catalog_scenario().await;
        let visit = scenario.record(scenario.visit().at(10, 0, 30).build()).await;
        let uri = format!("/api/v1/visits/{}/bonuses/calculate", visit.id.as_uuid());

        let (_, body) = send(app(&scenario), Method::POST, &uri, Some(json!({"save": false}))).await;

        let night = body["skipped"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["code"] == "NIGHT_VISIT")
            .cloned()
            .unwrap();
        assert_eq!(night["reason"], "not applicable: zero points");
    }

    #[tokio::test]
    async fn test_unknown_visit_is_404() {
        let scenario = catalog_scenario().await;
        let uri = format!("/api/v1/visits/{}/bonuses/calculate", uuid::Uuid::new_v4());

        let (status, body) = send(app(&scenario), Method::POST, &uri, Some(json!({"save": true}))).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_cancelled_visit_is_conflict() {
        let scenario = catalog_scenario().await;
        let visit = scenario.record(scenario.visit().status(VisitStatus::Cancelled).build()).await;
        let uri = format!("/api/v1/visits/{}/bonuses/calculate", visit.id.as_uuid());

        let (status, _) = send(app(&scenario), Method::POST, &uri, Some(json!({"save": true}))).await;

        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let scenario = catalog_scenario().await;
        let visit = scenario.record(scenario.visit().build()).await;
        let uri = format!("/api/v1/visits/{}/bonuses/calculate", visit.id.as_uuid());

        let (status, body) = send(app(&scenario), Method::POST, &uri, Some(json!({"save": "yes"}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_stored_bonuses_are_listed() {
        let scenario = catalog_scenario().await;
        let visit = scenario.record(scenario.visit().at(23, 10, 100).build()).await;
        scenario.service().calculate_visit(visit.id, true).await.unwrap();
        let uri = format!("/api/v1/visits/{}/bonuses", visit.id.as_uuid());

        let (status, body) = send(app(&scenario), Method::GET, &uri, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalPoints"], 4700);
        assert_eq!(body["records"][0]["billingCodeId"], "BC-NIGHT");
        assert_eq!(body["records"][0]["linkState"], "auto");
    }
}

// ============================================================================
// Definitions
// ============================================================================

mod definitions {
    use super::*;

    #[tokio::test]
    async fn test_get_definition() {
        let scenario = BonusScenario::new().await;
        let definition = DefinitionFixtures::long_visit();
        let id = *definition.id.as_uuid();
        scenario.define([definition]).await;
        let uri = format!("/api/v1/bonus-definitions/{id}");

        let (status, body) = send(app(&scenario), Method::GET, &uri, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], "LONG_VISIT");
        assert_eq!(body["valueKind"], "duration");
        assert_eq!(body["patternConfig"]["thresholds"][0]["minutes"], 90);
    }

    #[tokio::test]
    async fn test_unknown_definition_is_404() {
        let scenario = BonusScenario::new().await;
        let uri = format!("/api/v1/bonus-definitions/{}", uuid::Uuid::new_v4());

        let (status, _) = send(app(&scenario), Method::GET, &uri, None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

// ============================================================================
// Billing Links
// ============================================================================

mod billing_links {
    use super::*;

    async fn saved_night_row(scenario: &BonusScenario) -> String {
        let visit = scenario.record(scenario.visit().at(23, 10, 100).build()).await;
        let saved = scenario.service().calculate_visit(visit.id, true).await.unwrap();
        let row = saved.history.unwrap().into_iter().find(|r| r.code == "NIGHT_VISIT").unwrap();
        row.id.as_uuid().to_string()
    }

    #[tokio::test]
    async fn test_manual_link() {
        let scenario = catalog_scenario().await;
        let id = saved_night_row(&scenario).await;
        let uri = format!("/api/v1/bonus-history/{id}/billing-link");

        let (status, body) = send(app(&scenario), Method::PUT, &uri, Some(json!({"billingCodeId": "BC-OP"}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["billingCodeId"], "BC-OP");
        assert_eq!(body["linkState"], "manual");
    }

    #[tokio::test]
    async fn test_null_clears_link() {
        let scenario = catalog_scenario().await;
        let id = saved_night_row(&scenario).await;
        let uri = format!("/api/v1/bonus-history/{id}/billing-link");

        let (status, body) = send(app(&scenario), Method::PUT, &uri, Some(json!({"billingCodeId": null}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["billingCodeId"], Value::Null);
        assert_eq!(body["linkState"], "manually_cleared");
    }

    #[tokio::test]
    async fn test_empty_code_fails_validation() {
        let scenario = catalog_scenario().await;
        let id = saved_night_row(&scenario).await;
        let uri = format!("/api/v1/bonus-history/{id}/billing-link");

        let (status, body) = send(app(&scenario), Method::PUT, &uri, Some(json!({"billingCodeId": ""}))).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_error");
    }
}

// ============================================================================
// Recalculation
// ============================================================================

mod recalculation {
    use super::*;

    #[tokio::test]
    async fn test_period_recalculation() {
        let scenario = catalog_scenario().await;
        scenario.record(scenario.visit().at(23, 10, 100).build()).await;
        scenario.record(scenario.visit().on(TemporalFixtures::date(2024, 6, 10)).build()).await;

        let request = json!({
            "facilityId": scenario.facility.id.as_uuid(),
            "from": "2024-06-01",
            "to": "2024-06-30",
        });
        let (status, body) = send(app(&scenario), Method::POST, "/api/v1/bonuses/recalculate", Some(request)).await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["processed"], 2);
        assert_eq!(body["failed"].as_array().map(Vec::len), Some(0));
        assert_eq!(body["totalPoints"], 4700);
    }

    #[tokio::test]
    async fn test_reversed_period_is_rejected() {
        let scenario = catalog_scenario().await;
        let request = json!({
            "facilityId": scenario.facility.id.as_uuid(),
            "from": "2024-06-30",
            "to": "2024-06-01",
        });

        let (status, _) = send(app(&scenario), Method::POST, "/api/v1/bonuses/recalculate", Some(request)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}

//! PostgreSQL adapter integration tests
//!
//! Each test starts its own container; run with `cargo test -- --ignored`.

use std::sync::Arc;

use core_kernel::{DateRange, HistoryId, PortError, VisitId};
use domain_bonus::ports::{DefinitionPort, HistoryPort, VisitQuery, VisitRecordPort};
use domain_bonus::{InsuranceCategory, LinkState, VisitStatus};
use infra_db::repositories::BillingCodeRow;
use infra_db::{PostgresDefinitionAdapter, PostgresHistoryAdapter, PostgresVisitAdapter};
use test_utils::{
    assert_accepted, assert_history_matches, db_test, DefinitionFixtures, PatientRecordBuilder,
    PostgresScenario, TemporalFixtures,
};

fn june(day: u32) -> chrono::NaiveDate {
    TemporalFixtures::date(2024, 6, day)
}

// ============================================================================
// Definitions
// ============================================================================

mod definitions {
    use super::*;

    db_test!(test_find_effective_filters_and_orders, |db| {
        let scenario = PostgresScenario::new(db.pool.clone()).await.unwrap();
        let (old, new) = DefinitionFixtures::revised_pair("CARE_PLAN", 300, 350);
        scenario.define([old, new.clone(), DefinitionFixtures::time_of_day()]).await.unwrap();
        scenario
            .define([DefinitionFixtures::long_visit().inactive().with_version(9)])
            .await
            .unwrap();

        let adapter = PostgresDefinitionAdapter::new(db.pool.clone());
        let effective = adapter
            .find_effective(TemporalFixtures::visit_date(), scenario.facility.id, InsuranceCategory::Medical)
            .await
            .unwrap();

        let codes: Vec<_> = effective.iter().map(|d| (d.code.as_str(), d.version)).collect();
        assert!(codes.contains(&("NIGHT_VISIT", 1)));
        assert!(codes.contains(&(new.code.as_str(), new.version)));
        assert!(!codes.iter().any(|(code, _)| *code == "LONG_VISIT"));
        for pair in effective.windows(2) {
            assert!((pair[0].evaluation_order, pair[0].id) <= (pair[1].evaluation_order, pair[1].id));
        }
    });

    db_test!(test_definition_documents_survive_storage, |db| {
        let scenario = PostgresScenario::new(db.pool.clone()).await.unwrap();
        let enhanced = DefinitionFixtures::emergency_enhanced();
        scenario.define([enhanced.clone()]).await.unwrap();

        let adapter = PostgresDefinitionAdapter::new(db.pool.clone());
        let stored = adapter.get_definition(enhanced.id).await.unwrap();

        assert_eq!(stored, enhanced);
    });

    db_test!(test_duplicate_version_is_rejected, |db| {
        let scenario = PostgresScenario::new(db.pool.clone()).await.unwrap();
        scenario.define([DefinitionFixtures::long_visit()]).await.unwrap();

        let mut again = DefinitionFixtures::long_visit();
        again.id = core_kernel::DefinitionId::new();
        assert!(scenario.define([again]).await.is_err());
    });
}

// ============================================================================
// Visit Records
// ============================================================================

mod visits {
    use super::*;

    db_test!(test_patient_visits_respect_query, |db| {
        let scenario = PostgresScenario::new(db.pool.clone()).await.unwrap();
        let kept = scenario.record(scenario.visit().on(june(3)).build()).await.unwrap();
        scenario
            .record(scenario.visit().on(june(4)).status(VisitStatus::Cancelled).build())
            .await
            .unwrap();
        scenario.record(scenario.visit().on(june(5)).deleted().build()).await.unwrap();

        let adapter = PostgresVisitAdapter::new(db.pool.clone());
        let range = DateRange::new(june(1), june(30)).unwrap();

        let billable = adapter
            .list_patient_visits(&VisitQuery::billable(scenario.patient.id, range))
            .await
            .unwrap();
        assert_eq!(billable.iter().map(|v| v.id).collect::<Vec<_>>(), vec![kept.id]);

        let everything = VisitQuery {
            patient_id: scenario.patient.id,
            range,
            statuses: vec![],
            include_deleted: true,
        };
        assert_eq!(adapter.list_patient_visits(&everything).await.unwrap().len(), 3);
    });

    db_test!(test_site_patients_are_counted_once, |db| {
        let site = test_utils::IdFixtures::site_id();
        let first = PatientRecordBuilder::new().site(site).build();
        let scenario = PostgresScenario::with(
            db.pool.clone(),
            test_utils::FacilityRecordBuilder::new().build(),
            first.clone(),
        )
        .await
        .unwrap();
        let second = scenario.add_patient(PatientRecordBuilder::new().site(site).build()).await.unwrap();

        scenario.record(scenario.visit().at(9, 0, 30).build()).await.unwrap();
        scenario.record(scenario.visit().at(15, 0, 30).build()).await.unwrap();
        scenario
            .record(test_utils::VisitRecordBuilder::new(second.id, scenario.facility.id).build())
            .await
            .unwrap();

        let count = PostgresVisitAdapter::new(db.pool.clone())
            .count_site_patients(TemporalFixtures::visit_date(), scenario.facility.id, site)
            .await
            .unwrap();
        assert_eq!(count, 2);
    });

    db_test!(test_missing_visit_is_not_found, |db| {
        let adapter = PostgresVisitAdapter::new(db.pool.clone());
        let result = adapter.get_visit(VisitId::new()).await;
        assert!(matches!(result, Err(ref e) if e.is_not_found()));
    });
}

// ============================================================================
// History
// ============================================================================

mod history {
    use super::*;

    async fn seeded(db: &test_utils::TestDatabase) -> PostgresScenario {
        let scenario = PostgresScenario::new(db.pool.clone()).await.unwrap();
        scenario
            .define([DefinitionFixtures::time_of_day(), DefinitionFixtures::long_visit()])
            .await
            .unwrap();
        scenario
            .billing_code(BillingCodeRow::new(
                "BC-NIGHT",
                "NIGHT_VISIT",
                InsuranceCategory::Medical,
                TemporalFixtures::catalog_start(),
            ))
            .await
            .unwrap();
        scenario
    }

    db_test!(test_saved_rows_mirror_outcome, |db| {
        let scenario = seeded(&db).await;
        let visit = scenario.record(scenario.visit().at(22, 30, 100).build()).await.unwrap();

        let calculation = scenario.service().calculate_visit(visit.id, true).await.unwrap();
        assert_accepted(&calculation.outcome, "NIGHT_VISIT", 4200);

        let rows = scenario.service().history_for_visit(visit.id).await.unwrap();
        assert_history_matches(&calculation.outcome, &rows);
        let night = rows.iter().find(|r| r.code == "NIGHT_VISIT").unwrap();
        assert_eq!(night.billing_code_id.as_deref(), Some("BC-NIGHT"));
        let long = rows.iter().find(|r| r.code == "LONG_VISIT").unwrap();
        assert_eq!(long.billing_code_id, None);
    });

    db_test!(test_recalculation_keeps_manual_link, |db| {
        let scenario = seeded(&db).await;
        let visit = scenario.record(scenario.visit().at(22, 30, 100).build()).await.unwrap();
        let service = scenario.service();
        let saved = service.calculate_visit(visit.id, true).await.unwrap().history.unwrap();
        let night = saved.iter().find(|r| r.code == "NIGHT_VISIT").unwrap();

        service.set_manual_link(night.id, "BC-OPERATOR".into()).await.unwrap();
        service.calculate_visit(visit.id, true).await.unwrap();

        let rows = service.history_for_visit(visit.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        let night = rows.iter().find(|r| r.code == "NIGHT_VISIT").unwrap();
        assert_eq!(night.link_state, LinkState::Manual);
        assert_eq!(night.billing_code_id.as_deref(), Some("BC-OPERATOR"));
    });

    db_test!(test_dropped_transaction_rolls_back, |db| {
        let scenario = seeded(&db).await;
        let visit = scenario.record(scenario.visit().at(22, 30, 100).build()).await.unwrap();
        scenario.service().calculate_visit(visit.id, true).await.unwrap();

        let adapter = PostgresHistoryAdapter::new(db.pool.clone());
        {
            let mut tx = adapter.begin().await.unwrap();
            assert_eq!(tx.delete_for_visit(visit.id).await.unwrap(), 2);
        }

        assert_eq!(adapter.find_by_visit(visit.id).await.unwrap().len(), 2);
    });

    db_test!(test_monthly_occurrences_skip_cancelled_visits, |db| {
        let scenario = PostgresScenario::new(db.pool.clone()).await.unwrap();
        scenario.define([DefinitionFixtures::long_visit()]).await.unwrap();
        let service = scenario.service();

        let mut last = None;
        for day in [3, 4, 5] {
            let visit = scenario.record(scenario.visit().on(june(day)).at(10, 0, 120).build()).await.unwrap();
            service.calculate_visit(visit.id, true).await.unwrap();
            last = Some(visit.id);
        }
        let cancelled = scenario
            .visit()
            .with_id(last.unwrap())
            .on(june(5))
            .at(10, 0, 120)
            .status(VisitStatus::Cancelled)
            .build();
        scenario.record(cancelled).await.unwrap();

        let history: Arc<dyn HistoryPort> = Arc::new(PostgresHistoryAdapter::new(db.pool.clone()));
        let month = DateRange::month_of(june(3)).unwrap();
        let count = history
            .count_monthly_occurrences(scenario.patient.id, "LONG_VISIT", month, VisitId::new())
            .await
            .unwrap();
        assert_eq!(count, 2);
    });

    db_test!(test_link_unknown_row_is_not_found, |db| {
        let adapter = PostgresHistoryAdapter::new(db.pool.clone());
        let result = adapter.set_billing_link(HistoryId::new(), None, LinkState::ManuallyCleared).await;
        assert!(matches!(result, Err(PortError::NotFound { .. })));
    });
}

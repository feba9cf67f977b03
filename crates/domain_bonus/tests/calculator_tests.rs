//! Integration tests for bonus calculation
//!
//! Tests run the full service (assembly, selection, gates, patterns) against
//! the in-memory store.

use chrono::NaiveDate;
use serde_json::json;

use domain_bonus::{
    AddOnDefinition, ConditionSpec, InsuranceCategory, SkipReason, VisitStatus,
};
use test_utils::{
    assert_accepted, assert_not_accepted, assert_skipped, BonusScenario, DefinitionFixtures,
    FacilityRecordBuilder, PatientRecordBuilder, TemporalFixtures,
};

fn june(day: u32) -> NaiveDate {
    TemporalFixtures::date(2024, 6, day)
}

// ============================================================================
// Value Patterns
// ============================================================================

mod patterns {
    use super::*;

    #[tokio::test]
    async fn test_long_visit_over_ninety_minutes() {
        let scenario = BonusScenario::new().await;
        scenario.define([DefinitionFixtures::long_visit()]).await;
        let visit = scenario.record(scenario.visit().at(10, 0, 95).build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_accepted(&calculation.outcome, "LONG_VISIT", 500);
        let result = calculation.outcome.result_for("LONG_VISIT").unwrap();
        assert_eq!(result.trail.value_kind, "duration");
        assert_eq!(result.trail.pattern_metadata["duration_minutes"], 95);
    }

    #[tokio::test]
    async fn test_exactly_ninety_minutes_is_not_long() {
        let scenario = BonusScenario::new().await;
        scenario.define([DefinitionFixtures::long_visit()]).await;
        let visit = scenario.record(scenario.visit().at(10, 0, 90).build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_skipped(&calculation.outcome, "LONG_VISIT", |r| *r == SkipReason::ZeroPoints);
    }

    #[tokio::test]
    async fn test_late_night_bucket_in_facility_timezone() {
        let scenario = BonusScenario::new().await;
        scenario.define([DefinitionFixtures::time_of_day()]).await;
        let visit = scenario.record(scenario.visit().at(23, 10, 40).build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_accepted(&calculation.outcome, "NIGHT_VISIT", 4200);
        let result = calculation.outcome.result_for("NIGHT_VISIT").unwrap();
        assert_eq!(result.trail.matched_bucket, "late_night");
    }

    #[tokio::test]
    async fn test_daytime_visit_gets_no_time_add_on() {
        let scenario = BonusScenario::new().await;
        scenario.define([DefinitionFixtures::time_of_day()]).await;
        let visit = scenario.record(scenario.visit().at(13, 0, 40).build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_not_accepted(&calculation.outcome, "NIGHT_VISIT");
    }

    #[tokio::test]
    async fn test_child_bracket_uses_age_on_visit_date() {
        let patient = PatientRecordBuilder::new().born(TemporalFixtures::date(2018, 6, 4)).build();
        let scenario = BonusScenario::with(FacilityRecordBuilder::new().build(), patient).await;
        scenario.define([DefinitionFixtures::child()]).await;
        let visit = scenario.record(scenario.visit().build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        // Turns six the day after the visit
        assert_eq!(calculation.context.patient_age, 5);
        assert_accepted(&calculation.outcome, "CHILD", 1300);
    }

    #[tokio::test]
    async fn test_sixth_birthday_moves_to_older_bracket() {
        let patient = PatientRecordBuilder::new().born(TemporalFixtures::date(2018, 6, 3)).build();
        let scenario = BonusScenario::with(FacilityRecordBuilder::new().build(), patient).await;
        scenario.define([DefinitionFixtures::child()]).await;
        let visit = scenario.record(scenario.visit().build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_eq!(calculation.context.patient_age, 6);
        assert_accepted(&calculation.outcome, "CHILD", 500);
    }

    #[tokio::test]
    async fn test_untimed_visit_skips_time_of_day_as_error() {
        let scenario = BonusScenario::new().await;
        scenario
            .define([DefinitionFixtures::time_of_day(), DefinitionFixtures::child()])
            .await;
        let visit = scenario.record(scenario.visit().times(None, None).build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_skipped(&calculation.outcome, "NIGHT_VISIT", |r| {
            matches!(r, SkipReason::Error { message } if message.contains("start time"))
        });
    }

    #[tokio::test]
    async fn test_second_visit_of_day() {
        let scenario = BonusScenario::new().await;
        scenario.define([DefinitionFixtures::multiple_visits()]).await;
        let morning = scenario.record(scenario.visit().at(9, 0, 30).build()).await;
        let afternoon = scenario.record(scenario.visit().at(15, 0, 30).build()).await;
        let service = scenario.service();

        let first = service.calculate_visit(morning.id, false).await.unwrap();
        let second = service.calculate_visit(afternoon.id, false).await.unwrap();

        assert_eq!(first.context.visit_ordinal, 1);
        assert_skipped(&first.outcome, "MULTI_VISIT", |r| matches!(r, SkipReason::ConditionFailed { .. }));
        assert_eq!(second.context.visit_ordinal, 2);
        assert_accepted(&second.outcome, "MULTI_VISIT", 4500);
    }

    #[tokio::test]
    async fn test_same_site_occupancy_tiers() {
        let site = test_utils::IdFixtures::site_id();
        let patient = PatientRecordBuilder::new().site(site).build();
        let scenario = BonusScenario::with(FacilityRecordBuilder::new().build(), patient).await;
        scenario.define([DefinitionFixtures::same_site()]).await;
        let visit = scenario.record(scenario.visit().build()).await;

        let neighbour = scenario.add_patient(PatientRecordBuilder::new().site(site).build()).await;
        scenario
            .record(test_utils::VisitRecordBuilder::new(neighbour.id, scenario.facility.id).build())
            .await;

        let two = scenario.service().calculate_visit(visit.id, false).await.unwrap();
        assert_accepted(&two.outcome, "SAME_SITE", 300);

        let third = scenario.add_patient(PatientRecordBuilder::new().site(site).build()).await;
        scenario
            .record(test_utils::VisitRecordBuilder::new(third.id, scenario.facility.id).build())
            .await;

        let three = scenario.service().calculate_visit(visit.id, false).await.unwrap();
        assert_accepted(&three.outcome, "SAME_SITE", 150);
    }

    #[tokio::test]
    async fn test_monthly_day_threshold_counts_distinct_days() {
        let scenario = BonusScenario::new().await;
        let definition = AddOnDefinition::conditional(
            "EMERGENCY_DAYS",
            "Emergency by day count",
            "monthly_day_threshold",
            json!({"day_limit": 2, "up_to_limit": 2650, "after_limit": 2000}),
            InsuranceCategory::Medical,
            TemporalFixtures::catalog_start(),
        )
        .with_condition(ConditionSpec::new("is_emergency"));
        scenario.define([definition]).await;

        // Two visits on the 1st count as one day
        scenario.record(scenario.visit().on(june(1)).at(9, 0, 30).emergency().build()).await;
        scenario.record(scenario.visit().on(june(1)).at(15, 0, 30).emergency().build()).await;
        let second_day = scenario.record(scenario.visit().on(june(2)).emergency().build()).await;
        let third_day = scenario.record(scenario.visit().on(june(3)).emergency().build()).await;
        let service = scenario.service();

        let on_limit = service.calculate_visit(second_day.id, false).await.unwrap();
        assert_accepted(&on_limit.outcome, "EMERGENCY_DAYS", 2650);

        let after_limit = service.calculate_visit(third_day.id, false).await.unwrap();
        assert_accepted(&after_limit.outcome, "EMERGENCY_DAYS", 2000);
    }
}

// ============================================================================
// Versioning
// ============================================================================

mod versioning {
    use super::*;

    #[tokio::test]
    async fn test_revision_boundary_selects_one_version() {
        let scenario = BonusScenario::new().await;
        let (old, new) = DefinitionFixtures::revised_pair("BASE", 100, 120);
        scenario.define([old, new]).await;
        let before = scenario.record(scenario.visit().on(TemporalFixtures::date(2024, 5, 31)).build()).await;
        let after = scenario.record(scenario.visit().on(june(1)).build()).await;
        let service = scenario.service();

        let may = service.calculate_visit(before.id, false).await.unwrap();
        assert_accepted(&may.outcome, "BASE", 100);
        assert_eq!(may.outcome.result_for("BASE").unwrap().definition_version, 1);

        let june = service.calculate_visit(after.id, false).await.unwrap();
        assert_accepted(&june.outcome, "BASE", 120);
        assert_eq!(june.outcome.results.len(), 1);
    }

    #[tokio::test]
    async fn test_other_category_is_not_selected() {
        let scenario = BonusScenario::new().await;
        scenario
            .define([AddOnDefinition::fixed("CARE_ONLY", "Care only", 300, InsuranceCategory::Care, TemporalFixtures::catalog_start())])
            .await;
        let visit = scenario.record(scenario.visit().build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert!(calculation.outcome.results.is_empty());
        assert!(calculation.outcome.skipped.is_empty());
    }
}

// ============================================================================
// Combination Rules
// ============================================================================

mod combination {
    use super::*;

    fn emergency_facility() -> domain_bonus::FacilityRecord {
        FacilityRecordBuilder::new().emergency_enhanced(true).build()
    }

    #[tokio::test]
    async fn test_enhancement_follows_dependency_and_allow_list() {
        let scenario = BonusScenario::with(emergency_facility(), PatientRecordBuilder::new().build()).await;
        scenario
            .define([
                DefinitionFixtures::emergency_enhanced(),
                DefinitionFixtures::emergency(),
                DefinitionFixtures::time_of_day(),
            ])
            .await;
        let visit = scenario.record(scenario.visit().at(23, 30, 40).emergency().build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        let codes: Vec<_> = calculation.outcome.results.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["NIGHT_VISIT", "EMERGENCY", "EMERGENCY_ENHANCED"]);
    }

    #[tokio::test]
    async fn test_allow_list_rejects_unlisted_accepted_code() {
        let child = PatientRecordBuilder::new().born(TemporalFixtures::date(2020, 1, 1)).build();
        let scenario = BonusScenario::with(emergency_facility(), child).await;
        scenario
            .define([
                DefinitionFixtures::emergency_enhanced(),
                DefinitionFixtures::emergency(),
                DefinitionFixtures::child(),
            ])
            .await;
        let visit = scenario.record(scenario.visit().emergency().build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_accepted(&calculation.outcome, "CHILD", 1300);
        assert_accepted(&calculation.outcome, "EMERGENCY", 2650);
        assert_skipped(&calculation.outcome, "EMERGENCY_ENHANCED", |r| {
            matches!(r, SkipReason::CombinationDenied { reason } if reason.contains("CHILD"))
        });
    }

    #[tokio::test]
    async fn test_deny_list_uses_priority_order() {
        let scenario = BonusScenario::new().await;
        let first = AddOnDefinition::fixed("A", "A", 100, InsuranceCategory::Medical, TemporalFixtures::catalog_start())
            .with_order(1);
        let second = AddOnDefinition::fixed("B", "B", 200, InsuranceCategory::Medical, TemporalFixtures::catalog_start())
            .with_order(2)
            .not_combinable_with(["A"]);
        scenario.define([second, first]).await;
        let visit = scenario.record(scenario.visit().build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_accepted(&calculation.outcome, "A", 100);
        assert_skipped(&calculation.outcome, "B", |r| matches!(r, SkipReason::CombinationDenied { .. }));
    }

    #[tokio::test]
    async fn test_dependency_cycle_is_skipped_not_fatal() {
        let scenario = BonusScenario::new().await;
        let a = AddOnDefinition::fixed("A", "A", 100, InsuranceCategory::Medical, TemporalFixtures::catalog_start())
            .depending_on(["B"]);
        let b = AddOnDefinition::fixed("B", "B", 100, InsuranceCategory::Medical, TemporalFixtures::catalog_start())
            .depending_on(["A"]);
        let c = AddOnDefinition::fixed("C", "C", 100, InsuranceCategory::Medical, TemporalFixtures::catalog_start());
        scenario.define([a, b, c]).await;
        let visit = scenario.record(scenario.visit().build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_accepted(&calculation.outcome, "C", 100);
        assert_skipped(&calculation.outcome, "A", |r| *r == SkipReason::DependencyCycle);
        assert_skipped(&calculation.outcome, "B", |r| *r == SkipReason::DependencyCycle);
    }
}

// ============================================================================
// History-backed Conditions
// ============================================================================

mod history_conditions {
    use super::*;

    #[tokio::test]
    async fn test_monthly_cap_allows_fourteenth_and_denies_fifteenth() {
        let scenario = BonusScenario::new().await;
        scenario.define([DefinitionFixtures::emergency()]).await;
        let service = scenario.service();

        for day in 1..=13 {
            let visit = scenario.record(scenario.visit().on(june(day)).emergency().build()).await;
            let saved = service.calculate_visit(visit.id, true).await.unwrap();
            assert_accepted(&saved.outcome, "EMERGENCY", 2650);
        }

        let fourteenth = scenario.record(scenario.visit().on(june(14)).emergency().build()).await;
        let calculation = service.calculate_visit(fourteenth.id, true).await.unwrap();
        assert_accepted(&calculation.outcome, "EMERGENCY", 2650);

        let fifteenth = scenario.record(scenario.visit().on(june(15)).emergency().build()).await;
        let calculation = service.calculate_visit(fifteenth.id, false).await.unwrap();
        assert_skipped(&calculation.outcome, "EMERGENCY", |r| {
            matches!(r, SkipReason::ConditionFailed { kind, .. } if kind == "monthly_cap")
        });
    }

    #[tokio::test]
    async fn test_monthly_cap_ignores_cancelled_visits_and_recalculation() {
        let scenario = BonusScenario::new().await;
        let mut capped = DefinitionFixtures::emergency();
        capped.conditions.retain(|c| c.kind != "monthly_cap");
        let capped = capped.with_condition(ConditionSpec::new("monthly_cap").with_value(1));
        scenario.define([capped]).await;
        let service = scenario.service();

        let visit = scenario.record(scenario.visit().on(june(1)).emergency().build()).await;
        service.calculate_visit(visit.id, true).await.unwrap();

        // Recalculating the same visit does not count itself
        let again = service.calculate_visit(visit.id, true).await.unwrap();
        assert_accepted(&again.outcome, "EMERGENCY", 2650);

        // Once the first visit is cancelled its history no longer counts
        scenario
            .record(domain_bonus::VisitRecord { status: VisitStatus::Cancelled, ..visit.clone() })
            .await;
        let next = scenario.record(scenario.visit().on(june(2)).emergency().build()).await;
        let calculation = service.calculate_visit(next.id, false).await.unwrap();
        assert_accepted(&calculation.outcome, "EMERGENCY", 2650);
    }

    #[tokio::test]
    async fn test_terminal_care_needs_two_visits_in_window() {
        let death = june(10);
        let patient = PatientRecordBuilder::new().died(death, "home").build();
        let scenario = BonusScenario::with(FacilityRecordBuilder::new().build(), patient).await;
        scenario.define([DefinitionFixtures::terminal_care()]).await;
        let service = scenario.service();

        let last = scenario.record(scenario.visit().on(death).terminal_care().build()).await;
        let alone = service.calculate_visit(last.id, false).await.unwrap();
        assert_skipped(&alone.outcome, "TERMINAL_CARE", |r| {
            matches!(r, SkipReason::ConditionFailed { kind, .. } if kind == "terminal_care_eligibility")
        });

        scenario.record(scenario.visit().on(june(5)).terminal_care().build()).await;
        let with_earlier = service.calculate_visit(last.id, false).await.unwrap();
        assert_accepted(&with_earlier.outcome, "TERMINAL_CARE", 25000);
    }

    #[tokio::test]
    async fn test_terminal_care_outside_window_or_location() {
        let death = june(20);
        let patient = PatientRecordBuilder::new().died(death, "hospital").build();
        let scenario = BonusScenario::with(FacilityRecordBuilder::new().build(), patient).await;
        scenario.define([DefinitionFixtures::terminal_care()]).await;
        scenario.record(scenario.visit().on(june(19)).terminal_care().build()).await;
        let last = scenario.record(scenario.visit().on(death).terminal_care().build()).await;

        let calculation = scenario.service().calculate_visit(last.id, false).await.unwrap();

        assert_skipped(&calculation.outcome, "TERMINAL_CARE", |r| {
            matches!(r, SkipReason::ConditionFailed { reason, .. } if reason.contains("location"))
        });
    }
}

// ============================================================================
// Error Isolation
// ============================================================================

mod error_isolation {
    use super::*;

    #[tokio::test]
    async fn test_unknown_pattern_skips_only_that_definition() {
        let scenario = BonusScenario::new().await;
        let broken = AddOnDefinition::conditional(
            "BROKEN",
            "Broken",
            "phase_of_moon",
            json!({}),
            InsuranceCategory::Medical,
            TemporalFixtures::catalog_start(),
        );
        scenario.define([broken, DefinitionFixtures::long_visit()]).await;
        let visit = scenario.record(scenario.visit().at(10, 0, 120).build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_accepted(&calculation.outcome, "LONG_VISIT", 500);
        assert_skipped(&calculation.outcome, "BROKEN", |r| {
            matches!(r, SkipReason::Error { message } if message.contains("phase_of_moon"))
        });
    }

    #[tokio::test]
    async fn test_history_lookup_failure_skips_only_that_definition() {
        let scenario = BonusScenario::new().await;
        scenario.define([DefinitionFixtures::emergency(), DefinitionFixtures::time_of_day()]).await;
        scenario.store.set_fail_history_lookups(true).await;
        let visit = scenario.record(scenario.visit().at(22, 15, 30).emergency().build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_accepted(&calculation.outcome, "NIGHT_VISIT", 4200);
        assert_skipped(&calculation.outcome, "EMERGENCY", |r| matches!(r, SkipReason::Error { .. }));
    }

    #[tokio::test]
    async fn test_unknown_condition_kind_fails_gate() {
        let scenario = BonusScenario::new().await;
        let definition = AddOnDefinition::fixed("ODD", "Odd", 100, InsuranceCategory::Medical, TemporalFixtures::catalog_start())
            .with_condition(ConditionSpec::new("is_full_moon"));
        scenario.define([definition]).await;
        let visit = scenario.record(scenario.visit().build()).await;

        let calculation = scenario.service().calculate_visit(visit.id, false).await.unwrap();

        assert_skipped(&calculation.outcome, "ODD", |r| {
            matches!(r, SkipReason::ConditionFailed { reason, .. } if reason.contains("unknown condition kind"))
        });
    }
}

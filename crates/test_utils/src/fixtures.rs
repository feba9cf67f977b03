//! Pre-built Test Fixtures
//!
//! Ready-to-use dates, identifiers and add-on definitions. The definition
//! fixtures form a small but representative catalog covering every value
//! pattern and the history-backed conditions.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use core_kernel::{FacilityId, PatientId, SiteId, Timezone, ValidityWindow};
use domain_bonus::{AddOnDefinition, ConditionSpec, InsuranceCategory};

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid fixture date")
    }

    /// Zone used by the fixture facility
    pub fn tokyo() -> Timezone {
        Timezone::new(chrono_tz::Asia::Tokyo)
    }

    /// Standard visit date (Monday 3 June 2024)
    pub fn visit_date() -> NaiveDate {
        Self::date(2024, 6, 3)
    }

    /// Fee schedule revision day used by versioned fixtures
    pub fn revision_date() -> NaiveDate {
        Self::date(2024, 6, 1)
    }

    /// Start of the catalog's validity
    pub fn catalog_start() -> NaiveDate {
        Self::date(2022, 4, 1)
    }

    /// The UTC instant of a Tokyo wall-clock time
    pub fn tokyo_time(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
        chrono_tz::Asia::Tokyo
            .from_local_datetime(&date.and_hms_opt(hour, minute, 0).expect("valid fixture time"))
            .single()
            .expect("unambiguous Tokyo time")
            .with_timezone(&Utc)
    }
}

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    /// Deterministic facility id
    pub fn facility_id() -> FacilityId {
        FacilityId::from_uuid(Uuid::from_u128(0x5f0e_8400_e29b_41d4_a716_4466_5544_0001))
    }

    /// Deterministic patient id
    pub fn patient_id() -> PatientId {
        PatientId::from_uuid(Uuid::from_u128(0x5f0e_8400_e29b_41d4_a716_4466_5544_0002))
    }

    /// Deterministic site id
    pub fn site_id() -> SiteId {
        SiteId::from_uuid(Uuid::from_u128(0x5f0e_8400_e29b_41d4_a716_4466_5544_0003))
    }
}

/// Fixture for add-on definitions
pub struct DefinitionFixtures;

impl DefinitionFixtures {
    fn medical_fixed(code: &str, name: &str, points: i32) -> AddOnDefinition {
        AddOnDefinition::fixed(code, name, points, InsuranceCategory::Medical, TemporalFixtures::catalog_start())
    }

    fn medical_pattern(code: &str, name: &str, kind: &str, config: serde_json::Value) -> AddOnDefinition {
        AddOnDefinition::conditional(
            code,
            name,
            kind,
            config,
            InsuranceCategory::Medical,
            TemporalFixtures::catalog_start(),
        )
    }

    /// Late-night / early-morning / night visit add-on
    pub fn time_of_day() -> AddOnDefinition {
        Self::medical_pattern(
            "NIGHT_VISIT",
            "Night and early morning visit",
            "time_of_day",
            json!({"late_night": 4200, "early_morning": 2100, "night": 2100, "daytime": 0}),
        )
        .with_order(10)
    }

    /// Long visit add-on: over 90 minutes earns 500 points
    pub fn long_visit() -> AddOnDefinition {
        Self::medical_pattern(
            "LONG_VISIT",
            "Long visit",
            "duration",
            json!({"thresholds": [{"minutes": 90, "operator": "gt", "points": 500}], "default": 0}),
        )
        .with_order(20)
    }

    /// Infant and child add-on by age bracket
    pub fn child() -> AddOnDefinition {
        Self::medical_pattern(
            "CHILD",
            "Infant and child",
            "age_bracket",
            json!({"age_0_6": 1300, "age_6_15": 500}),
        )
        .with_order(30)
    }

    /// Multiple visits a day add-on by visit ordinal
    pub fn multiple_visits() -> AddOnDefinition {
        Self::medical_pattern(
            "MULTI_VISIT",
            "Multiple visits per day",
            "visit_ordinal",
            json!({"first": 0, "second": 4500, "third_or_later": 8000}),
        )
        .with_order(40)
        .with_condition(ConditionSpec::new("is_second_visit"))
    }

    /// Emergency visit add-on, capped at 14 a month
    pub fn emergency() -> AddOnDefinition {
        Self::medical_fixed("EMERGENCY", "Emergency visit", 2650)
            .with_order(50)
            .with_condition(ConditionSpec::new("is_emergency"))
            .with_condition(ConditionSpec::new("facility_emergency_support"))
            .with_condition(ConditionSpec::new("monthly_cap").with_value(14))
    }

    /// Emergency enhancement; only alongside the emergency add-on
    pub fn emergency_enhanced() -> AddOnDefinition {
        Self::medical_fixed("EMERGENCY_ENHANCED", "Emergency enhanced", 1000)
            .with_order(5)
            .depending_on(["EMERGENCY"])
            .combinable_only_with(["EMERGENCY", "NIGHT_VISIT", "LONG_VISIT"])
            .with_condition(ConditionSpec::new("code_accepted").with_value("EMERGENCY"))
            .with_condition(ConditionSpec::new("facility_emergency_enhanced"))
    }

    /// Terminal care add-on for visits on the day of death at home
    pub fn terminal_care() -> AddOnDefinition {
        Self::medical_fixed("TERMINAL_CARE", "Terminal care", 25000)
            .with_order(60)
            .with_condition(
                ConditionSpec::new("terminal_care_eligibility")
                    .with_value(json!({"allowed_death_locations": ["home", "nursing_home"]})),
            )
    }

    /// Same-building reduction tiers as a positive add-on
    pub fn same_site() -> AddOnDefinition {
        Self::medical_pattern(
            "SAME_SITE",
            "Same building visits",
            "same_site_occupancy",
            json!({"up_to_two": 300, "three_or_more": 150}),
        )
        .with_order(70)
        .with_condition(ConditionSpec::new("has_site_assignment"))
    }

    /// A revision of a fixed add-on, split at the revision date
    pub fn revised_pair(code: &str, before: i32, after: i32) -> (AddOnDefinition, AddOnDefinition) {
        let revision = TemporalFixtures::revision_date();
        let old = Self::medical_fixed(code, code, before).with_validity(
            ValidityWindow::new(
                TemporalFixtures::catalog_start(),
                revision.pred_opt(),
            )
            .expect("valid fixture window"),
        );
        let new = Self::medical_fixed(code, code, after)
            .with_version(2)
            .with_validity(ValidityWindow::open_from(revision));
        (old, new)
    }

    /// The standard medical catalog
    pub fn standard_catalog() -> Vec<AddOnDefinition> {
        vec![
            Self::time_of_day(),
            Self::long_visit(),
            Self::child(),
            Self::multiple_visits(),
            Self::emergency(),
            Self::emergency_enhanced(),
            Self::terminal_care(),
            Self::same_site(),
        ]
    }
}

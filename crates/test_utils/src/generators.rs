//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use core_kernel::{FacilityId, ValidityWindow};
use domain_bonus::{AddOnDefinition, InsuranceCategory};

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 1).expect("valid base date")
}

/// Strategy for dates between 2022 and 2026
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..1500).prop_map(|days| base_date() + Duration::days(days))
}

/// Strategy for insurance categories
pub fn category_strategy() -> impl Strategy<Value = InsuranceCategory> {
    prop_oneof![Just(InsuranceCategory::Medical), Just(InsuranceCategory::Care)]
}

/// Strategy for validity windows, bounded or open-ended
pub fn validity_strategy() -> impl Strategy<Value = ValidityWindow> {
    (date_strategy(), proptest::option::of(0i64..800)).prop_map(|(from, len)| ValidityWindow {
        from,
        to: len.map(|days| from + Duration::days(days)),
    })
}

/// Strategy for definitions scoped to one of the given facilities or global
pub fn definition_strategy(facilities: Vec<FacilityId>) -> impl Strategy<Value = AddOnDefinition> {
    let facility_count = facilities.len();
    (
        "[A-Z]{2,6}",
        1i32..5000,
        category_strategy(),
        validity_strategy(),
        -5i32..50,
        any::<bool>(),
        proptest::option::of(0..facility_count.max(1)),
    )
        .prop_map(move |(code, points, category, validity, order, active, scope)| {
            let mut definition = AddOnDefinition::fixed(code.clone(), code, points, category, validity.from)
                .with_validity(validity)
                .with_order(order);
            definition.facility_id = scope.and_then(|i| facilities.get(i).copied());
            if !active {
                definition = definition.inactive();
            }
            definition
        })
}

/// Strategy for visit lengths in minutes
pub fn duration_minutes_strategy() -> impl Strategy<Value = i64> {
    0i64..240
}

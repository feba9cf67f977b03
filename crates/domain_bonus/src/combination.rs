//! Combination constraints between add-ons
//!
//! A candidate is checked against the codes already accepted earlier in the
//! same calculation. The allow-list is checked before the deny-list; an
//! unset or empty allow-list allows anything.

use std::collections::BTreeSet;

use crate::definition::AddOnDefinition;

/// Verdict of a combination check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinationCheck {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl CombinationCheck {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Checks a candidate definition against already-accepted codes
pub fn check_combination(
    candidate: &AddOnDefinition,
    accepted_codes: &BTreeSet<String>,
) -> CombinationCheck {
    if let Some(allow) = candidate.can_combine_with_only.as_ref().filter(|l| !l.is_empty()) {
        if let Some(code) = accepted_codes.iter().find(|c| !allow.contains(c)) {
            return CombinationCheck::deny(format!(
                "'{}' can only be combined with {:?}, but '{}' is already accepted",
                candidate.code, allow, code
            ));
        }
    }

    if let Some(deny) = candidate.cannot_combine_with.as_ref() {
        if let Some(code) = deny.iter().find(|c| accepted_codes.contains(*c)) {
            return CombinationCheck::deny(format!(
                "'{}' cannot be combined with '{}'",
                candidate.code, code
            ));
        }
    }

    CombinationCheck::allow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::InsuranceCategory;
    use chrono::NaiveDate;

    fn definition(code: &str) -> AddOnDefinition {
        AddOnDefinition::fixed(code, code, 100, InsuranceCategory::Medical, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn accepted(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_nothing_accepted_always_allows() {
        let def = definition("X").combinable_only_with(["A"]).not_combinable_with(["B"]);
        assert!(check_combination(&def, &BTreeSet::new()).allowed);
    }

    #[test]
    fn test_allow_list_denies_unlisted_code() {
        let def = definition("X").combinable_only_with(["A", "B"]);
        assert!(check_combination(&def, &accepted(&["A", "B"])).allowed);

        let check = check_combination(&def, &accepted(&["A", "C"]));
        assert!(!check.allowed);
        assert!(check.reason.unwrap().contains("'C'"));
    }

    #[test]
    fn test_empty_allow_list_is_unset() {
        let def = definition("X").combinable_only_with(Vec::<String>::new());
        assert!(check_combination(&def, &accepted(&["Z"])).allowed);
    }

    #[test]
    fn test_deny_list() {
        let def = definition("X").not_combinable_with(["B"]);
        assert!(check_combination(&def, &accepted(&["A"])).allowed);
        assert!(!check_combination(&def, &accepted(&["A", "B"])).allowed);
    }
}

//! Add-on definitions
//!
//! An add-on definition is a versioned, data-driven rule: which visits it
//! applies to (scope and validity window), which gates must pass
//! (conditions), how many points it is worth (fixed or a pattern) and which
//! other add-ons it may coexist with.
//!
//! Revising a rule never edits it in place; a new version with a new id and
//! a fresh validity window is inserted next to the old one.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use core_kernel::{DefinitionId, FacilityId, ValidityWindow};

/// Insurance category a definition (and a patient) is billed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsuranceCategory {
    /// Medical insurance
    Medical,
    /// Long-term care insurance
    Care,
}

impl InsuranceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsuranceCategory::Medical => "medical",
            InsuranceCategory::Care => "care",
        }
    }
}

impl fmt::Display for InsuranceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsuranceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "medical" => Ok(InsuranceCategory::Medical),
            "care" => Ok(InsuranceCategory::Care),
            other => Err(format!("unknown insurance category: {other}")),
        }
    }
}

/// How a definition's point value is determined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "value_type", rename_all = "snake_case")]
pub enum ValueType {
    /// A constant number of points
    Fixed { points: i32 },
    /// Points chosen by a named pattern from its configuration
    Conditional {
        pattern_kind: String,
        pattern_config: Value,
    },
}

impl ValueType {
    /// Label recorded in the calculation trail
    pub fn kind_label(&self) -> &str {
        match self {
            ValueType::Fixed { .. } => "fixed",
            ValueType::Conditional { pattern_kind, .. } => pattern_kind,
        }
    }
}

/// One declarative gate on a definition
///
/// `kind` selects the evaluator; `field`, `value` and `operator` are
/// interpreted per kind. For boolean flag kinds, `value` is the expected
/// flag (default `true`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

impl ConditionSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            field: None,
            value: None,
            operator: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Expected flag value for boolean kinds; absent or non-boolean means true
    pub fn expected_flag(&self) -> bool {
        self.value.as_ref().and_then(Value::as_bool).unwrap_or(true)
    }
}

/// A versioned add-on rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddOnDefinition {
    pub id: DefinitionId,
    /// Business code, shared by every version of the same add-on
    pub code: String,
    pub name: String,
    pub version: i32,
    /// None means the definition applies to every facility
    pub facility_id: Option<FacilityId>,
    pub insurance_category: InsuranceCategory,
    pub validity: ValidityWindow,
    pub value: ValueType,
    pub conditions: Vec<ConditionSpec>,
    /// When set and non-empty, every already-accepted code must be listed
    pub can_combine_with_only: Option<Vec<String>>,
    /// When set, none of the listed codes may already be accepted
    pub cannot_combine_with: Option<Vec<String>>,
    /// Codes that must be evaluated before this one
    pub depends_on: Vec<String>,
    /// Lower values are evaluated first
    pub evaluation_order: i32,
    pub is_active: bool,
}

impl AddOnDefinition {
    /// Creates an active, global, fixed-value definition version 1
    pub fn fixed(
        code: impl Into<String>,
        name: impl Into<String>,
        points: i32,
        insurance_category: InsuranceCategory,
        valid_from: NaiveDate,
    ) -> Self {
        Self {
            id: DefinitionId::new(),
            code: code.into(),
            name: name.into(),
            version: 1,
            facility_id: None,
            insurance_category,
            validity: ValidityWindow::open_from(valid_from),
            value: ValueType::Fixed { points },
            conditions: Vec::new(),
            can_combine_with_only: None,
            cannot_combine_with: None,
            depends_on: Vec::new(),
            evaluation_order: 0,
            is_active: true,
        }
    }

    /// Creates an active, global, pattern-valued definition version 1
    pub fn conditional(
        code: impl Into<String>,
        name: impl Into<String>,
        pattern_kind: impl Into<String>,
        pattern_config: Value,
        insurance_category: InsuranceCategory,
        valid_from: NaiveDate,
    ) -> Self {
        let mut definition = Self::fixed(code, name, 0, insurance_category, valid_from);
        definition.value = ValueType::Conditional {
            pattern_kind: pattern_kind.into(),
            pattern_config,
        };
        definition
    }

    pub fn with_condition(mut self, condition: ConditionSpec) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_order(mut self, evaluation_order: i32) -> Self {
        self.evaluation_order = evaluation_order;
        self
    }

    pub fn with_validity(mut self, validity: ValidityWindow) -> Self {
        self.validity = validity;
        self
    }

    pub fn for_facility(mut self, facility_id: FacilityId) -> Self {
        self.facility_id = Some(facility_id);
        self
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn combinable_only_with<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.can_combine_with_only = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    pub fn not_combinable_with<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cannot_combine_with = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    pub fn depending_on<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Returns true if this definition is a candidate for the given visit
    pub fn applies_to(
        &self,
        visit_date: NaiveDate,
        facility_id: FacilityId,
        insurance_category: InsuranceCategory,
    ) -> bool {
        self.is_active
            && self.insurance_category == insurance_category
            && self.validity.contains(visit_date)
            && self.facility_id.map_or(true, |f| f == facility_id)
    }
}

//! Condition evaluation
//!
//! Each definition carries a list of declarative gates. A gate never raises
//! for bad rule content: unknown kinds, missing fields and malformed values
//! all produce a failed [`ConditionOutcome`] with a readable reason. Only
//! failing lookups against the history or visit stores surface as errors.
//!
//! Boolean flag kinds compare the observed flag against the expected value
//! (`value`, default `true`), so `{"kind": "is_emergency", "value": false}`
//! passes exactly when the visit is not an emergency.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use core_kernel::DateRange;

use crate::context::CalculationContext;
use crate::definition::{AddOnDefinition, ConditionSpec};
use crate::error::BonusError;
use crate::ports::{HistoryPort, VisitQuery, VisitRecordPort};
use crate::settings::EngineSettings;

/// The closed set of condition kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    FieldNotEmpty,
    FieldEquals,
    DurationAtLeast,
    DurationLessThan,
    AgeLessThan,
    AgeAtLeast,
    IsSecondVisit,
    HasSiteAssignment,
    Facility24hSupport,
    Facility24hEnhanced,
    FacilityEmergencySupport,
    FacilityEmergencyEnhanced,
    FacilityBurdenReduction,
    IsDischargeDate,
    IsFirstVisitOfPlan,
    HasCollaborationNote,
    IsTerminalCare,
    IsEmergency,
    TimeBucketIn,
    SpecialManagementIn,
    SpecialistQualification,
    CodeAccepted,
    MonthlyCap,
    TerminalCareEligibility,
}

impl ConditionKind {
    const ALL: [ConditionKind; 24] = [
        ConditionKind::FieldNotEmpty,
        ConditionKind::FieldEquals,
        ConditionKind::DurationAtLeast,
        ConditionKind::DurationLessThan,
        ConditionKind::AgeLessThan,
        ConditionKind::AgeAtLeast,
        ConditionKind::IsSecondVisit,
        ConditionKind::HasSiteAssignment,
        ConditionKind::Facility24hSupport,
        ConditionKind::Facility24hEnhanced,
        ConditionKind::FacilityEmergencySupport,
        ConditionKind::FacilityEmergencyEnhanced,
        ConditionKind::FacilityBurdenReduction,
        ConditionKind::IsDischargeDate,
        ConditionKind::IsFirstVisitOfPlan,
        ConditionKind::HasCollaborationNote,
        ConditionKind::IsTerminalCare,
        ConditionKind::IsEmergency,
        ConditionKind::TimeBucketIn,
        ConditionKind::SpecialManagementIn,
        ConditionKind::SpecialistQualification,
        ConditionKind::CodeAccepted,
        ConditionKind::MonthlyCap,
        ConditionKind::TerminalCareEligibility,
    ];

    /// Parses a stored kind name; unknown names yield None
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::FieldNotEmpty => "field_not_empty",
            ConditionKind::FieldEquals => "field_equals",
            ConditionKind::DurationAtLeast => "duration_at_least",
            ConditionKind::DurationLessThan => "duration_less_than",
            ConditionKind::AgeLessThan => "age_less_than",
            ConditionKind::AgeAtLeast => "age_at_least",
            ConditionKind::IsSecondVisit => "is_second_visit",
            ConditionKind::HasSiteAssignment => "has_site_assignment",
            ConditionKind::Facility24hSupport => "facility_24h_support",
            ConditionKind::Facility24hEnhanced => "facility_24h_enhanced",
            ConditionKind::FacilityEmergencySupport => "facility_emergency_support",
            ConditionKind::FacilityEmergencyEnhanced => "facility_emergency_enhanced",
            ConditionKind::FacilityBurdenReduction => "facility_burden_reduction",
            ConditionKind::IsDischargeDate => "is_discharge_date",
            ConditionKind::IsFirstVisitOfPlan => "is_first_visit_of_plan",
            ConditionKind::HasCollaborationNote => "has_collaboration_note",
            ConditionKind::IsTerminalCare => "is_terminal_care",
            ConditionKind::IsEmergency => "is_emergency",
            ConditionKind::TimeBucketIn => "time_bucket_in",
            ConditionKind::SpecialManagementIn => "special_management_in",
            ConditionKind::SpecialistQualification => "specialist_qualification",
            ConditionKind::CodeAccepted => "code_accepted",
            ConditionKind::MonthlyCap => "monthly_cap",
            ConditionKind::TerminalCareEligibility => "terminal_care_eligibility",
        }
    }

    /// Kinds whose result is a single boolean flag of the context
    pub fn is_flag(&self) -> bool {
        matches!(
            self,
            ConditionKind::IsSecondVisit
                | ConditionKind::HasSiteAssignment
                | ConditionKind::Facility24hSupport
                | ConditionKind::Facility24hEnhanced
                | ConditionKind::FacilityEmergencySupport
                | ConditionKind::FacilityEmergencyEnhanced
                | ConditionKind::IsDischargeDate
                | ConditionKind::IsFirstVisitOfPlan
                | ConditionKind::HasCollaborationNote
                | ConditionKind::IsTerminalCare
                | ConditionKind::IsEmergency
        )
    }

    /// Kinds that consult persisted history or other visits
    pub fn requires_lookup(&self) -> bool {
        matches!(
            self,
            ConditionKind::MonthlyCap | ConditionKind::TerminalCareEligibility
        )
    }

    fn flag(&self, context: &CalculationContext) -> Option<bool> {
        let value = match self {
            ConditionKind::IsSecondVisit => context.flags.second_visit,
            ConditionKind::HasSiteAssignment => context.site_id.is_some(),
            ConditionKind::Facility24hSupport => context.facility.support_24h,
            ConditionKind::Facility24hEnhanced => context.facility.enhanced_24h,
            ConditionKind::FacilityEmergencySupport => context.facility.emergency_support,
            ConditionKind::FacilityEmergencyEnhanced => context.facility.emergency_enhanced,
            ConditionKind::IsDischargeDate => context.flags.discharge_date,
            ConditionKind::IsFirstVisitOfPlan => context.flags.first_visit_of_plan,
            ConditionKind::HasCollaborationNote => context.flags.collaboration_note,
            ConditionKind::IsTerminalCare => context.flags.terminal_care,
            ConditionKind::IsEmergency => context.flags.emergency,
            _ => return None,
        };
        Some(value)
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threshold comparison used by the numeric kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ComparisonOperator {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "eq" | "equals" | "=" | "==" => Some(ComparisonOperator::Eq),
            "gt" | ">" => Some(ComparisonOperator::Gt),
            "gte" | ">=" => Some(ComparisonOperator::Gte),
            "lt" | "<" => Some(ComparisonOperator::Lt),
            "lte" | "<=" => Some(ComparisonOperator::Lte),
            _ => None,
        }
    }

    pub fn compare<T: PartialOrd>(&self, actual: T, threshold: T) -> bool {
        match self {
            ComparisonOperator::Eq => actual == threshold,
            ComparisonOperator::Gt => actual > threshold,
            ComparisonOperator::Gte => actual >= threshold,
            ComparisonOperator::Lt => actual < threshold,
            ComparisonOperator::Lte => actual <= threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
        }
    }
}

/// Result of one gate
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionOutcome {
    pub passed: bool,
    pub reason: String,
    pub metadata: Option<Value>,
}

impl ConditionOutcome {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
            metadata: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
            metadata: None,
        }
    }

    fn decide(passed: bool, reason: impl Into<String>) -> Self {
        Self {
            passed,
            reason: reason.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// What a gate may look at besides its own spec
#[derive(Debug, Clone, Copy)]
pub struct EvaluationScope<'a> {
    pub context: &'a CalculationContext,
    pub definition: &'a AddOnDefinition,
    /// Codes accepted earlier in the same calculation
    pub accepted_codes: &'a BTreeSet<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TerminalCareRule {
    allowed_death_locations: Vec<String>,
    min_visits: Option<u32>,
    window_days: Option<u32>,
}

/// Evaluates condition specs against a context
#[derive(Clone)]
pub struct ConditionEvaluator {
    visits: Arc<dyn VisitRecordPort>,
    history: Arc<dyn HistoryPort>,
    settings: EngineSettings,
}

impl ConditionEvaluator {
    pub fn new(
        visits: Arc<dyn VisitRecordPort>,
        history: Arc<dyn HistoryPort>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            visits,
            history,
            settings,
        }
    }

    /// Evaluates one gate
    ///
    /// Errors only when a lookup against a collaborator fails.
    #[instrument(skip(self, spec, scope), fields(kind = %spec.kind, code = %scope.definition.code))]
    pub async fn evaluate(
        &self,
        spec: &ConditionSpec,
        scope: &EvaluationScope<'_>,
    ) -> Result<ConditionOutcome, BonusError> {
        let Some(kind) = ConditionKind::parse(&spec.kind) else {
            debug!("Unknown condition kind");
            return Ok(ConditionOutcome::fail(format!("unknown condition kind '{}'", spec.kind)));
        };

        let outcome = match kind {
            ConditionKind::MonthlyCap => self.monthly_cap(spec, scope).await?,
            ConditionKind::TerminalCareEligibility => self.terminal_care(spec, scope).await?,
            _ => evaluate_local(kind, spec, scope),
        };

        debug!(passed = outcome.passed, reason = %outcome.reason, "Condition evaluated");
        Ok(outcome)
    }

    async fn monthly_cap(
        &self,
        spec: &ConditionSpec,
        scope: &EvaluationScope<'_>,
    ) -> Result<ConditionOutcome, BonusError> {
        let Some(cap) = number(spec.value.as_ref()).filter(|n| *n >= 0.0) else {
            return Ok(ConditionOutcome::fail("monthly_cap has no numeric cap configured"));
        };
        let context = scope.context;
        let code = scope.definition.code.as_str();
        let month = DateRange::month_of(context.visit_date)?;

        let count = self
            .history
            .count_monthly_occurrences(context.patient_id, code, month, context.visit_id)
            .await
            .map_err(BonusError::Lookup)?;

        let passed = f64::from(count) < cap;
        Ok(ConditionOutcome::decide(
            passed,
            format!("{count} earlier '{code}' visits this month, cap {cap}"),
        )
        .with_metadata(json!({ "count": count, "cap": cap })))
    }

    async fn terminal_care(
        &self,
        spec: &ConditionSpec,
        scope: &EvaluationScope<'_>,
    ) -> Result<ConditionOutcome, BonusError> {
        let rule: TerminalCareRule = match spec.value.clone() {
            None | Some(Value::Null) => TerminalCareRule::default(),
            Some(value) => match serde_json::from_value(value) {
                Ok(rule) => rule,
                Err(e) => {
                    return Ok(ConditionOutcome::fail(format!(
                        "terminal_care_eligibility configuration is malformed: {e}"
                    )))
                }
            },
        };
        let context = scope.context;

        let Some(date_of_death) = context.date_of_death else {
            return Ok(ConditionOutcome::fail("date of death not recorded"));
        };
        if date_of_death != context.visit_date {
            return Ok(ConditionOutcome::fail(format!(
                "visit date {} is not the date of death {date_of_death}",
                context.visit_date
            )));
        }
        if !rule.allowed_death_locations.is_empty() {
            let allowed = context
                .death_location
                .as_ref()
                .is_some_and(|loc| rule.allowed_death_locations.contains(loc));
            if !allowed {
                return Ok(ConditionOutcome::fail(format!(
                    "death location {:?} is not eligible",
                    context.death_location
                )));
            }
        }

        let window_days = rule.window_days.unwrap_or(self.settings.terminal_care_window_days);
        let min_visits = rule.min_visits.unwrap_or(self.settings.terminal_care_min_visits);
        let window = DateRange::trailing(date_of_death, window_days)?;

        let visits = self
            .visits
            .list_patient_visits(&VisitQuery::billable(context.patient_id, window))
            .await
            .map_err(BonusError::Lookup)?;
        let others = visits
            .iter()
            .filter(|v| v.id != context.visit_id && v.is_terminal_care)
            .count() as u32;
        let total = others + u32::from(context.flags.terminal_care);

        Ok(ConditionOutcome::decide(
            total >= min_visits,
            format!("{total} terminal-care visits in the {window_days} days before death, {min_visits} required"),
        )
        .with_metadata(json!({
            "terminal_care_visits": total,
            "min_visits": min_visits,
            "window_start": window.start,
            "window_end": window.end,
        })))
    }
}

/// Evaluates a kind that needs nothing beyond the scope
pub fn evaluate_local(
    kind: ConditionKind,
    spec: &ConditionSpec,
    scope: &EvaluationScope<'_>,
) -> ConditionOutcome {
    let context = scope.context;

    if let Some(actual) = kind.flag(context) {
        let expected = spec.expected_flag();
        return ConditionOutcome::decide(
            actual == expected,
            format!("{kind} is {actual}, expected {expected}"),
        );
    }

    match kind {
        ConditionKind::FieldNotEmpty => {
            let Some(field) = spec.field.as_deref() else {
                return ConditionOutcome::fail("field_not_empty has no field configured");
            };
            match context.field_value(field) {
                None => ConditionOutcome::fail(format!("unknown field '{field}'")),
                Some(value) => ConditionOutcome::decide(
                    !is_empty(&value),
                    format!("field '{field}' is {}", if is_empty(&value) { "empty" } else { "present" }),
                ),
            }
        }
        ConditionKind::FieldEquals => {
            let Some(field) = spec.field.as_deref() else {
                return ConditionOutcome::fail("field_equals has no field configured");
            };
            let Some(expected) = spec.value.as_ref() else {
                return ConditionOutcome::fail("field_equals has no value configured");
            };
            match context.field_value(field) {
                None => ConditionOutcome::fail(format!("unknown field '{field}'")),
                Some(actual) => ConditionOutcome::decide(
                    loosely_equal(&actual, expected),
                    format!("field '{field}' is {actual}, expected {expected}"),
                ),
            }
        }
        ConditionKind::DurationAtLeast | ConditionKind::DurationLessThan => {
            let Some(minutes) = context.duration_minutes() else {
                return ConditionOutcome::fail("visit start or end time not recorded");
            };
            compare_threshold(kind, spec, minutes as f64, "duration minutes")
        }
        ConditionKind::AgeLessThan | ConditionKind::AgeAtLeast => {
            compare_threshold(kind, spec, f64::from(context.patient_age), "patient age")
        }
        ConditionKind::FacilityBurdenReduction => {
            let required = number(spec.value.as_ref()).unwrap_or(1.0);
            let count = context.facility.burden_reduction_measures.len();
            ConditionOutcome::decide(
                count as f64 >= required,
                format!("{count} burden reduction measures, {required} required"),
            )
        }
        ConditionKind::TimeBucketIn => {
            let Some(bucket) = context.time_bucket() else {
                return ConditionOutcome::fail("visit start time not recorded");
            };
            let allowed = string_list(spec.value.as_ref());
            ConditionOutcome::decide(
                allowed.iter().any(|b| b == bucket.as_str()),
                format!("time bucket {bucket}, allowed {allowed:?}"),
            )
        }
        ConditionKind::SpecialManagementIn => {
            membership(&context.special_management, spec.value.as_ref(), "special management")
        }
        ConditionKind::SpecialistQualification => {
            membership(&context.staff_qualifications, spec.value.as_ref(), "staff qualification")
        }
        ConditionKind::CodeAccepted => {
            let required = string_list(spec.value.as_ref());
            if required.is_empty() {
                return ConditionOutcome::fail("code_accepted has no code configured");
            }
            let hit = required.iter().find(|c| scope.accepted_codes.contains(*c));
            match hit {
                Some(code) => ConditionOutcome::pass(format!("'{code}' already accepted")),
                None => ConditionOutcome::fail(format!("none of {required:?} accepted yet")),
            }
        }
        ConditionKind::MonthlyCap | ConditionKind::TerminalCareEligibility => {
            ConditionOutcome::fail(format!("{kind} needs a history lookup"))
        }
        _ => ConditionOutcome::fail(format!("{kind} is not evaluable here")),
    }
}

fn compare_threshold(
    kind: ConditionKind,
    spec: &ConditionSpec,
    actual: f64,
    label: &str,
) -> ConditionOutcome {
    let (default, allowed) = match kind {
        ConditionKind::DurationAtLeast | ConditionKind::AgeAtLeast => (
            ComparisonOperator::Gte,
            [ComparisonOperator::Gte, ComparisonOperator::Gt],
        ),
        _ => (
            ComparisonOperator::Lt,
            [ComparisonOperator::Lt, ComparisonOperator::Lte],
        ),
    };

    let operator = match spec.operator.as_deref() {
        None => default,
        Some(raw) => match ComparisonOperator::parse(raw) {
            Some(op) if allowed.contains(&op) => op,
            _ => return ConditionOutcome::fail(format!("operator '{raw}' not supported for {kind}")),
        },
    };

    let Some(threshold) = number(spec.value.as_ref()) else {
        return ConditionOutcome::fail(format!("{kind} has no numeric threshold configured"));
    };

    ConditionOutcome::decide(
        operator.compare(actual, threshold),
        format!("{label} {actual} {} {threshold}", operator.symbol()),
    )
}

fn membership(have: &[String], wanted: Option<&Value>, label: &str) -> ConditionOutcome {
    let wanted = string_list(wanted);
    if wanted.is_empty() {
        return ConditionOutcome::decide(
            !have.is_empty(),
            format!("{label}: {have:?}"),
        );
    }
    match have.iter().find(|h| wanted.contains(h)) {
        Some(hit) => ConditionOutcome::pass(format!("{label} '{hit}' matches")),
        None => ConditionOutcome::fail(format!("{label} {have:?} not in {wanted:?}")),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (number(Some(actual)), number(Some(expected))) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

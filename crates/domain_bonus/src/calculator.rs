//! Bonus calculation orchestration
//!
//! Runs every candidate definition for one visit through the gates in a
//! deterministic order and collects accepted results and skip reasons.
//!
//! # Ordering
//!
//! Candidates are ordered by `depends_on` first, then `(evaluation_order, id)`.
//! Definitions caught in (or downstream of) a dependency cycle are skipped
//! with [`SkipReason::DependencyCycle`]; the rest of the visit still
//! calculates.
//!
//! # Per-definition pipeline
//!
//! 1. Combination check against codes accepted so far
//! 2. Conditions, in declared order, stopping at the first failure
//! 3. Fixed points or pattern evaluation
//! 4. Zero points means not applicable
//!
//! Any error while evaluating one definition is logged and recorded as a
//! skip; it never aborts the other definitions.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use core_kernel::{DefinitionId, VisitId};

use crate::combination::check_combination;
use crate::condition::{ConditionEvaluator, ConditionOutcome, EvaluationScope};
use crate::context::CalculationContext;
use crate::definition::{AddOnDefinition, ConditionSpec, ValueType};
use crate::error::BonusError;
use crate::pattern::{PatternEvaluator, PatternOutcome};
use crate::ports::{DefinitionPort, HistoryPort, VisitRecordPort};
use crate::selector::DefinitionSelector;
use crate::settings::EngineSettings;

/// Trace of one passed condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionTrace {
    pub kind: String,
    pub passed: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ConditionTrace {
    fn new(spec: &ConditionSpec, outcome: ConditionOutcome) -> Self {
        Self {
            kind: spec.kind.clone(),
            passed: outcome.passed,
            reason: outcome.reason,
            metadata: outcome.metadata,
        }
    }
}

/// Structured account of how a result was reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationTrail {
    /// `fixed` or the pattern kind
    pub value_kind: String,
    pub matched_bucket: String,
    #[serde(default)]
    pub pattern_metadata: Value,
    pub conditions: Vec<ConditionTrace>,
    pub evaluated_at: DateTime<Utc>,
}

/// One accepted add-on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub definition_id: DefinitionId,
    pub code: String,
    pub name: String,
    pub definition_version: i32,
    /// Always positive
    pub points: i32,
    pub explanations: Vec<String>,
    pub trail: CalculationTrail,
}

/// Why a candidate did not produce a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipReason {
    CombinationDenied { reason: String },
    ConditionFailed { kind: String, reason: String },
    ZeroPoints,
    /// Part of, or dependent on, a `depends_on` cycle
    DependencyCycle,
    Error { message: String },
}

impl SkipReason {
    pub fn describe(&self) -> String {
        match self {
            SkipReason::CombinationDenied { reason } => format!("combination denied: {reason}"),
            SkipReason::ConditionFailed { kind, reason } => format!("condition {kind} failed: {reason}"),
            SkipReason::ZeroPoints => "not applicable: zero points".to_string(),
            SkipReason::DependencyCycle => "dependency cycle".to_string(),
            SkipReason::Error { message } => format!("error: {message}"),
        }
    }
}

/// A candidate that was evaluated but not accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDefinition {
    pub definition_id: DefinitionId,
    pub code: String,
    pub reason: SkipReason,
}

/// Everything one calculation produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationOutcome {
    pub visit_id: VisitId,
    /// Accepted results in evaluation order
    pub results: Vec<CalculationResult>,
    pub skipped: Vec<SkippedDefinition>,
    pub calculated_at: DateTime<Utc>,
}

impl CalculationOutcome {
    pub fn total_points(&self) -> i64 {
        self.results.iter().map(|r| i64::from(r.points)).sum()
    }

    pub fn accepted_codes(&self) -> BTreeSet<String> {
        self.results.iter().map(|r| r.code.clone()).collect()
    }

    pub fn result_for(&self, code: &str) -> Option<&CalculationResult> {
        self.results.iter().find(|r| r.code == code)
    }

    pub fn skip_for(&self, code: &str) -> Option<&SkippedDefinition> {
        self.skipped.iter().find(|s| s.code == code)
    }
}

enum Evaluation {
    Accepted(CalculationResult),
    Skipped(SkipReason),
}

/// Orders candidates by `depends_on`, breaking ties by `(evaluation_order, id)`
///
/// Returns the evaluable definitions in order and, separately, those that
/// could not be placed because of a cycle.
pub fn dependency_order(
    definitions: Vec<AddOnDefinition>,
) -> (Vec<AddOnDefinition>, Vec<AddOnDefinition>) {
    let n = definitions.len();
    let keys: Vec<(i32, DefinitionId)> = definitions
        .iter()
        .map(|d| (d.evaluation_order, d.id))
        .collect();

    let mut indegree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, definition) in definitions.iter().enumerate() {
        let wanted: BTreeSet<&str> = definition
            .depends_on
            .iter()
            .map(String::as_str)
            .filter(|code| *code != definition.code)
            .collect();
        for (j, other) in definitions.iter().enumerate() {
            if i != j && wanted.contains(other.code.as_str()) {
                dependents[j].push(i);
                indegree[i] += 1;
            }
        }
    }

    let mut ready: BTreeSet<(i32, DefinitionId, usize)> = (0..n)
        .filter(|&i| indegree[i] == 0)
        .map(|i| (keys[i].0, keys[i].1, i))
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some((_, _, i)) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.insert((keys[d].0, keys[d].1, d));
            }
        }
    }

    let mut slots: Vec<Option<AddOnDefinition>> = definitions.into_iter().map(Some).collect();
    let ordered: Vec<AddOnDefinition> = order.iter().filter_map(|&i| slots[i].take()).collect();

    let mut blocked: Vec<(usize, AddOnDefinition)> = slots
        .into_iter()
        .enumerate()
        .filter_map(|(i, slot)| slot.map(|d| (i, d)))
        .collect();
    blocked.sort_by_key(|(i, _)| keys[*i]);

    (ordered, blocked.into_iter().map(|(_, d)| d).collect())
}

/// Calculates the add-ons of one visit
#[derive(Clone)]
pub struct BonusCalculator {
    selector: DefinitionSelector,
    conditions: ConditionEvaluator,
    patterns: PatternEvaluator,
}

impl BonusCalculator {
    pub fn new(
        definitions: Arc<dyn DefinitionPort>,
        visits: Arc<dyn VisitRecordPort>,
        history: Arc<dyn HistoryPort>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            selector: DefinitionSelector::new(definitions),
            conditions: ConditionEvaluator::new(visits.clone(), history, settings),
            patterns: PatternEvaluator::new(visits),
        }
    }

    /// Selects the candidates for the visit and evaluates them
    ///
    /// Fails only when the definition catalog itself cannot be read.
    #[instrument(skip(self, context), fields(visit_id = %context.visit_id))]
    pub async fn calculate(
        &self,
        context: &CalculationContext,
    ) -> Result<CalculationOutcome, BonusError> {
        let candidates = self
            .selector
            .select(context.visit_date, context.facility_id, context.insurance_category)
            .await?;
        Ok(self.evaluate_candidates(context, candidates).await)
    }

    /// Evaluates an already-selected candidate list
    pub async fn evaluate_candidates(
        &self,
        context: &CalculationContext,
        candidates: Vec<AddOnDefinition>,
    ) -> CalculationOutcome {
        let calculated_at = Utc::now();
        let (ordered, cyclic) = dependency_order(candidates);

        let mut accepted_codes = BTreeSet::new();
        let mut results = Vec::new();
        let mut skipped = Vec::new();

        for definition in &ordered {
            let evaluation = self
                .evaluate_definition(definition, context, &accepted_codes, calculated_at)
                .await;
            match evaluation {
                Ok(Evaluation::Accepted(result)) => {
                    debug!(code = %result.code, points = result.points, "Add-on accepted");
                    accepted_codes.insert(result.code.clone());
                    results.push(result);
                }
                Ok(Evaluation::Skipped(reason)) => {
                    debug!(code = %definition.code, reason = %reason.describe(), "Add-on skipped");
                    skipped.push(SkippedDefinition {
                        definition_id: definition.id,
                        code: definition.code.clone(),
                        reason,
                    });
                }
                Err(e) => {
                    warn!(
                        code = %definition.code,
                        definition_id = %definition.id,
                        error = %e,
                        "Add-on evaluation failed"
                    );
                    skipped.push(SkippedDefinition {
                        definition_id: definition.id,
                        code: definition.code.clone(),
                        reason: SkipReason::Error { message: e.to_string() },
                    });
                }
            }
        }

        for definition in cyclic {
            warn!(code = %definition.code, "Add-on skipped: dependency cycle");
            skipped.push(SkippedDefinition {
                definition_id: definition.id,
                code: definition.code,
                reason: SkipReason::DependencyCycle,
            });
        }

        info!(
            accepted = results.len(),
            skipped = skipped.len(),
            "Bonus calculation complete"
        );

        CalculationOutcome {
            visit_id: context.visit_id,
            results,
            skipped,
            calculated_at,
        }
    }

    async fn evaluate_definition(
        &self,
        definition: &AddOnDefinition,
        context: &CalculationContext,
        accepted_codes: &BTreeSet<String>,
        evaluated_at: DateTime<Utc>,
    ) -> Result<Evaluation, BonusError> {
        let check = check_combination(definition, accepted_codes);
        if !check.allowed {
            return Ok(Evaluation::Skipped(SkipReason::CombinationDenied {
                reason: check.reason.unwrap_or_default(),
            }));
        }

        let scope = EvaluationScope {
            context,
            definition,
            accepted_codes,
        };
        let mut traces = Vec::with_capacity(definition.conditions.len());
        for spec in &definition.conditions {
            let outcome = self.conditions.evaluate(spec, &scope).await?;
            if !outcome.passed {
                return Ok(Evaluation::Skipped(SkipReason::ConditionFailed {
                    kind: spec.kind.clone(),
                    reason: outcome.reason,
                }));
            }
            traces.push(ConditionTrace::new(spec, outcome));
        }

        let value = match &definition.value {
            ValueType::Fixed { points } => PatternOutcome {
                points: *points,
                matched_bucket: "fixed".to_string(),
                metadata: Value::Null,
            },
            ValueType::Conditional {
                pattern_kind,
                pattern_config,
            } => {
                self.patterns
                    .evaluate(pattern_kind, pattern_config, context)
                    .await?
            }
        };

        if value.points <= 0 {
            return Ok(Evaluation::Skipped(SkipReason::ZeroPoints));
        }

        let value_kind = definition.value.kind_label().to_string();
        let mut explanations: Vec<String> = traces
            .iter()
            .map(|t| format!("{}: {}", t.kind, t.reason))
            .collect();
        explanations.push(format!(
            "{value_kind} [{}] = {} points",
            value.matched_bucket, value.points
        ));

        Ok(Evaluation::Accepted(CalculationResult {
            definition_id: definition.id,
            code: definition.code.clone(),
            name: definition.name.clone(),
            definition_version: definition.version,
            points: value.points,
            explanations,
            trail: CalculationTrail {
                value_kind,
                matched_bucket: value.matched_bucket,
                pattern_metadata: value.metadata,
                conditions: traces,
                evaluated_at,
            },
        }))
    }
}

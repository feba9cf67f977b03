//! Pattern evaluation
//!
//! A conditional definition names a pattern kind and carries a JSON
//! configuration. The pattern picks a bucket for the visit and returns the
//! points configured for that bucket. Configuration is parsed into typed
//! structs first; anything that does not parse is a configuration error for
//! that definition only.
//!
//! | Kind                    | Buckets                                   |
//! |-------------------------|-------------------------------------------|
//! | `time_of_day`           | late_night, early_morning, night, daytime |
//! | `duration`              | first matching threshold, else default    |
//! | `age_bracket`           | `age_{min}_{max}`, `age_{min}_plus`       |
//! | `visit_ordinal`         | first, second, third_or_later             |
//! | `same_site_occupancy`   | up_to_two, three_or_more                  |
//! | `monthly_day_threshold` | up_to_limit, after_limit                  |

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use core_kernel::DateRange;

use crate::context::{CalculationContext, TimeBucket};
use crate::error::BonusError;
use crate::ports::{VisitQuery, VisitRecordPort};
use crate::records::VisitRecord;

/// The closed set of pattern kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    TimeOfDay,
    Duration,
    AgeBracket,
    VisitOrdinal,
    SameSiteOccupancy,
    MonthlyDayThreshold,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::TimeOfDay => "time_of_day",
            PatternKind::Duration => "duration",
            PatternKind::AgeBracket => "age_bracket",
            PatternKind::VisitOrdinal => "visit_ordinal",
            PatternKind::SameSiteOccupancy => "same_site_occupancy",
            PatternKind::MonthlyDayThreshold => "monthly_day_threshold",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternKind {
    type Err = BonusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time_of_day" => Ok(PatternKind::TimeOfDay),
            "duration" => Ok(PatternKind::Duration),
            "age_bracket" => Ok(PatternKind::AgeBracket),
            "visit_ordinal" => Ok(PatternKind::VisitOrdinal),
            "same_site_occupancy" => Ok(PatternKind::SameSiteOccupancy),
            "monthly_day_threshold" => Ok(PatternKind::MonthlyDayThreshold),
            other => Err(BonusError::UnknownPattern(other.to_string())),
        }
    }
}

/// Points chosen by a pattern, with the bucket that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct PatternOutcome {
    pub points: i32,
    pub matched_bucket: String,
    pub metadata: Value,
}

impl PatternOutcome {
    fn new(points: i32, bucket: impl Into<String>) -> Self {
        Self {
            points,
            matched_bucket: bucket.into(),
            metadata: Value::Null,
        }
    }

    fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeOfDayConfig {
    pub late_night: i32,
    pub early_morning: i32,
    pub night: i32,
    pub daytime: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ThresholdOperator {
    #[serde(rename = "gt", alias = ">")]
    Gt,
    #[default]
    #[serde(rename = "gte", alias = ">=")]
    Gte,
}

impl ThresholdOperator {
    /// Sort rank among thresholds at the same minutes, stricter first
    fn strictness(self) -> u8 {
        match self {
            ThresholdOperator::Gt => 0,
            ThresholdOperator::Gte => 1,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DurationThreshold {
    pub minutes: i64,
    #[serde(default)]
    pub operator: ThresholdOperator,
    pub points: i32,
}

#[derive(Debug, Deserialize)]
pub struct DurationConfig {
    pub thresholds: Vec<DurationThreshold>,
    #[serde(default)]
    pub default: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisitOrdinalConfig {
    pub first: i32,
    pub second: i32,
    pub third_or_later: i32,
}

fn default_low_tier_max() -> u32 {
    2
}

#[derive(Debug, Deserialize)]
pub struct SameSiteConfig {
    pub up_to_two: i32,
    pub three_or_more: i32,
    #[serde(default = "default_low_tier_max")]
    pub low_tier_max: u32,
}

/// Which visits count toward a monthly day threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayQualifier {
    #[default]
    Emergency,
    TerminalCare,
    Any,
}

impl DayQualifier {
    fn visit_qualifies(&self, visit: &VisitRecord) -> bool {
        match self {
            DayQualifier::Emergency => visit.is_emergency,
            DayQualifier::TerminalCare => visit.is_terminal_care,
            DayQualifier::Any => true,
        }
    }

    fn context_qualifies(&self, context: &CalculationContext) -> bool {
        match self {
            DayQualifier::Emergency => context.flags.emergency,
            DayQualifier::TerminalCare => context.flags.terminal_care,
            DayQualifier::Any => true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MonthlyDayThresholdConfig {
    pub day_limit: u32,
    pub up_to_limit: i32,
    pub after_limit: i32,
    #[serde(default)]
    pub qualifier: DayQualifier,
}

/// One parsed `age_bracket` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeBracket {
    pub key: String,
    pub min: u32,
    /// Exclusive upper bound; None for `_plus` brackets
    pub max: Option<u32>,
    pub points: i32,
}

/// Parses an `age_bracket` configuration object
pub fn parse_age_brackets(config: &Value) -> Result<Vec<AgeBracket>, BonusError> {
    let kind = PatternKind::AgeBracket.as_str();
    let map = config
        .as_object()
        .ok_or_else(|| BonusError::invalid_config(kind, "expected an object of brackets"))?;

    let mut brackets = Vec::with_capacity(map.len());
    for (key, points) in map {
        let points = points
            .as_i64()
            .and_then(|p| i32::try_from(p).ok())
            .ok_or_else(|| BonusError::invalid_config(kind, format!("'{key}' points must be an integer")))?;
        let bounds = key
            .strip_prefix("age_")
            .ok_or_else(|| BonusError::invalid_config(kind, format!("bad bracket key '{key}'")))?;
        let (min, max) = match bounds.split_once('_') {
            Some((min, "plus")) => (min, None),
            Some((min, max)) => (min, Some(max)),
            None => return Err(BonusError::invalid_config(kind, format!("bad bracket key '{key}'"))),
        };
        let parse = |s: &str| {
            s.parse::<u32>()
                .map_err(|_| BonusError::invalid_config(kind, format!("bad bracket key '{key}'")))
        };
        let min = parse(min)?;
        let max = max.map(parse).transpose()?;
        if max.is_some_and(|max| max <= min) {
            return Err(BonusError::invalid_config(kind, format!("bracket '{key}' is empty")));
        }
        brackets.push(AgeBracket { key: key.clone(), min, max, points });
    }
    brackets.sort_by_key(|b| b.min);
    Ok(brackets)
}

fn parse_config<T: DeserializeOwned>(kind: PatternKind, config: &Value) -> Result<T, BonusError> {
    serde_json::from_value(config.clone())
        .map_err(|e| BonusError::invalid_config(kind.as_str(), e.to_string()))
}

/// Points by local time bucket of the visit start
pub fn time_of_day(config: &Value, context: &CalculationContext) -> Result<PatternOutcome, BonusError> {
    let config: TimeOfDayConfig = parse_config(PatternKind::TimeOfDay, config)?;
    let Some(bucket) = context.time_bucket() else {
        return Err(BonusError::invalid_context("time_of_day needs a visit start time"));
    };
    let points = match bucket {
        TimeBucket::LateNight => config.late_night,
        TimeBucket::EarlyMorning => config.early_morning,
        TimeBucket::Night => config.night,
        TimeBucket::Daytime => config.daytime,
    };
    Ok(PatternOutcome::new(points, bucket.as_str())
        .with_metadata(json!({ "local_start_time": context.local_start_time() })))
}

/// Points of the longest threshold the duration meets
///
/// Thresholds are tried from the most minutes down; at equal minutes `gt`
/// comes before `gte`.
pub fn duration(config: &Value, context: &CalculationContext) -> Result<PatternOutcome, BonusError> {
    let mut config: DurationConfig = parse_config(PatternKind::Duration, config)?;
    let Some(minutes) = context.duration_minutes() else {
        return Ok(PatternOutcome::new(0, "no_duration"));
    };

    config.thresholds.sort_by(|a, b| {
        b.minutes
            .cmp(&a.minutes)
            .then_with(|| a.operator.strictness().cmp(&b.operator.strictness()))
    });
    let hit = config.thresholds.iter().find(|t| match t.operator {
        ThresholdOperator::Gt => minutes > t.minutes,
        ThresholdOperator::Gte => minutes >= t.minutes,
    });

    let outcome = match hit {
        Some(t) => {
            let op = if t.operator == ThresholdOperator::Gt { "gt" } else { "gte" };
            PatternOutcome::new(t.points, format!("{op}_{}", t.minutes))
        }
        None => PatternOutcome::new(config.default, "default"),
    };
    Ok(outcome.with_metadata(json!({ "duration_minutes": minutes })))
}

/// Points of the bracket `[min, max)` containing the patient's age
pub fn age_bracket(config: &Value, context: &CalculationContext) -> Result<PatternOutcome, BonusError> {
    let age = context.patient_age;
    let hit = parse_age_brackets(config)?
        .into_iter()
        .find(|b| age >= b.min && b.max.map_or(true, |max| age < max));

    let outcome = match hit {
        Some(b) => PatternOutcome::new(b.points, b.key),
        None => PatternOutcome::new(0, "no_bracket"),
    };
    Ok(outcome.with_metadata(json!({ "patient_age": age })))
}

/// Points by the visit's position among the patient's visits that day
pub fn visit_ordinal(config: &Value, context: &CalculationContext) -> Result<PatternOutcome, BonusError> {
    let config: VisitOrdinalConfig = parse_config(PatternKind::VisitOrdinal, config)?;
    let (points, bucket) = match context.visit_ordinal {
        0 | 1 => (config.first, "first"),
        2 => (config.second, "second"),
        _ => (config.third_or_later, "third_or_later"),
    };
    Ok(PatternOutcome::new(points, bucket)
        .with_metadata(json!({ "visit_ordinal": context.visit_ordinal })))
}

fn occupancy_tier(config: &SameSiteConfig, occupancy: Option<u32>) -> PatternOutcome {
    match occupancy {
        Some(count) if count > config.low_tier_max => {
            PatternOutcome::new(config.three_or_more, "three_or_more")
        }
        _ => PatternOutcome::new(config.up_to_two, "up_to_two"),
    }
}

fn day_threshold_tier(config: &MonthlyDayThresholdConfig, days: u32) -> PatternOutcome {
    if days <= config.day_limit {
        PatternOutcome::new(config.up_to_limit, "up_to_limit")
    } else {
        PatternOutcome::new(config.after_limit, "after_limit")
    }
}

/// Resolves pattern kinds to points, querying visits where a pattern needs to
#[derive(Clone)]
pub struct PatternEvaluator {
    visits: Arc<dyn VisitRecordPort>,
}

impl PatternEvaluator {
    pub fn new(visits: Arc<dyn VisitRecordPort>) -> Self {
        Self { visits }
    }

    /// Evaluates the named pattern
    ///
    /// Unknown kinds and unparsable configuration are errors; so are failing
    /// lookups for the lookup-backed patterns.
    #[instrument(skip(self, config, context), fields(visit_id = %context.visit_id))]
    pub async fn evaluate(
        &self,
        kind: &str,
        config: &Value,
        context: &CalculationContext,
    ) -> Result<PatternOutcome, BonusError> {
        let kind: PatternKind = kind.parse()?;
        let outcome = match kind {
            PatternKind::TimeOfDay => time_of_day(config, context)?,
            PatternKind::Duration => duration(config, context)?,
            PatternKind::AgeBracket => age_bracket(config, context)?,
            PatternKind::VisitOrdinal => visit_ordinal(config, context)?,
            PatternKind::SameSiteOccupancy => self.same_site_occupancy(config, context).await?,
            PatternKind::MonthlyDayThreshold => self.monthly_day_threshold(config, context).await?,
        };
        debug!(
            kind = %kind,
            bucket = %outcome.matched_bucket,
            points = outcome.points,
            "Pattern evaluated"
        );
        Ok(outcome)
    }

    async fn same_site_occupancy(
        &self,
        config: &Value,
        context: &CalculationContext,
    ) -> Result<PatternOutcome, BonusError> {
        let config: SameSiteConfig = parse_config(PatternKind::SameSiteOccupancy, config)?;
        let Some(site_id) = context.site_id else {
            return Ok(occupancy_tier(&config, None).with_metadata(json!({ "site_assigned": false })));
        };

        let occupancy = self
            .visits
            .count_site_patients(context.visit_date, context.facility_id, site_id)
            .await
            .map_err(BonusError::Lookup)?;

        Ok(occupancy_tier(&config, Some(occupancy))
            .with_metadata(json!({ "site_assigned": true, "occupancy": occupancy })))
    }

    async fn monthly_day_threshold(
        &self,
        config: &Value,
        context: &CalculationContext,
    ) -> Result<PatternOutcome, BonusError> {
        let config: MonthlyDayThresholdConfig =
            parse_config(PatternKind::MonthlyDayThreshold, config)?;
        let month_to_date = DateRange::month_of(context.visit_date)?.truncate_to(context.visit_date);

        let visits = self
            .visits
            .list_patient_visits(&VisitQuery::billable(context.patient_id, month_to_date))
            .await
            .map_err(BonusError::Lookup)?;

        let mut days: BTreeSet<_> = visits
            .iter()
            .filter(|v| v.id != context.visit_id && config.qualifier.visit_qualifies(v))
            .map(|v| v.visit_date)
            .collect();
        if config.qualifier.context_qualifies(context) {
            days.insert(context.visit_date);
        }
        let count = days.len() as u32;

        Ok(day_threshold_tier(&config, count)
            .with_metadata(json!({ "qualifying_days": count, "day_limit": config.day_limit })))
    }
}

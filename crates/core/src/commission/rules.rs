use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::commission::period::{resolve_rule_period, PeriodKey, PeriodResolution};
use crate::commission::units::UnitSource;
use crate::domain::development::DevelopmentKey;
use crate::domain::rule::{CommissionRule, RuleId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug)]
pub struct RuleEvaluationInput<'a> {
    pub development: &'a DevelopmentKey,
    pub rules: &'a [CommissionRule],
    pub signed_on: NaiveDate,
    pub as_of: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
    OtherDevelopment,
    OutOfPeriod { period: PeriodKey },
    Malformed { reason: String },
    ThresholdNotMet { period: PeriodKey, unit_count: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRule {
    pub rule_id: RuleId,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    /// Every rule whose threshold held, ordered by priority (highest first)
    /// then id.
    pub applicable: Vec<CommissionRule>,
    /// Unit count each in-period rule was tested against.
    pub unit_counts: BTreeMap<RuleId, u32>,
    pub periods: BTreeMap<RuleId, PeriodKey>,
    pub skipped: Vec<SkippedRule>,
}

pub trait RuleEngine: Send + Sync {
    fn evaluate(&self, input: RuleEvaluationInput<'_>, units: &dyn UnitSource) -> RuleEvaluation;
}

#[derive(Default)]
pub struct DeterministicRuleEngine;

impl RuleEngine for DeterministicRuleEngine {
    fn evaluate(&self, input: RuleEvaluationInput<'_>, units: &dyn UnitSource) -> RuleEvaluation {
        evaluate_rules(input, units)
    }
}

/// Windows whose unit counts an evaluation of `rules` will ask for, so
/// callers can fetch them in one pass.
pub fn required_periods(
    development: &DevelopmentKey,
    rules: &[CommissionRule],
    signed_on: NaiveDate,
) -> BTreeSet<PeriodKey> {
    rules
        .iter()
        .filter(|rule| rule.active && &rule.development == development)
        .filter_map(|rule| match resolve_rule_period(rule, signed_on) {
            PeriodResolution::InPeriod(key) => Some(key),
            _ => None,
        })
        .collect()
}

pub fn evaluate_rules(input: RuleEvaluationInput<'_>, units: &dyn UnitSource) -> RuleEvaluation {
    let mut evaluation = RuleEvaluation::default();
    let mut counts_by_period: BTreeMap<PeriodKey, u32> = BTreeMap::new();

    for rule in input.rules {
        if !rule.active {
            evaluation.skip(rule, SkipReason::Inactive);
            continue;
        }
        if &rule.development != input.development {
            evaluation.skip(rule, SkipReason::OtherDevelopment);
            continue;
        }

        let period = match resolve_rule_period(rule, input.signed_on) {
            PeriodResolution::InPeriod(period) => period,
            PeriodResolution::OutOfPeriod(period) => {
                evaluation.skip(rule, SkipReason::OutOfPeriod { period });
                continue;
            }
            PeriodResolution::Malformed(reason) => {
                let error = DomainError::MalformedRule { rule_id: rule.id.0.clone(), reason };
                warn!(
                    event_name = "commission.rule.malformed",
                    rule_id = %rule.id,
                    development = %input.development,
                    period_type = rule.period_type.as_str(),
                    period_value = %rule.period_value,
                    error = %error,
                    "skipping bonus rule with unreadable period descriptor"
                );
                evaluation.skip(rule, SkipReason::Malformed { reason: error.to_string() });
                continue;
            }
        };

        let unit_count = *counts_by_period
            .entry(period)
            .or_insert_with(|| units.count_units(input.development, &period, input.as_of));
        evaluation.unit_counts.insert(rule.id.clone(), unit_count);
        evaluation.periods.insert(rule.id.clone(), period);

        if rule.operator.holds(unit_count, rule.unit_threshold) {
            evaluation.applicable.push(rule.clone());
        } else {
            evaluation.skip(rule, SkipReason::ThresholdNotMet { period, unit_count });
        }
    }

    evaluation.applicable.sort_by(|left, right| {
        right.priority.cmp(&left.priority).then_with(|| left.id.cmp(&right.id))
    });

    debug!(
        event_name = "commission.rule.evaluated",
        development = %input.development,
        applicable = evaluation.applicable.len(),
        skipped = evaluation.skipped.len(),
        "bonus rules evaluated"
    );

    evaluation
}

impl RuleEvaluation {
    fn skip(&mut self, rule: &CommissionRule, reason: SkipReason) {
        self.skipped.push(SkippedRule { rule_id: rule.id.clone(), reason });
    }

    pub fn is_applicable(&self, rule_id: &RuleId) -> bool {
        self.applicable.iter().any(|rule| &rule.id == rule_id)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{evaluate_rules, required_periods, RuleEvaluationInput, SkipReason};
    use crate::commission::period::PeriodKey;
    use crate::commission::units::UnitSource;
    use crate::domain::development::DevelopmentKey;
    use crate::domain::rule::{CommissionRule, PeriodType, RuleId, ThresholdOperator};

    struct FixedUnits {
        count: u32,
        calls: Cell<u32>,
    }

    impl FixedUnits {
        fn new(count: u32) -> Self {
            Self { count, calls: Cell::new(0) }
        }
    }

    impl UnitSource for FixedUnits {
        fn count_units(&self, _: &DevelopmentKey, _: &PeriodKey, _: NaiveDate) -> u32 {
            self.calls.set(self.calls.get() + 1);
            self.count
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn rule(
        id: &str,
        period_type: PeriodType,
        period_value: &str,
        operator: ThresholdOperator,
        threshold: u32,
    ) -> CommissionRule {
        CommissionRule {
            id: RuleId(id.to_string()),
            development: DevelopmentKey("merida".to_string()),
            name: format!("bonus {id}"),
            period_type,
            period_value: period_value.to_string(),
            operator,
            unit_threshold: threshold,
            commission_percent: Decimal::new(5, 1),
            vat_percent: Decimal::new(16, 0),
            active: true,
            priority: 0,
        }
    }

    fn input<'a>(
        development: &'a DevelopmentKey,
        rules: &'a [CommissionRule],
    ) -> RuleEvaluationInput<'a> {
        RuleEvaluationInput {
            development,
            rules,
            signed_on: date(2025, 8, 15),
            as_of: date(2025, 8, 31),
        }
    }

    #[test]
    fn every_satisfied_rule_applies() {
        let development = DevelopmentKey("merida".to_string());
        let rules = vec![
            CommissionRule {
                priority: 1,
                ..rule("R-low", PeriodType::Quarter, "2025", ThresholdOperator::AtLeast, 3)
            },
            CommissionRule {
                priority: 9,
                ..rule("R-high", PeriodType::Year, "2025", ThresholdOperator::AtLeast, 5)
            },
        ];
        let units = FixedUnits::new(6);

        let evaluation = evaluate_rules(input(&development, &rules), &units);

        let ids: Vec<&str> = evaluation.applicable.iter().map(|rule| rule.id.0.as_str()).collect();
        assert_eq!(ids, vec!["R-high", "R-low"]);
        assert_eq!(evaluation.unit_counts.get(&RuleId("R-low".into())), Some(&6));
        assert_eq!(
            evaluation.periods.get(&RuleId("R-low".into())),
            Some(&PeriodKey::Quarter { year: 2025, quarter: 3 })
        );
    }

    #[test]
    fn operators_gate_each_rule_independently() {
        let development = DevelopmentKey("merida".to_string());
        let rules = vec![
            rule("R-eq", PeriodType::Month, "2025-08", ThresholdOperator::Equal, 4),
            rule("R-ge", PeriodType::Month, "2025-08", ThresholdOperator::AtLeast, 5),
            rule("R-le", PeriodType::Month, "2025-08", ThresholdOperator::AtMost, 4),
        ];
        let units = FixedUnits::new(4);

        let evaluation = evaluate_rules(input(&development, &rules), &units);

        assert!(evaluation.is_applicable(&RuleId("R-eq".into())));
        assert!(!evaluation.is_applicable(&RuleId("R-ge".into())));
        assert!(evaluation.is_applicable(&RuleId("R-le".into())));
        assert_eq!(units.calls.get(), 1, "one count per distinct period");
        assert!(evaluation.skipped.iter().any(|skipped| matches!(
            skipped.reason,
            SkipReason::ThresholdNotMet { unit_count: 4, .. }
        )));
    }

    #[test]
    fn inactive_foreign_out_of_period_and_malformed_rules_are_skipped() {
        let development = DevelopmentKey("merida".to_string());
        let rules = vec![
            CommissionRule {
                active: false,
                ..rule("R-off", PeriodType::Year, "2025", ThresholdOperator::AtLeast, 0)
            },
            CommissionRule {
                development: DevelopmentKey("torre norte".to_string()),
                ..rule("R-other", PeriodType::Year, "2025", ThresholdOperator::AtLeast, 0)
            },
            rule("R-past", PeriodType::Year, "2024", ThresholdOperator::AtLeast, 0),
            rule("R-bad", PeriodType::Month, "agosto", ThresholdOperator::AtLeast, 0),
            rule("R-ok", PeriodType::Year, "2025", ThresholdOperator::AtLeast, 0),
        ];
        let units = FixedUnits::new(1);

        let evaluation = evaluate_rules(input(&development, &rules), &units);

        assert_eq!(evaluation.applicable.len(), 1);
        assert!(evaluation.is_applicable(&RuleId("R-ok".into())));
        let reasons: Vec<&SkipReason> =
            evaluation.skipped.iter().map(|skipped| &skipped.reason).collect();
        assert!(matches!(reasons[0], SkipReason::Inactive));
        assert!(matches!(reasons[1], SkipReason::OtherDevelopment));
        assert!(matches!(reasons[2], SkipReason::OutOfPeriod { .. }));
        assert!(matches!(reasons[3], SkipReason::Malformed { reason } if reason.contains("R-bad")));
        assert!(!evaluation.unit_counts.contains_key(&RuleId("R-bad".into())));
    }

    #[test]
    fn required_periods_lists_distinct_in_period_windows() {
        let development = DevelopmentKey("merida".to_string());
        let rules = vec![
            rule("R-1", PeriodType::Quarter, "2025", ThresholdOperator::AtLeast, 1),
            rule("R-2", PeriodType::Quarter, "2025", ThresholdOperator::AtLeast, 3),
            rule("R-3", PeriodType::Month, "2025-08", ThresholdOperator::AtLeast, 1),
            rule("R-4", PeriodType::Month, "2025-07", ThresholdOperator::AtLeast, 1),
        ];

        let periods = required_periods(&development, &rules, date(2025, 8, 15));

        assert_eq!(
            periods.into_iter().collect::<Vec<_>>(),
            vec![
                PeriodKey::Quarter { year: 2025, quarter: 3 },
                PeriodKey::Month { year: 2025, month: 8 },
            ]
        );
    }
}

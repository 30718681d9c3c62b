//! Success rubrics for workflow runs.
//!
//! A [`Goal`] declares what a successful run looks like: a set of weighted
//! [`SuccessCriterion`] entries, each tied to a measurable metric, plus any
//! hard [`Constraint`]s the run must respect. Goals carry no behavior of
//! their own; the executor evaluates them against the final shared context
//! when a run reaches a terminal node.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Tolerance when checking that criterion weights sum to 1.0.
const WEIGHT_EPSILON: f64 = 1e-6;

/// One weighted, measurable condition of success.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriterion {
    /// Unique id within the goal.
    pub id: String,
    /// Human-readable description of what this criterion checks.
    pub description: String,
    /// Context key holding the measured value for this criterion.
    pub metric: String,
    /// Human-readable target, e.g. ">= 5 businesses".
    pub target: String,
    /// Relative weight; all weights in a goal sum to 1.0.
    pub weight: f64,
}

/// A hard constraint the run must respect, surfaced to every node prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: String,
    pub description: String,
    /// Constraint class, e.g. "safety" or "budget".
    pub constraint_type: String,
    /// Free-form grouping label, e.g. "location".
    pub category: String,
}

/// The success rubric for a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub description: String,
    pub success_criteria: Vec<SuccessCriterion>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

/// Advisory evaluation of a goal against a run's final context.
///
/// The weighted score never flips a run's success flag — success is
/// determined by reaching a terminal node without a fatal error. The
/// assessment tells observers how much of the rubric the run actually
/// satisfied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalAssessment {
    /// Sum of the weights of satisfied criteria, in `[0.0, 1.0]`.
    pub score: f64,
    /// Ids of criteria whose metric key held a non-empty value.
    pub satisfied: Vec<String>,
    /// Ids of criteria that were not satisfied.
    pub unsatisfied: Vec<String>,
}

/// Goal validation failures, detected before a run starts.
#[derive(Debug, Error, Diagnostic)]
pub enum GoalError {
    #[error("goal '{goal}' has no success criteria")]
    #[diagnostic(
        code(hiveflow::goal::empty_criteria),
        help("Declare at least one weighted success criterion.")
    )]
    EmptyCriteria { goal: String },

    #[error("goal '{goal}' criterion weights sum to {sum}, expected 1.0")]
    #[diagnostic(
        code(hiveflow::goal::weight_sum),
        help("Adjust criterion weights so they total exactly 1.0.")
    )]
    WeightSum { goal: String, sum: f64 },

    #[error("goal '{goal}' declares criterion id '{id}' more than once")]
    #[diagnostic(code(hiveflow::goal::duplicate_criterion))]
    DuplicateCriterion { goal: String, id: String },
}

impl Goal {
    /// Validates the rubric's invariants: at least one criterion, unique
    /// criterion ids, weights summing to 1.0.
    pub fn validate(&self) -> Result<(), GoalError> {
        if self.success_criteria.is_empty() {
            return Err(GoalError::EmptyCriteria {
                goal: self.id.clone(),
            });
        }
        let mut seen = FxHashSet::default();
        for criterion in &self.success_criteria {
            if !seen.insert(criterion.id.as_str()) {
                return Err(GoalError::DuplicateCriterion {
                    goal: self.id.clone(),
                    id: criterion.id.clone(),
                });
            }
        }
        let sum: f64 = self.success_criteria.iter().map(|c| c.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(GoalError::WeightSum {
                goal: self.id.clone(),
                sum,
            });
        }
        Ok(())
    }

    /// Evaluates the rubric against a final context snapshot.
    ///
    /// A criterion is satisfied when the context holds a non-empty value
    /// under the criterion's `metric` key. The score aggregates the weights
    /// of satisfied criteria.
    #[must_use]
    pub fn evaluate(&self, context: &FxHashMap<String, Value>) -> GoalAssessment {
        let mut score = 0.0;
        let mut satisfied = Vec::new();
        let mut unsatisfied = Vec::new();
        for criterion in &self.success_criteria {
            if context.get(&criterion.metric).is_some_and(is_non_empty) {
                score += criterion.weight;
                satisfied.push(criterion.id.clone());
            } else {
                unsatisfied.push(criterion.id.clone());
            }
        }
        GoalAssessment {
            score,
            satisfied,
            unsatisfied,
        }
    }

    /// Renders the constraints as a prompt preamble section, or `None` when
    /// the goal has no constraints.
    #[must_use]
    pub fn constraint_preamble(&self) -> Option<String> {
        if self.constraints.is_empty() {
            return None;
        }
        let mut out = String::from("Constraints you must respect:\n");
        for c in &self.constraints {
            out.push_str(&format!("- [{}] {}\n", c.constraint_type, c.description));
        }
        Some(out)
    }
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn goal_with_weights(weights: &[f64]) -> Goal {
        Goal {
            id: "g".to_string(),
            name: "Test".to_string(),
            description: String::new(),
            success_criteria: weights
                .iter()
                .enumerate()
                .map(|(i, w)| SuccessCriterion {
                    id: format!("c{i}"),
                    description: String::new(),
                    metric: format!("m{i}"),
                    target: String::new(),
                    weight: *w,
                })
                .collect(),
            constraints: vec![],
        }
    }

    #[test]
    /// Weights summing to 1.0 validate; anything else is rejected.
    fn test_weight_sum_validation() {
        assert!(goal_with_weights(&[0.3, 0.4, 0.3]).validate().is_ok());
        assert!(matches!(
            goal_with_weights(&[0.5, 0.6]).validate(),
            Err(GoalError::WeightSum { .. })
        ));
        assert!(matches!(
            goal_with_weights(&[]).validate(),
            Err(GoalError::EmptyCriteria { .. })
        ));
    }

    #[test]
    /// Duplicate criterion ids are a validation error.
    fn test_duplicate_criterion() {
        let mut goal = goal_with_weights(&[0.5, 0.5]);
        goal.success_criteria[1].id = "c0".to_string();
        assert!(matches!(
            goal.validate(),
            Err(GoalError::DuplicateCriterion { .. })
        ));
    }

    #[test]
    /// Evaluation aggregates the weights of criteria whose metric key holds
    /// a non-empty value.
    fn test_evaluate_scoring() {
        let goal = goal_with_weights(&[0.3, 0.7]);
        let mut context = FxHashMap::default();
        context.insert("m0".to_string(), json!("five businesses"));
        context.insert("m1".to_string(), json!(""));

        let assessment = goal.evaluate(&context);
        assert!((assessment.score - 0.3).abs() < 1e-9);
        assert_eq!(assessment.satisfied, vec!["c0".to_string()]);
        assert_eq!(assessment.unsatisfied, vec!["c1".to_string()]);
    }

    #[test]
    /// Null, empty strings, empty arrays, and empty objects do not satisfy a
    /// criterion; numbers and booleans do.
    fn test_non_empty_semantics() {
        let goal = goal_with_weights(&[1.0]);
        for (value, expect) in [
            (json!(null), false),
            (json!(""), false),
            (json!([]), false),
            (json!({}), false),
            (json!(0), true),
            (json!(false), true),
            (json!(["x"]), true),
        ] {
            let mut context = FxHashMap::default();
            context.insert("m0".to_string(), value.clone());
            let score = goal.evaluate(&context).score;
            assert_eq!(score > 0.0, expect, "value {value} should be {expect}");
        }
    }

    #[test]
    /// The constraint preamble lists every constraint, or is absent.
    fn test_constraint_preamble() {
        let mut goal = goal_with_weights(&[1.0]);
        assert!(goal.constraint_preamble().is_none());
        goal.constraints.push(Constraint {
            id: "local-focus".to_string(),
            description: "Only businesses in Lusaka".to_string(),
            constraint_type: "safety".to_string(),
            category: "location".to_string(),
        });
        let preamble = goal.constraint_preamble().expect("preamble");
        assert!(preamble.contains("[safety]"));
        assert!(preamble.contains("Only businesses in Lusaka"));
    }
}

//! Condition Evaluator (C4): evaluates a node's condition list against a
//! variable snapshot and picks the matching branch's `nodeResultId`.

use std::collections::HashMap;

use flowrunner_store::{CondType, Condition, ConditionOperator, ConditionResultEntry};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ConditionOutcome {
    pub value: bool,
    pub node_result_id: Option<String>,
}

fn lookup(vars: &HashMap<String, String>, variable: &str) -> String {
    let key = variable.strip_prefix('@').unwrap_or(variable);
    vars.get(key).cloned().unwrap_or_default()
}

fn eval_one(cond: &Condition, vars: &HashMap<String, String>) -> bool {
    let actual = lookup(vars, &cond.variable);
    match cond.cond_type {
        CondType::Equal => actual.trim() == cond.value.trim(),
        CondType::NotEqual => actual.trim() != cond.value.trim(),
        CondType::Contains => actual.to_lowercase().contains(&cond.value.to_lowercase()),
        CondType::NotContains => !actual.to_lowercase().contains(&cond.value.to_lowercase()),
        CondType::GreaterThan => match (actual.trim().parse::<f64>(), cond.value.trim().parse::<f64>()) {
            (Ok(a), Ok(b)) => a > b,
            _ => false,
        },
        CondType::LessThan => match (actual.trim().parse::<f64>(), cond.value.trim().parse::<f64>()) {
            (Ok(a), Ok(b)) => a < b,
            _ => false,
        },
    }
}

/// Folds the condition list per `operator`, then looks up the matching
/// `__true` / `__false` entry in `condition_result`.
pub fn evaluate(
    conditions: &[Condition],
    operator: ConditionOperator,
    condition_result: &[ConditionResultEntry],
    vars: &HashMap<String, String>,
) -> ConditionOutcome {
    let value = if conditions.is_empty() {
        false
    } else {
        match operator {
            ConditionOperator::None => {
                if conditions.len() > 1 {
                    warn!(count = conditions.len(), "operator=None with multiple conditions; only the first is evaluated");
                }
                eval_one(&conditions[0], vars)
            }
            ConditionOperator::And => conditions.iter().all(|c| eval_one(c, vars)),
            ConditionOperator::Or => conditions.iter().any(|c| eval_one(c, vars)),
        }
    };

    let suffix = if value { "__true" } else { "__false" };
    let node_result_id = condition_result
        .iter()
        .find(|r| r.id.ends_with(suffix))
        .map(|r| r.node_result_id.clone());

    ConditionOutcome { value, node_result_id }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_entries() -> Vec<ConditionResultEntry> {
        vec![
            ConditionResultEntry { id: "C__true".into(), node_result_id: "Myes".into() },
            ConditionResultEntry { id: "C__false".into(), node_result_id: "Mno".into() },
        ]
    }

    #[test]
    fn equal_after_trim_picks_true_branch() {
        let conds = vec![Condition { id: "c1".into(), cond_type: CondType::Equal, variable: "@name".into(), value: "John".into() }];
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), " John ".to_string());
        let outcome = evaluate(&conds, ConditionOperator::None, &result_entries(), &vars);
        assert!(outcome.value);
        assert_eq!(outcome.node_result_id.as_deref(), Some("Myes"));
    }

    #[test]
    fn missing_variable_compares_as_empty_string() {
        let conds = vec![Condition { id: "c1".into(), cond_type: CondType::Equal, variable: "@ghost".into(), value: "".into() }];
        let outcome = evaluate(&conds, ConditionOperator::None, &result_entries(), &HashMap::new());
        assert!(outcome.value);
    }

    #[test]
    fn greater_than_with_non_numeric_side_is_false() {
        let conds = vec![Condition { id: "c1".into(), cond_type: CondType::GreaterThan, variable: "@age".into(), value: "18".into() }];
        let mut vars = HashMap::new();
        vars.insert("age".to_string(), "not-a-number".to_string());
        let outcome = evaluate(&conds, ConditionOperator::None, &result_entries(), &vars);
        assert!(!outcome.value);
        assert_eq!(outcome.node_result_id.as_deref(), Some("Mno"));
    }

    #[test]
    fn and_requires_every_condition() {
        let conds = vec![
            Condition { id: "c1".into(), cond_type: CondType::Equal, variable: "@a".into(), value: "1".into() },
            Condition { id: "c2".into(), cond_type: CondType::Equal, variable: "@b".into(), value: "2".into() },
        ];
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), "1".to_string());
        vars.insert("b".to_string(), "3".to_string());
        let outcome = evaluate(&conds, ConditionOperator::And, &result_entries(), &vars);
        assert!(!outcome.value);
    }

    #[test]
    fn or_needs_only_one_condition() {
        let conds = vec![
            Condition { id: "c1".into(), cond_type: CondType::Equal, variable: "@a".into(), value: "1".into() },
            Condition { id: "c2".into(), cond_type: CondType::Equal, variable: "@b".into(), value: "2".into() },
        ];
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), "1".to_string());
        vars.insert("b".to_string(), "3".to_string());
        let outcome = evaluate(&conds, ConditionOperator::Or, &result_entries(), &vars);
        assert!(outcome.value);
    }

    #[test]
    fn contains_is_case_insensitive() {
        let conds = vec![Condition { id: "c1".into(), cond_type: CondType::Contains, variable: "@msg".into(), value: "HELLO".into() }];
        let mut vars = HashMap::new();
        vars.insert("msg".to_string(), "well hello there".to_string());
        let outcome = evaluate(&conds, ConditionOperator::None, &result_entries(), &vars);
        assert!(outcome.value);
    }
}

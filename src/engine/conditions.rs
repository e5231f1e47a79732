use serde_json::Value;

use crate::models::automation_rule::{
    ConditionExpr, ConditionOperator, LogicalOperator, RuleCondition,
};

use super::templating::lookup_path;

/// Left fold: each condition's `logical_operator` decides how the next one
/// joins the running result, with no AND-over-OR precedence, so `a OR b AND c`
/// is `(a || b) && c`. Use [`ConditionExpr`] for conventional grouping.
pub fn evaluate_conditions(conditions: &[RuleCondition], ctx: &Value) -> bool {
    let mut result = true;
    let mut joiner = LogicalOperator::And;

    for condition in conditions {
        let outcome = evaluate_condition(condition, ctx);
        result = match joiner {
            LogicalOperator::And => result && outcome,
            LogicalOperator::Or => result || outcome,
        };
        joiner = condition.logical_operator.unwrap_or_default();
    }

    result
}

pub fn evaluate_expression(expr: &ConditionExpr, ctx: &Value) -> bool {
    match expr {
        ConditionExpr::Leaf(condition) => evaluate_condition(condition, ctx),
        ConditionExpr::And { children } => children.iter().all(|c| evaluate_expression(c, ctx)),
        ConditionExpr::Or { children } => children.iter().any(|c| evaluate_expression(c, ctx)),
        ConditionExpr::Not { child } => !evaluate_expression(child, ctx),
    }
}

/// The expression wins when both forms are present.
pub fn evaluate(conditions: &[RuleCondition], expression: Option<&ConditionExpr>, ctx: &Value) -> bool {
    match expression {
        Some(expr) => evaluate_expression(expr, ctx),
        None => evaluate_conditions(conditions, ctx),
    }
}

pub fn evaluate_condition(condition: &RuleCondition, ctx: &Value) -> bool {
    let actual = lookup_path(&condition.field, ctx);
    compare(actual, condition.operator, &condition.value)
}

fn compare(actual: Option<&Value>, operator: ConditionOperator, expected: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => strict_equals(actual, expected),
        ConditionOperator::NotEquals => !strict_equals(actual, expected),
        ConditionOperator::Greater => {
            compare_order(actual, expected) == Some(std::cmp::Ordering::Greater)
        }
        ConditionOperator::Less => compare_order(actual, expected) == Some(std::cmp::Ordering::Less),
        ConditionOperator::Contains => coerce_string(actual).contains(&coerce_string(Some(expected))),
        ConditionOperator::StartsWith => {
            coerce_string(actual).starts_with(&coerce_string(Some(expected)))
        }
        ConditionOperator::EndsWith => {
            coerce_string(actual).ends_with(&coerce_string(Some(expected)))
        }
        ConditionOperator::In => match expected {
            Value::Array(items) => items.iter().any(|item| strict_equals(actual, item)),
            _ => false,
        },
        ConditionOperator::NotIn => match expected {
            Value::Array(items) => !items.iter().any(|item| strict_equals(actual, item)),
            _ => false,
        },
        ConditionOperator::Between => between(actual, expected),
    }
}

/// Scalars compare by value (numbers numerically); arrays and objects never
/// compare equal, and a missing value equals nothing.
fn strict_equals(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn compare_order(actual: Option<&Value>, expected: &Value) -> Option<std::cmp::Ordering> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Inclusive on both ends; anything but a two-number bound is false.
fn between(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(value) = actual.and_then(Value::as_f64) else {
        return false;
    };
    match expected.as_array().map(Vec::as_slice) {
        Some([low, high]) => match (low.as_f64(), high.as_f64()) {
            (Some(low), Some(high)) => value >= low && value <= high,
            _ => false,
        },
        _ => false,
    }
}

pub(crate) fn coerce_string(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => format_number(n),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => coerce_string(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

fn format_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, operator: ConditionOperator, value: Value) -> RuleCondition {
        RuleCondition {
            id: None,
            field: field.into(),
            operator,
            value,
            logical_operator: None,
        }
    }

    fn joined(mut c: RuleCondition, op: LogicalOperator) -> RuleCondition {
        c.logical_operator = Some(op);
        c
    }

    #[test]
    fn empty_list_is_true() {
        assert!(evaluate_conditions(&[], &json!({})));
    }

    #[test]
    fn null_equals_null_but_not_missing() {
        let ctx = json!({"task": {"assignedToId": null}});
        assert!(evaluate_condition(
            &cond("task.assignedToId", ConditionOperator::Equals, Value::Null),
            &ctx
        ));
        assert!(!evaluate_condition(
            &cond("task.reviewerId", ConditionOperator::Equals, Value::Null),
            &ctx
        ));
        assert!(evaluate_condition(
            &cond("task.reviewerId", ConditionOperator::NotEquals, Value::Null),
            &ctx
        ));
    }

    #[test]
    fn numbers_compare_numerically() {
        let ctx = json!({"budget": 1500000, "score": 79.5});
        assert!(evaluate_condition(&cond("budget", ConditionOperator::Greater, json!(1000000)), &ctx));
        assert!(evaluate_condition(&cond("score", ConditionOperator::Less, json!(80)), &ctx));
        assert!(evaluate_condition(&cond("budget", ConditionOperator::Equals, json!(1500000.0)), &ctx));
        assert!(!evaluate_condition(&cond("budget", ConditionOperator::Greater, json!("1000")), &ctx));
        assert!(!evaluate_condition(&cond("missing", ConditionOperator::Less, json!(1)), &ctx));
    }

    #[test]
    fn between_is_inclusive() {
        let bounds = json!([10, 20]);
        for (value, expected) in [(10, true), (15, true), (20, true), (9, false), (21, false)] {
            let ctx = json!({ "v": value });
            assert_eq!(
                evaluate_condition(&cond("v", ConditionOperator::Between, bounds.clone()), &ctx),
                expected,
                "value {value}"
            );
        }
        let ctx = json!({"v": 15});
        assert!(!evaluate_condition(&cond("v", ConditionOperator::Between, json!(15)), &ctx));
        assert!(!evaluate_condition(&cond("v", ConditionOperator::Between, json!([1])), &ctx));
    }

    #[test]
    fn string_operators_coerce() {
        let ctx = json!({"code": 4512, "name": "North Tower", "tags": ["steel", "glass"]});
        assert!(evaluate_condition(&cond("code", ConditionOperator::StartsWith, json!(45)), &ctx));
        assert!(evaluate_condition(&cond("name", ConditionOperator::EndsWith, json!("Tower")), &ctx));
        assert!(evaluate_condition(&cond("tags", ConditionOperator::Contains, json!("l,gl")), &ctx));
        assert!(evaluate_condition(&cond("nope", ConditionOperator::Contains, json!("undef")), &ctx));
    }

    #[test]
    fn in_and_not_in_require_array() {
        let ctx = json!({"status": "blocked"});
        assert!(evaluate_condition(
            &cond("status", ConditionOperator::In, json!(["blocked", "late"])),
            &ctx
        ));
        assert!(!evaluate_condition(&cond("status", ConditionOperator::In, json!("blocked")), &ctx));
        assert!(evaluate_condition(
            &cond("status", ConditionOperator::NotIn, json!(["done"])),
            &ctx
        ));
        assert!(!evaluate_condition(&cond("status", ConditionOperator::NotIn, json!("done")), &ctx));
    }

    #[test]
    fn left_fold_has_no_precedence() {
        // false OR true AND false  =>  (false || true) && false  =>  false
        let ctx = json!({"a": 1, "b": 2, "c": 3});
        let list = vec![
            joined(cond("a", ConditionOperator::Equals, json!(0)), LogicalOperator::Or),
            joined(cond("b", ConditionOperator::Equals, json!(2)), LogicalOperator::And),
            cond("c", ConditionOperator::Equals, json!(0)),
        ];
        assert!(!evaluate_conditions(&list, &ctx));

        // The same shape as a tree with AND binding tighter: a || (b && c) => false;
        // flip c to true and the tree is true.
        let tree = ConditionExpr::Or {
            children: vec![
                ConditionExpr::Leaf(cond("a", ConditionOperator::Equals, json!(0))),
                ConditionExpr::And {
                    children: vec![
                        ConditionExpr::Leaf(cond("b", ConditionOperator::Equals, json!(2))),
                        ConditionExpr::Leaf(cond("c", ConditionOperator::Equals, json!(3))),
                    ],
                },
            ],
        };
        assert!(evaluate_expression(&tree, &ctx));
    }

    #[test]
    fn or_fold_recovers_from_earlier_false() {
        let ctx = json!({"priority": "low", "overdue": true});
        let list = vec![
            joined(cond("priority", ConditionOperator::Equals, json!("high")), LogicalOperator::Or),
            cond("overdue", ConditionOperator::Equals, json!(true)),
        ];
        assert!(evaluate_conditions(&list, &ctx));
    }

    #[test]
    fn expression_takes_precedence_over_list() {
        let ctx = json!({"x": 1});
        let list = vec![cond("x", ConditionOperator::Equals, json!(2))];
        let expr = ConditionExpr::Not {
            child: Box::new(ConditionExpr::Leaf(cond("x", ConditionOperator::Equals, json!(2)))),
        };
        assert!(!evaluate(&list, None, &ctx));
        assert!(evaluate(&list, Some(&expr), &ctx));
    }

    #[test]
    fn coercion_matches_loose_display_rules() {
        assert_eq!(coerce_string(Some(&json!(2.0))), "2");
        assert_eq!(coerce_string(Some(&json!(2.5))), "2.5");
        assert_eq!(coerce_string(Some(&json!([1, null, "a"]))), "1,,a");
        assert_eq!(coerce_string(Some(&json!({"k": 1}))), "[object Object]");
        assert_eq!(coerce_string(None), "undefined");
    }
}

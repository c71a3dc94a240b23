//! Evaluation of row-independent expression fragments.
//!
//! Captured variables, computed Take/Skip counts and IN-list collections all
//! go through [`evaluate`] to become concrete values before they are bound.

use crate::ast::{BinaryOp, Expr, StringOp};
use crate::error::{QueryError, Result};
use serde_json::Value;
use std::cmp::Ordering;

/// Evaluate an expression that does not depend on a row
pub fn evaluate(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Constant(value) => Ok(value.clone()),
        Expr::Captured { value, .. } => Ok(value.clone()),
        Expr::Member { target, member } => match evaluate(target)? {
            Value::Object(mut fields) => fields.remove(member).ok_or_else(|| {
                QueryError::Translation(format!("Captured value has no member {}", member))
            }),
            Value::Null => Err(QueryError::Translation(format!(
                "Member {} accessed on a null value",
                member
            ))),
            other => Err(QueryError::Translation(format!(
                "Member {} accessed on non-object value {}",
                member, other
            ))),
        },
        Expr::Array(items) => items
            .iter()
            .map(evaluate)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Expr::Not(inner) => Ok(Value::Bool(!as_bool(&evaluate(inner)?)?)),
        Expr::HasValue(inner) => Ok(Value::Bool(!evaluate(inner)?.is_null())),
        Expr::IsNullOrEmpty(inner) => Ok(Value::Bool(match evaluate(inner)? {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        })),
        Expr::Binary { op, left, right } => binary(*op, evaluate(left)?, evaluate(right)?),
        Expr::StringMatch { op, target, value } => {
            let target = evaluate(target)?;
            let value = evaluate(value)?;
            let (Some(target), Some(value)) = (target.as_str(), value.as_str()) else {
                return Err(QueryError::Translation(
                    "String match on non-string operands".to_string(),
                ));
            };
            Ok(Value::Bool(match op {
                StringOp::Contains => target.contains(value),
                StringOp::StartsWith => target.starts_with(value),
                StringOp::EndsWith => target.ends_with(value),
            }))
        }
        Expr::CollectionContains { collection, item } => {
            let item = evaluate(item)?;
            let values = evaluate_list(collection)?;
            Ok(Value::Bool(values.contains(&item)))
        }
        Expr::Parameter(param) => Err(QueryError::Translation(format!(
            "Expression depends on query parameter {} and cannot be evaluated",
            param.name
        ))),
    }
}

/// Evaluate a collection operand to its elements, in order
pub fn evaluate_list(expr: &Expr) -> Result<Vec<Value>> {
    match evaluate(expr)? {
        Value::Array(values) => Ok(values),
        other => Err(QueryError::Translation(format!(
            "Expected a collection, found {}",
            other
        ))),
    }
}

/// Evaluate a Take/Skip count
pub fn evaluate_count(expr: &Expr) -> Result<u64> {
    let value = evaluate(expr)?;
    value.as_u64().ok_or_else(|| {
        QueryError::Usage(format!(
            "Row count must be a non-negative integer, found {}",
            value
        ))
    })
}

fn as_bool(value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| {
        QueryError::Translation(format!("Expected a boolean, found {}", value))
    })
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    let result = match op {
        BinaryOp::And => as_bool(&left)? && as_bool(&right)?,
        BinaryOp::Or => as_bool(&left)? || as_bool(&right)?,
        BinaryOp::Eq => left == right,
        BinaryOp::Ne => left != right,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right).ok_or_else(|| {
                QueryError::Translation(format!("Cannot compare {} with {}", left, right))
            })?;
            match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Param;
    use serde_json::json;

    struct Player;

    #[test]
    fn test_captured_member() {
        let settings = Expr::captured("settings", json!({"page": {"size": 25}}));
        let size = settings.member("page").member("size");
        assert_eq!(evaluate(&size).unwrap(), json!(25));
        assert_eq!(evaluate_count(&size).unwrap(), 25);
    }

    #[test]
    fn test_missing_member() {
        let settings = Expr::captured("settings", json!({}));
        let err = evaluate(&settings.member("size")).unwrap_err();
        assert!(matches!(err, QueryError::Translation(_)));
    }

    #[test]
    fn test_array_keeps_order() {
        let list = Expr::array(vec![
            Expr::constant("b"),
            Expr::captured("x", "a"),
            Expr::null(),
        ]);
        assert_eq!(evaluate_list(&list).unwrap(), vec![json!("b"), json!("a"), Value::Null]);
    }

    #[test]
    fn test_negative_count_rejected() {
        let err = evaluate_count(&Expr::constant(-1)).unwrap_err();
        assert!(matches!(err, QueryError::Usage(_)));
    }

    #[test]
    fn test_row_dependent_expression_rejected() {
        let p = Param::new::<Player>("p");
        let err = evaluate(&p.field("Name")).unwrap_err();
        assert!(matches!(err, QueryError::Translation(_)));
    }

    #[test]
    fn test_boolean_logic() {
        let flag = Expr::captured("enabled", true);
        let expr = !flag.and(Expr::constant(3).lt(Expr::constant(4)));
        assert_eq!(evaluate(&expr).unwrap(), json!(false));

        let name = Expr::constant("textual");
        assert_eq!(
            evaluate(&name.clone().starts_with(Expr::constant("text"))).unwrap(),
            json!(true)
        );
        assert_eq!(evaluate(&name.is_null_or_empty()).unwrap(), json!(false));
    }
}

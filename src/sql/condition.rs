//! Condition rendering for WHERE, GROUP BY and ORDER BY clauses
//!
//! Predicates render in declaration order and are joined with `AND`. Values are
//! never inlined; each fragment pushes its parameters in the same order its
//! placeholders appear.

use crate::condition::{Condition, Operator, Predicate};
use crate::error::{EngineError, Result};
use crate::sql::dialect::Dialect;
use crate::sql::sanitize::validate_key;
use crate::types::Value;

/// Build the WHERE body (without the `WHERE` keyword) for a condition
///
/// Returns `(clause, params)`; `clause` is empty when the condition has no
/// renderable predicate.
///
/// # Operators
/// - Comparison: `=`, `<>`, `<`, `<=`, `>`, `>=` (an `=`/`<>` against NULL becomes `IS [NOT] NULL`)
/// - Range: `BETWEEN ? AND ?`, `NOT BETWEEN ? AND ?`
/// - Sets: `IN (?, ...)`, `NOT IN (?, ...)`; an empty set renders `1 = 0` / `1 = 1`
/// - Pattern: `LIKE ?`, `NOT LIKE ?`
/// - Nullability: `IS NULL`, `IS NOT NULL`
/// - OR: each nested condition's fragment, joined with `OR`, in one parenthesis
pub fn build_where(dialect: &dyn Dialect, cnd: &Condition) -> Result<(String, Vec<Value>)> {
    let mut params = Vec::new();
    let parts = build_fragments(dialect, cnd.predicates(), &mut params)?;
    Ok((parts.join(" AND "), params))
}

fn build_fragments(
    dialect: &dyn Dialect,
    predicates: &[Predicate],
    params: &mut Vec<Value>,
) -> Result<Vec<String>> {
    let mut parts = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        match predicate {
            Predicate::Compare { key, op, values } => {
                parts.push(build_compare(dialect, key, *op, values, params)?);
            }
            Predicate::Or(nested) => {
                let mut branches = Vec::with_capacity(nested.len());
                for cnd in nested {
                    let inner = build_fragments(dialect, cnd.predicates(), params)?;
                    match inner.len() {
                        0 => {}
                        1 => branches.extend(inner),
                        _ => branches.push(format!("({})", inner.join(" AND "))),
                    }
                }
                if !branches.is_empty() {
                    parts.push(format!("({})", branches.join(" OR ")));
                }
            }
        }
    }
    Ok(parts)
}

fn build_compare(
    dialect: &dyn Dialect,
    key: &str,
    op: Operator,
    values: &[Value],
    params: &mut Vec<Value>,
) -> Result<String> {
    validate_key(key).map_err(EngineError::Validation)?;
    let column = dialect.quote_key(key);

    let fragment = match op {
        Operator::Eq | Operator::NotEq | Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            let value = single(key, op, values)?;
            if value == Value::Null {
                match op {
                    Operator::Eq => return Ok(format!("{} IS NULL", column)),
                    Operator::NotEq => return Ok(format!("{} IS NOT NULL", column)),
                    _ => {
                        return Err(EngineError::validation(format!(
                            "{:?} on '{}' cannot compare against NULL",
                            op, key
                        )));
                    }
                }
            }
            let symbol = match op {
                Operator::Eq => "=",
                Operator::NotEq => "<>",
                Operator::Lt => "<",
                Operator::Lte => "<=",
                Operator::Gt => ">",
                _ => ">=",
            };
            params.push(value);
            format!("{} {} {}", column, symbol, dialect.placeholder(params.len()))
        }
        Operator::Between | Operator::NotBetween => {
            let [low, high] = values else {
                return Err(EngineError::validation(format!(
                    "{:?} on '{}' requires exactly 2 values",
                    op, key
                )));
            };
            let keyword = if op == Operator::Between {
                "BETWEEN"
            } else {
                "NOT BETWEEN"
            };
            params.push(low.clone());
            let low_ph = dialect.placeholder(params.len());
            params.push(high.clone());
            let high_ph = dialect.placeholder(params.len());
            format!("{} {} {} AND {}", column, keyword, low_ph, high_ph)
        }
        Operator::In | Operator::NotIn => {
            if values.is_empty() {
                return Ok(if op == Operator::In { "1 = 0" } else { "1 = 1" }.to_string());
            }
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| {
                    params.push(v.clone());
                    dialect.placeholder(params.len())
                })
                .collect();
            let keyword = if op == Operator::In { "IN" } else { "NOT IN" };
            format!("{} {} ({})", column, keyword, placeholders.join(", "))
        }
        Operator::Like | Operator::NotLike => {
            let value = single(key, op, values)?;
            let keyword = if op == Operator::Like { "LIKE" } else { "NOT LIKE" };
            params.push(value);
            format!("{} {} {}", column, keyword, dialect.placeholder(params.len()))
        }
        Operator::IsNull => format!("{} IS NULL", column),
        Operator::IsNotNull => format!("{} IS NOT NULL", column),
    };
    Ok(fragment)
}

fn single(key: &str, op: Operator, values: &[Value]) -> Result<Value> {
    match values {
        [value] => Ok(value.clone()),
        _ => Err(EngineError::validation(format!(
            "{:?} on '{}' requires exactly 1 value",
            op, key
        ))),
    }
}

/// ` GROUP BY ...`, or an empty string when no group keys are set
pub fn build_group_by(dialect: &dyn Dialect, cnd: &Condition) -> Result<String> {
    if cnd.groups().is_empty() {
        return Ok(String::new());
    }
    let keys = cnd
        .groups()
        .iter()
        .map(|key| {
            validate_key(key).map_err(EngineError::Validation)?;
            Ok(dialect.quote_key(key))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(" GROUP BY {}", keys.join(", ")))
}

/// ` ORDER BY ...`, or an empty string when no sort keys are set
pub fn build_sort_by(dialect: &dyn Dialect, cnd: &Condition) -> Result<String> {
    if cnd.sorts().is_empty() {
        return Ok(String::new());
    }
    let keys = cnd
        .sorts()
        .iter()
        .map(|sort| {
            validate_key(&sort.key).map_err(EngineError::Validation)?;
            Ok(format!("{} {}", dialect.quote_key(&sort.key), sort.order.as_sql()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(" ORDER BY {}", keys.join(", ")))
}

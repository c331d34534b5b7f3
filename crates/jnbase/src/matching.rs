//! Equality-conjunction matching of records against conditions.

use serde_json::{Number, Value};

use crate::{Condition, Record};

/// Checks if a record matches every field of the condition.
///
/// A field matches when it exists on the record and is [`strict_equals`] to the expected value.
/// An empty condition matches every record.
pub fn matches_condition(record: &Record, condition: &Condition) -> bool {
    condition
        .iter()
        .all(|(field, expected)| record.get(field).is_some_and(|actual| strict_equals(actual, expected)))
}

/// Scalar equality between two JSON values.
///
/// Null, booleans, strings and numbers compare by value; numbers compare numerically, so `1`
/// equals `1.0`. Arrays and objects are never equal to anything, including an identical
/// structure: conditions cannot match on nested values.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (&Value::Null, &Value::Null) => true,
        (&Value::Bool(x), &Value::Bool(y)) => x == y,
        (&Value::String(ref x), &Value::String(ref y)) => x == y,
        (&Value::Number(ref x), &Value::Number(ref y)) => numbers_equal(x, y),
        _ => false,
    }
}

#[allow(clippy::float_cmp, reason = "strict equality is the documented matching semantics")]
fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

//! Structural equality for variable values.
//!
//! `serde_json::Value` keeps integers and floats apart, so `1` and `1.0`
//! compare unequal with `==`. A variable whose number only switched
//! representation is not a change.

use serde_json::{Number, Value};

/// Deep structural equality where numbers compare by numeric value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert!(values_equal(&json!(null), &json!(null)));
        assert!(values_equal(&json!("a"), &json!("a")));
        assert!(!values_equal(&json!("a"), &json!("b")));
        assert!(!values_equal(&json!(true), &json!(1)));
        assert!(!values_equal(&json!(null), &json!(false)));
    }

    #[test]
    fn test_numbers_compare_numerically() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!(-3), &json!(-3.0)));
        assert!(!values_equal(&json!(1), &json!(1.5)));
        assert!(values_equal(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(!values_equal(&json!(-1), &json!(u64::MAX)));
    }

    #[test]
    fn test_nested() {
        let a = json!({"items": [1, 2, {"x": 3}], "flag": true});
        let b = json!({"flag": true, "items": [1.0, 2, {"x": 3.0}]});
        assert!(values_equal(&a, &b));

        let c = json!({"items": [1, 2, {"x": 4}], "flag": true});
        assert!(!values_equal(&a, &c));

        assert!(!values_equal(&json!([1, 2]), &json!([1, 2, 3])));
        assert!(!values_equal(&json!({"a": 1}), &json!({"b": 1})));
    }
}

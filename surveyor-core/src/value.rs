//! Helpers over `serde_json::Value` shared by templates, expressions and answers

use serde_json::Value;
use std::cmp::Ordering;

/// Render a value as prompt text.
///
/// Strings are inserted without quotes, arrays of scalars become a
/// comma-separated list, everything else is compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.iter().all(is_scalar) => {
            items.iter().map(render_value).collect::<Vec<_>>().join(", ")
        }
        other => other.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Walk a dotted path into a value. Numeric segments index into arrays.
pub fn lookup_path<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        let segment = segment.as_ref();
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Numeric view of a value; numeric strings are coerced.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Equality with numeric coercion: `1 == 1.0` and `"5" == 5`.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(left), as_number(right)) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        },
        _ => left == right,
    }
}

/// Ordering for numbers (with coercion) and strings; `None` when incomparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => as_number(left)?.partial_cmp(&as_number(right)?),
    }
}

/// Python-style truthiness
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Membership test backing the `in` operator.
pub fn contains(container: &Value, item: &Value) -> bool {
    match container {
        Value::Array(items) => items.iter().any(|candidate| values_equal(candidate, item)),
        Value::String(haystack) => match item {
            Value::String(needle) => haystack.contains(needle.as_str()),
            other => haystack.contains(&render_value(other)),
        },
        Value::Object(map) => item.as_str().map(|key| map.contains_key(key)).unwrap_or(false),
        _ => false,
    }
}

/// Number value that stays integral when the float has no fractional part.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&json!("hello")), "hello");
        assert_eq!(render_value(&json!(3)), "3");
        assert_eq!(render_value(&json!(["a", "b"])), "a, b");
        assert_eq!(render_value(&json!({"k": 1})), "{\"k\":1}");
        assert_eq!(render_value(&Value::Null), "None");
    }

    #[test]
    fn test_lookup_path() {
        let value = json!({"person": {"name": "Ada", "langs": ["en", "fr"]}});
        assert_eq!(lookup_path(&value, &["person", "name"]), Some(&json!("Ada")));
        assert_eq!(lookup_path(&value, &["person", "langs", "1"]), Some(&json!("fr")));
        assert_eq!(lookup_path(&value, &["person", "age"]), None);
        let empty: [&str; 0] = [];
        assert_eq!(lookup_path(&value, &empty), Some(&value));
    }

    #[test]
    fn test_values_equal_coerces_numbers() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!("5"), &json!(5)));
        assert!(!values_equal(&json!("five"), &json!(5)));
        assert!(values_equal(&json!("yes"), &json!("yes")));
    }

    #[test]
    fn test_compare_and_contains() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!(true), &json!(1)), None);
        assert!(contains(&json!(["a", "b"]), &json!("b")));
        assert!(contains(&json!("pizza and pasta"), &json!("pasta")));
        assert!(!contains(&json!(null), &json!("a")));
    }

    #[test]
    fn test_number_value() {
        assert_eq!(number_value(4.0), json!(4));
        assert_eq!(number_value(4.5), json!(4.5));
    }
}

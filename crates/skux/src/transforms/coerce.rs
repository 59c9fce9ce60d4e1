//! 🧪 Field coercion: one total conversion per target type.
//!
//! Every helper takes `Option<&Value>` (the cell may be absent from the row
//! altogether) and returns a [`Coerced`] so the caller can tell "nobody sent
//! this" apart from "somebody sent garbage". Both end in the same fallback;
//! only the log line differs.

use serde_json::Value;

/// 🎭 The three fates of a cell.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Coerced<T> {
    Value(T),
    Missing,
    Unparsable,
}

impl<T> Coerced<T> {
    pub(crate) fn or(self, fallback: T) -> T {
        match self {
            Coerced::Value(v) => v,
            Coerced::Missing | Coerced::Unparsable => fallback,
        }
    }
}

/// 🔤 Stringify-then-trim. Absent, null, and blank all count as missing.
pub(crate) fn text(cell: Option<&Value>) -> Coerced<String> {
    let rendered = match cell {
        None | Some(Value::Null) => return Coerced::Missing,
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        // -- 🎁 arrays/objects get their JSON rendering. weird input, honest output.
        Some(other) => other.to_string(),
    };
    if rendered.is_empty() {
        Coerced::Missing
    } else {
        Coerced::Value(rendered)
    }
}

/// 💲 Numeric parse into `f64`. Non-finite results are not prices.
pub(crate) fn float(cell: Option<&Value>) -> Coerced<f64> {
    let parsed = match cell {
        None | Some(Value::Null) => return Coerced::Missing,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Coerced::Missing;
            }
            trimmed.parse::<f64>().ok()
        }
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(_) => None,
    };
    match parsed {
        Some(f) if f.is_finite() => Coerced::Value(f),
        _ => Coerced::Unparsable,
    }
}

/// 📦 Numeric parse into `i64`. `"5"` and `"5.0"` are both five; `"4.9"` is four.
pub(crate) fn integer(cell: Option<&Value>) -> Coerced<i64> {
    match cell {
        None | Some(Value::Null) => Coerced::Missing,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Coerced::Missing;
            }
            match trimmed.parse::<i64>() {
                Ok(i) => Coerced::Value(i),
                Err(_) => truncate(trimmed.parse::<f64>().ok()),
            }
        }
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Coerced::Value(i),
            None => truncate(n.as_f64()),
        },
        Some(Value::Bool(b)) => Coerced::Value(i64::from(*b)),
        Some(_) => Coerced::Unparsable,
    }
}

// -- ✂️ truncate toward zero, refusing anything i64 cannot hold
fn truncate(maybe_float: Option<f64>) -> Coerced<i64> {
    match maybe_float {
        Some(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Coerced::Value(f.trunc() as i64)
        }
        _ => Coerced::Unparsable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_text_gets_a_haircut() {
        assert_eq!(text(Some(&json!("  Widget  "))), Coerced::Value("Widget".to_string()));
        assert_eq!(text(Some(&json!(7))), Coerced::Value("7".to_string()));
        assert_eq!(text(Some(&json!(true))), Coerced::Value("true".to_string()));
        assert_eq!(text(Some(&json!("   "))), Coerced::Missing);
        assert_eq!(text(Some(&Value::Null)), Coerced::Missing);
        assert_eq!(text(None), Coerced::Missing);
    }

    #[test]
    fn the_one_where_prices_are_parsed_or_politely_zeroed() {
        assert_eq!(float(Some(&json!(" 9.99 "))), Coerced::Value(9.99));
        assert_eq!(float(Some(&json!(10))), Coerced::Value(10.0));
        assert_eq!(float(Some(&json!("1e2"))), Coerced::Value(100.0));
        assert_eq!(float(Some(&json!("twelve"))), Coerced::Unparsable);
        assert_eq!(float(Some(&json!("NaN"))), Coerced::Unparsable);
        assert_eq!(float(Some(&json!("inf"))), Coerced::Unparsable);
        assert_eq!(float(Some(&json!(""))), Coerced::Missing);
        assert_eq!(float(Some(&json!([1, 2]))).or(0.0), 0.0);
    }

    #[test]
    fn the_one_where_stock_counts_are_truncated_like_python_would() {
        assert_eq!(integer(Some(&json!("5"))), Coerced::Value(5));
        assert_eq!(integer(Some(&json!("5.0"))), Coerced::Value(5));
        assert_eq!(integer(Some(&json!("4.9"))), Coerced::Value(4));
        assert_eq!(integer(Some(&json!("-2.7"))), Coerced::Value(-2));
        assert_eq!(integer(Some(&json!(3.99))), Coerced::Value(3));
        assert_eq!(integer(Some(&json!(false))), Coerced::Value(0));
        assert_eq!(integer(Some(&json!("lots"))), Coerced::Unparsable);
        assert_eq!(integer(Some(&json!("1e300"))), Coerced::Unparsable);
        assert_eq!(integer(None), Coerced::Missing);
    }
}

//! Filter evaluation against a single row.
//!
//! A missing field never matches, whatever the operator: `ne` and `nin`
//! are false on absent fields too. Operands that cannot be coerced to
//! what the operator needs make the predicate false; nothing here errors.

use std::cmp::Ordering;

use crate::types::{Filter, FilterOp, Row, Value};

static NULL: Value = Value::Null;

pub fn filter_match(filter: &Filter, payload: &Row) -> bool {
    let Some(val) = payload.get(&filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => values_equal(val, &filter.value),
        FilterOp::Ne => !values_equal(val, &filter.value),
        FilterOp::In => filter.values.iter().any(|one| values_equal(val, one)),
        FilterOp::Nin => !filter.values.iter().any(|one| values_equal(val, one)),
        FilterOp::Gt => compare_numbers(val, &filter.value).is_some_and(|o| o == Ordering::Greater),
        FilterOp::Gte => compare_numbers(val, &filter.value).is_some_and(|o| o != Ordering::Less),
        FilterOp::Lt => compare_numbers(val, &filter.value).is_some_and(|o| o == Ordering::Less),
        FilterOp::Lte => compare_numbers(val, &filter.value).is_some_and(|o| o != Ordering::Greater),
        FilterOp::Range => in_range(val, filter.min.as_ref(), filter.max.as_ref()),
    }
}

/// AND of every filter, stopping at the first miss.
pub fn all_match(filters: &[Filter], payload: &Row) -> bool {
    filters.iter().all(|f| filter_match(f, payload))
}

/// Numeric equality when both sides are numeric, otherwise
/// case-insensitive comparison of the textual forms.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(fa), Some(fb)) = (a.as_f64(), b.as_f64()) {
        return fa == fb;
    }
    a.text().to_lowercase() == b.text().to_lowercase()
}

fn compare_numbers(a: &Value, b: &Value) -> Option<Ordering> {
    let fa = a.as_f64()?;
    let fb = b.as_f64()?;
    fa.partial_cmp(&fb)
}

fn in_range(val: &Value, min: Option<&Value>, max: Option<&Value>) -> bool {
    let Some(fv) = val.as_f64() else {
        return false;
    };
    // non-numeric bounds are treated as absent
    if let Some(lo) = min.and_then(Value::as_f64) {
        if fv < lo {
            return false;
        }
    }
    if let Some(hi) = max.and_then(Value::as_f64) {
        if fv > hi {
            return false;
        }
    }
    true
}

/// Total ordering used by sorts. Numeric values come first, ordered by
/// value; everything else follows, ordered by textual form. A missing
/// value sorts as `null`.
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&NULL);
    let b = b.unwrap_or(&NULL);
    match (a.as_f64(), b.as_f64()) {
        (Some(fa), Some(fb)) => fa.total_cmp(&fb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.text().cmp(&b.text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::row_from_json;
    use serde_json::json;

    fn row(v: serde_json::Value) -> Row {
        row_from_json(v).expect("object")
    }

    #[test]
    fn missing_field_never_matches() {
        let payload = row(json!({"other": 1}));
        for op in FilterOp::ALL {
            let filter = Filter {
                values: vec![Value::from(1)],
                ..Filter::compare("price", op, 1)
            };
            assert!(!filter_match(&filter, &payload), "{} on missing field", op.as_str());
        }
    }

    #[test]
    fn equality_is_numeric_then_case_insensitive() {
        let payload = row(json!({"price": 10, "cat": "Books"}));
        assert!(filter_match(&Filter::eq("price", "10.0"), &payload));
        assert!(filter_match(&Filter::eq("cat", "books"), &payload));
        assert!(!filter_match(&Filter::eq("cat", "book"), &payload));
        assert!(filter_match(&Filter::compare("cat", FilterOp::Ne, "music"), &payload));
    }

    #[test]
    fn ordering_requires_numbers() {
        let payload = row(json!({"price": 10, "name": "z"}));
        assert!(filter_match(&Filter::compare("price", FilterOp::Gt, 5), &payload));
        assert!(filter_match(&Filter::compare("price", FilterOp::Gte, "10"), &payload));
        assert!(!filter_match(&Filter::compare("price", FilterOp::Lt, 10), &payload));
        assert!(!filter_match(&Filter::compare("name", FilterOp::Gt, "a"), &payload));
        assert!(!filter_match(&Filter::compare("price", FilterOp::Lte, "cheap"), &payload));
    }

    #[test]
    fn range_is_inclusive_with_open_bounds() {
        let payload = row(json!({"price": 20, "label": "n/a"}));
        assert!(filter_match(&Filter::range("price", Some(Value::from(20)), Some(Value::from(25))), &payload));
        assert!(filter_match(&Filter::range("price", None, Some(Value::from(20))), &payload));
        assert!(filter_match(&Filter::range("price", Some(Value::from(1)), None), &payload));
        assert!(!filter_match(&Filter::range("price", Some(Value::from(21)), None), &payload));
        assert!(!filter_match(&Filter::range("label", None, None), &payload));
    }

    #[test]
    fn in_and_not_in_use_equality_rule() {
        let payload = row(json!({"cat": "X"}));
        let candidates = vec![Value::from("x"), Value::from("y")];
        assert!(filter_match(&Filter::within("cat", FilterOp::In, candidates.clone()), &payload));
        assert!(!filter_match(&Filter::within("cat", FilterOp::Nin, candidates), &payload));
        assert!(filter_match(&Filter::within("cat", FilterOp::Nin, vec![Value::from("z")]), &payload));
    }

    #[test]
    fn sort_comparison_falls_back_to_text() {
        let two = Value::from(2);
        let ten = Value::from("10");
        assert_eq!(compare_for_sort(Some(&two), Some(&ten)), Ordering::Less);
        let a = Value::from("apple");
        assert_eq!(compare_for_sort(Some(&a), Some(&ten)), Ordering::Greater);
        assert_eq!(compare_for_sort(None, None), Ordering::Equal);
    }

    #[test]
    fn sort_comparison_is_a_total_order() {
        let values = [
            Value::from(10),
            Value::from("2a"),
            Value::from(3),
            Value::from("NaN"),
            Value::from("nan"),
            Value::from(-1.5),
            Value::from("inf"),
            Value::from("apple"),
            Value::Null,
            Value::Bool(true),
        ];
        for a in &values {
            assert_eq!(compare_for_sort(Some(a), Some(a)), Ordering::Equal);
            for b in &values {
                let ab = compare_for_sort(Some(a), Some(b));
                assert_eq!(ab, compare_for_sort(Some(b), Some(a)).reverse());
                for c in &values {
                    let bc = compare_for_sort(Some(b), Some(c));
                    if ab != Ordering::Greater && bc != Ordering::Greater {
                        assert_ne!(compare_for_sort(Some(a), Some(c)), Ordering::Greater);
                    }
                }
            }
        }
        // numbers rank before text, so 3 < 10 < "2a"
        let ten = Value::from(10);
        let mixed = Value::from("2a");
        assert_eq!(compare_for_sort(Some(&ten), Some(&mixed)), Ordering::Less);
        let nan = Value::from("NaN");
        assert_eq!(compare_for_sort(Some(&ten), Some(&nan)), Ordering::Less);
    }

    #[test]
    fn nan_strings_are_not_numbers() {
        let payload = row(json!({"v": "NaN"}));
        assert!(!filter_match(&Filter::compare("v", FilterOp::Gt, 1), &payload));
        assert!(filter_match(&Filter::eq("v", "nan"), &payload));
    }
}

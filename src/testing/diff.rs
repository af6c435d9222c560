use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// One difference between an expected and an actual item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    /// Location of the value, e.g. `$.offers[0].price`.
    pub path: String,
    pub kind: DiffKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffKind {
    Changed { expected: Value, actual: Value },
    Missing { expected: Value },
    Unexpected { actual: Value },
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiffKind::Changed { expected, actual } => write!(f, "{}: expected {}, got {}", self.path, expected, actual),
            DiffKind::Missing { expected } => write!(f, "{}: missing (expected {})", self.path, expected),
            DiffKind::Unexpected { actual } => write!(f, "{}: unexpected {}", self.path, actual),
        }
    }
}

/// Deep structural comparison. Top level object keys listed in `ignored`
/// are skipped on both sides. Returns an empty list when the values match.
pub fn diff_values(expected: &Value, actual: &Value, ignored: &[String]) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => diff_objects(e, a, "$", ignored, &mut diffs),
        _ => diff_at(expected, actual, "$".to_string(), &mut diffs),
    }
    diffs
}

fn diff_at(expected: &Value, actual: &Value, path: String, out: &mut Vec<FieldDiff>) {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => diff_objects(e, a, &path, &[], out),
        (Value::Array(e), Value::Array(a)) => {
            for i in 0..e.len().max(a.len()) {
                let path = format!("{path}[{i}]");
                match (e.get(i), a.get(i)) {
                    (Some(ev), Some(av)) => diff_at(ev, av, path, out),
                    (Some(ev), None) => out.push(FieldDiff {
                        path,
                        kind: DiffKind::Missing { expected: ev.clone() },
                    }),
                    (None, Some(av)) => out.push(FieldDiff {
                        path,
                        kind: DiffKind::Unexpected { actual: av.clone() },
                    }),
                    (None, None) => {}
                }
            }
        }
        _ if expected == actual => {}
        _ => out.push(FieldDiff {
            path,
            kind: DiffKind::Changed {
                expected: expected.clone(),
                actual: actual.clone(),
            },
        }),
    }
}

fn diff_objects(expected: &Map<String, Value>, actual: &Map<String, Value>, path: &str, ignored: &[String], out: &mut Vec<FieldDiff>) {
    let skip = |key: &String| ignored.contains(key);

    for (key, ev) in expected.iter().filter(|(k, _)| !skip(*k)) {
        let child = format!("{path}.{key}");
        match actual.get(key) {
            Some(av) => diff_at(ev, av, child, out),
            None => out.push(FieldDiff {
                path: child,
                kind: DiffKind::Missing { expected: ev.clone() },
            }),
        }
    }
    for (key, av) in actual.iter().filter(|(k, _)| !skip(*k) && !expected.contains_key(*k)) {
        out.push(FieldDiff {
            path: format!("{path}.{key}"),
            kind: DiffKind::Unexpected { actual: av.clone() },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_values_have_no_diffs() {
        let v = json!({"title": "Hi", "tags": ["a", "b"], "price": {"amount": 1.5}});
        assert!(diff_values(&v, &v.clone(), &[]).is_empty());
    }

    #[test]
    fn nested_changes_are_reported_by_path() {
        let expected = json!({"offers": [{"price": 10}, {"price": 20}], "name": "x"});
        let actual = json!({"offers": [{"price": 10}, {"price": 25}], "sku": "1"});
        let diffs = diff_values(&expected, &actual, &[]);
        assert_eq!(
            diffs,
            vec![
                FieldDiff {
                    path: "$.offers[1].price".into(),
                    kind: DiffKind::Changed {
                        expected: json!(20),
                        actual: json!(25)
                    },
                },
                FieldDiff {
                    path: "$.name".into(),
                    kind: DiffKind::Missing { expected: json!("x") },
                },
                FieldDiff {
                    path: "$.sku".into(),
                    kind: DiffKind::Unexpected { actual: json!("1") },
                },
            ]
        );
        assert_eq!(diffs[0].to_string(), "$.offers[1].price: expected 20, got 25");
    }

    #[test]
    fn array_length_differences() {
        let diffs = diff_values(&json!([1, 2]), &json!([1, 2, 3]), &[]);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "$[2]");
        assert!(matches!(diffs[0].kind, DiffKind::Unexpected { .. }));
    }

    #[test]
    fn ignored_fields_only_apply_at_top_level() {
        let ignored = vec!["scraped_at".to_string()];
        let expected = json!({"scraped_at": "yesterday", "meta": {"scraped_at": 1}});
        let actual = json!({"scraped_at": "today", "meta": {"scraped_at": 2}});
        let diffs = diff_values(&expected, &actual, &ignored);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "$.meta.scraped_at");
    }

    #[test]
    fn scalar_root_mismatch() {
        let diffs = diff_values(&json!("Hi"), &json!("Ho"), &[]);
        assert_eq!(diffs[0].path, "$");
    }
}

// Query filters (spec §4.F, "Filters"). A `Filter` is a small tree of field
// predicates composed with AND/OR; `matches` is a total function over a
// document's fields plus its path (for `__name__` filters).

use submerge_lang::{Path, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    IsNan,
    IsNull,
    IsNotNan,
    IsNotNull,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompositeOp {
    And,
    Or,
}

#[derive(Clone, Debug)]
pub enum Filter {
    Field {
        field_path: String,
        op: FieldOp,
        value: Value,
    },
    Unary {
        field_path: String,
        op: UnaryOp,
    },
    Composite {
        op: CompositeOp,
        filters: Vec<Filter>,
    },
}

impl Filter {
    /// Every distinct field path this filter (or its descendants) tests
    /// with an inequality operator -- used to enforce the "inequality
    /// addresses at most one field, and it must be the first order-by key"
    /// rule.
    pub fn inequality_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_inequality_fields(&mut out);
        out
    }

    fn collect_inequality_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Field { field_path, op, .. } => {
                if matches!(
                    op,
                    FieldOp::LessThan
                        | FieldOp::LessThanOrEqual
                        | FieldOp::GreaterThan
                        | FieldOp::GreaterThanOrEqual
                        | FieldOp::NotEqual
                        | FieldOp::NotIn
                ) && !out.contains(&field_path.as_str())
                {
                    out.push(field_path.as_str());
                }
            }
            Filter::Unary { .. } => {}
            Filter::Composite { filters, .. } => {
                for f in filters {
                    f.collect_inequality_fields(out);
                }
            }
        }
    }

    /// Detects the disallowed `IN` + `ARRAY_CONTAINS_ANY` combination
    /// anywhere in the filter tree (spec §4.F, "Predicate semantics").
    pub fn has_in_and_array_contains_any(&self) -> bool {
        let mut has_in = false;
        let mut has_any = false;
        self.scan_ops(&mut has_in, &mut has_any);
        has_in && has_any
    }

    fn scan_ops(&self, has_in: &mut bool, has_any: &mut bool) {
        match self {
            Filter::Field { op, .. } => match op {
                FieldOp::In => *has_in = true,
                FieldOp::ArrayContainsAny => *has_any = true,
                _ => {}
            },
            Filter::Unary { .. } => {}
            Filter::Composite { filters, .. } => {
                for f in filters {
                    f.scan_ops(has_in, has_any);
                }
            }
        }
    }

    pub fn matches(&self, path: &Path, field: impl Fn(&str) -> Option<Value> + Copy) -> bool {
        match self {
            Filter::Field { field_path, op, value } => {
                field_matches(path, field_path, *op, value, field)
            }
            Filter::Unary { field_path, op } => {
                let current = resolve(path, field_path, field);
                match op {
                    UnaryOp::IsNan => matches!(&current, Some(v) if v.is_nan()),
                    UnaryOp::IsNull => matches!(current, Some(Value::Null)),
                    UnaryOp::IsNotNan => matches!(&current, Some(v) if v.is_number() && !v.is_nan()),
                    UnaryOp::IsNotNull => matches!(&current, Some(v) if !matches!(v, Value::Null)),
                }
            }
            Filter::Composite { op, filters } => match op {
                CompositeOp::And => filters.iter().all(|f| f.matches(path, field)),
                CompositeOp::Or => filters.iter().any(|f| f.matches(path, field)),
            },
        }
    }
}

fn resolve(path: &Path, field_path: &str, field: impl Fn(&str) -> Option<Value>) -> Option<Value> {
    if field_path == "__name__" {
        Some(Value::String(path.to_string()))
    } else {
        field(field_path)
    }
}

fn field_matches(
    path: &Path,
    field_path: &str,
    op: FieldOp,
    rhs: &Value,
    field: impl Fn(&str) -> Option<Value>,
) -> bool {
    let current = resolve(path, field_path, field);
    match op {
        FieldOp::Equal => match &current {
            Some(v) => v == rhs,
            None => false,
        },
        FieldOp::NotEqual => match &current {
            Some(v) => v != rhs,
            None => false,
        },
        FieldOp::LessThan => ordered_compare(&current, rhs, |o| o.is_lt()),
        FieldOp::LessThanOrEqual => ordered_compare(&current, rhs, |o| o.is_le()),
        FieldOp::GreaterThan => ordered_compare(&current, rhs, |o| o.is_gt()),
        FieldOp::GreaterThanOrEqual => ordered_compare(&current, rhs, |o| o.is_ge()),
        FieldOp::ArrayContains => match &current {
            Some(Value::Array(items)) => items.contains(rhs),
            _ => false,
        },
        FieldOp::ArrayContainsAny => match (&current, rhs) {
            (Some(Value::Array(items)), Value::Array(candidates)) => {
                candidates.iter().any(|c| items.contains(c))
            }
            _ => false,
        },
        FieldOp::In => match (&current, rhs) {
            (Some(v), Value::Array(candidates)) => candidates.contains(v),
            _ => false,
        },
        FieldOp::NotIn => match (&current, rhs) {
            (Some(v), Value::Array(candidates)) => !v.is_nan() && !candidates.contains(v),
            _ => false,
        },
    }
}

/// Range/inequality comparisons exclude NaN on both sides (spec §4.F,
/// "NaN is excluded from range operators").
fn ordered_compare(current: &Option<Value>, rhs: &Value, accept: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    match current {
        Some(v) if !v.is_nan() && !rhs.is_nan() => accept(v.cmp(rhs)),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use submerge_lang::Fields;

    fn doc_field(fields: &Fields) -> impl Fn(&str) -> Option<Value> + Copy + '_ {
        move |name: &str| fields.get(name).cloned()
    }

    #[test]
    fn equal_matches_and_absent_field_does_not() {
        let mut fields = Fields::new();
        fields.insert("active".into(), Value::Bool(true));
        let f = Filter::Field {
            field_path: "active".into(),
            op: FieldOp::Equal,
            value: Value::Bool(true),
        };
        let path = Path::parse_document("u/1").unwrap();
        assert!(f.matches(&path, doc_field(&fields)));

        let missing = Filter::Field {
            field_path: "nope".into(),
            op: FieldOp::Equal,
            value: Value::Bool(true),
        };
        assert!(!missing.matches(&path, doc_field(&fields)));
    }

    #[test]
    fn is_nan_matches_only_nan() {
        let mut fields = Fields::new();
        fields.insert("score".into(), Value::double(f64::NAN));
        let f = Filter::Unary {
            field_path: "score".into(),
            op: UnaryOp::IsNan,
        };
        let path = Path::parse_document("u/1").unwrap();
        assert!(f.matches(&path, doc_field(&fields)));
    }

    #[test]
    fn inequality_fields_are_deduplicated() {
        let f = Filter::Composite {
            op: CompositeOp::And,
            filters: vec![
                Filter::Field {
                    field_path: "age".into(),
                    op: FieldOp::GreaterThan,
                    value: Value::Int64(10),
                },
                Filter::Field {
                    field_path: "age".into(),
                    op: FieldOp::LessThan,
                    value: Value::Int64(20),
                },
            ],
        };
        assert_eq!(f.inequality_fields(), vec!["age"]);
    }
}

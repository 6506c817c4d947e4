// Order-by and cursors (spec §4.F, "Order-by"/"Cursors"). The implicit
// trailing `__name__` key guarantees a total order, which cursors rely on.

use std::cmp::Ordering;

use submerge_lang::{Path, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug)]
pub struct OrderBy {
    pub field_path: String,
    pub direction: Direction,
}

/// Appends an implicit trailing `__name__` key if the caller's order-by
/// doesn't already end on one, matching the managed service's rule that
/// every query has a total order.
pub fn with_implicit_name_key(mut order_by: Vec<OrderBy>) -> Vec<OrderBy> {
    let has_name_key = order_by.iter().any(|o| o.field_path == "__name__");
    if !has_name_key {
        let direction = order_by.last().map(|o| o.direction).unwrap_or(Direction::Ascending);
        order_by.push(OrderBy {
            field_path: "__name__".into(),
            direction,
        });
    }
    order_by
}

/// The projection of a document onto an order-by's key sequence, used both
/// to sort results and to compare against cursor tuples.
pub fn sort_key(path: &Path, order_by: &[OrderBy], field: impl Fn(&str) -> Option<Value>) -> Vec<Value> {
    order_by
        .iter()
        .map(|o| {
            if o.field_path == "__name__" {
                Value::String(path.to_string())
            } else {
                field(&o.field_path).unwrap_or(Value::Null)
            }
        })
        .collect()
}

/// Compares two order-by projections key by key. `a`/`b`/`order_by` need not
/// all be the same length: a cursor's `values` are aligned with the
/// order-by the caller declared, which may be shorter than `order_by` once
/// the implicit trailing `__name__` key has been appended, so comparison
/// stops at the shortest of the three (the shorter tuple is treated as a
/// valid prefix of the longer one).
pub fn compare_keys(a: &[Value], b: &[Value], order_by: &[OrderBy]) -> Ordering {
    for ((av, bv), o) in a.iter().zip(b.iter()).zip(order_by.iter()) {
        let c = av.cmp(bv);
        let c = match o.direction {
            Direction::Ascending => c,
            Direction::Descending => c.reverse(),
        };
        if c != Ordering::Equal {
            return c;
        }
    }
    Ordering::Equal
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CursorKind {
    StartAt,
    StartAfter,
    EndAt,
    EndBefore,
}

#[derive(Clone, Debug)]
pub struct Cursor {
    pub kind: CursorKind,
    pub values: Vec<Value>,
}

impl Cursor {
    /// Whether a document at `key` (its projected order-by key) is on the
    /// accepted side of this cursor boundary (spec §4.F, "Apply cursors").
    pub fn accepts(&self, key: &[Value], order_by: &[OrderBy]) -> bool {
        let c = compare_keys(key, &self.values, order_by);
        match self.kind {
            CursorKind::StartAt => c != Ordering::Less,
            CursorKind::StartAfter => c == Ordering::Greater,
            CursorKind::EndAt => c != Ordering::Greater,
            CursorKind::EndBefore => c == Ordering::Less,
        }
    }
}

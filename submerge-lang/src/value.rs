// The dynamic value taxonomy design note (spec §9) re-expresses the
// source's runtime type tests as a tagged sum with explicit arms, and every
// operator below (ordering, equality, the codec) is a total function over
// it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use submerge_base::{fault, Code, FaultResult};

use crate::path::Path;

pub type Flo = OrderedFloat<f64>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    /// Always truncates nanoseconds to a multiple of 1000, per spec §4.B
    /// ("Timestamp truncation").
    pub fn new(seconds: i64, nanos: i32) -> Timestamp {
        Timestamp {
            seconds,
            nanos: truncate_nanos(nanos),
        }
    }

    pub fn from_micros_since_epoch(micros: i64) -> Timestamp {
        let seconds = micros.div_euclid(1_000_000);
        let micros_of_second = micros.rem_euclid(1_000_000);
        Timestamp::new(seconds, (micros_of_second * 1000) as i32)
    }

    pub fn to_micros_since_epoch(self) -> i64 {
        self.seconds * 1_000_000 + (self.nanos as i64) / 1000
    }
}

fn truncate_nanos(nanos: i32) -> i32 {
    nanos - nanos.rem_euclid(1000)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: Flo,
    pub lon: Flo,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint {
            lat: OrderedFloat(lat),
            lon: OrderedFloat(lon),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub database_id: String,
    pub path: Path,
}

/// A field-name -> Value map. Insertion order is irrelevant (spec §3); a
/// `BTreeMap` also gives `Map`'s "sorted-field comparison" ordering rule for
/// free.
pub type Fields = BTreeMap<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Double(Flo),
    Timestamp(Timestamp),
    String(String),
    Bytes(Vec<u8>),
    Reference(Reference),
    GeoPoint(GeoPoint),
    Array(Vec<Value>),
    Vector(Vec<Flo>),
    Map(Fields),
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Double(d) => d.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Reference(r) => r.hash(state),
            Value::GeoPoint(g) => g.hash(state),
            Value::Array(a) => a.hash(state),
            Value::Vector(v) => v.hash(state),
            Value::Map(m) => m.hash(state),
        }
    }
}

/// Rank used for the canonical cross-type ordering (spec §4.F, "Value
/// ordering"). Int64 and Double share a rank: they're compared together as
/// a single "Number" category.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int64(_) | Value::Double(_) => 2,
        Value::Timestamp(_) => 3,
        Value::String(_) => 4,
        Value::Bytes(_) => 5,
        Value::Reference(_) => 6,
        Value::GeoPoint(_) => 7,
        Value::Array(_) => 8,
        Value::Vector(_) => 9,
        Value::Map(_) => 10,
    }
}

fn is_nan(v: &Value) -> bool {
    matches!(v, Value::Double(d) if d.into_inner().is_nan())
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int64(i) => *i as f64,
        Value::Double(d) => d.into_inner(),
        _ => unreachable!("as_f64 called on a non-number Value"),
    }
}

fn cmp_number(a: &Value, b: &Value) -> Ordering {
    match (is_nan(a), is_nan(b)) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => match (a, b) {
            (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
            _ => as_f64(a).partial_cmp(&as_f64(b)).unwrap_or(Ordering::Equal),
        },
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let (ra, rb) = (type_rank(self), type_rank(other));
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int64(_) | Value::Double(_), Value::Int64(_) | Value::Double(_)) => {
                cmp_number(self, other)
            }
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Reference(a), Value::Reference(b)) => {
                (&a.database_id, &a.path).cmp(&(&b.database_id, &b.path))
            }
            (Value::GeoPoint(a), Value::GeoPoint(b)) => (a.lat, a.lon).cmp(&(b.lat, b.lon)),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Vector(a), Value::Vector(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            _ => unreachable!("type_rank partitions variants exhaustively"),
        }
    }
}

impl Value {
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int64(_) | Value::Double(_))
    }

    pub fn is_nan(&self) -> bool {
        is_nan(self)
    }

    pub fn as_number_f64(&self) -> Option<f64> {
        self.is_number().then(|| as_f64(self))
    }

    pub fn double(v: f64) -> Value {
        Value::Double(OrderedFloat(v))
    }

    pub fn vector(vs: impl IntoIterator<Item = f64>) -> Value {
        Value::Vector(vs.into_iter().map(OrderedFloat).collect())
    }

    pub fn timestamp(seconds: i64, nanos: i32) -> Value {
        Value::Timestamp(Timestamp::new(seconds, nanos))
    }

    /// Field names are reserved if they match `__.*__`, mirroring the
    /// managed service (spec §4.B, "Rejections").
    pub fn is_reserved_field_name(name: &str) -> bool {
        name.len() >= 4 && name.starts_with("__") && name.ends_with("__")
    }

    /// Maximum serialized document size, matching the managed service's
    /// documented 1 MiB limit (spec §4.B, "Rejections").
    pub const MAX_DOCUMENT_BYTES: usize = 1_048_576;

    /// Validates a document's field map against spec §4.B's rejection
    /// rules that are expressible on a `Value` (the server-timestamp
    /// sentinel-inside-array rule lives with the write pipeline instead,
    /// since `Value` has no sentinel variant of its own).
    pub fn validate_fields(fields: &Fields) -> FaultResult<()> {
        for name in fields.keys() {
            if name.is_empty() {
                return Err(fault(Code::InvalidArgument, "field name must not be empty"));
            }
            if Value::is_reserved_field_name(name) {
                return Err(fault(
                    Code::InvalidArgument,
                    format!("field name {name:?} is reserved"),
                ));
            }
        }
        for v in fields.values() {
            v.validate_nested()?;
        }
        let encoded = crate::codec::encode(&Value::Map(fields.clone()))?;
        if encoded.len() > Value::MAX_DOCUMENT_BYTES {
            return Err(fault(
                Code::InvalidArgument,
                "document exceeds the maximum allowed size",
            ));
        }
        Ok(())
    }

    fn validate_nested(&self) -> FaultResult<()> {
        match self {
            Value::Map(m) => {
                for (name, v) in m {
                    if Value::is_reserved_field_name(name) {
                        return Err(fault(
                            Code::InvalidArgument,
                            format!("field name {name:?} is reserved"),
                        ));
                    }
                    v.validate_nested()?;
                }
                Ok(())
            }
            Value::Array(a) => {
                for v in a {
                    v.validate_nested()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn v_i(i: i64) -> Value {
        Value::Int64(i)
    }
    fn v_f(f: f64) -> Value {
        Value::double(f)
    }

    #[test]
    fn canonical_ordering_across_types() {
        let mut vals = vec![
            Value::Map(Fields::new()),
            Value::Vector(vec![]),
            Value::Array(vec![]),
            Value::GeoPoint(GeoPoint::new(0.0, 0.0)),
            Value::Reference(Reference {
                database_id: "d".into(),
                path: Path::parse_document("a/b").unwrap(),
            }),
            Value::Bytes(vec![1]),
            Value::String("s".into()),
            Value::Timestamp(Timestamp::new(0, 0)),
            v_i(1),
            Value::Bool(true),
            Value::Null,
        ];
        vals.sort();
        let ranks: Vec<u8> = vals.iter().map(type_rank).collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn nan_sorts_below_all_other_numbers() {
        let nan = v_f(f64::NAN);
        let neg_inf = v_f(f64::NEG_INFINITY);
        let zero = v_i(0);
        assert_eq!(nan.cmp(&neg_inf), Ordering::Less);
        assert_eq!(nan.cmp(&zero), Ordering::Less);
        assert_eq!(nan.cmp(&nan), Ordering::Equal);
    }

    #[test]
    fn int_and_double_compare_numerically() {
        assert_eq!(v_i(2).cmp(&v_f(2.0)), Ordering::Equal);
        assert_eq!(v_i(1).cmp(&v_f(2.5)), Ordering::Less);
    }

    #[test]
    fn reserved_field_names_are_rejected() {
        let mut fields = Fields::new();
        fields.insert("__id__".into(), Value::Null);
        assert!(Value::validate_fields(&fields).is_err());
    }
}

// The value codec (spec §4.B): round-trips `Value` through a MessagePack
// wire representation, continuing `submerge-net`'s existing use of
// `rmp_serde` for `Msg` rather than introducing a second serialization
// stack.

use submerge_base::{internal, FaultResult};

use crate::value::{Fields, Timestamp, Value};

pub fn encode(value: &Value) -> FaultResult<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(internal)
}

pub fn decode(bytes: &[u8]) -> FaultResult<Value> {
    let mut value: Value = rmp_serde::from_slice(bytes).map_err(internal)?;
    normalize(&mut value);
    Ok(value)
}

/// Re-applies timestamp truncation after decode, so reads always expose
/// microsecond-aligned values even if the bytes came from somewhere that
/// skipped `Timestamp::new`'s normalization (spec §4.B).
fn normalize(value: &mut Value) {
    match value {
        Value::Timestamp(ts) => *ts = Timestamp::new(ts.seconds, ts.nanos),
        Value::Array(items) => items.iter_mut().for_each(normalize),
        Value::Map(fields) => fields.values_mut().for_each(normalize),
        _ => {}
    }
}

pub fn encode_fields(fields: &Fields) -> FaultResult<Vec<u8>> {
    encode(&Value::Map(fields.clone()))
}

pub fn decode_fields(bytes: &[u8]) -> FaultResult<Fields> {
    match decode(bytes)? {
        Value::Map(fields) => Ok(fields),
        _ => Err(submerge_base::fault(
            submerge_base::Code::Internal,
            "decoded document bytes were not a map",
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;

    #[test]
    fn round_trips_scalars() {
        for v in [
            Value::Null,
            Value::Bool(true),
            Value::Int64(-5),
            Value::double(1.5),
            Value::String("hi".into()),
            Value::Bytes(vec![1, 2, 3]),
        ] {
            let bytes = encode(&v).unwrap();
            assert_eq!(decode(&bytes).unwrap(), v);
        }
    }

    #[test]
    fn timestamp_truncates_nanoseconds_on_round_trip() {
        let v = Value::timestamp(1_600_000_000, 123_456_789);
        let bytes = encode(&v).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back, Value::timestamp(1_600_000_000, 123_456_000));
    }

    #[test]
    fn nan_double_round_trips_and_self_equals() {
        let v = Value::double(f64::NAN);
        let bytes = encode(&v).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back, v);
    }
}

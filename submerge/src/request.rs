// Strict vs compatibility request parsing (spec §9, Open Question (c)).
// Outside this crate, an HTTP/callable-function harness is responsible for
// turning wire bytes into the engine's native Rust calls (spec §1,
// "Deliberately out of scope"); this module is the one seam where that
// harness's decoding choice is actually enforced, by validating the
// top-level field set of a decoded map before the harness proceeds to
// build a native request out of it.

use submerge_base::{fault, Code, FaultResult};
use submerge_lang::{decode_fields, Fields};

/// Decodes a wire request body into its top-level field map. In strict
/// mode, any field not in `known_fields` is rejected with
/// `InvalidArgument`, mirroring `#[serde(deny_unknown_fields)]`; in
/// compatibility mode (the default), unknown fields are tolerated and
/// simply dropped by the caller's subsequent field-by-field extraction.
pub fn decode_request(bytes: &[u8], known_fields: &[&str], strict: bool) -> FaultResult<Fields> {
    let fields = decode_fields(bytes)?;
    if strict {
        for name in fields.keys() {
            if !known_fields.contains(&name.as_str()) {
                return Err(fault(
                    Code::InvalidArgument,
                    format!("unknown field {name:?} in request"),
                ));
            }
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod test {
    use super::*;
    use submerge_lang::{encode_fields, Value};

    fn sample_request() -> Fields {
        let mut fields = Fields::new();
        fields.insert("transaction".into(), Value::Bytes(vec![1, 2, 3]));
        fields.insert("extra".into(), Value::Bool(true));
        fields
    }

    #[test]
    fn compatibility_mode_tolerates_unknown_fields() {
        let bytes = encode_fields(&sample_request()).unwrap();
        let decoded = decode_request(&bytes, &["transaction"], false).unwrap();
        assert!(decoded.contains_key("extra"));
    }

    #[test]
    fn strict_mode_rejects_unknown_fields() {
        let bytes = encode_fields(&sample_request()).unwrap();
        let err = decode_request(&bytes, &["transaction"], true).unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }
}

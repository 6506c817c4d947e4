// Dotted field-path lookup, shared by filters, order-by, and aggregation.

use submerge_lang::{Fields, Value};

pub fn get(fields: &Fields, dotted: &str) -> Option<Value> {
    let mut segments = dotted.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?;
    for seg in segments {
        match current {
            Value::Map(m) => current = m.get(seg)?,
            _ => return None,
        }
    }
    Some(current.clone())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolves_nested_map_paths() {
        let mut inner = Fields::new();
        inner.insert("age".into(), Value::Int64(30));
        let mut fields = Fields::new();
        fields.insert("details".into(), Value::Map(inner));
        assert_eq!(get(&fields, "details.age"), Some(Value::Int64(30)));
        assert_eq!(get(&fields, "details.missing"), None);
    }
}

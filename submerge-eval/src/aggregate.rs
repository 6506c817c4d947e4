// Aggregation evaluator (spec §4.G): reduces a base query's result set.

use std::collections::BTreeMap;

use submerge_base::FaultResult;
use submerge_lang::Value;
use submerge_rowdb::Store;

use crate::dotted;
use crate::query::Query;

#[derive(Clone, Debug)]
pub enum Aggregator {
    Count,
    Sum(String),
    Average(String),
}

pub type Aggregation = BTreeMap<String, Aggregator>;

/// Runs the base query's full pipeline, then reduces. Non-numeric
/// contributions to `sum`/`average` are ignored, not errors (spec §4.G).
pub fn run(store: &Store, query: &Query, aggregation: &Aggregation) -> FaultResult<BTreeMap<String, Value>> {
    let docs = query.execute(store)?;
    let mut out = BTreeMap::new();
    for (alias, aggregator) in aggregation {
        let value = match aggregator {
            Aggregator::Count => Value::Int64(docs.len() as i64),
            Aggregator::Sum(field) => sum(&docs, field),
            Aggregator::Average(field) => average(&docs, field),
        };
        out.insert(alias.clone(), value);
    }
    Ok(out)
}

fn numeric_contributions<'a>(docs: &'a [submerge_rowdb::Document], field: &'a str) -> Vec<f64> {
    docs.iter()
        .filter_map(|d| dotted::get(&d.fields, field))
        .filter_map(|v| v.as_number_f64())
        .collect()
}

fn sum(docs: &[submerge_rowdb::Document], field: &str) -> Value {
    let all_int = docs.iter().all(|d| match dotted::get(&d.fields, field) {
        Some(Value::Int64(_)) | None => true,
        _ => false,
    });
    let values = numeric_contributions(docs, field);
    if values.is_empty() {
        return Value::Int64(0);
    }
    if all_int {
        let total: i64 = docs
            .iter()
            .filter_map(|d| match dotted::get(&d.fields, field) {
                Some(Value::Int64(i)) => Some(i),
                _ => None,
            })
            .sum();
        Value::Int64(total)
    } else {
        Value::double(values.iter().sum())
    }
}

fn average(docs: &[submerge_rowdb::Document], field: &str) -> Value {
    let values = numeric_contributions(docs, field);
    if values.is_empty() {
        return Value::Null;
    }
    Value::double(values.iter().sum::<f64>() / values.len() as f64)
}

// The query evaluator (spec §4.F): turns a structured query into a
// materialized, ordered document set against the store.

use submerge_base::{fault, Code, FaultResult};
use submerge_lang::{Path, Value};
use submerge_rowdb::{Document, Store};

use crate::filter::{Filter, FieldOp};
use crate::order::{compare_keys, sort_key, with_implicit_name_key, Cursor, OrderBy};
use crate::vector::{as_f64_vector, distance, FindNearest};

#[derive(Clone, Debug)]
pub enum Target {
    Collection {
        parent: Option<Path>,
        collection_id: String,
    },
    CollectionGroup {
        collection_id: String,
    },
}

#[derive(Clone, Debug)]
pub struct Query {
    pub target: Target,
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub start_cursor: Option<Cursor>,
    pub end_cursor: Option<Cursor>,
    pub offset: u32,
    pub limit: Option<u32>,
    pub find_nearest: Option<FindNearest>,
}

impl Query {
    pub fn validate(&self) -> FaultResult<()> {
        if let Some(filter) = &self.filter {
            let inequality_fields = filter.inequality_fields();
            if inequality_fields.len() > 1 {
                return Err(fault(
                    Code::InvalidArgument,
                    "inequality filters may address at most one field",
                ));
            }
            if let Some(field) = inequality_fields.first() {
                let first_key = self.order_by.first().map(|o| o.field_path.as_str());
                if first_key != Some(*field) {
                    return Err(fault(
                        Code::InvalidArgument,
                        "inequality field must be the first order-by key",
                    ));
                }
            }
            if filter.has_in_and_array_contains_any() {
                return Err(fault(
                    Code::InvalidArgument,
                    "IN and ARRAY_CONTAINS_ANY cannot be used in the same query",
                ));
            }
        }
        if let Some(fnq) = &self.find_nearest {
            fnq.validate()?;
        }
        Ok(())
    }

    pub fn execute(&self, store: &Store) -> FaultResult<Vec<Document>> {
        self.validate()?;

        let candidates = self.gather(store)?;

        if let Some(fnq) = &self.find_nearest {
            return Ok(nearest(fnq, candidates));
        }

        let mut matched: Vec<Document> = match &self.filter {
            Some(f) => candidates
                .into_iter()
                .filter(|d| f.matches(&d.path, |name| field_value(d, name)))
                .collect(),
            None => candidates,
        };

        let order_by = with_implicit_name_key(self.order_by.clone());
        matched.sort_by(|a, b| {
            let ka = sort_key(&a.path, &order_by, |n| field_value(a, n));
            let kb = sort_key(&b.path, &order_by, |n| field_value(b, n));
            compare_keys(&ka, &kb, &order_by)
        });

        if let Some(cursor) = &self.start_cursor {
            matched.retain(|d| cursor.accepts(&sort_key(&d.path, &order_by, |n| field_value(d, n)), &order_by));
        }
        if let Some(cursor) = &self.end_cursor {
            matched.retain(|d| cursor.accepts(&sort_key(&d.path, &order_by, |n| field_value(d, n)), &order_by));
        }

        let skipped: Vec<Document> = matched.into_iter().skip(self.offset as usize).collect();
        let limited = match self.limit {
            Some(n) => skipped.into_iter().take(n as usize).collect(),
            None => skipped,
        };
        Ok(limited)
    }

    fn gather(&self, store: &Store) -> FaultResult<Vec<Document>> {
        match &self.target {
            Target::Collection { parent, collection_id } => {
                store.list_documents(parent.as_ref(), collection_id, false)
            }
            Target::CollectionGroup { collection_id } => store.list_collection_group(collection_id),
        }
    }
}

fn field_value(doc: &Document, name: &str) -> Option<Value> {
    crate::dotted::get(&doc.fields, name)
}

fn nearest(fnq: &FindNearest, candidates: Vec<Document>) -> Vec<Document> {
    let dim = fnq.query_vector.len();
    let mut scored: Vec<(f64, Document)> = candidates
        .into_iter()
        .filter_map(|d| {
            let v = field_value(&d, &fnq.vector_field)?;
            let vec = as_f64_vector(&v, dim)?;
            Some((distance(fnq.distance_measure, &fnq.query_vector, &vec), d))
        })
        .collect();
    scored.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.path.cmp(&b.1.path))
    });
    scored.into_iter().take(fnq.limit as usize).map(|(_, d)| d).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use submerge_lang::Fields;
    use crate::order::Direction;

    fn seed(store: &Store) {
        for (id, active, points) in [("u1", true, 10i64), ("u2", true, 30), ("u3", false, 25)] {
            let mut fields = Fields::new();
            fields.insert("active".into(), Value::Bool(active));
            fields.insert("points".into(), Value::Int64(points));
            store
                .set_document(
                    &Path::parse_document(&format!("users/{id}")).unwrap(),
                    fields,
                    submerge_lang::Timestamp::from_micros_since_epoch(100),
                )
                .unwrap();
        }
    }

    #[test]
    fn filter_and_order_by_points() {
        let store = Store::new().unwrap();
        seed(&store);
        let query = Query {
            target: Target::Collection {
                parent: None,
                collection_id: "users".into(),
            },
            filter: Some(Filter::Field {
                field_path: "active".into(),
                op: FieldOp::Equal,
                value: Value::Bool(true),
            }),
            order_by: vec![OrderBy {
                field_path: "points".into(),
                direction: Direction::Ascending,
            }],
            start_cursor: None,
            end_cursor: None,
            offset: 0,
            limit: None,
            find_nearest: None,
        };
        let results = query.execute(&store).unwrap();
        let ids: Vec<_> = results.iter().map(|d| d.path.last_id().unwrap().to_string()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
    }

    #[test]
    fn inequality_must_be_first_order_by_key() {
        let store = Store::new().unwrap();
        seed(&store);
        let query = Query {
            target: Target::Collection {
                parent: None,
                collection_id: "users".into(),
            },
            filter: Some(Filter::Field {
                field_path: "points".into(),
                op: FieldOp::GreaterThan,
                value: Value::Int64(5),
            }),
            order_by: vec![OrderBy {
                field_path: "active".into(),
                direction: Direction::Ascending,
            }],
            start_cursor: None,
            end_cursor: None,
            offset: 0,
            limit: None,
            find_nearest: None,
        };
        let err = query.execute(&store).unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[test]
    fn limit_bounds_result_count() {
        let store = Store::new().unwrap();
        seed(&store);
        let query = Query {
            target: Target::Collection {
                parent: None,
                collection_id: "users".into(),
            },
            filter: None,
            order_by: vec![],
            start_cursor: None,
            end_cursor: None,
            offset: 0,
            limit: Some(1),
            find_nearest: None,
        };
        assert_eq!(query.execute(&store).unwrap().len(), 1);
    }
}

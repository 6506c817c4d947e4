// End-to-end scenarios against the `Engine` facade, covering the six
// concrete worked examples plus a few cross-cutting properties not already
// exercised at the unit level inside the individual component crates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use submerge::{
    BatchWriteResult, Code, Config, Engine, Fields, FieldTransform, Path, Precondition, ServerValue, Timestamp,
    TransformKind, TriggerKind, TxnKind, Value, Write, WriteOperation,
};
use submerge_base::FakeClock;
use submerge_eval::{Aggregator, Query, Target};
use submerge_net::ListenTargetSpec;

fn engine() -> Engine {
    Engine::with_clock_and_ids(
        Config::default(),
        Arc::new(FakeClock::new(1_600_000_000_000_000)),
        Arc::new(submerge_base::SequentialIdGen::new()),
        false,
    )
}

fn update(path: &str, fields: Fields) -> Write {
    Write {
        path: Path::parse_document(path).unwrap(),
        operation: WriteOperation::Update(fields),
        update_mask: None,
        transforms: vec![],
        precondition: None,
    }
}

#[test]
fn scenario_aggregation_with_filter() {
    let e = engine();
    let seed = [("u1", true, 10i64, 20i64), ("u2", true, 30, 40), ("u3", false, 25, 30)];
    for (id, active, points, age) in seed {
        let mut fields = Fields::new();
        fields.insert("active".into(), Value::Bool(active));
        fields.insert("points".into(), Value::Int64(points));
        let mut details = Fields::new();
        details.insert("age".into(), Value::Int64(age));
        fields.insert("details".into(), Value::Map(details));
        e.commit(None, vec![update(&format!("users/{id}"), fields)]).unwrap();
    }

    let query = Query {
        target: Target::Collection {
            parent: None,
            collection_id: "users".into(),
        },
        filter: Some(submerge_eval::Filter::Field {
            field_path: "active".into(),
            op: submerge_eval::FieldOp::Equal,
            value: Value::Bool(true),
        }),
        order_by: vec![],
        start_cursor: None,
        end_cursor: None,
        offset: 0,
        limit: None,
        find_nearest: None,
    };
    let mut aggregation = submerge_eval::Aggregation::new();
    aggregation.insert("count".into(), Aggregator::Count);
    aggregation.insert("sum".into(), Aggregator::Sum("points".into()));
    aggregation.insert("avg".into(), Aggregator::Average("details.age".into()));

    let result = e.run_aggregation_query(&query, &aggregation).unwrap();
    assert_eq!(result["count"], Value::Int64(2));
    assert_eq!(result["sum"], Value::Int64(40));
    assert_eq!(result["avg"], Value::double(30.0));
}

#[test]
fn scenario_collection_group_with_duplicate_ids() {
    let e = engine();
    let seed = [
        ("root/p1/orders/o1", 1i64),
        ("root/p1/orders/dupe", 2),
        ("root/p1/nested/b/orders/deep1", 3),
        ("root/p2/orders/o2", 4),
        ("root/p2/orders/dupe", 5),
    ];
    for (path, seq) in seed {
        let mut fields = Fields::new();
        fields.insert("seq".into(), Value::Int64(seq));
        e.commit(None, vec![update(path, fields)]).unwrap();
    }

    let query = Query {
        target: Target::CollectionGroup {
            collection_id: "orders".into(),
        },
        filter: None,
        order_by: vec![submerge_eval::OrderBy {
            field_path: "seq".into(),
            direction: submerge_eval::Direction::Ascending,
        }],
        start_cursor: None,
        end_cursor: None,
        offset: 0,
        limit: None,
        find_nearest: None,
    };
    let docs = e.run_query(&query).unwrap();
    let ids: Vec<_> = docs.iter().map(|d| d.path.last_id().unwrap().to_string()).collect();
    assert_eq!(ids, vec!["o1", "dupe", "deep1", "o2", "dupe"]);
}

#[test]
fn scenario_timestamp_truncation() {
    let e = engine();
    let mut fields = Fields::new();
    fields.insert("ts".into(), Value::Timestamp(Timestamp::new(1_600_000_000, 123_456_789)));
    e.commit(None, vec![update("docs/d1", fields)]).unwrap();

    let doc = e.batch_get_documents(&[Path::parse_document("docs/d1").unwrap()]).unwrap().remove(0);
    assert_eq!(doc.fields["ts"], Value::Timestamp(Timestamp::new(1_600_000_000, 123_456_000)));
}

#[test]
fn scenario_server_timestamp_transform() {
    let e = engine();
    let write = Write {
        path: Path::parse_document("users/u1").unwrap(),
        operation: WriteOperation::Update(Fields::new()),
        update_mask: None,
        transforms: vec![FieldTransform {
            field_path: "lastLogin".into(),
            kind: TransformKind::SetToServerValue(ServerValue::RequestTime),
        }],
        precondition: None,
    };
    let (commit_time, results) = e.commit(None, vec![write]).unwrap();
    assert_eq!(results[0].transform_results[0], Value::Timestamp(commit_time));

    let doc = e.batch_get_documents(&[Path::parse_document("users/u1").unwrap()]).unwrap().remove(0);
    assert_eq!(doc.fields["lastLogin"], Value::Timestamp(commit_time));
}

#[test]
fn scenario_nearest_neighbor_limit_bounds() {
    let e = engine();
    let vectors = [("a", [1.0, 0.0, 0.0]), ("b", [0.0, 1.0, 0.0]), ("c", [0.0, 0.0, 1.0])];
    for (id, v) in vectors {
        let mut fields = Fields::new();
        fields.insert("v".into(), Value::vector(v));
        e.commit(None, vec![update(&format!("points/{id}"), fields)]).unwrap();
    }

    let base_query = Query {
        target: Target::Collection {
            parent: None,
            collection_id: "points".into(),
        },
        filter: None,
        order_by: vec![],
        start_cursor: None,
        end_cursor: None,
        offset: 0,
        limit: None,
        find_nearest: None,
    };

    let mut two = base_query.clone();
    two.find_nearest = Some(submerge_eval::FindNearest {
        vector_field: "v".into(),
        query_vector: vec![1.0, 0.0, 0.0],
        limit: 2,
        distance_measure: submerge_eval::DistanceMeasure::Euclidean,
    });
    let docs = e.run_query(&two).unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].path.last_id().unwrap(), "a");

    let mut zero = base_query.clone();
    zero.find_nearest = Some(submerge_eval::FindNearest {
        vector_field: "v".into(),
        query_vector: vec![1.0, 0.0, 0.0],
        limit: 0,
        distance_measure: submerge_eval::DistanceMeasure::Euclidean,
    });
    assert_eq!(e.run_query(&zero).unwrap_err().code, Code::InvalidArgument);

    let mut too_many = base_query;
    too_many.find_nearest = Some(submerge_eval::FindNearest {
        vector_field: "v".into(),
        query_vector: vec![1.0, 0.0, 0.0],
        limit: 1001,
        distance_measure: submerge_eval::DistanceMeasure::Euclidean,
    });
    assert_eq!(e.run_query(&too_many).unwrap_err().code, Code::InvalidArgument);
}

#[test]
fn scenario_trigger_on_create() {
    let e = engine();
    let fire_count = Arc::new(AtomicUsize::new(0));
    let captured_uid = Arc::new(std::sync::Mutex::new(String::new()));
    let count2 = fire_count.clone();
    let captured2 = captured_uid.clone();
    e.triggers.subscribe("users/{uid}", TriggerKind::Create, move |event| {
        count2.fetch_add(1, Ordering::SeqCst);
        *captured2.lock().unwrap() = event.params[0].1.clone();
        assert!(!event.before.exists);
        assert_eq!(event.after.fields["name"], Value::String("Alice".into()));
        Ok(())
    });

    let mut fields = Fields::new();
    fields.insert("name".into(), Value::String("Alice".into()));
    e.commit(None, vec![update("users/alice", fields)]).unwrap();

    assert_eq!(fire_count.load(Ordering::SeqCst), 1);
    assert_eq!(*captured_uid.lock().unwrap(), "alice");
}

#[test]
fn concurrent_commits_have_strictly_monotonic_times() {
    let e = engine();
    let mut last = None;
    for i in 0..5 {
        let mut fields = Fields::new();
        fields.insert("i".into(), Value::Int64(i));
        let (t, _) = e.commit(None, vec![update(&format!("docs/{i}"), fields)]).unwrap();
        if let Some(prev) = last {
            assert!(t > prev);
        }
        last = Some(t);
    }
}

#[test]
fn transaction_sees_its_own_writes_and_commits_atomically() {
    let e = engine();
    let token = e.begin_transaction(TxnKind::ReadWrite).unwrap();
    let path = Path::parse_document("users/u1").unwrap();
    assert!(e.transactional_read(&token, &path).unwrap().is_none());

    let mut fields = Fields::new();
    fields.insert("name".into(), Value::String("Bob".into()));
    let (_, results) = e.commit(Some(&token), vec![update("users/u1", fields)]).unwrap();
    assert_eq!(results.len(), 1);

    let doc = e.batch_get_documents(&[path]).unwrap().remove(0);
    assert!(doc.exists);
}

#[test]
fn read_only_transaction_rejects_a_write_at_commit() {
    let e = engine();
    let token = e.begin_transaction(TxnKind::ReadOnly).unwrap();
    let mut fields = Fields::new();
    fields.insert("x".into(), Value::Int64(1));
    let err = e.commit(Some(&token), vec![update("docs/d1", fields)]).unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
}

#[test]
fn second_rollback_of_a_transaction_is_aborted() {
    let e = engine();
    let token = e.begin_transaction(TxnKind::ReadWrite).unwrap();
    e.rollback(&token).unwrap();
    let err = e.rollback(&token).unwrap_err();
    assert_eq!(err.code, Code::Aborted);
}

#[test]
fn commit_with_unknown_transaction_token_is_invalid_argument() {
    let e = engine();
    let err = e.commit(Some(b"not-a-real-token"), vec![]).unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
}

#[test]
fn listen_target_observes_committed_changes_in_order() {
    let e = engine();
    let path = Path::parse_document("users/alice").unwrap();
    let target = e.add_listen_target(ListenTargetSpec::Document(path.clone())).unwrap();

    let mut fields = Fields::new();
    fields.insert("name".into(), Value::String("Alice".into()));
    e.commit(None, vec![update("users/alice", fields)]).unwrap();

    assert!(matches!(
        e.poll_listen_target(target).unwrap(),
        Some(submerge_net::TargetEvent::Change(submerge_net::DocumentChange::Added(_)))
    ));
    assert!(matches!(e.poll_listen_target(target).unwrap(), Some(submerge_net::TargetEvent::Current)));
    assert!(matches!(
        e.poll_listen_target(target).unwrap(),
        Some(submerge_net::TargetEvent::Checkpoint { .. })
    ));

    e.detach_listen_target(target).unwrap();
    let mut more_fields = Fields::new();
    more_fields.insert("name".into(), Value::String("Alicia".into()));
    e.commit(None, vec![update("users/alice", more_fields)]).unwrap();
    assert!(e.poll_listen_target(target).unwrap().is_none());
}

#[test]
fn start_after_cursor_resumes_a_paginated_query() {
    let e = engine();
    for (id, points) in [("u1", 10i64), ("u2", 20), ("u3", 30), ("u4", 40)] {
        let mut fields = Fields::new();
        fields.insert("points".into(), Value::Int64(points));
        e.commit(None, vec![update(&format!("users/{id}"), fields)]).unwrap();
    }

    let order_by = vec![submerge_eval::OrderBy {
        field_path: "points".into(),
        direction: submerge_eval::Direction::Ascending,
    }];
    let query = Query {
        target: Target::Collection {
            parent: None,
            collection_id: "users".into(),
        },
        filter: None,
        order_by: order_by.clone(),
        start_cursor: None,
        end_cursor: None,
        offset: 0,
        limit: Some(2),
        find_nearest: None,
    };
    let first_page = e.run_query(&query).unwrap();
    let first_ids: Vec<_> = first_page.iter().map(|d| d.path.last_id().unwrap().to_string()).collect();
    assert_eq!(first_ids, vec!["u1", "u2"]);

    let mut next_page = query.clone();
    next_page.start_cursor = Some(submerge_eval::Cursor {
        kind: submerge_eval::CursorKind::StartAfter,
        values: vec![Value::Int64(20)],
    });
    let second_page = e.run_query(&next_page).unwrap();
    let second_ids: Vec<_> = second_page.iter().map(|d| d.path.last_id().unwrap().to_string()).collect();
    assert_eq!(second_ids, vec!["u3", "u4"]);
}

#[test]
fn batch_write_failures_do_not_affect_sibling_writes() {
    let e = engine();
    let ok = update("a/1", Fields::new());
    let conflicting = Write {
        path: Path::parse_document("a/2").unwrap(),
        operation: WriteOperation::Update(Fields::new()),
        update_mask: None,
        transforms: vec![],
        precondition: Some(Precondition {
            exists: Some(true),
            update_time: None,
        }),
    };
    let results: Vec<BatchWriteResult> = e.batch_write(vec![ok, conflicting]).unwrap();
    assert!(results[0].result.is_ok());
    assert!(results[1].result.is_err());
    assert_eq!(results[0].result.as_ref().unwrap().transform_results.len(), 0);

    let doc = e.batch_get_documents(&[Path::parse_document("a/1").unwrap()]).unwrap().remove(0);
    assert!(doc.exists);
    let missing = e.batch_get_documents(&[Path::parse_document("a/2").unwrap()]).unwrap().remove(0);
    assert!(!missing.exists);
}

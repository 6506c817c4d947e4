// The write pipeline (spec §4.D): applies a batch of writes atomically at
// a single commit time, with field transforms running after the base
// update and update masks scoping merges to specific field paths.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use submerge_base::{fault, Code, Clock, FaultResult};
use submerge_lang::{Fields, Path, Timestamp, Value};
use submerge_rowdb::{Document, Store};

#[derive(Clone, Debug)]
pub enum WriteOperation {
    Update(Fields),
    Delete,
}

#[derive(Clone, Debug, Default)]
pub struct Precondition {
    pub exists: Option<bool>,
    pub update_time: Option<Timestamp>,
}

#[derive(Clone, Debug)]
pub enum ServerValue {
    RequestTime,
}

#[derive(Clone, Debug)]
pub enum TransformKind {
    SetToServerValue(ServerValue),
    Increment(Value),
    Maximum(Value),
    Minimum(Value),
    ArrayUnion(Vec<Value>),
    ArrayRemove(Vec<Value>),
}

#[derive(Clone, Debug)]
pub struct FieldTransform {
    pub field_path: String,
    pub kind: TransformKind,
}

#[derive(Clone, Debug)]
pub struct Write {
    pub path: Path,
    pub operation: WriteOperation,
    /// Dotted field paths; `Some` scopes an `Update` to a merge, `None`
    /// means full replacement. Only meaningful for `Update`.
    pub update_mask: Option<Vec<String>>,
    pub transforms: Vec<FieldTransform>,
    pub precondition: Option<Precondition>,
}

impl Write {
    pub fn validate(&self) -> FaultResult<()> {
        if matches!(self.operation, WriteOperation::Delete) && !self.transforms.is_empty() {
            return Err(fault(
                Code::InvalidArgument,
                "a delete cannot carry field transforms",
            ));
        }
        if let WriteOperation::Update(fields) = &self.operation {
            Value::validate_fields(fields)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct WriteResult {
    pub update_time: Timestamp,
    pub transform_results: Vec<Value>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    NoOp,
}

#[derive(Clone, Debug)]
pub struct ChangeRecord {
    pub path: Path,
    pub kind: ChangeKind,
    pub before: Document,
    pub after: Document,
    pub commit_time: Timestamp,
}

#[derive(Clone, Debug)]
pub struct CommitBatch {
    pub commit_time: Timestamp,
    pub records: Vec<ChangeRecord>,
}

/// Produces microsecond-monotonic commit times: `max(clock.now(), last + 1)`
/// (spec §4.D, "Commit time"). Shared by the write pipeline and the
/// transaction manager so every commit in the engine, transactional or not,
/// draws from the same sequence.
pub struct CommitClock {
    clock: Arc<dyn Clock>,
    last_micros: AtomicI64,
}

impl CommitClock {
    pub fn new(clock: Arc<dyn Clock>) -> CommitClock {
        CommitClock {
            clock,
            last_micros: AtomicI64::new(i64::MIN),
        }
    }

    pub fn next(&self) -> Timestamp {
        loop {
            let last = self.last_micros.load(Ordering::SeqCst);
            let candidate = std::cmp::max(self.clock.now_micros(), last.saturating_add(1));
            if self
                .last_micros
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Timestamp::from_micros_since_epoch(candidate);
            }
        }
    }
}

fn check_precondition(path: &Path, existing: &Option<Document>, pre: &Precondition) -> FaultResult<()> {
    if let Some(want_exists) = pre.exists {
        let has = existing.as_ref().map(|d| d.exists).unwrap_or(false);
        if has != want_exists {
            return Err(fault(
                Code::FailedPrecondition,
                format!("precondition failed for {path}: exists={want_exists}"),
            ));
        }
    }
    if let Some(want_time) = pre.update_time {
        match existing {
            Some(d) if d.update_time == want_time => {}
            _ => {
                return Err(fault(
                    Code::FailedPrecondition,
                    format!("precondition failed for {path}: updateTime mismatch"),
                ))
            }
        }
    }
    Ok(())
}

/// Applies one write's base update/delete (not transforms) and returns the
/// resulting fields (or `None` for a delete), plus whether this is a no-op.
fn apply_base(existing: &Option<Document>, write: &Write) -> (Option<Fields>, ChangeKind) {
    match &write.operation {
        WriteOperation::Delete => {
            if existing.as_ref().map(|d| d.exists).unwrap_or(false) {
                (None, ChangeKind::Delete)
            } else {
                (None, ChangeKind::NoOp)
            }
        }
        WriteOperation::Update(fields) => {
            let had_doc = existing.as_ref().map(|d| d.exists).unwrap_or(false);
            let merged = match &write.update_mask {
                None => fields.clone(),
                Some(mask) => {
                    let mut base = existing
                        .as_ref()
                        .map(|d| d.fields.clone())
                        .unwrap_or_default();
                    for path in mask {
                        match get_dotted(fields, path) {
                            Some(v) => set_dotted(&mut base, path, v.clone()),
                            None => delete_dotted(&mut base, path),
                        }
                    }
                    base
                }
            };
            let kind = if had_doc { ChangeKind::Update } else { ChangeKind::Create };
            (Some(merged), kind)
        }
    }
}

fn apply_transforms(
    fields: &mut Fields,
    transforms: &[FieldTransform],
    commit_time: Timestamp,
) -> FaultResult<Vec<Value>> {
    let mut results = Vec::with_capacity(transforms.len());
    for t in transforms {
        let resolved = match &t.kind {
            TransformKind::SetToServerValue(ServerValue::RequestTime) => {
                Value::Timestamp(commit_time)
            }
            TransformKind::Increment(delta) => {
                let current = get_dotted(fields, &t.field_path).cloned().unwrap_or(Value::Int64(0));
                numeric_add(&current, delta)?
            }
            TransformKind::Maximum(bound) => {
                let current = get_dotted(fields, &t.field_path).cloned();
                numeric_extreme(current, bound.clone(), true)?
            }
            TransformKind::Minimum(bound) => {
                let current = get_dotted(fields, &t.field_path).cloned();
                numeric_extreme(current, bound.clone(), false)?
            }
            TransformKind::ArrayUnion(values) => {
                let mut current = match get_dotted(fields, &t.field_path) {
                    Some(Value::Array(a)) => a.clone(),
                    _ => Vec::new(),
                };
                for v in values {
                    if !current.contains(v) {
                        current.push(v.clone());
                    }
                }
                Value::Array(current)
            }
            TransformKind::ArrayRemove(values) => {
                let current = match get_dotted(fields, &t.field_path) {
                    Some(Value::Array(a)) => a.clone(),
                    _ => Vec::new(),
                };
                Value::Array(current.into_iter().filter(|v| !values.contains(v)).collect())
            }
        };
        set_dotted_checked(fields, &t.field_path, resolved.clone())?;
        results.push(resolved);
    }
    Ok(results)
}

fn numeric_add(current: &Value, delta: &Value) -> FaultResult<Value> {
    match (current, delta) {
        (Value::Int64(a), Value::Int64(b)) => Ok(Value::Int64(a.saturating_add(*b))),
        (a, b) if a.is_number() && b.is_number() => {
            Ok(Value::double(a.as_number_f64().unwrap() + b.as_number_f64().unwrap()))
        }
        _ => Ok(delta.clone()),
    }
}

fn numeric_extreme(current: Option<Value>, bound: Value, want_max: bool) -> FaultResult<Value> {
    match current {
        Some(v) if v.is_number() && bound.is_number() => {
            let keep_current = if want_max { v >= bound } else { v <= bound };
            Ok(if keep_current { v } else { bound })
        }
        _ => Ok(bound),
    }
}

/// Rejects a transform whose path would have to pass through an array
/// element to reach its target -- the structured-value analogue of spec
/// §4.B's "server-timestamp sentinel nested inside arrays" rejection.
fn set_dotted_checked(fields: &mut Fields, dotted: &str, value: Value) -> FaultResult<()> {
    let segments: Vec<&str> = dotted.split('.').collect();
    let mut cursor = fields;
    for seg in &segments[..segments.len() - 1] {
        let entry = cursor
            .entry(seg.to_string())
            .or_insert_with(|| Value::Map(Fields::new()));
        match entry {
            Value::Map(m) => cursor = m,
            Value::Array(_) => {
                return Err(fault(
                    Code::InvalidArgument,
                    format!("transform field path {dotted:?} passes through an array"),
                ))
            }
            _ => {
                *entry = Value::Map(Fields::new());
                match entry {
                    Value::Map(m) => cursor = m,
                    _ => unreachable!(),
                }
            }
        }
    }
    cursor.insert(segments[segments.len() - 1].to_string(), value);
    Ok(())
}

pub fn get_dotted<'a>(fields: &'a Fields, dotted: &str) -> Option<&'a Value> {
    let mut segments = dotted.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?;
    for seg in segments {
        match current {
            Value::Map(m) => current = m.get(seg)?,
            _ => return None,
        }
    }
    Some(current)
}

pub fn set_dotted(fields: &mut Fields, dotted: &str, value: Value) {
    let _ = set_dotted_checked(fields, dotted, value);
}

pub fn delete_dotted(fields: &mut Fields, dotted: &str) {
    let segments: Vec<&str> = dotted.split('.').collect();
    let mut cursor = fields;
    for seg in &segments[..segments.len() - 1] {
        match cursor.get_mut(*seg) {
            Some(Value::Map(m)) => cursor = m,
            _ => return,
        }
    }
    cursor.remove(segments[segments.len() - 1]);
}

/// Applies one write against the store, assuming its precondition has
/// already been checked by the caller (see `apply_batch`, which checks
/// every write's precondition before mutating anything).
fn apply_one(store: &Store, write: &Write, commit_time: Timestamp) -> FaultResult<(WriteResult, ChangeRecord)> {
    let before_doc = store.get_document(&write.path)?;
    let before = before_doc.clone().unwrap_or_else(|| Document::missing(write.path.clone()));

    let (merged_fields, kind) = apply_base(&before_doc, write);

    let after = match merged_fields {
        None => {
            if kind != ChangeKind::NoOp {
                store.delete_document(&write.path)?;
            }
            Document::missing(write.path.clone())
        }
        Some(mut fields) => {
            if !write.transforms.is_empty() {
                apply_transforms(&mut fields, &write.transforms, commit_time)?;
            }
            Value::validate_fields(&fields)?;
            store.set_document(&write.path, fields, commit_time)?
        }
    };

    let transform_results = if let Some(ref fields) = after_fields(&after) {
        write
            .transforms
            .iter()
            .map(|t| get_dotted(fields, &t.field_path).cloned().unwrap_or(Value::Null))
            .collect()
    } else {
        Vec::new()
    };

    let record = ChangeRecord {
        path: write.path.clone(),
        kind,
        before,
        after: after.clone(),
        commit_time,
    };
    Ok((
        WriteResult {
            update_time: commit_time,
            transform_results,
        },
        record,
    ))
}

fn after_fields(doc: &Document) -> Option<Fields> {
    doc.exists.then(|| doc.fields.clone())
}

/// Atomically validates every write's precondition against the store's
/// current state, then applies them in order. Either every write's effect
/// is visible afterward, or (on a precondition failure) none is (spec
/// §4.D, "Atomicity").
pub fn apply_batch(
    store: &Store,
    commit_clock: &CommitClock,
    writes: &[Write],
) -> FaultResult<CommitBatch> {
    for w in writes {
        w.validate()?;
    }
    let snapshots: Vec<Option<Document>> = writes
        .iter()
        .map(|w| store.get_document(&w.path))
        .collect::<FaultResult<_>>()?;
    for (w, snap) in writes.iter().zip(snapshots.iter()) {
        if let Some(pre) = &w.precondition {
            check_precondition(&w.path, snap, pre)?;
        }
    }

    let commit_time = commit_clock.next();
    let mut records = Vec::with_capacity(writes.len());
    for w in writes {
        let (_, record) = apply_one(store, w, commit_time)?;
        records.push(record);
    }
    Ok(CommitBatch { commit_time, records })
}

/// Per-write results for an atomic `commit` (spec §4.D, "Result").
pub fn apply_batch_with_results(
    store: &Store,
    commit_clock: &CommitClock,
    writes: &[Write],
) -> FaultResult<(CommitBatch, Vec<WriteResult>)> {
    for w in writes {
        w.validate()?;
    }
    let snapshots: Vec<Option<Document>> = writes
        .iter()
        .map(|w| store.get_document(&w.path))
        .collect::<FaultResult<_>>()?;
    for (w, snap) in writes.iter().zip(snapshots.iter()) {
        if let Some(pre) = &w.precondition {
            check_precondition(&w.path, snap, pre)?;
        }
    }

    let commit_time = commit_clock.next();
    let mut records = Vec::with_capacity(writes.len());
    let mut results = Vec::with_capacity(writes.len());
    for w in writes {
        let (result, record) = apply_one(store, w, commit_time)?;
        results.push(result);
        records.push(record);
    }
    Ok((CommitBatch { commit_time, records }, results))
}

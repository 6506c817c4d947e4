// The trigger router (spec §4.I): matches committed change records against
// `{name}`-pattern path subscriptions and hands matching events to
// subscriber callbacks, isolating callback failures from the writer and
// from other subscribers.

use std::sync::Mutex;

use submerge_lang::Path;
use submerge_rowdb::Document;
use submerge_txn::{ChangeKind, ChangeRecord};
use tracing::warn;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TriggerKind {
    Create,
    Update,
    Delete,
    Write,
}

impl TriggerKind {
    fn matches(self, kind: ChangeKind) -> bool {
        match (self, kind) {
            (TriggerKind::Write, ChangeKind::Create | ChangeKind::Update | ChangeKind::Delete) => true,
            (TriggerKind::Create, ChangeKind::Create) => true,
            (TriggerKind::Update, ChangeKind::Update) => true,
            (TriggerKind::Delete, ChangeKind::Delete) => true,
            _ => false,
        }
    }
}

/// A `{name}`-segmented route, e.g. `users/{uid}/posts/{pid}`.
#[derive(Clone, Debug)]
pub struct Pattern {
    segments: Vec<PatternSegment>,
}

#[derive(Clone, Debug)]
enum PatternSegment {
    Literal(String),
    Capture(String),
}

impl Pattern {
    pub fn parse(route: &str) -> Pattern {
        let segments = route
            .split('/')
            .map(|seg| {
                if let Some(name) = seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    PatternSegment::Capture(name.to_string())
                } else {
                    PatternSegment::Literal(seg.to_string())
                }
            })
            .collect();
        Pattern { segments }
    }

    /// Matches iff segment counts agree and every literal segment matches
    /// exactly; captures fill `params`.
    pub fn matches(&self, path: &Path) -> Option<Vec<(String, String)>> {
        let path_segments = path.segments();
        if path_segments.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (pattern_seg, path_seg) in self.segments.iter().zip(path_segments) {
            match pattern_seg {
                PatternSegment::Literal(lit) => {
                    if lit != path_seg {
                        return None;
                    }
                }
                PatternSegment::Capture(name) => params.push((name.clone(), path_seg.clone())),
            }
        }
        Some(params)
    }
}

#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub before: Document,
    pub after: Document,
    pub params: Vec<(String, String)>,
    pub resource_name: String,
    pub commit_time: submerge_lang::Timestamp,
    pub event_id: u64,
}

type Callback = Box<dyn Fn(&ChangeEvent) -> Result<(), String> + Send + Sync>;

struct Subscription {
    pattern: Pattern,
    kind: TriggerKind,
    callback: Callback,
}

/// Routes committed change records to path-pattern subscriptions. NoOps
/// are never routed (spec §4.I).
pub struct TriggerRouter {
    project: String,
    database: String,
    subscriptions: Mutex<Vec<Subscription>>,
    next_event_id: Mutex<u64>,
}

impl TriggerRouter {
    pub fn new(project: impl Into<String>, database: impl Into<String>) -> TriggerRouter {
        TriggerRouter {
            project: project.into(),
            database: database.into(),
            subscriptions: Mutex::new(Vec::new()),
            next_event_id: Mutex::new(0),
        }
    }

    pub fn subscribe(
        &self,
        route: &str,
        kind: TriggerKind,
        callback: impl Fn(&ChangeEvent) -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.subscriptions.lock().unwrap().push(Subscription {
            pattern: Pattern::parse(route),
            kind,
            callback: Box::new(callback),
        });
    }

    /// Dispatches one committed record to every matching subscription, in
    /// registration order, isolating each callback's failure (spec §4.I,
    /// "Failures in subscriber callbacks are isolated").
    pub fn route(&self, record: &ChangeRecord) {
        if record.kind == ChangeKind::NoOp {
            return;
        }
        let subscriptions = self.subscriptions.lock().unwrap();
        for sub in subscriptions.iter() {
            if !sub.kind.matches(record.kind) {
                continue;
            }
            let Some(params) = sub.pattern.matches(&record.path) else {
                continue;
            };
            let event_id = {
                let mut next = self.next_event_id.lock().unwrap();
                let id = *next;
                *next += 1;
                id
            };
            let event = ChangeEvent {
                before: record.before.clone(),
                after: record.after.clone(),
                params,
                resource_name: submerge_lang::format_wire_name(&self.project, &self.database, &record.path),
                commit_time: record.commit_time,
                event_id,
            };
            if let Err(e) = (sub.callback)(&event) {
                warn!(target: "submerge", error = %e, path = %record.path, "trigger subscriber failed");
            }
        }
    }
}

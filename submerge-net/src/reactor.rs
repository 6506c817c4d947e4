// The listen reactor (spec §4.H). Targets are multiplexed over a single
// change bus: every commit batch is drained in order, each target is
// re-evaluated, and the diff against its previous snapshot is queued as
// events the caller drains with `poll` -- the same request/complete queue
// shape the transport layer used to alternate incoming messages and
// completed request/response pairs, adapted here to alternate diff events
// and checkpoints per target.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use submerge_base::FaultResult;
use submerge_eval::Query;
use submerge_lang::Path;
use submerge_rowdb::{Document, Store};
use submerge_txn::CommitBatch;

#[derive(Clone, Debug)]
pub enum ListenTargetSpec {
    Document(Path),
    Query(Query),
}

#[derive(Clone, Debug)]
pub enum DocumentChange {
    Added(Document),
    Modified(Document),
    Removed(Path),
}

#[derive(Clone, Debug)]
pub enum TargetEvent {
    Change(DocumentChange),
    Current,
    Checkpoint { commit_time: submerge_lang::Timestamp },
}

struct TargetState {
    spec: ListenTargetSpec,
    snapshot: BTreeMap<Path, Document>,
    sent_current: bool,
    detached: bool,
}

/// Owns listen targets by id; targets hold no back-pointer to the reactor
/// (spec §9, "Cyclic references") -- detachment is by id only.
pub struct Reactor {
    store: Arc<Store>,
    targets: Mutex<HashMap<u64, TargetState>>,
    queues: Mutex<HashMap<u64, VecDeque<TargetEvent>>>,
    next_id: AtomicU64,
}

impl Reactor {
    pub fn new(store: Arc<Store>) -> Reactor {
        Reactor {
            store,
            targets: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add_target(&self, spec: ListenTargetSpec) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().insert(
            id,
            TargetState {
                spec,
                snapshot: BTreeMap::new(),
                sent_current: false,
                detached: false,
            },
        );
        self.queues.lock().unwrap().insert(id, VecDeque::new());
        id
    }

    /// Subsequent batches skip a detached target; events already queued
    /// before detachment are still delivered via `poll` (spec §4.H,
    /// "Cancellation").
    pub fn detach(&self, target_id: u64) {
        if let Some(t) = self.targets.lock().unwrap().get_mut(&target_id) {
            t.detached = true;
        }
    }

    pub fn poll(&self, target_id: u64) -> Option<TargetEvent> {
        self.queues.lock().unwrap().get_mut(&target_id)?.pop_front()
    }

    /// Re-evaluates every live target against `batch` and enqueues the
    /// resulting diff. No target sees batches out of commit order because
    /// the caller (the write pipeline) publishes batches serially.
    pub fn publish(&self, batch: &CommitBatch) -> FaultResult<()> {
        let mut targets = self.targets.lock().unwrap();
        let mut queues = self.queues.lock().unwrap();
        for (id, target) in targets.iter_mut() {
            if target.detached {
                continue;
            }
            let queue = queues.get_mut(id).expect("queue exists for every registered target");
            self.reevaluate_one(target, queue, batch)?;
        }
        Ok(())
    }

    fn reevaluate_one(
        &self,
        target: &mut TargetState,
        queue: &mut VecDeque<TargetEvent>,
        batch: &CommitBatch,
    ) -> FaultResult<()> {
        let current: BTreeMap<Path, Document> = match &target.spec {
            ListenTargetSpec::Document(path) => {
                let touched = batch.records.iter().any(|r| &r.path == path);
                if !touched && target.sent_current {
                    return Ok(());
                }
                match self.store.get_document(path)? {
                    Some(doc) if doc.exists => BTreeMap::from([(path.clone(), doc)]),
                    _ => BTreeMap::new(),
                }
            }
            ListenTargetSpec::Query(query) => {
                let docs = query.execute(&self.store)?;
                docs.into_iter().map(|d| (d.path.clone(), d)).collect()
            }
        };

        for (path, doc) in &current {
            match target.snapshot.get(path) {
                None => queue.push_back(TargetEvent::Change(DocumentChange::Added(doc.clone()))),
                Some(prev) if prev.update_time != doc.update_time || prev.fields != doc.fields => {
                    queue.push_back(TargetEvent::Change(DocumentChange::Modified(doc.clone())))
                }
                Some(_) => {}
            }
        }
        for path in target.snapshot.keys() {
            if !current.contains_key(path) {
                queue.push_back(TargetEvent::Change(DocumentChange::Removed(path.clone())));
            }
        }

        target.snapshot = current;
        if !target.sent_current {
            queue.push_back(TargetEvent::Current);
            target.sent_current = true;
        }
        queue.push_back(TargetEvent::Checkpoint {
            commit_time: batch.commit_time,
        });
        Ok(())
    }
}

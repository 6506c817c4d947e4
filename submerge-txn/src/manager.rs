// The transaction manager (spec §4.E). The store has no MVCC, so
// repeatable reads are approximated per-path: the first read of a given
// document path within a transaction is memoized and returned on every
// subsequent read of that same path, while reads of paths not yet touched
// see live state. Conflict detection at commit time is doc-level (the
// chosen resolution of Open Question (a)): a transaction aborts if any
// path it read has a different `update_time` than when it read it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use submerge_base::{fault, Code, FaultResult, IdGen};
use submerge_lang::{Path, Timestamp};
use submerge_rowdb::{Document, Store};

use crate::write::{apply_batch_with_results, CommitBatch, CommitClock, Write, WriteResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxnKind {
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxnState {
    Active,
    Committed,
    RolledBack,
    Aborted,
}

struct TxnRecord {
    kind: TxnKind,
    state: TxnState,
    /// Per-path snapshot of the first observed read: `None` means the
    /// document did not exist at read time.
    reads: HashMap<Path, Option<Timestamp>>,
}

/// Coordinates transaction lifecycle on top of the write pipeline's atomic
/// batch application.
pub struct TransactionManager {
    store: Arc<Store>,
    commit_clock: Arc<CommitClock>,
    id_gen: Arc<dyn IdGen>,
    txns: Mutex<HashMap<Vec<u8>, TxnRecord>>,
    next_seq: AtomicU64,
}

impl TransactionManager {
    pub fn new(store: Arc<Store>, commit_clock: Arc<CommitClock>, id_gen: Arc<dyn IdGen>) -> TransactionManager {
        TransactionManager {
            store,
            commit_clock,
            id_gen,
            txns: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn begin(&self, kind: TxnKind) -> Vec<u8> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut token = self.id_gen.fresh_token();
        token.extend_from_slice(&seq.to_be_bytes());
        self.txns.lock().unwrap().insert(
            token.clone(),
            TxnRecord {
                kind,
                state: TxnState::Active,
                reads: HashMap::new(),
            },
        );
        token
    }

    /// Reads a document within the transaction, memoizing the first
    /// observation of each path so repeat reads within the same transaction
    /// are repeatable (spec §4.E, "Reads").
    pub fn read_document(&self, token: &[u8], path: &Path) -> FaultResult<Option<Document>> {
        let mut txns = self.txns.lock().unwrap();
        let txn = active_txn(&mut txns, token, Code::InvalidArgument)?;
        if let Some(snapshot_time) = txn.reads.get(path) {
            return match snapshot_time {
                Some(_) => self.store.get_document(path),
                None => Ok(None),
            };
        }
        let current = self.store.get_document(path)?;
        txn.reads.insert(path.clone(), current.as_ref().map(|d| d.update_time));
        Ok(current)
    }

    /// Validates that the transaction may accept `writes` (a read-only
    /// transaction may carry none, spec §4.E "ReadOnly"), that every path it
    /// read is still at the `update_time` it was read at, then applies
    /// `writes` atomically through the shared write pipeline (spec §4.E,
    /// "Commit"). Unlike `batchWrite`, the writes are not pre-queued on the
    /// transaction; they are supplied directly to `commit`.
    pub fn commit(&self, token: &[u8], writes: &[Write]) -> FaultResult<(CommitBatch, Vec<WriteResult>)> {
        {
            let mut txns = self.txns.lock().unwrap();
            let txn = active_txn(&mut txns, token, Code::InvalidArgument)?;

            if txn.kind == TxnKind::ReadOnly && !writes.is_empty() {
                return Err(fault(
                    Code::InvalidArgument,
                    "cannot write within a read-only transaction",
                ));
            }

            for (path, snapshot_time) in &txn.reads {
                let current = self.store.get_document(path)?;
                let current_time = current.as_ref().map(|d| d.update_time);
                if current_time != *snapshot_time {
                    txn.state = TxnState::Aborted;
                    return Err(fault(
                        Code::Aborted,
                        "transaction conflicts with a concurrent change",
                    ));
                }
            }
        }

        let result = apply_batch_with_results(&self.store, &self.commit_clock, writes);

        let mut txns = self.txns.lock().unwrap();
        let txn = txns.get_mut(token).expect("transaction present under its own lock");
        match &result {
            Ok(_) => txn.state = TxnState::Committed,
            Err(_) => txn.state = TxnState::Aborted,
        }
        result
    }

    /// Marks the transaction rolled back. Rolling back a transaction that
    /// was already rolled back yields `Aborted`; rolling back one that has
    /// already committed (or aborted at commit) yields `InvalidArgument`
    /// (spec §4.E, "Rollback").
    pub fn rollback(&self, token: &[u8]) -> FaultResult<()> {
        let mut txns = self.txns.lock().unwrap();
        let txn = txns
            .get_mut(token)
            .ok_or_else(|| fault(Code::InvalidArgument, "unknown transaction token"))?;
        match txn.state {
            TxnState::Active => {
                txn.state = TxnState::RolledBack;
                Ok(())
            }
            TxnState::RolledBack => Err(fault(Code::Aborted, "transaction was already rolled back")),
            TxnState::Committed | TxnState::Aborted => Err(fault(
                Code::InvalidArgument,
                "transaction is no longer active",
            )),
        }
    }

    pub fn state(&self, token: &[u8]) -> FaultResult<TxnState> {
        let txns = self.txns.lock().unwrap();
        let txn = txns
            .get(token)
            .ok_or_else(|| fault(Code::InvalidArgument, "unknown transaction token"))?;
        Ok(txn.state)
    }
}

/// Looks up a transaction and requires it to be `Active`; any terminal
/// state is rejected with `on_terminal` (spec §4.E: `InvalidArgument` for
/// commit, and for rollback split further between `Aborted` and
/// `InvalidArgument` — see `rollback`, which does not use this helper).
fn active_txn<'a>(
    txns: &'a mut HashMap<Vec<u8>, TxnRecord>,
    token: &[u8],
    on_terminal: Code,
) -> FaultResult<&'a mut TxnRecord> {
    let txn = txns
        .get_mut(token)
        .ok_or_else(|| fault(Code::InvalidArgument, "unknown transaction token"))?;
    match txn.state {
        TxnState::Active => Ok(txn),
        TxnState::Committed | TxnState::RolledBack | TxnState::Aborted => {
            Err(fault(on_terminal, "transaction is no longer active"))
        }
    }
}

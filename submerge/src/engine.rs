// The low-level RPC-shaped facade (spec §6): wires the document store, the
// write pipeline, the transaction manager, the query/aggregation
// evaluators, and the listen reactor / trigger router behind a single
// `Engine`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use submerge_base::{fault, Clock, Code, FaultResult, IdGen, RapidIdGen, SystemClock};
use submerge_eval::{run_aggregation, Aggregation, Query};
use submerge_lang::{format_wire_name, Path, Timestamp, Value};
use submerge_net::{ListenTargetSpec, Reactor, TargetEvent, TriggerRouter};
use submerge_rowdb::{Document, Store};
use submerge_txn::{
    apply_batch_with_results, ChangeRecord, CommitBatch, CommitClock, TransactionManager, TxnKind, Write, WriteResult,
};

#[derive(Clone, Debug)]
pub struct Config {
    pub project: String,
    pub database: String,
    pub region: String,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            project: "default-project".into(),
            database: "(default)".into(),
            region: "nam5".into(),
        }
    }
}

/// Per-write outcome of a non-atomic `batchWrite` (spec §4.D.1): unlike
/// `commit`, a failing write carries its own status rather than aborting
/// its siblings.
pub struct BatchWriteResult {
    pub result: Result<WriteResult, submerge_base::Fault>,
}

pub struct Engine {
    config: Config,
    store: Arc<Store>,
    commit_clock: Arc<CommitClock>,
    txn_manager: TransactionManager,
    reactor: Reactor,
    pub triggers: TriggerRouter,
    strict: bool,
    closed: AtomicBool,
}

impl Engine {
    pub fn new(config: Config) -> Engine {
        Engine::with_clock_and_ids(config, Arc::new(SystemClock), Arc::new(RapidIdGen::new()), false)
    }

    pub fn with_strict_mode(config: Config, strict: bool) -> Engine {
        Engine::with_clock_and_ids(config, Arc::new(SystemClock), Arc::new(RapidIdGen::new()), strict)
    }

    /// Constructs an engine with an injected `Clock`/`IdGen`, enabling
    /// deterministic tests (spec §9, "Global mutable state").
    pub fn with_clock_and_ids(config: Config, clock: Arc<dyn Clock>, id_gen: Arc<dyn IdGen>, strict: bool) -> Engine {
        let store = Arc::new(Store::new().expect("in-memory store always initializes"));
        let commit_clock = Arc::new(CommitClock::new(clock));
        let txn_manager = TransactionManager::new(store.clone(), commit_clock.clone(), id_gen);
        let reactor = Reactor::new(store.clone());
        let triggers = TriggerRouter::new(config.project.clone(), config.database.clone());
        Engine {
            config,
            store,
            commit_clock,
            txn_manager,
            reactor,
            triggers,
            strict,
            closed: AtomicBool::new(false),
        }
    }

    pub fn strict_mode(&self) -> bool {
        self.strict
    }

    pub fn get_project_id(&self) -> FaultResult<&str> {
        self.check_open()?;
        Ok(&self.config.project)
    }

    pub fn wire_name(&self, path: &Path) -> String {
        format_wire_name(&self.config.project, &self.config.database, path)
    }

    pub fn begin_transaction(&self, kind: TxnKind) -> FaultResult<Vec<u8>> {
        self.check_open()?;
        Ok(self.txn_manager.begin(kind))
    }

    pub fn rollback(&self, transaction: &[u8]) -> FaultResult<()> {
        self.check_open()?;
        self.txn_manager.rollback(transaction)
    }

    pub fn transactional_read(&self, transaction: &[u8], path: &Path) -> FaultResult<Option<Document>> {
        self.check_open()?;
        self.txn_manager.read_document(transaction, path)
    }

    /// Atomic commit, either standalone (`transaction = None`) or closing
    /// out a transaction along with the writes it collected (spec §6,
    /// `commit`).
    pub fn commit(&self, transaction: Option<&[u8]>, writes: Vec<Write>) -> FaultResult<(Timestamp, Vec<WriteResult>)> {
        self.check_open()?;
        let (batch, results) = match transaction {
            Some(token) => self.txn_manager.commit(token, &writes)?,
            None => apply_batch_with_results(&self.store, &self.commit_clock, &writes)?,
        };
        self.publish(&batch);
        Ok((batch.commit_time, results))
    }

    /// Non-atomic batch write (spec §4.D.1): each write gets its own
    /// commit and its own pass/fail status.
    pub fn batch_write(&self, writes: Vec<Write>) -> FaultResult<Vec<BatchWriteResult>> {
        self.check_open()?;
        let mut out = Vec::with_capacity(writes.len());
        for write in writes {
            match apply_batch_with_results(&self.store, &self.commit_clock, std::slice::from_ref(&write)) {
                Ok((batch, mut results)) => {
                    self.publish(&batch);
                    out.push(BatchWriteResult {
                        result: Ok(results.remove(0)),
                    });
                }
                Err(f) => out.push(BatchWriteResult { result: Err(f) }),
            }
        }
        Ok(out)
    }

    pub fn batch_get_documents(&self, paths: &[Path]) -> FaultResult<Vec<Document>> {
        self.check_open()?;
        paths
            .iter()
            .map(|p| {
                self.store
                    .get_document(p)
                    .map(|opt| opt.unwrap_or_else(|| Document::missing(p.clone())))
            })
            .collect()
    }

    pub fn run_query(&self, query: &Query) -> FaultResult<Vec<Document>> {
        self.check_open()?;
        query.execute(&self.store)
    }

    pub fn run_aggregation_query(&self, query: &Query, aggregation: &Aggregation) -> FaultResult<BTreeMap<String, Value>> {
        self.check_open()?;
        run_aggregation(&self.store, query, aggregation)
    }

    pub fn list_documents(&self, parent: Option<&Path>, collection_id: &str, show_missing: bool) -> FaultResult<Vec<Document>> {
        self.check_open()?;
        self.store.list_documents(parent, collection_id, show_missing)
    }

    pub fn list_collection_ids(&self, path: &Path) -> FaultResult<Vec<String>> {
        self.check_open()?;
        self.store.list_collection_ids(path)
    }

    pub fn partition_query_stream(&self, query: &Query, desired_count: u32) -> FaultResult<Vec<submerge_eval::PartitionCursor>> {
        self.check_open()?;
        submerge_eval::partitions(query, desired_count)
    }

    pub fn add_listen_target(&self, spec: ListenTargetSpec) -> FaultResult<u64> {
        self.check_open()?;
        Ok(self.reactor.add_target(spec))
    }

    pub fn detach_listen_target(&self, target_id: u64) -> FaultResult<()> {
        self.check_open()?;
        self.reactor.detach(target_id);
        Ok(())
    }

    pub fn poll_listen_target(&self, target_id: u64) -> FaultResult<Option<TargetEvent>> {
        self.check_open()?;
        Ok(self.reactor.poll(target_id))
    }

    /// Idempotent; every subsequent operation fails with `Unavailable`
    /// (spec §5, "Lifecycle").
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_open(&self) -> FaultResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(fault(Code::Unavailable, "engine is closed"));
        }
        Ok(())
    }

    fn publish(&self, batch: &CommitBatch) {
        if let Err(e) = self.reactor.publish(batch) {
            tracing::error!(target: "submerge", error = %e, "reactor failed to process commit batch");
        }
        for record in &batch.records {
            self.route_one(record);
        }
    }

    fn route_one(&self, record: &ChangeRecord) {
        self.triggers.route(record);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use submerge_base::{FakeClock, SequentialIdGen};
    use submerge_lang::Fields;
    use submerge_txn::WriteOperation;

    fn engine() -> Engine {
        Engine::with_clock_and_ids(
            Config::default(),
            Arc::new(FakeClock::new(1_600_000_000_000_000)),
            Arc::new(SequentialIdGen::new()),
            false,
        )
    }

    #[test]
    fn closed_engine_rejects_operations() {
        let e = engine();
        e.close();
        let err = e.get_project_id().unwrap_err();
        assert_eq!(err.code, Code::Unavailable);
    }

    #[test]
    fn commit_then_read_your_writes() {
        let e = engine();
        let mut fields = Fields::new();
        fields.insert("name".into(), Value::String("Alice".into()));
        let write = Write {
            path: Path::parse_document("users/alice").unwrap(),
            operation: WriteOperation::Update(fields),
            update_mask: None,
            transforms: vec![],
            precondition: None,
        };
        let (commit_time, _) = e.commit(None, vec![write]).unwrap();
        let doc = e
            .batch_get_documents(&[Path::parse_document("users/alice").unwrap()])
            .unwrap()
            .remove(0);
        assert!(doc.exists);
        assert_eq!(doc.update_time, commit_time);
    }

    #[test]
    fn create_trigger_fires_on_write() {
        let e = engine();
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired2 = fired.clone();
        e.triggers.subscribe("users/{uid}", submerge_net::TriggerKind::Create, move |_| {
            fired2.store(true, Ordering::SeqCst);
            Ok(())
        });
        let mut fields = Fields::new();
        fields.insert("name".into(), Value::String("Alice".into()));
        let write = Write {
            path: Path::parse_document("users/alice").unwrap(),
            operation: WriteOperation::Update(fields),
            update_mask: None,
            transforms: vec![],
            precondition: None,
        };
        e.commit(None, vec![write]).unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn batch_write_is_per_write_independent() {
        let e = engine();
        let good = Write {
            path: Path::parse_document("a/1").unwrap(),
            operation: WriteOperation::Update(Fields::new()),
            update_mask: None,
            transforms: vec![],
            precondition: None,
        };
        let bad = Write {
            path: Path::parse_document("a/2").unwrap(),
            operation: WriteOperation::Update(Fields::new()),
            update_mask: None,
            transforms: vec![],
            precondition: Some(submerge_txn::Precondition {
                exists: Some(true),
                update_time: None,
            }),
        };
        let results = e.batch_write(vec![good, bad]).unwrap();
        assert!(results[0].result.is_ok());
        assert!(results[1].result.is_err());
        assert!(e
            .batch_get_documents(&[Path::parse_document("a/1").unwrap()])
            .unwrap()[0]
            .exists);
    }
}

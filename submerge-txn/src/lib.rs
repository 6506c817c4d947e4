// Write pipeline (spec §4.D) and transaction manager (spec §4.E): applies
// batches of writes atomically at a monotonic commit time, and coordinates
// multi-operation transactions on top of that same pipeline.

mod manager;
mod write;

pub use manager::{TransactionManager, TxnKind, TxnState};
pub use write::{
    apply_batch, apply_batch_with_results, delete_dotted, get_dotted, set_dotted, ChangeKind,
    ChangeRecord, CommitBatch, CommitClock, FieldTransform, Precondition, ServerValue,
    TransformKind, Write, WriteOperation, WriteResult,
};

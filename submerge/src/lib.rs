// The top-level facade (spec §6): a single `Engine` wiring the document
// store, the write pipeline and transaction manager, the query and
// aggregation evaluators, and the listen reactor / trigger router behind
// one RPC-shaped surface.

mod engine;
mod request;

pub use engine::{BatchWriteResult, Config, Engine};
pub use request::decode_request;

pub use submerge_base::{Clock, Code, Fault, FaultResult, IdGen};
pub use submerge_eval::{Aggregation, Aggregator, Query, Target};
pub use submerge_lang::{Fields, Path, Timestamp, Value};
pub use submerge_net::{ChangeEvent, ListenTargetSpec, TargetEvent, TriggerKind};
pub use submerge_rowdb::Document;
pub use submerge_txn::{
    ChangeKind, FieldTransform, Precondition, ServerValue, TransformKind, TxnKind, TxnState, Write, WriteOperation,
    WriteResult,
};

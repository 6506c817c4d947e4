// Query evaluator (spec §4.F) and aggregation evaluator (spec §4.G): turns
// a structured query into a materialized document set, and reduces it.

mod aggregate;
mod dotted;
mod filter;
mod order;
mod partition;
mod query;
mod vector;

pub use aggregate::{run as run_aggregation, Aggregation, Aggregator};
pub use filter::{CompositeOp, Filter, FieldOp, UnaryOp};
pub use order::{Cursor, CursorKind, Direction, OrderBy};
pub use partition::{partitions, PartitionCursor};
pub use query::{Query, Target};
pub use vector::{DistanceMeasure, FindNearest};

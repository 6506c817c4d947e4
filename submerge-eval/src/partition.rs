// `partitionQueryStream` at the minimum useful fidelity (spec §4.F.1): a
// single partition covering the whole query. Requesting more partitions is
// accepted and silently collapses to one -- a deliberate scope decision,
// not a bug (see DESIGN.md).

use submerge_base::FaultResult;
use submerge_lang::Value;

use crate::query::Query;

#[derive(Clone, Debug)]
pub struct PartitionCursor {
    pub start: Option<Vec<Value>>,
    pub end: Option<Vec<Value>>,
}

pub fn partitions(query: &Query, _desired_count: u32) -> FaultResult<Vec<PartitionCursor>> {
    query.validate()?;
    Ok(vec![PartitionCursor { start: None, end: None }])
}

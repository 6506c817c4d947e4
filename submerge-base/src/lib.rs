mod clock;
mod error;
mod idgen;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{fault, fault_field, internal, Code, Fault, FaultResult};
pub use idgen::{IdGen, RapidIdGen, SequentialIdGen};

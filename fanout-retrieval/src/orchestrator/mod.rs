//! Orchestration: deadline allocation, chain ordering, lane dispatch and
//! the fan-out across lanes.

pub mod chain;
pub mod deadline;
pub mod dispatch;
pub mod fanout;

pub use chain::effective_order;
pub use deadline::{Allocation, DeadlineAllocator};
pub use dispatch::{Lane, LaneDispatcher};
pub use fanout::Orchestrator;

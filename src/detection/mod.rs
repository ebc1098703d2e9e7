//! Classification Engine
//!
//! Stateless: criteria vector -> code / alias / description, gated by the
//! policy table, applied over batches of host records. Nothing in here
//! touches disk.

pub mod batch;
pub mod classifier;
pub mod codes;
pub mod criteria;
pub mod policy;

pub use batch::{
    evaluate, filter_zombies, process, summarize, zombie_ids, BatchOutcome, BatchSummary,
    CodeCount, DetectionResult, HostRecord, InvalidRecord,
};
pub use classifier::{classify, Classification};
pub use codes::{CodeInfo, CODE_TABLE};
pub use criteria::{CriteriaVector, Criterion};
pub use policy::{is_active, PolicyError, PolicyTable};

//! Domain model: diff documents, proposal identity, task ids.
//!
//! Nothing here does I/O.

pub mod diff;
pub mod ids;
pub mod proposal;

pub use diff::{LineKind, NormalizeError, classify, normalize};
pub use ids::TaskId;
pub use proposal::{BRANCH_SEPARATOR, ProposalId, Submitter, UNNAMED_TITLE};

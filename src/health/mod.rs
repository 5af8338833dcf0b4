//! Reachability checks for track audio resources.

mod checker;
mod probe;

pub use checker::{CheckOutcome, ResourceChecker};
pub use probe::{HttpProbe, ReqwestProbe, DEFAULT_PROBE_TIMEOUT};

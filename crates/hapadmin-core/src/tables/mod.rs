//! Static tables describing the daemon's vocabulary.
//!
//! Built once on first use and read-only afterwards.

pub mod metrics;
pub mod status;

pub use metrics::{
    BACKEND_METRICS, FRONTEND_METRICS, PROCESS_METRICS, Reduction, SERVER_METRICS, reduction_for,
};
pub use status::{AddressChange, CommandOutcome, classify, is_error_output};

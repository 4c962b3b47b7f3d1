//! Error categorization, backoff policy selection, and the retry engine
//! that ties them together (§4.3).

pub mod category;
pub mod engine;
pub mod policy;

pub use category::{classify, ErrorCategory};
pub use engine::{AttemptRecord, CancellationToken, RetryEngine, RetryError};
pub use policy::RetryPolicy;

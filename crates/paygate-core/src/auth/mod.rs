//! Request authentication: signed-parameter token validation with
//! progressive lockout and replay protection (§4.1).

pub mod lockout;
pub mod pipeline;
pub mod replay;
pub mod team;
pub mod token;

pub use lockout::{LockoutDecision, LockoutTracker};
pub use pipeline::{AuthOutcome, AuthPipeline, AuthRequest, AuthResult};
pub use replay::{InMemoryReplayStore, ReplayStore, SqliteReplayStore};
pub use team::{Team, TeamStore};
pub use token::{canonical_string, compute_token, verify_token};

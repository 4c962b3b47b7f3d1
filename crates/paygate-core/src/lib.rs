//! `paygate-core`: the transactional core of a payment gateway.
//!
//! Pure, trait-based, no HTTP. `paygate-server` supplies concrete
//! implementations of the narrow collaborator traits defined here
//! (`PaymentStore`, `TeamStore`, `WebhookSender`, `MetricsSink`,
//! `AuditSink`) and wires them together at its composition root, the way
//! `tempo-x402-facilitator` wires concrete collaborators behind `x402`'s
//! trait boundaries.

pub mod audit;
pub mod auth;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod observer;
pub mod payment;
pub mod retry;
pub mod security;
pub mod webhook;

pub use constants::GatewayConfig;
pub use error::GatewayError;

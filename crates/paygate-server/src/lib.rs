//! HTTP composition root for `paygate-core`.
//!
//! Wires the core's trait objects (`PaymentStore`, `TeamStore`,
//! `WebhookSender`, `MetricsSink`, `AuditSink`) to concrete
//! implementations, the way `tempo-x402-facilitator` wires
//! `x402::TempoSchemeFacilitator` behind its own state and routes.
//!
//! # Modules
//!
//! - [`routes`] — HTTP endpoints (health, supported, auth/verify,
//!   payments, metrics)
//! - [`state`] — shared [`state::AppState`]
//! - [`config`] — environment-driven [`config::ServerConfig`]
//! - [`teams`] — [`teams::InMemoryTeamStore`]
//! - [`webhook`] — `reqwest`-based [`webhook::ReqwestWebhookSender`] and
//!   webhook URL validation
//! - [`metrics`] — Prometheus metrics and [`metrics::PrometheusMetricsSink`]

pub mod config;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod teams;
pub mod webhook;

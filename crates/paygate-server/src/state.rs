//! Shared application state and startup wiring (§9.3), grounded on
//! `tempo-x402-facilitator::{state, bootstrap}`: the bootstrap function
//! parses configuration, opens the durable stores (falling back to
//! in-memory with a loud warning, never silently), validates webhook
//! URLs, and assembles the core's trait objects into one [`AppState`].

use std::sync::Arc;

use paygate_core::audit::{AuditSink, TracingAuditSink};
use paygate_core::auth::replay::start_replay_purge;
use paygate_core::auth::{AuthPipeline, InMemoryReplayStore, ReplayStore, SqliteReplayStore};
use paygate_core::observer::DeadlockObserver;
use paygate_core::payment::{InMemoryPaymentStore, LockRegistry, PaymentManager, PaymentStore, SqlitePaymentStore};
use paygate_core::retry::{CancellationToken, RetryEngine};
use paygate_core::webhook::{GenericRouter, WebhookDispatcher};

use crate::config::ServerConfig;
use crate::metrics::PrometheusMetricsSink;
use crate::teams::InMemoryTeamStore;
use crate::webhook::ReqwestWebhookSender;

/// Shared application state handed to every route handler.
pub struct AppState {
    pub auth_pipeline: AuthPipeline,
    pub payment_manager: PaymentManager,
    pub metrics_token: Option<Vec<u8>>,
}

fn open_payment_store(path: Option<&str>) -> Arc<dyn PaymentStore> {
    match path {
        Some(path) => match SqlitePaymentStore::open(path) {
            Ok(store) => {
                tracing::info!(path, "payment store: SQLite");
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "failed to open SQLite payment store — using in-memory");
                Arc::new(InMemoryPaymentStore::new())
            }
        },
        None => {
            tracing::warn!("PAYMENTS_DB_PATH not set — using in-memory payment store (not durable)");
            Arc::new(InMemoryPaymentStore::new())
        }
    }
}

fn open_replay_store(path: Option<&str>, label: &str) -> Arc<dyn ReplayStore> {
    match path {
        Some(path) => match SqliteReplayStore::open(path) {
            Ok(store) => {
                tracing::info!(path, label, "replay store: SQLite");
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!(path, label, error = %e, "failed to open SQLite replay store — using in-memory");
                Arc::new(InMemoryReplayStore::new())
            }
        },
        None => Arc::new(InMemoryReplayStore::new()),
    }
}

/// Assemble [`AppState`] from configuration, mirroring
/// `bootstrap_embedded_facilitator`'s shape.
pub fn bootstrap(config: &ServerConfig) -> AppState {
    let metrics: Arc<dyn paygate_core::metrics::MetricsSink> = Arc::new(PrometheusMetricsSink);

    let team_store = Arc::new(InMemoryTeamStore::from_env());
    tracing::info!(teams = team_store.len(), "team directory loaded");

    let nonce_store = open_replay_store(config.replay_db_path.as_deref(), "nonce");
    let fingerprint_store = open_replay_store(config.replay_db_path.as_deref(), "fingerprint");

    let auth_pipeline = AuthPipeline::new(
        team_store,
        nonce_store.clone(),
        fingerprint_store.clone(),
        config.gateway.clone(),
        metrics.clone(),
    );

    let payment_store = open_payment_store(config.payments_db_path.as_deref());
    let locks = Arc::new(LockRegistry::new(config.gateway.lock_timeout));
    let retry = Arc::new(RetryEngine::new(config.gateway.attempt_retention).with_metrics(metrics.clone()));
    let observer = Arc::new(DeadlockObserver::new(
        config.gateway.deadlock_history,
        config.gateway.auto_resolve_deadlocks,
        config.gateway.max_lock_wait,
    ));

    for url in &config.webhook_urls {
        crate::webhook::validate_webhook_url(url);
    }
    let sender = Arc::new(ReqwestWebhookSender::new());
    let mut dispatcher = WebhookDispatcher::new(sender, Arc::new(GenericRouter), retry.clone())
        .with_metrics(metrics.clone());
    if let Some(secret) = &config.webhook_hmac_secret {
        dispatcher = dispatcher.with_hmac_secret(secret.clone());
    }

    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

    let payment_manager = PaymentManager::new(
        payment_store,
        locks.clone(),
        retry.clone(),
        observer.clone(),
        Arc::new(dispatcher),
        metrics.clone(),
        audit,
    );

    let cancel = CancellationToken::new();
    let sweep_interval = config.gateway.sweep_interval;
    locks.clone().start_gc(sweep_interval, cancel.clone());
    retry.clone().start_purge(sweep_interval, cancel.clone());
    observer.clone().start_sweep(sweep_interval, metrics.clone(), cancel.clone());
    start_replay_purge(
        nonce_store,
        config.gateway.nonce_window,
        sweep_interval,
        "nonce",
        cancel.clone(),
    );
    start_replay_purge(
        fingerprint_store,
        config.gateway.replay_window,
        sweep_interval,
        "fingerprint",
        cancel,
    );

    AppState {
        auth_pipeline,
        payment_manager,
        metrics_token: config.metrics_token.clone(),
    }
}

//! HTTP endpoints (§10): the composition root that exercises the core
//! end to end, grounded on `tempo-x402-facilitator::routes`'s handler
//! shape (state extraction, JSON bodies, metrics/tracing around the
//! core call).

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::collections::BTreeMap;

use paygate_core::auth::AuthRequest;
use paygate_core::payment::{Payment, PaymentStatus, TransitionRequest};
use paygate_core::security::constant_time_eq;

use crate::metrics;
use crate::state::AppState;

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "paygate-server",
    }))
}

#[get("/supported")]
pub async fn supported() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "authentication": ["hmac-token"],
        "statuses": [
            "INIT", "NEW", "FORM_SHOWED", "AUTHORIZED", "CONFIRMED",
            "CANCELLED", "REJECTED", "REFUNDED", "PARTIAL_REFUNDED", "EXPIRED",
        ],
    }))
}

/// Bearer-token-gated metrics endpoint, identical in shape to
/// `tempo-x402-facilitator::routes::metrics_endpoint`: no token
/// configured means metrics are forbidden by default rather than
/// silently public.
#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            return HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN to access /metrics"
            }));
        }
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

#[derive(Deserialize)]
pub struct AuthVerifyRequest {
    #[serde(rename = "TeamSlug")]
    pub team_slug: String,
    #[serde(rename = "Token")]
    pub token: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, String>,
}

fn client_ip(req: &HttpRequest) -> Option<String> {
    req.peer_addr().map(|a| a.ip().to_string())
}

/// `POST /auth/verify`: exercises the auth pipeline end to end (§10 —
/// not a redefinition of the out-of-scope wire protocol, just enough
/// surface for the core to be driven over HTTP).
#[post("/auth/verify")]
pub async fn auth_verify(req: HttpRequest, state: web::Data<AppState>, body: web::Json<AuthVerifyRequest>) -> HttpResponse {
    let body = body.into_inner();
    let mut params = body.params;
    params.insert("TeamSlug".to_string(), body.team_slug.clone());

    let result = state
        .auth_pipeline
        .authenticate(AuthRequest {
            slug: body.team_slug,
            params,
            token: body.token,
            client_ip: client_ip(&req),
        })
        .await;

    match result.outcome {
        paygate_core::auth::AuthOutcome::Success { team } => HttpResponse::Ok().json(serde_json::json!({
            "authenticated": true,
            "teamSlug": team.slug,
        })),
        paygate_core::auth::AuthOutcome::Failure { kind, message } => HttpResponse::Unauthorized().json(serde_json::json!({
            "authenticated": false,
            "errorCode": kind.code(),
            "message": message,
        })),
    }
}

#[derive(Deserialize)]
pub struct InitPaymentRequest {
    pub id: String,
    pub team_slug: String,
    pub amount: i64,
    pub currency: String,
    pub idempotency_fingerprint: String,
    pub notification_url: Option<String>,
}

/// `POST /payments/init`: creates a new payment in `INIT` status.
#[post("/payments/init")]
pub async fn init_payment(state: web::Data<AppState>, body: web::Json<InitPaymentRequest>) -> HttpResponse {
    let body = body.into_inner();
    let payment = Payment::new_init(
        body.id.clone(),
        body.team_slug,
        body.amount,
        body.currency,
        body.idempotency_fingerprint,
        body.notification_url,
    );

    match state.payment_manager.create(payment).await {
        Ok(()) => HttpResponse::Created().json(serde_json::json!({ "id": body.id, "status": "INIT" })),
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": e.sanitized_message(),
            "errorCode": e.code(),
        })),
    }
}

#[derive(Deserialize)]
pub struct TransitionPaymentRequest {
    pub from: String,
    pub to: String,
    pub team_slug: String,
}

/// `POST /payments/{id}/transition`: drives the payment state manager.
#[post("/payments/{id}/transition")]
pub async fn transition_payment(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<TransitionPaymentRequest>,
) -> HttpResponse {
    let payment_id = path.into_inner();
    let body = body.into_inner();

    let (Some(from), Some(to)) = (PaymentStatus::from_wire(&body.from), PaymentStatus::from_wire(&body.to)) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "unknown status name",
        }));
    };

    let outcome = state
        .payment_manager
        .try_transition(TransitionRequest {
            payment_id,
            from,
            to,
            team_slug: body.team_slug,
            suppress_webhook: false,
        })
        .await;

    match outcome {
        paygate_core::payment::TransitionOutcome::Success => {
            HttpResponse::Ok().json(serde_json::json!({ "status": to.wire_name() }))
        }
        paygate_core::payment::TransitionOutcome::Rejected { reason, observed } => {
            HttpResponse::Conflict().json(serde_json::json!({
                "error": reason.sanitized_message(),
                "errorCode": reason.code(),
                "observedStatus": observed.map(|s| s.wire_name()),
            }))
        }
        paygate_core::payment::TransitionOutcome::Failed { reason } => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": reason.sanitized_message(),
                "errorCode": reason.code(),
            }))
        }
    }
}

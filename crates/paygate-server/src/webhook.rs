//! `reqwest`-based [`WebhookSender`] and webhook URL validation (§4.4),
//! grounded on `tempo-x402-facilitator::webhook`'s SSRF/HTTPS checks and
//! signed-POST pattern. The retry loop itself lives in
//! `paygate_core::webhook::WebhookDispatcher`; this sender performs a
//! single delivery attempt per call.

use async_trait::async_trait;
use paygate_core::error::GatewayError;
use paygate_core::webhook::{WebhookEnvelope, WebhookSender};

/// Warn (never fail startup) about webhook URLs that don't use HTTPS or
/// that target a private/loopback/internal host — the same advisory
/// checks `tempo-x402-facilitator::webhook::validate_webhook_urls`
/// performs.
pub fn validate_webhook_url(url_str: &str) {
    if !url_str.starts_with("https://") {
        tracing::warn!(
            url = %url_str,
            "webhook URL does not use HTTPS — payloads will be sent in cleartext"
        );
    }

    if let Ok(parsed) = url::Url::parse(url_str) {
        match parsed.host() {
            Some(url::Host::Ipv4(ip)) => {
                if ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified() {
                    tracing::warn!(
                        url = %url_str,
                        "webhook URL targets a private/loopback IP — potential SSRF risk"
                    );
                }
            }
            Some(url::Host::Domain(domain)) => {
                let d = domain.to_lowercase();
                if d == "localhost" || d.ends_with(".local") || d.ends_with(".internal") {
                    tracing::warn!(
                        url = %url_str,
                        "webhook URL targets localhost/local domain — potential SSRF risk"
                    );
                }
            }
            _ => {}
        }
    }
}

/// Build the `reqwest::Client` used for webhook delivery: redirects are
/// disabled so a compromised or misconfigured endpoint can't redirect
/// delivery to an internal host after the SSRF check above has run.
pub fn webhook_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap_or_default()
}

pub struct ReqwestWebhookSender {
    client: reqwest::Client,
}

impl ReqwestWebhookSender {
    pub fn new() -> Self {
        Self { client: webhook_client() }
    }
}

impl Default for ReqwestWebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookSender for ReqwestWebhookSender {
    async fn send(
        &self,
        url: &str,
        envelope: &WebhookEnvelope,
        signature: Option<&str>,
    ) -> Result<(), GatewayError> {
        let mut request = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(envelope);

        if let Some(sig) = signature {
            request = request.header("X-Webhook-Signature", sig);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::ExternalUnavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(GatewayError::ExternalUnavailable(format!(
                "webhook endpoint returned {}",
                response.status()
            )))
        }
    }
}

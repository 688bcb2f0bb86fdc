//! Hosted-checkout gateway over HTTPS.
//!
//! Sessions are created with `POST {base_url}/checkout_sessions`, authenticated
//! with the secret key as the basic-auth user. Amounts travel in minor units.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use super::{CheckoutSession, GatewayError, PaymentGateway, SessionRequest};

#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Serialize)]
struct SessionBody<'a> {
    reference_number: &'a str,
    line_items: Vec<LineItemBody<'a>>,
    amount: i64,
    currency: &'a str,
    success_url: &'a str,
    cancel_url: &'a str,
}

#[derive(Serialize)]
struct LineItemBody<'a> {
    name: &'a str,
    quantity: u32,
    amount: i64,
    currency: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    checkout_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), secret_key: secret_key.into() })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    #[instrument(skip(self, request), fields(reference = %request.reference, amount = %request.total_amount))]
    async fn create_checkout_session(&self, request: SessionRequest) -> Result<CheckoutSession, GatewayError> {
        request.validate()?;
        let body = SessionBody {
            reference_number: &request.reference,
            line_items: request.line_items.iter().map(|l| LineItemBody {
                name: &l.name, quantity: l.quantity, amount: l.amount.minor_units(), currency: &request.currency,
            }).collect(),
            amount: request.total_amount.minor_units(),
            currency: &request.currency,
            success_url: &request.success_url,
            cancel_url: &request.cancel_url,
        };
        let response = self.client
            .post(format!("{}/checkout_sessions", self.base_url))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected { status: status.as_u16(), body });
        }
        let session: SessionResponse = response.json().await.map_err(|e| GatewayError::Malformed(e.to_string()))?;
        debug!(session_id = %session.id, "checkout session created");
        Ok(CheckoutSession { session_id: session.id, checkout_url: session.checkout_url })
    }
}

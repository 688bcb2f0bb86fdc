//! In-process gateway for development and tests. Sessions are never paid
//! on their own; tests deliver the completion webhook themselves.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;
use super::{CheckoutSession, GatewayError, PaymentGateway, SessionRequest};

#[derive(Default)]
pub struct MockGateway {
    fail: AtomicBool,
    sessions: Mutex<Vec<(CheckoutSession, SessionRequest)>>,
}

impl MockGateway {
    pub fn new() -> Self { Self::default() }

    /// Makes every following call fail as if the provider rejected it.
    pub fn fail_requests(&self, fail: bool) { self.fail.store(fail, Ordering::SeqCst); }

    pub async fn sessions(&self) -> Vec<(CheckoutSession, SessionRequest)> { self.sessions.lock().await.clone() }

    pub async fn last_session(&self) -> Option<(CheckoutSession, SessionRequest)> { self.sessions.lock().await.last().cloned() }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout_session(&self, request: SessionRequest) -> Result<CheckoutSession, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected { status: 503, body: "mock gateway unavailable".into() });
        }
        request.validate()?;
        // Stands in for the provider round trip so concurrent callers interleave.
        tokio::task::yield_now().await;
        let session_id = format!("cs_mock_{}", Uuid::new_v4().simple());
        let session = CheckoutSession {
            checkout_url: format!("https://checkout.mock/{session_id}"),
            session_id,
        };
        info!(session_id = %session.session_id, amount = %request.total_amount, "mock checkout session created");
        self.sessions.lock().await.push((session.clone(), request));
        Ok(session)
    }
}

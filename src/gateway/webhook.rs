//! Gateway webhook payloads and signature checks.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout_session.completed";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: Option<String>,
    pub event_type: String,
    pub session_id: Option<String>,
}

impl WebhookEvent {
    /// Accepts `{"type", "data": {"session_id"}}` as well as the nested
    /// `{"data": {"object": {"id"}}}` shape some providers send.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let json: Value = serde_json::from_slice(payload)?;
        let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
        let data = json.get("data");
        Ok(Self {
            id: text(json.get("id")),
            event_type: text(json.get("type")).unwrap_or_default(),
            session_id: text(data.and_then(|d| d.get("session_id")))
                .or_else(|| text(data.and_then(|d| d.get("object")).and_then(|o| o.get("id")))),
        })
    }

    pub fn completed(session_id: impl Into<String>) -> Self {
        Self { id: None, event_type: CHECKOUT_SESSION_COMPLETED.into(), session_id: Some(session_id.into()) }
    }

    pub fn is_checkout_completed(&self) -> bool { self.event_type == CHECKOUT_SESSION_COMPLETED }
}

/// Verifies a `t=<unix>,v1=<hex hmac>` signature header over `"<t>.<payload>"`.
pub fn verify_signature(header: &str, payload: &[u8], secret: &str, tolerance_secs: u64, now: i64) -> bool {
    let (mut timestamp, mut signature) = (None, None);
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("v1", v)) => signature = Some(v),
            _ => {}
        }
    }
    let (Some(ts), Some(sig)) = (timestamp, signature) else { return false };
    let Ok(ts_value) = ts.parse::<i64>() else { return false };
    if now.abs_diff(ts_value) > tolerance_secs { return false; }
    let Ok(expected) = hex::decode(sig) else { return false };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

//! Request extractors: caller identity and validated JSON bodies.

use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::response::Response;
use axum::{async_trait, Json};
use serde::de::DeserializeOwned;
use validator::Validate;
use crate::domain::identity::{Caller, Role};
use crate::http::error::missing_identity;
use crate::LedgerError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty());
        let Some(user_id) = header(USER_ID_HEADER) else {
            return Err(missing_identity("missing x-user-id header"));
        };
        let role = match header(USER_ROLE_HEADER) {
            None => Role::User,
            Some(raw) => raw.parse::<Role>().map_err(|e| missing_identity(&e))?,
        };
        Ok(Caller { user_id: user_id.to_string(), role })
    }
}

/// JSON body that has passed its `validator` rules.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await
            .map_err(|e| LedgerError::Validation(e.body_text()))?;
        value.validate().map_err(|e| LedgerError::Validation(e.to_string()))?;
        Ok(Self(value))
    }
}

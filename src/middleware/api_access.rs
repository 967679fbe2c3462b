use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use subtle::ConstantTimeEq;

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::models::AppState;

/// Proof that the caller may use the CRM API.
///
/// When no token hash is configured the API is open and every request passes.
#[derive(Debug, Clone, Copy)]
pub struct ApiAccess;

impl FromRequestParts<AppState> for ApiAccess {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let Some(expected) = state.api_token_sha256.as_deref() else {
                return Ok(ApiAccess);
            };

            // Extract Authorization: Bearer <token>
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::missing_token())?;

            let presented = hash_access_token(authz.token());
            let matches: bool = presented.as_bytes().ct_eq(expected.as_bytes()).into();
            if !matches {
                tracing::warn!("rejected request with invalid API token");
                return Err(ApiError::missing_token());
            }

            Ok(ApiAccess)
        }
    }
}

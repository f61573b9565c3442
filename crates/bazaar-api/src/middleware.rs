use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::debug;

use bazaar_types::api::Principal;

use crate::auth::AppState;
use crate::error::ApiError;

/// Who is calling. Resolved once per request by [`resolve_caller`] and handed
/// to every operation explicitly; `None` is an anonymous caller.
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<Principal>);

impl Caller {
    pub fn email(&self) -> Option<&str> {
        self.0.as_ref().map(|p| p.email.as_str())
    }

    /// Email a new record is created under. A signed-in caller's verified
    /// email always wins and a body value naming someone else is rejected;
    /// anonymous callers must supply one themselves.
    pub fn acting_email(&self, field: &str, supplied: Option<String>) -> Result<Option<String>, ApiError> {
        let supplied = supplied.filter(|v| !v.trim().is_empty());
        match (self.email(), supplied) {
            (Some(verified), Some(claimed)) if !claimed.trim().eq_ignore_ascii_case(verified) => {
                Err(ApiError::invalid(format!("{} must match the signed-in user.", field)))
            }
            (Some(verified), _) => Ok(Some(verified.to_string())),
            (None, supplied) => Ok(supplied),
        }
    }
}

/// Verifies an optional bearer token and stores the resulting [`Caller`] in
/// the request extensions. A missing header is anonymous; a header that is
/// present but invalid is rejected.
pub async fn resolve_caller(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_try_get::<Authorization<Bearer>>()
        .map_err(|_| ApiError::Unauthorized("Malformed Authorization header.".into()))?;

    let caller = match bearer {
        Some(auth) => {
            let principal = state.auth.verify(auth.token())?;
            debug!(email = %principal.email, "Authenticated caller");
            Caller(Some(principal))
        }
        None => Caller::default(),
    };

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::{debug, error};

use bazaar_db::Database;
use bazaar_types::api::{Claims, Principal};

use crate::error::ApiError;
use crate::storage::BlobStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub blobs: BlobStore,
    pub auth: AuthConfig,
}

/// Verification settings for session tokens issued by the auth provider.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Expected `aud` claim. `None` skips the audience check.
    pub audience: Option<String>,
}

impl AuthConfig {
    pub fn verify(&self, token: &str) -> Result<Principal, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            debug!("Rejected session token: {}", e);
            ApiError::Unauthorized("Invalid or expired session token.".into())
        })?;

        let claims = token_data.claims;
        let email = claims
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Session token carries no email.".into()))?;

        Ok(Principal {
            user_id: claims.sub,
            email,
        })
    }
}

/// Runs a blocking storage call off the async runtime and maps its failure to
/// `ApiError::Storage`. `op` names the operation in logs and in the message
/// returned to the caller.
pub(crate) async fn with_db<F, T>(state: &AppState, op: &'static str, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!(op, "spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(|e| {
            error!(op, error = %e, "storage call failed");
            ApiError::Storage(format!("Failed to {op}."))
        })
}

/**
 * Collaboration Tokens
 *
 * Verification of the short-lived JWTs clients present when opening a
 * collaboration connection. Tokens are issued elsewhere with the shared
 * HMAC secret; this module only checks them.
 */

use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::error::CollabError;

/// Token purpose accepted on collaboration connections
pub const COLLAB_TOKEN_TYPE: &str = "collab";

/// JWT claims of a collaboration token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollabClaims {
    /// User ID
    pub sub: String,
    /// Workspace the token was issued for
    #[serde(rename = "workspaceId")]
    pub workspace_id: String,
    /// Token purpose, must be `collab`
    #[serde(rename = "type")]
    pub token_type: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

/// Subject of a verified token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedToken {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
}

/// HS256 verifier for collaboration tokens
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier for the given HMAC secret
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verify signature, expiry and purpose of a token
    ///
    /// # Returns
    ///
    /// The user and workspace the token was issued for
    ///
    /// # Errors
    ///
    /// `Unauthorized` for bad signatures, expired tokens, tokens issued for
    /// another purpose and malformed subject ids.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, CollabError> {
        let claims = decode::<CollabClaims>(token, &self.key, &self.validation)
            .map_err(|e| CollabError::unauthorized(format!("Token verification failed: {}", e)))?
            .claims;

        if claims.token_type != COLLAB_TOKEN_TYPE {
            return Err(CollabError::unauthorized(format!(
                "Token type '{}' cannot open collaboration sessions",
                claims.token_type
            )));
        }

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| CollabError::unauthorized(format!("Invalid user ID in token: {}", e)))?;
        let workspace_id = Uuid::parse_str(&claims.workspace_id)
            .map_err(|e| CollabError::unauthorized(format!("Invalid workspace ID in token: {}", e)))?;

        Ok(VerifiedToken { user_id, workspace_id })
    }
}

/// Token from an `Authorization: Bearer` header, if present
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

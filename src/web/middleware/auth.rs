//! JWT authentication middleware.

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{Caller, Role};
use crate::web::error::ApiError;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (owner ID).
    pub sub: String,
    /// Caller role (`member` or `admin`).
    pub role: String,
    /// Issued at timestamp.
    pub iat: u64,
    /// Expiration timestamp.
    pub exp: u64,
    /// JWT ID (unique identifier).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl JwtClaims {
    /// The caller these claims identify.
    pub fn caller(&self) -> Result<Caller, ApiError> {
        if self.sub.trim().is_empty() {
            return Err(ApiError::unauthorized("Token has no subject"));
        }
        let role: Role = self
            .role
            .parse()
            .map_err(|_| ApiError::unauthorized("Token carries an unknown role"))?;
        Ok(Caller {
            user_id: self.sub.clone(),
            role,
        })
    }
}

/// Application state for JWT authentication.
#[derive(Clone)]
pub struct JwtState {
    /// Decoding key for JWT verification.
    pub decoding_key: DecodingKey,
    /// Validation settings.
    pub validation: Validation,
}

impl JwtState {
    /// Create a new JWT state from a secret key.
    pub fn new(secret: &str) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            decoding_key,
            validation,
        }
    }
}

/// Bearer token from the Authorization header, or the `token` query
/// parameter for clients that cannot set headers (EventSource, links).
fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(auth_header) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        return auth_header.strip_prefix("Bearer ").map(|t| t.trim().to_string());
    }

    parts.uri.query().unwrap_or("").split('&').find_map(|pair| {
        let mut kv = pair.splitn(2, '=');
        let key = kv.next()?;
        let value = kv.next()?;
        if key == "token" {
            urlencoding::decode(value).ok().map(|s| s.into_owned())
        } else {
            None
        }
    })
}

/// Extractor for authenticated callers.
///
/// Rejects the request with 401 unless a valid bearer token is present.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Caller);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let token =
                extract_token(parts).ok_or_else(|| ApiError::unauthorized("Missing authorization"))?;

            // Set by the jwt_auth middleware
            let jwt_state = parts
                .extensions
                .get::<Arc<JwtState>>()
                .ok_or_else(|| ApiError::internal("JWT state not configured"))?;

            let token_data =
                decode::<JwtClaims>(&token, &jwt_state.decoding_key, &jwt_state.validation)
                    .map_err(|e| {
                        tracing::debug!("JWT validation failed: {}", e);
                        ApiError::unauthorized("Invalid or expired token")
                    })?;

            Ok(AuthUser(token_data.claims.caller()?))
        })
    }
}

/// Middleware function to inject JWT state into request extensions.
pub async fn jwt_auth(
    jwt_state: Arc<JwtState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(jwt_state);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_test_token(secret: &str, claims: &JwtClaims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(sub: &str, role: &str, exp_offset: i64) -> JwtClaims {
        let now = chrono::Utc::now().timestamp();
        JwtClaims {
            sub: sub.to_string(),
            role: role.to_string(),
            iat: now as u64,
            exp: (now + exp_offset) as u64,
            jti: Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    fn parts_for(uri: &str, auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_create_and_verify_token() {
        let secret = "test-secret";
        let state = JwtState::new(secret);
        let token = create_test_token(secret, &claims("u1", "member", 3600));

        let decoded = decode::<JwtClaims>(&token, &state.decoding_key, &state.validation).unwrap();
        assert_eq!(decoded.claims.sub, "u1");
        assert_eq!(decoded.claims.role, "member");
    }

    #[test]
    fn test_expired_token() {
        let secret = "test-secret";
        let state = JwtState::new(secret);
        let token = create_test_token(secret, &claims("u1", "member", -3600));

        let result = decode::<JwtClaims>(&token, &state.decoding_key, &state.validation);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_secret() {
        let token = create_test_token("secret1", &claims("u1", "member", 3600));
        let state = JwtState::new("secret2");

        let result = decode::<JwtClaims>(&token, &state.decoding_key, &state.validation);
        assert!(result.is_err());
    }

    #[test]
    fn test_claims_to_caller() {
        let caller = claims("u1", "admin", 60).caller().unwrap();
        assert_eq!(caller.user_id, "u1");
        assert!(caller.is_admin());

        assert!(!claims("u2", "member", 60).caller().unwrap().is_admin());
        assert!(claims("u3", "root", 60).caller().is_err());
        assert!(claims(" ", "member", 60).caller().is_err());
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(
            extract_token(&parts_for("/api/files", Some("Bearer abc"))).as_deref(),
            Some("abc")
        );
        assert_eq!(
            extract_token(&parts_for("/api/files/events?token=a%2Eb", None)).as_deref(),
            Some("a.b")
        );
        assert_eq!(extract_token(&parts_for("/api/files", Some("Basic abc"))), None);
        assert_eq!(extract_token(&parts_for("/api/files", None)), None);
    }
}

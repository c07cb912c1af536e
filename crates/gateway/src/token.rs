//! Identity token codec.
//!
//! Issues HS256-signed JWTs carrying a fixed claims schema and verifies them.
//! Verification accepts only the HMAC family, applies no clock leeway, and
//! rejects any payload that does not match [`Claims`] exactly.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token lifetime in seconds (24 hours).
pub const TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Signing algorithms accepted by [`TokenService::verify`].
const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Claims embedded in every identity token.
///
/// Wire names follow the identity service's vocabulary (`user_id`,
/// `username`); `iat` and `exp` are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claims {
    #[serde(rename = "user_id")]
    pub subject_id: String,
    #[serde(rename = "username")]
    pub display_name: String,
    pub role: String,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

/// Reasons a token could not be issued or verified.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signature does not match")]
    InvalidSignature,

    #[error("unsupported signing algorithm")]
    UnsupportedAlgorithm,

    #[error("token has expired")]
    Expired,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Signs and verifies identity tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a token valid for [`TOKEN_LIFETIME_SECS`] from now.
    pub fn issue(
        &self,
        subject_id: &str,
        display_name: &str,
        role: &str,
    ) -> Result<String, TokenError> {
        self.issue_at(subject_id, display_name, role, chrono::Utc::now().timestamp())
    }

    pub(crate) fn issue_at(
        &self,
        subject_id: &str,
        display_name: &str,
        role: &str,
        now: i64,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            subject_id: subject_id.to_string(),
            display_name: display_name.to_string(),
            role: role.to_string(),
            issued_at: now,
            expires_at: now + TOKEN_LIFETIME_SECS,
        };

        let header = Header::new(Algorithm::HS256);
        jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(TokenError::Signing)
    }

    /// Verify a token and return its claims unchanged.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    pub(crate) fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let header = jsonwebtoken::decode_header(token).map_err(classify)?;
        if !HMAC_ALGORITHMS.contains(&header.alg) {
            return Err(TokenError::UnsupportedAlgorithm);
        }

        // Expiry is checked below against `now` with no leeway.
        let mut validation = Validation::new(header.alg);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iat"]);

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(classify)?
            .claims;

        if claims.expires_at <= claims.issued_at {
            return Err(TokenError::Malformed(
                "expiry does not follow issue time".to_string(),
            ));
        }
        if claims.expires_at <= now {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            TokenError::UnsupportedAlgorithm
        }
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed(err.to_string()),
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::json;

    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn service() -> TokenService {
        TokenService::new(SECRET)
    }

    fn sign_raw(payload: &serde_json::Value, alg: Algorithm, secret: &[u8]) -> String {
        jsonwebtoken::encode(&Header::new(alg), payload, &EncodingKey::from_secret(secret))
            .unwrap()
    }

    #[test]
    fn test_issue_then_verify_round_trips_identity() {
        let tokens = service();
        let token = tokens.issue("u-1", "alice", "admin").unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.subject_id, "u-1");
        assert_eq!(claims.display_name, "alice");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.expires_at - claims.issued_at, TOKEN_LIFETIME_SECS);
    }

    #[test]
    fn test_token_payload_uses_wire_names() {
        let token = service().issue_at("u-1", "alice", "user", 1_000).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let decoded: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();

        assert_eq!(
            decoded,
            json!({
                "user_id": "u-1",
                "username": "alice",
                "role": "user",
                "iat": 1_000,
                "exp": 1_000 + TOKEN_LIFETIME_SECS,
            })
        );
        assert!(!token.contains("0123456789abcdef"));
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let token = TokenService::new(b"some-other-secret-entirely-32byt")
            .issue("u-1", "alice", "user")
            .unwrap();

        assert!(matches!(
            service().verify(&token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = service();
        let issued = 1_700_000_000;
        let token = tokens.issue_at("u-1", "alice", "user", issued).unwrap();

        let expiry = issued + TOKEN_LIFETIME_SECS;
        assert!(tokens.verify_at(&token, expiry - 1).is_ok());
        assert!(matches!(
            tokens.verify_at(&token, expiry),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            tokens.verify_at(&token, expiry + 3600),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_other_hmac_algorithms_accepted() {
        let now = chrono::Utc::now().timestamp();
        let payload = json!({
            "user_id": "u-2", "username": "bob", "role": "user",
            "iat": now, "exp": now + 60,
        });

        for alg in [Algorithm::HS384, Algorithm::HS512] {
            let claims = service().verify(&sign_raw(&payload, alg, SECRET)).unwrap();
            assert_eq!(claims.display_name, "bob");
        }
    }

    #[test]
    fn test_non_hmac_algorithm_rejected() {
        let now = chrono::Utc::now().timestamp();
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            json!({
                "user_id": "u-1", "username": "mallory", "role": "admin",
                "iat": now, "exp": now + 60,
            })
            .to_string(),
        );
        let token = format!("{header}.{payload}.c2lnbmF0dXJl");

        assert!(matches!(
            service().verify(&token),
            Err(TokenError::UnsupportedAlgorithm)
        ));
    }

    #[test]
    fn test_unsigned_token_rejected() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(r#"{"user_id":"u-1"}"#);

        assert!(service().verify(&format!("{header}.{payload}.")).is_err());
    }

    #[test]
    fn test_unknown_claim_rejected() {
        let now = chrono::Utc::now().timestamp();
        let payload = json!({
            "user_id": "u-1", "username": "alice", "role": "user",
            "iat": now, "exp": now + 60, "admin": true,
        });

        assert!(matches!(
            service().verify(&sign_raw(&payload, Algorithm::HS256, SECRET)),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_claim_rejected() {
        let now = chrono::Utc::now().timestamp();
        let payload = json!({ "user_id": "u-1", "username": "alice", "exp": now + 60, "iat": now });

        assert!(matches!(
            service().verify(&sign_raw(&payload, Algorithm::HS256, SECRET)),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_expiry_before_issue_rejected() {
        let now = chrono::Utc::now().timestamp();
        let payload = json!({
            "user_id": "u-1", "username": "alice", "role": "user",
            "iat": now + 600, "exp": now + 300,
        });

        assert!(matches!(
            service().verify(&sign_raw(&payload, Algorithm::HS256, SECRET)),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        for token in ["", "not-a-jwt", "a.b.c", "a.b"] {
            assert!(service().verify(token).is_err(), "accepted {token:?}");
        }
    }
}

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const EMAIL_CONFIRM_SALT: &str = "email-confirm";
pub const CONFIRMATION_MAX_AGE_SECS: i64 = 3600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token expired ({age}s old)")]
    Expired { age: i64 },
}

/// Signs short string values into URL-safe, timestamped tokens.
///
/// Layout: `base64(value).issued_at.base64(hmac)`, where the HMAC covers the salt and both
/// leading segments. Tokens signed under one salt never verify under another.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    salt: &'static str,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, salt: &'static str) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            salt,
        }
    }

    pub fn sign(&self, value: &str) -> String {
        self.sign_at(value, Utc::now().timestamp())
    }

    pub fn sign_at(&self, value: &str, issued_at: i64) -> String {
        let signed_part = format!("{}.{}", URL_SAFE_NO_PAD.encode(value), issued_at);
        let signature = self.mac(&signed_part).finalize().into_bytes();
        format!("{signed_part}.{}", URL_SAFE_NO_PAD.encode(signature))
    }

    pub fn verify(&self, token: &str, max_age_secs: i64) -> Result<String, TokenError> {
        self.verify_at(token, max_age_secs, Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        token: &str,
        max_age_secs: i64,
        now: i64,
    ) -> Result<String, TokenError> {
        let (signed_part, signature_b64) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        let (value_b64, issued_at) = signed_part.split_once('.').ok_or(TokenError::Malformed)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;
        self.mac(signed_part)
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let issued_at: i64 = issued_at.parse().map_err(|_| TokenError::Malformed)?;
        let age = now - issued_at;
        if !(0..=max_age_secs).contains(&age) {
            return Err(TokenError::Expired { age });
        }

        let value = URL_SAFE_NO_PAD
            .decode(value_b64)
            .map_err(|_| TokenError::Malformed)?;
        String::from_utf8(value).map_err(|_| TokenError::Malformed)
    }

    fn mac(&self, signed_part: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(self.salt.as_bytes());
        mac.update(b".");
        mac.update(signed_part.as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-with-enough-entropy-000";

    fn signer() -> TokenSigner {
        TokenSigner::new(SECRET, EMAIL_CONFIRM_SALT)
    }

    #[test]
    fn verifies_fresh_token() {
        let token = signer().sign_at("alice@example.com", 1_000);
        assert_eq!(
            signer().verify_at(&token, CONFIRMATION_MAX_AGE_SECS, 1_000 + 3_599),
            Ok("alice@example.com".to_string())
        );
    }

    #[test]
    fn token_at_exact_window_edge_is_accepted() {
        let token = signer().sign_at("alice@example.com", 1_000);
        assert!(signer().verify_at(&token, 3_600, 4_600).is_ok());
    }

    #[test]
    fn rejects_expired_token() {
        let token = signer().sign_at("alice@example.com", 1_000);
        assert_eq!(
            signer().verify_at(&token, CONFIRMATION_MAX_AGE_SECS, 1_000 + 3_601),
            Err(TokenError::Expired { age: 3_601 })
        );
    }

    #[test]
    fn rejects_token_issued_in_the_future() {
        let token = signer().sign_at("alice@example.com", 5_000);
        assert_eq!(
            signer().verify_at(&token, CONFIRMATION_MAX_AGE_SECS, 4_999),
            Err(TokenError::Expired { age: -1 })
        );
    }

    #[test]
    fn rejects_token_from_other_salt() {
        let other = TokenSigner::new(SECRET, "password-reset");
        let token = other.sign_at("alice@example.com", 1_000);
        assert_eq!(
            signer().verify_at(&token, CONFIRMATION_MAX_AGE_SECS, 1_001),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn rejects_token_from_other_secret() {
        let other = TokenSigner::new("another-secret-key-with-enough-entropy", EMAIL_CONFIRM_SALT);
        let token = other.sign_at("alice@example.com", 1_000);
        assert_eq!(
            signer().verify_at(&token, CONFIRMATION_MAX_AGE_SECS, 1_001),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn rejects_tampered_value() {
        let token = signer().sign_at("alice@example.com", 1_000);
        let (_, rest) = token.split_once('.').expect("segments");
        let forged = format!("{}.{}", URL_SAFE_NO_PAD.encode("mallory@example.com"), rest);
        assert_eq!(
            signer().verify_at(&forged, CONFIRMATION_MAX_AGE_SECS, 1_001),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            signer().verify_at("not-a-token", CONFIRMATION_MAX_AGE_SECS, 0),
            Err(TokenError::Malformed)
        );
        assert_eq!(
            signer().verify_at("a.b.!!!", CONFIRMATION_MAX_AGE_SECS, 0),
            Err(TokenError::Malformed)
        );
    }
}

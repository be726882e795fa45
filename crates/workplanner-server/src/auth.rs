//! Bearer-token authorization shared by the HTTP and RPC front ends.

/// Why a call was rejected. Every variant maps to "unauthenticated".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no API key configured; all calls are rejected")]
    Unconfigured,
    #[error("missing Authorization: Bearer <token>")]
    MissingCredential,
    #[error("invalid token")]
    InvalidCredential,
}

/// Decides whether a presented bearer token grants access.
pub trait CredentialVerifier: Send + Sync {
    /// `token` is `None` when the caller sent no credential at all.
    fn verify(&self, token: Option<&str>) -> Result<(), AuthError>;
}

/// Compares against one shared secret. With no secret configured every call
/// is rejected.
#[derive(Clone)]
pub struct StaticTokenVerifier {
    expected: Option<String>,
}

impl StaticTokenVerifier {
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected.filter(|key| !key.trim().is_empty()),
        }
    }
}

impl std::fmt::Debug for StaticTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenVerifier")
            .field("configured", &self.expected.is_some())
            .finish()
    }
}

impl CredentialVerifier for StaticTokenVerifier {
    fn verify(&self, token: Option<&str>) -> Result<(), AuthError> {
        let expected = self.expected.as_deref().ok_or(AuthError::Unconfigured)?;
        let token = token.ok_or(AuthError::MissingCredential)?;
        if constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredential)
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Token of an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
}

/// Checks a raw `Authorization` value. A value that is not a bearer
/// credential counts as a wrong token.
pub fn authorize(verifier: &dyn CredentialVerifier, header: Option<&str>) -> Result<(), AuthError> {
    let token = header.map(|h| bearer_token(h).unwrap_or(""));
    verifier.verify(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(key: Option<&str>) -> StaticTokenVerifier {
        StaticTokenVerifier::new(key.map(str::to_string))
    }

    #[test]
    fn fails_closed_without_a_configured_key() {
        for key in [None, Some(""), Some("  ")] {
            let v = verifier(key);
            assert_eq!(authorize(&v, Some("Bearer anything")), Err(AuthError::Unconfigured));
            assert_eq!(authorize(&v, None), Err(AuthError::Unconfigured));
        }
    }

    #[test]
    fn requires_an_exact_bearer_match() {
        let v = verifier(Some("s3cret"));
        assert_eq!(authorize(&v, Some("Bearer s3cret")), Ok(()));
        assert_eq!(authorize(&v, Some("bearer s3cret")), Ok(()));
        assert_eq!(authorize(&v, None), Err(AuthError::MissingCredential));
        assert_eq!(authorize(&v, Some("Bearer s3cre")), Err(AuthError::InvalidCredential));
        assert_eq!(authorize(&v, Some("Bearer S3CRET")), Err(AuthError::InvalidCredential));
        assert_eq!(authorize(&v, Some("Basic s3cret")), Err(AuthError::InvalidCredential));
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let v = verifier(Some("s3cret"));
        assert!(!format!("{v:?}").contains("s3cret"));
    }

    proptest::proptest! {
        #[test]
        fn only_the_configured_token_is_accepted(
            key in "[a-z0-9]{1,16}",
            candidate in "[a-z0-9]{0,16}",
        ) {
            let v = verifier(Some(&key));
            let header = format!("Bearer {candidate}");
            proptest::prop_assert_eq!(authorize(&v, Some(&header)).is_ok(), candidate == key);
        }
    }
}

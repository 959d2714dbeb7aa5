//! Credentials for provider requests.
//!
//! Authentication itself is delegated: a [`CredentialProvider`] only hands
//! out the `Authorization` header value for the next request.

use crate::error::FetchError;

/// Source of provider request credentials.
pub trait CredentialProvider: Send + Sync {
    /// Header value for the `Authorization` header.
    fn authorization(&self) -> Result<String, FetchError>;
}

/// Static OAuth bearer token.
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

impl CredentialProvider for BearerToken {
    fn authorization(&self) -> Result<String, FetchError> {
        if self.0.trim().is_empty() {
            return Err(FetchError::Credentials("empty bearer token".to_owned()));
        }
        Ok(format!("Bearer {}", self.0.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_header() {
        let token = BearerToken::new(" abc \n");
        assert_eq!(token.authorization().unwrap(), "Bearer abc");
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = BearerToken::new("").authorization().unwrap_err();
        assert!(matches!(err, FetchError::Credentials(_)));
    }

    #[test]
    fn test_debug_hides_token() {
        assert_eq!(format!("{:?}", BearerToken::new("secret")), "BearerToken(***)");
    }
}

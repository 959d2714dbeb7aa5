//! `${VAR}` and `${VAR:-default}` expansion for string settings.

use crate::ConfigError;

/// Expand environment variable references in `value`.
///
/// Only the braced form is recognized; a lone `$` is kept as-is so that
/// URLs and tokens containing dollar signs survive untouched.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |name| -> Result<Option<String>, MissingVar> {
        std::env::var(name)
            .map(Some)
            .map_err(|_| MissingVar(name.to_owned()))
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.0),
    })
}

/// Expand an optional setting, leaving `None` alone.
pub(crate) fn expand_opt(
    value: Option<&String>,
    field: &str,
) -> Result<Option<String>, ConfigError> {
    value.map(|v| expand_env(v, field)).transpose()
}

struct MissingVar(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_token_from_env() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("TUT_TEST_TOKEN", "abc123");
        }
        let result = expand_env("${TUT_TEST_TOKEN}", "provider.token").unwrap();
        assert_eq!(result, "abc123");
        unsafe {
            std::env::remove_var("TUT_TEST_TOKEN");
        }
    }

    #[test]
    fn test_expand_default_when_unset() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("TUT_TEST_UNSET_HOST");
        }
        let result = expand_env("${TUT_TEST_UNSET_HOST:-localhost}", "server.host").unwrap();
        assert_eq!(result, "localhost");
    }

    #[test]
    fn test_expand_embedded_in_url() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("TUT_TEST_API_HOST", "drive.example.com");
        }
        let result = expand_env("https://${TUT_TEST_API_HOST}/v3", "provider.api_base").unwrap();
        assert_eq!(result, "https://drive.example.com/v3");
        unsafe {
            std::env::remove_var("TUT_TEST_API_HOST");
        }
    }

    #[test]
    fn test_missing_var_names_field_and_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("TUT_TEST_MISSING");
        }
        let err = expand_env("${TUT_TEST_MISSING}", "provider.token").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        let message = err.to_string();
        assert!(message.contains("TUT_TEST_MISSING"));
        assert!(message.contains("provider.token"));
    }

    #[test]
    fn test_plain_dollar_is_literal() {
        let result = expand_env("https://example.com/$path", "provider.api_base").unwrap();
        assert_eq!(result, "https://example.com/$path");
    }

    #[test]
    fn test_expand_opt_none() {
        assert_eq!(expand_opt(None, "provider.token").unwrap(), None);
    }
}

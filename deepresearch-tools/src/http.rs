//! Shared HTTP plumbing for the collaborators: client construction, API key
//! lookup, and mapping of transport and status failures onto
//! [`CollaboratorError`].

use deepresearch_core::error::{CollaboratorError, ConfigError};
use std::time::Duration;
use tracing::debug;

pub(crate) const USER_AGENT: &str = concat!("DeepResearch/", env!("CARGO_PKG_VERSION"));

/// Build a client with the given timeout and at most five redirects.
pub(crate) fn client(timeout_secs: u64) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| ConfigError::Invalid {
            message: format!("Failed to create HTTP client: {e}"),
        })
}

/// Read an API key from the environment. Empty values count as missing.
pub(crate) fn api_key(var: &str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ConfigError::EnvVarMissing {
            var: var.to_string(),
        }),
    }
}

/// Map a non-success HTTP status to a collaborator error.
///
/// 402 and auth failures are permanent; 408, 429 and 5xx are transient.
pub(crate) fn classify_status(collaborator: &str, status: u16, body: &str) -> CollaboratorError {
    let collaborator = collaborator.to_string();
    match status {
        401 | 403 => {
            debug!(body = %body, "Authentication failed");
            CollaboratorError::AuthFailed {
                collaborator,
                message: format!("HTTP {status}"),
            }
        }
        402 => CollaboratorError::InsufficientBalance { collaborator },
        429 => CollaboratorError::RateLimited {
            collaborator,
            retry_after_secs: 5,
        },
        408 => CollaboratorError::Timeout {
            collaborator,
            timeout_secs: 0,
        },
        code if code >= 500 => CollaboratorError::Unavailable {
            collaborator,
            message: format!("HTTP {code}: {}", body.chars().take(300).collect::<String>()),
        },
        code => CollaboratorError::InvalidResponse {
            collaborator,
            message: format!("HTTP {code}: {}", body.chars().take(300).collect::<String>()),
        },
    }
}

/// Map a transport failure (connect, timeout, body read).
pub(crate) fn classify_transport(
    collaborator: &str,
    timeout_secs: u64,
    err: reqwest::Error,
) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout {
            collaborator: collaborator.to_string(),
            timeout_secs,
        }
    } else {
        CollaboratorError::Unavailable {
            collaborator: collaborator.to_string(),
            message: err.to_string(),
        }
    }
}

pub(crate) fn invalid_response(collaborator: &str, message: impl Into<String>) -> CollaboratorError {
    CollaboratorError::InvalidResponse {
        collaborator: collaborator.to_string(),
        message: message.into(),
    }
}

/// Some services report failures in a `code` field of a 200 body.
pub(crate) fn body_status(body: &serde_json::Value) -> Option<u16> {
    body.get("code")
        .and_then(|c| c.as_u64())
        .and_then(|c| u16::try_from(c).ok())
        .filter(|c| *c >= 400)
}

/// Send a request and return the parsed JSON body, classifying failures.
pub(crate) async fn send_json(
    collaborator: &str,
    timeout_secs: u64,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, CollaboratorError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(collaborator, timeout_secs, e))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| classify_transport(collaborator, timeout_secs, e))?;
    if !status.is_success() {
        return Err(classify_status(collaborator, status.as_u16(), &text));
    }
    let body: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| invalid_response(collaborator, format!("malformed JSON: {e}")))?;
    if let Some(code) = body_status(&body) {
        return Err(classify_status(collaborator, code, &text));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepresearch_core::retry::Transient;

    #[test]
    fn test_classify_status_permanent_and_transient() {
        assert!(matches!(
            classify_status("jina", 402, ""),
            CollaboratorError::InsufficientBalance { .. }
        ));
        assert!(!classify_status("jina", 402, "").is_transient());
        assert!(!classify_status("jina", 401, "").is_transient());
        assert!(!classify_status("jina", 404, "").is_transient());
        assert!(classify_status("jina", 429, "").is_transient());
        assert!(classify_status("jina", 503, "busy").is_transient());
        assert!(classify_status("jina", 408, "").is_transient());
    }

    #[test]
    fn test_body_status() {
        assert_eq!(body_status(&serde_json::json!({"code": 402})), Some(402));
        assert_eq!(body_status(&serde_json::json!({"code": 200})), None);
        assert_eq!(body_status(&serde_json::json!({"data": []})), None);
    }

    #[test]
    fn test_api_key_missing() {
        let err = api_key("DEEPRESEARCH_TEST_DEFINITELY_UNSET").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarMissing { .. }));
    }

    #[test]
    fn test_client_builds() {
        assert!(client(5).is_ok());
    }
}

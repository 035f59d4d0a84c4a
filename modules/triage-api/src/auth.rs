use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts, http::StatusCode};
use tracing::{error, warn};

use crate::error::ApiError;
use crate::AppState;

/// Header the authenticating proxy sets to the signed-in user's email.
pub const EMAIL_HEADER: &str = "oidc-claim-user-profile-email";

/// Proof that the caller may write. Extract this in every mutating handler.
#[derive(Debug)]
pub struct WriteAccess {
    /// `None` when auth is skipped.
    pub email: Option<String>,
}

impl FromRequestParts<Arc<AppState>> for WriteAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty());

        check_write_access(state.skip_auth, state.write_allowlist.as_deref(), email)
    }
}

pub fn check_write_access(
    skip_auth: bool,
    allowlist: Option<&[String]>,
    email: Option<&str>,
) -> Result<WriteAccess, ApiError> {
    if skip_auth {
        return Ok(WriteAccess { email: None });
    }

    let Some(email) = email else {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized"));
    };

    let Some(allowlist) = allowlist else {
        error!("MOZLDAP_STATE_ACCESS was not set, all authenticated writes will fail");
        return Err(ApiError::new(StatusCode::FORBIDDEN, "user not allowed"));
    };

    if allowlist.iter().any(|allowed| allowed == email) {
        Ok(WriteAccess {
            email: Some(email.to_string()),
        })
    } else {
        warn!(email, "Write refused for user outside the allowlist");
        Err(ApiError::new(StatusCode::FORBIDDEN, "user not allowed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist() -> Vec<String> {
        vec!["triager@example.com".to_string(), "lead@example.com".to_string()]
    }

    #[test]
    fn skip_auth_allows_anonymous_writes() {
        let access = check_write_access(true, None, None).unwrap();
        assert!(access.email.is_none());
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let list = allowlist();
        let err = check_write_access(false, Some(&list), None).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "unauthorized");
    }

    #[test]
    fn unlisted_user_is_forbidden() {
        let list = allowlist();
        let err = check_write_access(false, Some(&list), Some("someone@example.com")).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.message, "user not allowed");
    }

    #[test]
    fn unset_allowlist_refuses_everyone() {
        let err = check_write_access(false, None, Some("triager@example.com")).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn listed_user_may_write() {
        let list = allowlist();
        let access = check_write_access(false, Some(&list), Some("lead@example.com")).unwrap();
        assert_eq!(access.email.as_deref(), Some("lead@example.com"));
    }

    #[test]
    fn matching_is_exact() {
        let list = allowlist();
        assert!(check_write_access(false, Some(&list), Some("Triager@example.com")).is_err());
    }
}

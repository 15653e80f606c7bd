//! Error kinds raised inside a single job cycle.
//!
//! Every variant is caught at the cycle boundary and turned into one
//! user-visible notification; none of them reach the scheduler.

use thiserror::Error;

/// Failure to establish a forum session.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login rejected: {0}")]
    BadCredentials(String),

    #[error("network failure during login: {0}")]
    Network(String),

    #[error("missing required token: {0}")]
    MissingToken(String),
}

impl AuthError {
    pub fn network(e: impl std::fmt::Display) -> Self {
        Self::Network(e.to_string())
    }
}

/// The remote operation did not succeed within the retry budget.
#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempt(s): {reason}")]
pub struct FetchError {
    pub operation: String,
    pub attempts: u32,
    pub reason: String,
}

/// The remote answered, but not in a shape we understand. Retried like
/// any other failed attempt.
#[derive(Debug, Error)]
#[error("unexpected response: {0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("configuration incomplete: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("state store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl CycleError {
    /// Plain-language name of the failure category, used as notification headline.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "Configuration missing",
            Self::Auth(AuthError::BadCredentials(_)) => "Login rejected",
            Self::Auth(AuthError::Network(_)) => "Forum unreachable during login",
            Self::Auth(AuthError::MissingToken(_)) => "Login token missing",
            Self::Fetch(_) => "Request failed after retries",
            Self::Store(_) => "Local state could not be saved",
        }
    }

    /// Suggested remediation lines for the failure notification.
    pub fn hints(&self) -> &'static [&'static str] {
        match self {
            Self::Config(_) => &["Fill in the missing settings in the config file"],
            Self::Auth(AuthError::BadCredentials(_)) => &[
                "Check that the credentials or cookie are still valid",
                "Log in manually to see whether a captcha is required",
            ],
            Self::Auth(AuthError::Network(_)) | Self::Fetch(_) => &[
                "Confirm the site is reachable",
                "Check the proxy settings",
            ],
            Self::Auth(AuthError::MissingToken(_)) => &[
                "Refresh the cookie by logging in again",
                "The site layout may have changed",
            ],
            Self::Store(_) => &["Check free disk space and permissions of the state directory"],
        }
    }
}

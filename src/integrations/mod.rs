pub mod cookies;
pub mod discuz;
pub mod flarum;

use crate::config::HttpConfig;
use crate::error::ParseError;
use anyhow::{Context, Result};
use cookies::CookieJar;
use std::time::Duration;

/// Build the HTTP client for one job.
///
/// Cookies are handled explicitly through [`Session`], so the client keeps no cookie store.
pub fn build_client(http: &HttpConfig, use_proxy: bool) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(http.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(5)
        .user_agent(http.user_agent.clone());

    if use_proxy {
        if let Some(proxy) = http.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).with_context(|| format!("Invalid proxy URL {}", proxy))?,
            );
        }
    }

    builder.build().context("Failed to create HTTP client")
}

/// Authenticated cookie material for one cycle. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub cookies: CookieJar,
}

impl Session {
    pub fn new(cookies: CookieJar) -> Self {
        Self { cookies }
    }

    pub fn cookie_header(&self) -> String {
        self.cookies.to_header()
    }
}

/// Why a single request attempt failed. All variants are retried.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Malformed(#[from] ParseError),
}

/// Join a base URL and an absolute path
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

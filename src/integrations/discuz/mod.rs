//! Discuz forum client for the daily check-in (zqlj_sign plugin).

pub mod parse;

use crate::data::{CheckinStatus, CreditInfo};
use crate::error::AuthError;
use crate::integrations::cookies::CookieJar;
use crate::integrations::{endpoint, AttemptError, Session};
use parse::{LoginState, SignPage};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, REFERER};

const PROFILE_PATH: &str = "/home.php?mod=space";
const SIGN_PAGE_PATH: &str = "/plugin.php?id=zqlj_sign";
const CREDIT_PATH: &str = "/home.php?mod=spacecp&ac=credit&showcredit=1";

const HTML_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

pub struct DiscuzClient {
    http: reqwest::Client,
    base_url: String,
}

impl DiscuzClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Build a session from a pasted browser cookie, keeping only `required` cookies.
    pub fn session_from_cookie(raw: &str, required: &[String]) -> Result<Session, AuthError> {
        let mut jar = CookieJar::parse(raw);
        if !required.is_empty() {
            jar.retain_only(required);
        }
        let missing = jar.missing(required);
        if !missing.is_empty() {
            return Err(AuthError::MissingToken(missing.join(", ")));
        }
        if jar.is_empty() {
            return Err(AuthError::MissingToken("cookie".to_string()));
        }
        Ok(Session::new(jar))
    }

    /// Probe the profile page to confirm the cookie is still logged in
    pub async fn probe(&self, session: &Session) -> Result<Option<String>, AuthError> {
        let html = self
            .get_html(session, PROFILE_PATH, None)
            .await
            .map_err(AuthError::network)?;

        match parse::login_state(&html) {
            LoginState::LoggedIn { uid } => {
                match &uid {
                    Some(uid) => tracing::info!("Cookie valid, uid {}", uid),
                    None => tracing::warn!("Cookie valid, but no uid on profile page"),
                }
                Ok(uid)
            }
            LoginState::LoggedOut => Err(AuthError::BadCredentials(
                "cookie is invalid or expired".to_string(),
            )),
        }
    }

    /// One check-in attempt: open the sign page, then press the button if needed
    pub async fn attempt_checkin(&self, session: &Session) -> Result<CheckinStatus, AttemptError> {
        // Visiting the index first mirrors a browser and refreshes session cookies server-side.
        if let Err(e) = self.get_html(session, "/", None).await {
            tracing::debug!("Index request failed: {}", e);
        }

        let sign_page_url = endpoint(&self.base_url, SIGN_PAGE_PATH);
        let html = self
            .get_html(session, SIGN_PAGE_PATH, Some(&endpoint(&self.base_url, "/")))
            .await?;

        let token = match parse::parse_sign_page(&html)? {
            SignPage::AlreadyCheckedIn => {
                tracing::info!("Already checked in today");
                return Ok(CheckinStatus::AlreadyCheckedIn);
            }
            SignPage::Ready { token } => token,
        };

        tracing::info!("Submitting check-in");
        let sign_path = format!("{}&sign={}", SIGN_PAGE_PATH, token);
        let html = self
            .get_html(session, &sign_path, Some(&sign_page_url))
            .await?;

        Ok(parse::parse_sign_result(&html)?)
    }

    /// Scrape credit counters. Best effort: failures yield empty credits.
    pub async fn fetch_credits(&self, session: &Session) -> CreditInfo {
        let html = match self.get_html(session, CREDIT_PATH, None).await {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Failed to fetch credit page: {}", e);
                return CreditInfo::default();
            }
        };

        parse::parse_credits(&html).unwrap_or_else(|e| {
            tracing::error!("Failed to read credit info: {}", e);
            CreditInfo::default()
        })
    }

    async fn get_html(
        &self,
        session: &Session,
        path: &str,
        referer: Option<&str>,
    ) -> Result<String, AttemptError> {
        let mut request = self
            .http
            .get(endpoint(&self.base_url, path))
            .header(ACCEPT, HTML_ACCEPT)
            .header(ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9")
            .header(COOKIE, session.cookie_header());
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AttemptError::Status(response.status()));
        }
        Ok(response.text().await?)
    }
}

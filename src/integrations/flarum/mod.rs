//! Flarum forum client: login handshake and the invite-store API.

use crate::data::Invite;
use crate::error::{AuthError, ParseError};
use crate::integrations::cookies::CookieJar;
use crate::integrations::{endpoint, AttemptError, Session};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use serde::Deserialize;
use serde_json::Value;

pub const SESSION_COOKIE: &str = "flarum_session";
const INVITE_LIST_PATH: &str = "/api/store/invite/list";

static CSRF_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""csrfToken":"(.*?)""#).expect("valid csrf regex"));

pub struct FlarumClient {
    http: reqwest::Client,
    base_url: String,
}

impl FlarumClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Two-step login: fetch the CSRF token and initial session cookie, then post credentials.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        tracing::debug!("Fetching CSRF token and initial session cookie");
        let response = self
            .http
            .get(endpoint(&self.base_url, "/"))
            .send()
            .await
            .map_err(AuthError::network)?;

        if !response.status().is_success() {
            return Err(AuthError::Network(format!(
                "forum returned {}",
                response.status()
            )));
        }

        let mut cookies = CookieJar::default();
        cookies.absorb(&response);
        let page = response.text().await.map_err(AuthError::network)?;

        let csrf = extract_csrf_token(&page)
            .ok_or_else(|| AuthError::MissingToken("csrfToken".to_string()))?;
        if cookies.get(SESSION_COOKIE).is_none() {
            return Err(AuthError::MissingToken(SESSION_COOKIE.to_string()));
        }

        tracing::debug!("Posting credentials");
        let response = self
            .http
            .post(endpoint(&self.base_url, "/login"))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "*/*")
            .header("X-CSRF-Token", csrf)
            .header(COOKIE, cookies.to_header())
            .json(&serde_json::json!({
                "identification": username,
                "password": password,
                "remember": true,
            }))
            .send()
            .await
            .map_err(AuthError::network)?;

        let status = response.status();
        if status.is_client_error() {
            return Err(AuthError::BadCredentials(format!("login returned {}", status)));
        }
        if !status.is_success() {
            return Err(AuthError::Network(format!("login returned {}", status)));
        }

        cookies.absorb(&response);
        tracing::info!("Logged in to {}", self.base_url);
        Ok(Session::new(cookies))
    }

    /// One attempt at listing invites awaiting review
    pub async fn fetch_pending_invites(&self, session: &Session) -> Result<Vec<Invite>, AttemptError> {
        let response = self
            .http
            .get(endpoint(&self.base_url, INVITE_LIST_PATH))
            .query(&[
                ("filter[query]", ""),
                ("filter[status]", "0"),
                ("page[offset]", "0"),
            ])
            .header(COOKIE, session.cookie_header())
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(AttemptError::Status(response.status()));
        }

        let body = response.text().await?;
        Ok(parse_invite_list(&body)?)
    }
}

pub fn extract_csrf_token(page: &str) -> Option<&str> {
    CSRF_TOKEN
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|t| !t.is_empty())
}

// JSON:API shapes of the invite list response
#[derive(Debug, Deserialize)]
struct InviteListResponse {
    #[serde(default)]
    data: Option<Vec<InviteNode>>,
}

#[derive(Debug, Deserialize)]
struct InviteNode {
    id: Value,
    #[serde(default)]
    attributes: InviteAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct InviteAttributes {
    user: Option<Value>,
    email: Option<Value>,
    username: Option<Value>,
    link: Option<Value>,
    link2: Option<Value>,
}

fn value_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Parse `{data: [{id, attributes: {...}}]}`. Missing or null `data` means no invites.
pub fn parse_invite_list(body: &str) -> Result<Vec<Invite>, ParseError> {
    let response: InviteListResponse = serde_json::from_str(body)
        .map_err(|e| ParseError::new(format!("invite list is not valid JSON:API: {}", e)))?;

    response
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|node| {
            let id = match node.id {
                Value::String(s) if !s.is_empty() => s,
                Value::Number(n) => n.to_string(),
                other => return Err(ParseError::new(format!("invite without usable id: {}", other))),
            };
            let attrs = node.attributes;
            Ok(Invite {
                id,
                inviter: value_text(attrs.user),
                email: value_text(attrs.email),
                username: value_text(attrs.username),
                link: value_text(attrs.link),
                link2: value_text(attrs.link2),
            })
        })
        .collect()
}

//! Text extraction from Discuz pages.
//!
//! Everything here depends on upstream markup and wording; keep the fragile
//! patterns in this file so they can be swapped and tested in isolation.

use crate::data::{CheckinStatus, CreditInfo};
use crate::error::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;

/// "You have already checked in today"
pub const ALREADY_CHECKED_IN: &str = "您今天已经打过卡了";
/// "Check-in succeeded" (the full phrase is prefixed with 恭喜您，)
pub const CHECKIN_SUCCEEDED: &str = "打卡成功";

const LOGGED_OUT_MARKERS: &[&str] = &[
    "请先登录后才能继续浏览",
    "您需要登录后才能继续本操作",
    "您需要先登录才能继续本操作",
];
const LOGGED_IN_MARKERS: &[&str] = &["天天打卡", "安全退出", "我的主页"];

static SIGN_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"sign&sign=(.+)" class="btna"#).expect("valid sign regex"));

static SPACE_UID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"home\.php\?mod=space&uid=(\d+)").expect("valid uid regex"));

static CREDIT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<ul class="creditl mtm bbda cl">.*?</ul>"#).expect("valid credit block regex")
});

/// Patterns for one credit counter, most specific first
struct CreditPatterns {
    in_block: Regex,
    fallbacks: [Regex; 3],
}

impl CreditPatterns {
    fn new(label: &str) -> Self {
        let compile = |p: String| Regex::new(&p).expect("valid credit regex");
        Self {
            in_block: compile(format!(r"<em>\s*{}:\s*</em>(\d+)", label)),
            fallbacks: [
                compile(format!(r"(?s)<em>\s*{}:\s*</em>(\d+)", label)),
                compile(format!(r"(?s){}:\s*(\d+)", label)),
                compile(format!(r"(?s){}</em>\s*(\d+)", label)),
            ],
        }
    }
}

static COINS: Lazy<CreditPatterns> = Lazy::new(|| CreditPatterns::new("飞牛币"));
static REPUTATION: Lazy<CreditPatterns> = Lazy::new(|| CreditPatterns::new("牛值"));
static POINTS: Lazy<CreditPatterns> = Lazy::new(|| CreditPatterns::new("积分"));
static LOGIN_DAYS: Lazy<CreditPatterns> = Lazy::new(|| CreditPatterns::new("登陆天数"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    LoggedIn { uid: Option<String> },
    LoggedOut,
}

/// Decide from a profile page whether the cookie is still logged in
pub fn login_state(html: &str) -> LoginState {
    if LOGGED_OUT_MARKERS.iter().any(|m| html.contains(m)) {
        return LoginState::LoggedOut;
    }
    if let Some(uid) = SPACE_UID.captures(html).and_then(|c| c.get(1)) {
        return LoginState::LoggedIn {
            uid: Some(uid.as_str().to_string()),
        };
    }
    if LOGGED_IN_MARKERS.iter().any(|m| html.contains(m)) {
        return LoginState::LoggedIn { uid: None };
    }
    LoginState::LoggedOut
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignPage {
    AlreadyCheckedIn,
    /// Check-in button present, carrying the one-time sign token
    Ready { token: String },
}

pub fn parse_sign_page(html: &str) -> Result<SignPage, ParseError> {
    if html.contains(ALREADY_CHECKED_IN) {
        return Ok(SignPage::AlreadyCheckedIn);
    }
    SIGN_TOKEN
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| SignPage::Ready {
            token: m.as_str().to_string(),
        })
        .ok_or_else(|| ParseError::new("check-in button not found on sign page"))
}

pub fn parse_sign_result(html: &str) -> Result<CheckinStatus, ParseError> {
    if html.contains(CHECKIN_SUCCEEDED) {
        Ok(CheckinStatus::CheckedIn)
    } else if html.contains(ALREADY_CHECKED_IN) {
        Ok(CheckinStatus::AlreadyCheckedIn)
    } else {
        let preview: String = html.chars().take(200).collect();
        Err(ParseError::new(format!(
            "check-in response not recognised: {}",
            preview
        )))
    }
}

/// Read credit counters from the credit page.
///
/// Looks inside the credit summary block first and falls back to searching
/// the whole page. Counters that cannot be found stay `None`.
pub fn parse_credits(html: &str) -> Result<CreditInfo, ParseError> {
    if LOGGED_OUT_MARKERS.iter().any(|m| html.contains(m)) {
        return Err(ParseError::new("credit page requires login"));
    }

    let find = |patterns: &CreditPatterns| -> Option<u64> {
        match CREDIT_BLOCK.find(html) {
            Some(block) => first_number(&patterns.in_block, block.as_str()),
            None => patterns
                .fallbacks
                .iter()
                .find_map(|re| first_number(re, html)),
        }
    };

    let credits = CreditInfo {
        coins: find(&COINS),
        reputation: find(&REPUTATION),
        points: find(&POINTS),
        login_days: find(&LOGIN_DAYS),
    };

    if CREDIT_BLOCK.find(html).is_none() {
        tracing::warn!("Credit block not found, used whole-page patterns");
    }
    let missing = credits.missing_fields();
    if !missing.is_empty() {
        tracing::warn!("Credit info incomplete, missing: {}", missing.join(", "));
    }
    Ok(credits)
}

fn first_number(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

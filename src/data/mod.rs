use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Format of invite stamps in persisted state (ISO-8601, local time, no offset)
pub const STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format of check-in dates in persisted state and history
pub const SIGN_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A pending invitation review from the forum's invite store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: String,
    pub inviter: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub link: Option<String>,
    pub link2: Option<String>,
}

impl Invite {
    /// Invite carrying only an id, other fields unknown
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inviter: None,
            email: None,
            username: None,
            link: None,
            link2: None,
        }
    }
}

/// Persisted invite state: invite id -> stamp (see [`STAMP_FORMAT`]).
///
/// The stamp is when the invite was last *reported*, not last seen. Scans that
/// find an invite unchanged keep its stamp, so an invite left unreviewed is
/// reported again once the stamp is older than the overdue threshold.
///
/// Stored as strings so a single malformed entry never poisons the whole map.
pub type PendingReviews = BTreeMap<String, String>;

pub fn format_stamp(at: NaiveDateTime) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Parse a stored stamp. Accepts fractional seconds written by older versions.
pub fn parse_stamp(raw: &str) -> Option<NaiveDateTime> {
    raw.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, SIGN_DATE_FORMAT).ok())
}

/// How the check-in request was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckinStatus {
    /// This call performed today's check-in
    CheckedIn,
    /// Someone (or an earlier run) already checked in today
    AlreadyCheckedIn,
}

impl CheckinStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CheckedIn => "Checked in",
            Self::AlreadyCheckedIn => "Already checked in",
        }
    }
}

/// Credit counters scraped from the forum's credit page.
///
/// A `None` field means the counter could not be found on the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditInfo {
    /// 飞牛币
    pub coins: Option<u64>,
    /// 牛值
    pub reputation: Option<u64>,
    /// 积分
    pub points: Option<u64>,
    /// 登陆天数
    pub login_days: Option<u64>,
}

impl CreditInfo {
    pub fn is_empty(&self) -> bool {
        self.coins.is_none()
            && self.reputation.is_none()
            && self.points.is_none()
            && self.login_days.is_none()
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.coins.is_none() {
            missing.push("coins");
        }
        if self.reputation.is_none() {
            missing.push("reputation");
        }
        if self.points.is_none() {
            missing.push("points");
        }
        if self.login_days.is_none() {
            missing.push("login_days");
        }
        missing
    }
}

/// Result of one successful check-in cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckinOutcome {
    pub status: CheckinStatus,
    pub credits: CreditInfo,
}

/// Outcome stored in the check-in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum SignState {
    CheckedIn,
    AlreadyCheckedIn,
    Failed(String),
}

impl SignState {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn label(&self) -> String {
        match self {
            Self::CheckedIn => CheckinStatus::CheckedIn.label().to_string(),
            Self::AlreadyCheckedIn => CheckinStatus::AlreadyCheckedIn.label().to_string(),
            Self::Failed(reason) => format!("Failed: {}", reason),
        }
    }
}

impl From<CheckinStatus> for SignState {
    fn from(status: CheckinStatus) -> Self {
        match status {
            CheckinStatus::CheckedIn => Self::CheckedIn,
            CheckinStatus::AlreadyCheckedIn => Self::AlreadyCheckedIn,
        }
    }
}

/// One entry of the check-in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRecord {
    #[serde(with = "sign_date")]
    pub date: NaiveDateTime,
    pub state: SignState,
    #[serde(default)]
    pub credits: CreditInfo,
}

mod sign_date {
    use super::SIGN_DATE_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format(SIGN_DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, SIGN_DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Category of a notification, forwarded to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SiteMessage,
    Failure,
}

/// A formatted message waiting for delivery. Consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub text: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_stamp_format() {
        assert_eq!(format_stamp(at(1, 2, 3)), "2024-01-01T01:02:03");
        assert_eq!(parse_stamp("2024-01-01T01:02:03"), Some(at(1, 2, 3)));
    }

    #[test]
    fn test_parse_stamp_accepts_fractional_and_spaced() {
        let parsed = parse_stamp("2024-01-01T01:02:03.123456").unwrap();
        assert_eq!(parsed.format("%H:%M:%S").to_string(), "01:02:03");
        assert_eq!(parse_stamp("2024-01-01 01:02:03"), Some(at(1, 2, 3)));
        assert_eq!(parse_stamp("yesterday"), None);
    }

    #[test]
    fn test_sign_record_json_shape() {
        let record = SignRecord {
            date: at(8, 0, 5),
            state: SignState::Failed("cookie expired".to_string()),
            credits: CreditInfo::default(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date"], "2024-01-01 08:00:05");
        assert_eq!(json["state"]["kind"], "failed");
        assert_eq!(json["state"]["reason"], "cookie expired");

        let back: SignRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_sign_state_success() {
        assert!(SignState::CheckedIn.is_success());
        assert!(SignState::AlreadyCheckedIn.is_success());
        assert!(!SignState::Failed("HTTP 502".to_string()).is_success());
        assert_eq!(SignState::Failed("HTTP 502".to_string()).label(), "Failed: HTTP 502");
    }

    #[test]
    fn test_credit_info_missing_fields() {
        let credits = CreditInfo {
            coins: Some(10),
            points: Some(3),
            ..Default::default()
        };
        assert!(!credits.is_empty());
        assert_eq!(credits.missing_fields(), vec!["reputation", "login_days"]);
        assert!(CreditInfo::default().is_empty());
    }
}

//! Daily forum check-in.
//!
//! Uses a pasted browser cookie, presses the sign button once per day and
//! scrapes the credit counters afterwards.

use crate::config::{CheckinConfig, HttpConfig};
use crate::data::{
    CheckinOutcome, CreditInfo, Notification, NotificationKind, SignRecord, SignState,
    SIGN_DATE_FORMAT,
};
use crate::error::CycleError;
use crate::integrations::{build_client, discuz::DiscuzClient};
use crate::jobs::{failure_notification, Services};
use crate::notify::{send_or_log, Notifier};
use crate::retry::with_retries;
use crate::scheduler::{Job, Trigger};
use crate::store::{self, KvStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime};
use serde_json::Value;
use tracing::Instrument;

pub const JOB_ID: &str = "checkin";
pub const LAST_SIGN_KEY: &str = "last_sign_date";
pub const HISTORY_KEY: &str = "sign_history";
const JOB_TITLE: &str = "Forum check-in";

/// Whether `last` falls on the same local day as `now`
pub fn already_checked_in_today(last: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    last.is_some_and(|last| last.date() == now.date())
}

fn last_sign_date(store: &dyn KvStore) -> Result<Option<NaiveDateTime>> {
    let raw: Option<String> = store::load(store, LAST_SIGN_KEY)?;
    Ok(raw.and_then(|raw| {
        NaiveDateTime::parse_from_str(&raw, SIGN_DATE_FORMAT)
            .map_err(|e| tracing::warn!("Ignoring unreadable {}: {}", LAST_SIGN_KEY, e))
            .ok()
    }))
}

/// Decode stored history entry by entry. With `repair_date` set, an entry
/// whose date cannot be read is re-dated instead of dropped.
fn decode_history(raw: Vec<Value>, repair_date: Option<NaiveDateTime>) -> Vec<SignRecord> {
    raw.into_iter()
        .filter_map(|mut entry| {
            match serde_json::from_value::<SignRecord>(entry.clone()) {
                Ok(record) => return Some(record),
                Err(e) => tracing::warn!("Unreadable sign record {}: {}", entry, e),
            }
            let date = repair_date?;
            entry
                .as_object_mut()?
                .insert("date".to_string(), Value::String(date.format(SIGN_DATE_FORMAT).to_string()));
            serde_json::from_value(entry).ok()
        })
        .collect()
}

/// Append `record` and drop entries older than `history_days` (0 keeps all)
pub fn append_history(store: &dyn KvStore, record: SignRecord, history_days: u32) -> Result<()> {
    let now = record.date;
    let raw: Vec<Value> = store::load(store, HISTORY_KEY)?.unwrap_or_default();
    let mut history = decode_history(raw, Some(now));
    history.push(record);

    let cutoff = Duration::try_days(i64::from(history_days))
        .filter(|_| history_days > 0)
        .and_then(|keep| now.checked_sub_signed(keep));
    if let Some(cutoff) = cutoff {
        let before = history.len();
        history.retain(|r| r.date >= cutoff);
        if history.len() < before {
            tracing::debug!("Pruned {} old sign record(s)", before - history.len());
        }
    }

    store::save(store, HISTORY_KEY, &history)
}

/// Most recent `limit` sign records, newest first
pub fn recent_history(store: &dyn KvStore, limit: usize) -> Result<Vec<SignRecord>> {
    let raw: Vec<Value> = store::load(store, HISTORY_KEY)?.unwrap_or_default();
    let mut history = decode_history(raw, None);
    history.sort_by(|a, b| b.date.cmp(&a.date));
    history.truncate(limit);
    Ok(history)
}

/// Check in, scrape credits and persist the outcome. Returns `None` when a
/// scheduled run finds today's check-in already recorded.
pub async fn run_cycle(
    config: &CheckinConfig,
    client: &DiscuzClient,
    store: &dyn KvStore,
    trigger: Trigger,
    now: NaiveDateTime,
) -> Result<Option<CheckinOutcome>, CycleError> {
    if trigger == Trigger::Scheduled && already_checked_in_today(last_sign_date(store)?, now) {
        tracing::info!("Already checked in today, skipping scheduled run");
        return Ok(None);
    }

    if config.cookie.trim().is_empty() {
        return Err(CycleError::Config("forum cookie is not set".to_string()));
    }

    let session = DiscuzClient::session_from_cookie(&config.cookie, &config.required_cookies)?;
    client.probe(&session).await?;

    let status = with_retries(config.retry_policy(), "check-in", |attempt| {
        tracing::debug!("Check-in attempt {}", attempt);
        client.attempt_checkin(&session)
    })
    .await?;
    tracing::info!("{}", status.label());

    let credits = client.fetch_credits(&session).await;
    if credits.is_empty() {
        tracing::warn!("No credit info found");
    }

    store::save(store, LAST_SIGN_KEY, &now.format(SIGN_DATE_FORMAT).to_string())?;
    append_history(
        store,
        SignRecord {
            date: now,
            state: status.into(),
            credits: credits.clone(),
        },
        config.history_days,
    )?;

    Ok(Some(CheckinOutcome { status, credits }))
}

/// Run one full cycle and report the result. Never fails.
pub async fn check_in(
    config: &CheckinConfig,
    client: &DiscuzClient,
    store: &dyn KvStore,
    notifier: &dyn Notifier,
    trigger: Trigger,
) -> Option<CheckinOutcome> {
    let span = tracing::info_span!("checkin", cycle = %uuid::Uuid::new_v4());
    async {
        tracing::info!("Starting check-in ({:?})", trigger);
        let now = Local::now().naive_local();

        match run_cycle(config, client, store, trigger, now).await {
            Ok(Some(outcome)) => {
                if config.notify {
                    send_or_log(notifier, &checkin_notification(&outcome, now)).await;
                }
                Some(outcome)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Check-in failed: {}", e);
                let record = SignRecord {
                    date: now,
                    state: SignState::Failed(e.to_string()),
                    credits: CreditInfo::default(),
                };
                if let Err(err) = append_history(store, record, config.history_days) {
                    tracing::error!("Failed to record failed check-in: {:#}", err);
                }
                if config.notify {
                    send_or_log(notifier, &failure_notification(JOB_TITLE, &e, now)).await;
                }
                None
            }
        }
    }
    .instrument(span)
    .await
}

pub fn checkin_notification(outcome: &CheckinOutcome, now: NaiveDateTime) -> Notification {
    let mut text = format!(
        "Time: {}\nStatus: {}\n",
        now.format(SIGN_DATE_FORMAT),
        outcome.status.label()
    );

    let credits = &outcome.credits;
    if credits.is_empty() {
        text.push_str("\nCredits unavailable: the credit page could not be read.\n");
    } else {
        text.push_str("\nCredits:\n");
        let lines = [
            ("Coins", credits.coins),
            ("Reputation", credits.reputation),
            ("Points", credits.points),
            ("Login days", credits.login_days),
        ];
        for (label, value) in lines {
            if let Some(value) = value {
                text.push_str(&format!("• {}: {}\n", label, value));
            }
        }
    }

    Notification::new(
        NotificationKind::SiteMessage,
        format!("{}: {}", JOB_TITLE, outcome.status.label()),
        text.trim_end().to_string(),
    )
}

pub struct CheckinJob {
    config: CheckinConfig,
    client: DiscuzClient,
    services: Services,
}

impl CheckinJob {
    pub fn new(config: CheckinConfig, http: &HttpConfig, services: Services) -> Result<Self> {
        let client = DiscuzClient::new(build_client(http, config.use_proxy)?, config.base_url.clone());
        Ok(Self {
            config,
            client,
            services,
        })
    }
}

#[async_trait]
impl Job for CheckinJob {
    fn id(&self) -> &str {
        JOB_ID
    }

    async fn run(&self, trigger: Trigger) {
        check_in(
            &self.config,
            &self.client,
            self.services.store.as_ref(),
            self.services.notifier.as_ref(),
            trigger,
        )
        .await;
    }
}

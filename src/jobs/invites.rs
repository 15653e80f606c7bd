//! Pending invite monitor.
//!
//! Logs in, lists invites awaiting review, reports the new ones and the ones
//! left unreviewed for longer than `overdue_hours`.

use crate::config::{HttpConfig, InviteConfig};
use crate::data::{Invite, Notification, NotificationKind, PendingReviews};
use crate::differ::{self, Classification, DiffOutcome};
use crate::error::CycleError;
use crate::integrations::{build_client, flarum::FlarumClient};
use crate::jobs::{failure_notification, Services};
use crate::notify::{send_or_log, Notifier};
use crate::retry::with_retries;
use crate::scheduler::{Job, Trigger};
use crate::store::{self, KvStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime};
use tracing::Instrument;

pub const JOB_ID: &str = "invites";
pub const STATE_KEY: &str = "pending_reviews";
const JOB_TITLE: &str = "Forum invite monitor";

/// Authenticate, fetch, diff and persist. Sends nothing.
pub async fn run_cycle(
    config: &InviteConfig,
    client: &FlarumClient,
    store: &dyn KvStore,
    now: NaiveDateTime,
) -> Result<DiffOutcome, CycleError> {
    if config.username.trim().is_empty() || config.password.is_empty() {
        return Err(CycleError::Config(
            "forum username or password is not set".to_string(),
        ));
    }

    let threshold = config
        .overdue_after()
        .map_err(|e| CycleError::Config(format!("{:#}", e)))?;

    let session = client.login(&config.username, &config.password).await?;

    let invites = with_retries(config.retry_policy(), "invite list", |_| {
        client.fetch_pending_invites(&session)
    })
    .await?;
    tracing::info!("Found {} pending invite(s)", invites.len());

    let previous: PendingReviews = store::load(store, STATE_KEY)?.unwrap_or_default();
    let outcome = differ::diff(&invites, &previous, now, threshold);
    store::save(store, STATE_KEY, &outcome.next_state)?;

    Ok(outcome)
}

/// Run one full cycle and report the result. Never fails.
pub async fn check_invites(
    config: &InviteConfig,
    client: &FlarumClient,
    store: &dyn KvStore,
    notifier: &dyn Notifier,
    trigger: Trigger,
) -> Option<DiffOutcome> {
    let span = tracing::info_span!("invites", cycle = %uuid::Uuid::new_v4());
    async {
        tracing::info!("Checking pending invites ({:?})", trigger);
        let now = Local::now().naive_local();

        match run_cycle(config, client, store, now).await {
            Ok(outcome) => {
                let notification = invites_notification(&outcome);
                match notification {
                    Some(n) if config.notify => {
                        send_or_log(notifier, &n).await;
                        tracing::info!("Reported {} invite(s)", outcome.to_notify().len());
                    }
                    Some(_) => tracing::debug!("Notifications disabled"),
                    None => tracing::info!("Nothing new to report"),
                }
                Some(outcome)
            }
            Err(e) => {
                tracing::error!("Invite check failed: {}", e);
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

/// Summary of the invites that need attention, or `None` if there are none
pub fn invites_notification(outcome: &DiffOutcome) -> Option<Notification> {
    let items = outcome.to_notify();
    if items.is_empty() {
        return None;
    }

    let mut text = String::new();
    for (i, (classification, invite)) in items.iter().enumerate() {
        text.push_str(&format_invite(i + 1, *classification, invite, outcome.threshold));
    }

    Some(Notification::new(
        NotificationKind::SiteMessage,
        format!("Invites awaiting review ({})", items.len()),
        text.trim_end().to_string(),
    ))
}

fn format_invite(n: usize, classification: Classification, invite: &Invite, threshold: Duration) -> String {
    let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "unknown".to_string());
    format!(
        "### Invite {} ({})\n- Inviter: {}\n- Email: {}\n- Username: {}\n- Link 1: {}\n- Link 2: {}\n\n",
        n,
        classification.label(threshold),
        field(&invite.inviter),
        field(&invite.email),
        field(&invite.username),
        field(&invite.link),
        field(&invite.link2),
    )
}

/// Persisted pending invites, newest stamp first
pub fn pending_summary(store: &dyn KvStore) -> Result<Vec<(String, String)>> {
    let pending: PendingReviews = store::load(store, STATE_KEY)?.unwrap_or_default();
    let mut rows: Vec<(String, String)> = pending.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(rows)
}

pub struct InviteWatchJob {
    config: InviteConfig,
    client: FlarumClient,
    services: Services,
}

impl InviteWatchJob {
    pub fn new(config: InviteConfig, http: &HttpConfig, services: Services) -> Result<Self> {
        let client = FlarumClient::new(build_client(http, config.use_proxy)?, config.base_url.clone());
        Ok(Self {
            config,
            client,
            services,
        })
    }
}

#[async_trait]
impl Job for InviteWatchJob {
    fn id(&self) -> &str {
        JOB_ID
    }

    async fn run(&self, trigger: Trigger) {
        check_invites(
            &self.config,
            &self.client,
            self.services.store.as_ref(),
            self.services.notifier.as_ref(),
            trigger,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn outcome_for(current: &[Invite], previous: &PendingReviews) -> DiffOutcome {
        differ::diff(
            current,
            previous,
            "2024-01-01T09:00:00".parse().unwrap(),
            Duration::hours(4),
        )
    }

    #[test]
    fn test_notification_lists_new_and_overdue() {
        let mut previous = PendingReviews::new();
        previous.insert("1".to_string(), "2024-01-01T01:00:00".to_string());
        previous.insert("2".to_string(), "2024-01-01T08:00:00".to_string());

        let mut fresh = Invite::bare("3");
        fresh.inviter = Some("alice".to_string());
        fresh.email = Some("bob@example.com".to_string());

        let outcome = outcome_for(&[Invite::bare("1"), Invite::bare("2"), fresh], &previous);
        let n = invites_notification(&outcome).unwrap();

        assert_eq!(n.title, "Invites awaiting review (2)");
        assert!(n.text.starts_with("### Invite 1 (pending over 4h)"));
        assert!(n.text.contains("### Invite 2 (new)\n- Inviter: alice\n- Email: bob@example.com"));
        assert!(n.text.contains("- Username: unknown"));
    }

    #[test]
    fn test_no_notification_when_nothing_changed() {
        let mut previous = PendingReviews::new();
        previous.insert("1".to_string(), "2024-01-01T08:30:00".to_string());
        let outcome = outcome_for(&[Invite::bare("1")], &previous);
        assert!(invites_notification(&outcome).is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_overdue_hours_is_config_error() {
        let config = InviteConfig {
            username: "alice".to_string(),
            password: "secret".to_string(),
            overdue_hours: u64::MAX,
            ..InviteConfig::default()
        };
        let client = FlarumClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let store = MemoryStore::new();

        let err = run_cycle(&config, &client, &store, "2024-01-01T09:00:00".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CycleError::Config(ref msg) if msg.contains("overdue_hours")));
        assert!(store.get(STATE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_pending_summary_sorted_newest_first() {
        let store = MemoryStore::new();
        store
            .set(
                STATE_KEY,
                json!({"a": "2024-01-01T01:00:00", "b": "2024-01-02T01:00:00"}),
            )
            .unwrap();
        let rows = pending_summary(&store).unwrap();
        assert_eq!(rows[0].0, "b");
        assert_eq!(rows[1].0, "a");
    }
}

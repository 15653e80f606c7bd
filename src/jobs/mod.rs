pub mod checkin;
pub mod invites;

use crate::config::{self, Config};
use crate::data::{Notification, NotificationKind};
use crate::error::CycleError;
use crate::notify::Notifier;
use crate::scheduler::Scheduler;
use crate::store::{JsonFileStore, KvStore};
use anyhow::Result;
use chrono::NaiveDateTime;
use std::sync::Arc;

/// Shared handles a job needs besides its own configuration
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn KvStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    /// Services for `job_id`, storing state under the configured state dir
    pub fn for_job(config: &Config, job_id: &str, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let dir = config::state_dir(config)?;
        Ok(Self {
            store: Arc::new(JsonFileStore::for_job(&dir, job_id)),
            notifier,
        })
    }
}

/// Register every enabled job
pub fn build_scheduler(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Scheduler> {
    let mut scheduler = Scheduler::new();

    if config.invites.enabled {
        let services = Services::for_job(config, invites::JOB_ID, Arc::clone(&notifier))?;
        let job = invites::InviteWatchJob::new(config.invites.clone(), &config.http, services)?;
        scheduler.register(
            Arc::new(job),
            config.invites.schedule()?,
            config.invites.run_on_start,
        );
    }

    if config.checkin.enabled {
        let services = Services::for_job(config, checkin::JOB_ID, Arc::clone(&notifier))?;
        let job = checkin::CheckinJob::new(config.checkin.clone(), &config.http, services)?;
        scheduler.register(
            Arc::new(job),
            config.checkin.schedule()?,
            config.checkin.run_on_start,
        );
    }

    Ok(scheduler)
}

/// The single notification describing a failed cycle
pub fn failure_notification(job_title: &str, error: &CycleError, now: NaiveDateTime) -> Notification {
    let mut text = format!(
        "Time: {}\nProblem: {}\nDetail: {}\n",
        now.format("%Y-%m-%d %H:%M:%S"),
        error.category(),
        error
    );
    let hints = error.hints();
    if !hints.is_empty() {
        text.push_str("\nPossible fixes:\n");
        for hint in hints {
            text.push_str(&format!("• {}\n", hint));
        }
    }
    Notification::new(
        NotificationKind::Failure,
        format!("{} failed", job_title),
        text.trim_end().to_string(),
    )
}

//! Timer loop driving the registered jobs.
//!
//! Each job owns a non-reentrant guard: a tick that arrives while the previous
//! cycle is still running (for example sleeping between retries) is skipped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Who started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fired by the timer
    Scheduled,
    /// Requested by the user (CLI or run-on-start)
    Manual,
}

#[derive(Debug, Clone)]
pub enum Schedule {
    Cron { expr: String, schedule: cron::Schedule },
    Every(Duration),
}

impl Schedule {
    /// Cron expression if set and non-blank, otherwise a fixed interval in minutes.
    pub fn from_settings(cron_expr: Option<&str>, interval_minutes: u64) -> Result<Self> {
        match cron_expr.map(str::trim).filter(|e| !e.is_empty()) {
            Some(expr) => Self::cron(expr),
            None => {
                if interval_minutes == 0 {
                    bail!("interval_minutes must be > 0 when no cron expression is set");
                }
                let secs = interval_minutes
                    .checked_mul(60)
                    .with_context(|| format!("interval_minutes {} is out of range", interval_minutes))?;
                Ok(Self::Every(Duration::from_secs(secs)))
            }
        }
    }

    /// Parse a cron expression. Standard 5-field expressions are accepted.
    pub fn cron(expr: &str) -> Result<Self> {
        // The `cron` crate wants seconds and an optional year; pad 5-field input.
        let schedule = expr
            .parse::<cron::Schedule>()
            .or_else(|_| format!("0 {} *", expr).parse::<cron::Schedule>())
            .map_err(|e| anyhow::anyhow!("invalid cron expression '{}': {}", expr, e))?;
        Ok(Self::Cron {
            expr: expr.to_string(),
            schedule,
        })
    }

    pub fn next_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        match self {
            Self::Cron { schedule, .. } => schedule.after(&now).next(),
            Self::Every(every) => chrono::Duration::from_std(*every)
                .ok()
                .and_then(|d| now.checked_add_signed(d)),
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cron { expr, .. } => write!(f, "cron '{}'", expr),
            Self::Every(every) => write!(f, "every {} min", every.as_secs() / 60),
        }
    }
}

/// A unit of scheduled work. Errors are handled inside `run`.
#[async_trait]
pub trait Job: Send + Sync {
    fn id(&self) -> &str;
    async fn run(&self, trigger: Trigger);
}

struct Registered {
    job: Arc<dyn Job>,
    schedule: Schedule,
    run_on_start: bool,
    guard: Arc<Mutex<()>>,
}

#[derive(Default)]
pub struct Scheduler {
    jobs: BTreeMap<String, Registered>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. A second registration under the same id replaces the first.
    pub fn register(&mut self, job: Arc<dyn Job>, schedule: Schedule, run_on_start: bool) {
        let id = job.id().to_string();
        tracing::info!("Registered job {} ({})", id, schedule);
        let previous = self.jobs.insert(
            id.clone(),
            Registered {
                job,
                schedule,
                run_on_start,
                guard: Arc::new(Mutex::new(())),
            },
        );
        if previous.is_some() {
            tracing::warn!("Job {} was already registered, replaced", id);
        }
    }

    pub fn job_ids(&self) -> Vec<&str> {
        self.jobs.keys().map(String::as_str).collect()
    }

    /// Run a registered job now. Returns `false` if it was skipped because a cycle is in flight.
    pub async fn trigger(&self, id: &str, trigger: Trigger) -> Result<bool> {
        let entry = self
            .jobs
            .get(id)
            .with_context(|| format!("No job registered as {}", id))?;
        Ok(run_guarded(&entry.job, &entry.guard, trigger).await)
    }

    /// Drive every job until Ctrl-C.
    pub async fn run_until_shutdown(self) -> Result<()> {
        if self.jobs.is_empty() {
            bail!("No jobs enabled. Enable [invites] or [checkin] in the config file.");
        }

        let loops = futures::future::join_all(self.jobs.into_values().map(job_loop));

        tokio::select! {
            _ = loops => {
                tracing::warn!("All job schedules finished");
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for shutdown signal")?;
                tracing::info!("Shutting down");
            }
        }
        Ok(())
    }
}

async fn run_guarded(job: &Arc<dyn Job>, guard: &Arc<Mutex<()>>, trigger: Trigger) -> bool {
    let Ok(_running) = guard.try_lock() else {
        tracing::warn!("Job {} is still running, skipping {:?} run", job.id(), trigger);
        return false;
    };
    job.run(trigger).await;
    true
}

async fn job_loop(entry: Registered) {
    let Registered {
        job,
        schedule,
        run_on_start,
        guard,
    } = entry;

    if run_on_start {
        tracing::info!("Running {} once on start", job.id());
        spawn_cycle(&job, &guard, Trigger::Manual);
    }

    loop {
        let now = Local::now();
        let Some(next) = schedule.next_after(now) else {
            tracing::warn!("Schedule for {} has no future runs", job.id());
            return;
        };
        tracing::debug!("Next run of {} at {}", job.id(), next.format("%Y-%m-%d %H:%M:%S"));

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        spawn_cycle(&job, &guard, Trigger::Scheduled);
    }
}

/// Run a cycle on its own task so a slow cycle never delays the timer and a panic
/// never ends the schedule.
fn spawn_cycle(job: &Arc<dyn Job>, guard: &Arc<Mutex<()>>, trigger: Trigger) {
    let job = Arc::clone(job);
    let guard = Arc::clone(guard);
    tokio::spawn(async move {
        run_guarded(&job, &guard, trigger).await;
    });
}

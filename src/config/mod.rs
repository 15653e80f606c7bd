use crate::retry::RetryPolicy;
use crate::scheduler::Schedule;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub invites: InviteConfig,
    #[serde(default)]
    pub checkin: CheckinConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Proxy URL applied to jobs that set `use_proxy`
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StateConfig {
    /// Directory for persisted job state. Defaults to the platform data dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationConfig {
    /// When unset, notifications are written to the log only.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Settings for the pending-invite monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub notify: bool,
    #[serde(default)]
    pub run_on_start: bool,
    #[serde(default = "default_invite_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_invite_cron")]
    pub cron: Option<String>,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_invite_retry_interval")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_true")]
    pub use_proxy: bool,
    /// Pending invites are re-reported once they stay unreviewed this long
    #[serde(default = "default_overdue_hours")]
    pub overdue_hours: u64,
}

fn default_true() -> bool {
    true
}

fn default_invite_base_url() -> String {
    "https://pting.club".to_string()
}

fn default_invite_cron() -> Option<String> {
    Some("*/5 * * * *".to_string())
}

fn default_interval_minutes() -> u64 {
    5
}

fn default_retry_count() -> u32 {
    3
}

fn default_invite_retry_interval() -> u64 {
    5
}

fn default_overdue_hours() -> u64 {
    4
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            notify: true,
            run_on_start: false,
            base_url: default_invite_base_url(),
            username: String::new(),
            password: String::new(),
            cron: default_invite_cron(),
            interval_minutes: default_interval_minutes(),
            retry_count: default_retry_count(),
            retry_interval_secs: default_invite_retry_interval(),
            use_proxy: true,
            overdue_hours: default_overdue_hours(),
        }
    }
}

impl InviteConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, Duration::from_secs(self.retry_interval_secs))
    }

    pub fn schedule(&self) -> Result<Schedule> {
        Schedule::from_settings(self.cron.as_deref(), self.interval_minutes)
    }

    pub fn overdue_after(&self) -> Result<chrono::Duration> {
        i64::try_from(self.overdue_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .with_context(|| format!("overdue_hours {} is out of range", self.overdue_hours))
    }
}

/// Settings for the daily check-in job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub notify: bool,
    #[serde(default)]
    pub run_on_start: bool,
    #[serde(default = "default_checkin_base_url")]
    pub base_url: String,
    /// Full cookie string copied from a logged-in browser session
    #[serde(default)]
    pub cookie: String,
    #[serde(default = "default_checkin_cron")]
    pub cron: Option<String>,
    #[serde(default = "default_checkin_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_checkin_retry_interval")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_history_days")]
    pub history_days: u32,
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default = "default_required_cookies")]
    pub required_cookies: Vec<String>,
}

fn default_checkin_base_url() -> String {
    "https://club.fnnas.com".to_string()
}

fn default_checkin_cron() -> Option<String> {
    Some("0 8 * * *".to_string())
}

fn default_checkin_interval_minutes() -> u64 {
    24 * 60
}

fn default_checkin_retry_interval() -> u64 {
    30
}

fn default_history_days() -> u32 {
    30
}

fn default_required_cookies() -> Vec<String> {
    vec!["pvRK_2132_saltkey".to_string(), "pvRK_2132_auth".to_string()]
}

impl Default for CheckinConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            notify: true,
            run_on_start: false,
            base_url: default_checkin_base_url(),
            cookie: String::new(),
            cron: default_checkin_cron(),
            interval_minutes: default_checkin_interval_minutes(),
            retry_count: default_retry_count(),
            retry_interval_secs: default_checkin_retry_interval(),
            history_days: default_history_days(),
            use_proxy: false,
            required_cookies: default_required_cookies(),
        }
    }
}

impl CheckinConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, Duration::from_secs(self.retry_interval_secs))
    }

    pub fn schedule(&self) -> Result<Schedule> {
        Schedule::from_settings(self.cron.as_deref(), self.interval_minutes)
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = directories::ProjectDirs::from("", "", "forumwatch")
        .context("Could not determine config directory")?
        .config_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Directory holding persisted job state
pub fn state_dir(config: &Config) -> Result<PathBuf> {
    if let Some(dir) = &config.state.dir {
        return Ok(dir.clone());
    }
    let dir = directories::ProjectDirs::from("", "", "forumwatch")
        .context("Could not determine data directory")?
        .data_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}. Run `forumwatch --init` to create one.",
            path.display()
        );
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    parse(&content).with_context(|| format!("Failed to parse config from {}", path.display()))
}

pub fn parse(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Reject values that cannot be turned into schedules or durations
    pub fn validate(&self) -> Result<()> {
        self.invites.schedule().context("Invalid [invites] schedule")?;
        self.invites.overdue_after().context("Invalid [invites] settings")?;
        self.checkin.schedule().context("Invalid [checkin] schedule")?;
        Ok(())
    }
}

pub async fn init_wizard() -> Result<()> {
    use std::io::{self, Write};

    if !atty::is(atty::Stream::Stdin) {
        anyhow::bail!("--init needs an interactive terminal");
    }

    println!("forumwatch Configuration Wizard");
    println!("===============================\n");

    let config_path = default_config_path()?;
    if config_path.exists() {
        print!("Config already exists at {}. Overwrite? [y/N] ", config_path.display());
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let prompt = |label: &str| -> Result<String> {
        print!("{}: ", label);
        io::stdout().flush()?;
        let mut value = String::new();
        io::stdin().read_line(&mut value)?;
        Ok(value.trim().to_string())
    };

    println!("Invite monitor (press Enter to skip):\n");
    let username = prompt("Forum username")?;
    let password = if username.is_empty() {
        String::new()
    } else {
        prompt("Forum password")?
    };

    println!("\nDaily check-in (press Enter to skip):\n");
    let cookie = prompt("Forum cookie string")?;

    let config = Config {
        invites: InviteConfig {
            enabled: !username.is_empty(),
            username,
            password,
            ..InviteConfig::default()
        },
        checkin: CheckinConfig {
            enabled: !cookie.is_empty(),
            cookie,
            ..CheckinConfig::default()
        },
        ..Config::default()
    };

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Write config with restricted permissions
    let content = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))?;
    }

    println!("\nConfig saved to {}", config_path.display());
    println!("Run `forumwatch run` to start the scheduler.");

    Ok(())
}

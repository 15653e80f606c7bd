use anyhow::Result;
use clap::{Parser, Subcommand};
use forumwatch::config::{self, Config};
use forumwatch::integrations::build_client;
use forumwatch::integrations::discuz::DiscuzClient;
use forumwatch::integrations::flarum::FlarumClient;
use forumwatch::jobs::{self, checkin, invites, Services};
use forumwatch::notify;
use forumwatch::scheduler::Trigger;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "forumwatch")]
#[command(about = "Scheduled forum invite monitor and daily check-in")]
#[command(version)]
struct Args {
    /// Initialize configuration
    #[arg(long)]
    init: bool,

    /// Path to config file
    #[arg(long, short)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run enabled jobs on their schedules until Ctrl-C (default)
    Run,
    /// Check pending invites once
    Invites,
    /// Check in once, even if already done today
    Checkin,
    /// Show persisted invites and recent check-ins
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("forumwatch=info".parse()?),
        )
        .init();

    if args.init {
        config::init_wizard().await?;
        return Ok(());
    }

    let config = config::load(args.config.as_deref())?;
    let notifier: Arc<dyn notify::Notifier> = Arc::from(notify::from_config(&config.notifications)?);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let scheduler = jobs::build_scheduler(&config, notifier)?;
            scheduler.run_until_shutdown().await
        }
        Command::Invites => {
            let services = Services::for_job(&config, invites::JOB_ID, notifier)?;
            let client = FlarumClient::new(
                build_client(&config.http, config.invites.use_proxy)?,
                config.invites.base_url.clone(),
            );
            invites::check_invites(
                &config.invites,
                &client,
                services.store.as_ref(),
                services.notifier.as_ref(),
                Trigger::Manual,
            )
            .await;
            Ok(())
        }
        Command::Checkin => {
            let services = Services::for_job(&config, checkin::JOB_ID, notifier)?;
            let client = DiscuzClient::new(
                build_client(&config.http, config.checkin.use_proxy)?,
                config.checkin.base_url.clone(),
            );
            checkin::check_in(
                &config.checkin,
                &client,
                services.store.as_ref(),
                services.notifier.as_ref(),
                Trigger::Manual,
            )
            .await;
            Ok(())
        }
        Command::Status => print_status(&config, notifier),
    }
}

fn print_status(config: &Config, notifier: Arc<dyn notify::Notifier>) -> Result<()> {
    let services = Services::for_job(config, invites::JOB_ID, Arc::clone(&notifier))?;
    let pending = invites::pending_summary(services.store.as_ref())?;

    println!("Pending invites ({})", pending.len());
    if pending.is_empty() {
        println!("  none");
    }
    for (id, stamp) in &pending {
        println!("  {:<12} last reported {}", id, stamp);
    }

    let services = Services::for_job(config, checkin::JOB_ID, notifier)?;
    let history = checkin::recent_history(services.store.as_ref(), 30)?;

    println!("\nRecent check-ins ({})", history.len());
    if history.is_empty() {
        println!("  none");
    }
    for record in &history {
        let credits = &record.credits;
        let show = |v: Option<u64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
        let mark = if record.state.is_success() { '+' } else { '!' };
        println!(
            "  {} {}  {:<20} coins {} | reputation {} | points {} | login days {}",
            mark,
            record.date.format("%Y-%m-%d %H:%M:%S"),
            record.state.label(),
            show(credits.coins),
            show(credits.reputation),
            show(credits.points),
            show(credits.login_days),
        );
    }

    Ok(())
}

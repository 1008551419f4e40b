use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pmm_shell_core::api::{RestClient, UpdateApi};
use pmm_shell_core::config::ShellConfig;
use pmm_shell_core::logging::init_tracing;
use pmm_shell_core::models::UpdateSeverity;
use pmm_shell_core::update::{UpdateDriver, UpdateStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "pmm-shell", about = "Check, install and snooze server updates", version)]
struct Cli {
    /// YAML configuration file
    #[arg(long, env = "PMM_SHELL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Show installed and latest versions and outdated clients
    Check,
    /// Install the latest release and follow its logs
    Update,
    /// Hide the update notice for the latest release
    Snooze,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ShellConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(config.log_dir.as_deref()).map_err(anyhow::Error::msg)?;

    let client = Arc::new(RestClient::from_config(&config)?);
    let mut driver = UpdateDriver::from_config(client, &config);

    let status = driver.check(true).await;
    match cli.command.unwrap_or(Command::Check) {
        Command::Check => print_status(&driver),
        Command::Update => {
            if status != UpdateStatus::Pending {
                print_status(&driver);
                bail!("no update to install (status {})", status.as_str());
            }
            let (shutdown_tx, mut shutdown) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = shutdown_tx.send(true);
                }
            });
            let status = driver.run_update(&mut shutdown).await;
            for line in &driver.session().log_lines {
                println!("{}", line);
            }
            if let Some(notification) = &driver.session().notification {
                eprintln!("{}", notification.message);
            }
            if status != UpdateStatus::Completed {
                bail!("update did not complete (status {})", status.as_str());
            }
            println!("update completed");
        }
        Command::Snooze => {
            let user = driver.snooze().await.context("snoozing update")?;
            println!("snoozed {}", user.snoozed_pmm_version);
        }
    }
    Ok(())
}

fn print_status<A: UpdateApi>(driver: &UpdateDriver<A>) {
    let session = driver.session();
    println!("status: {}", session.status.as_str());
    if let Some(info) = &session.version_info {
        println!("installed: {}", info.installed.version);
        if let Some(latest) = info.latest_version() {
            println!("latest: {}", latest);
        }
    }
    let outdated = session
        .agents
        .iter()
        .filter(|agent| agent.severity != UpdateSeverity::UpToDate)
        .count();
    if outdated > 0 {
        println!("clients needing update: {}", outdated);
    }
}

//! hubkeeper - keeps a GitHub-backed session alive from the terminal.
//!
//! Logs in with a personal access token, then runs the session keeper and
//! the auth reactions in the foreground until interrupted.

mod app;
mod host;

use std::io;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use hubkeeper_core::{Config, Event};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{delete_outcome, login_outcome, wait_for, App};

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "hubkeeper.log";

#[derive(Parser)]
#[command(name = "hubkeeper", version, about = "Keep a GitHub-backed session fresh")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a personal access token and log in with it
    Login {
        #[arg(long, env = "HUBKEEPER_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Restore the saved session and keep it fresh until Ctrl-C
    Run,
    /// Show the saved session
    Status,
    /// Forget the saved session and the locally stored token
    Logout,
    /// Permanently delete the account on the backend
    DeleteAccount {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// Stderr honours `RUST_LOG` (default `warn`); the daily log file in the
/// cache directory always records `info` and above.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr = fmt::layer().with_writer(io::stderr).with_filter(filter);

    let (file, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new("info"));
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry().with(stderr).with(file).init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;
    let _log_guard = init_tracing(&config);
    info!(mode = ?config.auth_mode, "hubkeeper starting");

    let app = App::new(config)?;
    match cli.command {
        Command::Login { token } => login(&app, &token).await,
        Command::Run => run(&app).await,
        Command::Status => status(&app),
        Command::Logout => logout(&app),
        Command::DeleteAccount { yes } => delete_account(&app, yes).await,
    }
}

async fn login(app: &App, token: &str) -> Result<()> {
    let reactor = app.start_reactor();
    let mut events = app.store.events();

    let outcome = match app.token_controller().validate_and_adopt(token).await {
        Ok(()) => wait_for(&mut events, login_outcome).await,
        Err(e) => Ok(Err(e)),
    };

    reactor.shutdown().await;

    match outcome? {
        Ok(session) => {
            app.save_session(&session)?;
            println!("Logged in as @{}", session.user.github_account().login);
            Ok(())
        }
        Err(e) => bail!("Login failed: {}", e),
    }
}

async fn run(app: &App) -> Result<()> {
    let session = app.session();
    if session.is_none() {
        bail!("Not logged in. Run `hubkeeper login --token <TOKEN>` first.");
    }

    let reactor = app.start_reactor();
    let persistence = app.start_persistence();
    let keeper = app.start_keeper();

    app.store.dispatch(Event::Rehydrate {
        session: session.map(Box::new),
    });
    println!("Keeping session fresh. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    keeper.abort();
    reactor.shutdown().await;
    persistence.abort();
    Ok(())
}

fn status(app: &App) -> Result<()> {
    let Some(session) = app.session() else {
        println!("Not logged in");
        return Ok(());
    };

    let user = &session.user;
    println!("Logged in as @{}", user.github_account().login);
    if let Some(plan) = &user.plan {
        let label = match plan.label.as_deref() {
            Some(label) => label,
            None if plan.is_free() => "Free",
            None => "unknown",
        };
        println!("Plan: {}", label);
        match plan.trial_end_at {
            Some(trial_end) if plan.is_trialing_at(Utc::now()) => {
                println!("Trial ends: {}", trial_end.format("%Y-%m-%d %H:%M UTC"))
            }
            Some(trial_end) => println!("Trial ended: {}", trial_end.format("%Y-%m-%d %H:%M UTC")),
            None => {}
        }
    }
    if let Some(last_login) = user.last_login_at {
        let hours = (Utc::now() - last_login).num_hours();
        println!("Last login: {} ({}h ago)", last_login.format("%Y-%m-%d %H:%M UTC"), hours);
    }
    let has_token = user.github_identity.personal.is_some();
    println!("Personal access token: {}", if has_token { "stored" } else { "none" });
    Ok(())
}

fn logout(app: &App) -> Result<()> {
    app.clear_session()?;
    app.token_controller().revoke()?;
    println!("Logged out");
    Ok(())
}

async fn delete_account(app: &App, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("Deleting the account cannot be undone. Re-run with --yes to confirm.");
    }
    if app.session().is_none() {
        bail!("Not logged in");
    }

    let reactor = app.start_reactor();
    let mut events = app.store.events();
    app.store.dispatch(Event::DeleteAccountRequest);
    let outcome = wait_for(&mut events, delete_outcome).await;
    reactor.shutdown().await;

    match outcome? {
        Ok(()) => {
            app.clear_session()?;
            app.token_controller().revoke()?;
            println!("Account deleted");
            Ok(())
        }
        Err(e) => bail!("Account deletion failed: {}", e),
    }
}

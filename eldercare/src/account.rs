//! eldercare-account - manage the care backend account used by the relay
//!
//! This tool provides commands for:
//! - Logging in, registering and logging out
//! - Showing the stored session and configuration
//! - Fetching recent heart-rate history
//!
//! The session is stored at $XDG_DATA_HOME/eldercare/session.json and read
//! by eldercare-relay on startup.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{NaiveTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use eldercare_core::dispatch::Registration;
use eldercare_core::{ApiClient, Config, SessionStore};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "eldercare-account")]
#[command(about = "Manage the care backend account used by the relay")]
#[command(version)]
struct Args {
    /// Verbose output (writes a log file)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        username: String,

        /// Password (prompted on stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account and store the session
    Register {
        username: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        #[arg(long)]
        email: String,

        /// Date of birth, e.g. 1950-04-12
        #[arg(long)]
        date_of_birth: String,

        /// Password (prompted on stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show configuration and the stored session
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch heart-rate history (default: since the start of today, UTC)
    Recent {
        /// Start of the range (RFC 3339)
        #[arg(long)]
        from: Option<String>,

        /// End of the range (RFC 3339)
        #[arg(long)]
        to: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct StatusReport {
    config_path: String,
    base_url: String,
    session_path: String,
    username: Option<String>,
    has_token: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = if args.verbose {
        Some(eldercare_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    let sessions = Arc::new(
        SessionStore::open(Config::session_path()).context("failed to open session store")?,
    );
    let client =
        ApiClient::new(&config.api, sessions.clone()).context("failed to create API client")?;

    match args.command {
        Command::Login { username, password } => cmd_login(&client, &username, password).await,
        Command::Register {
            username,
            first_name,
            last_name,
            email,
            date_of_birth,
            password,
        } => {
            let password = password_or_prompt(password)?;
            let registration = Registration {
                username,
                password,
                first_name,
                last_name,
                email,
                date_of_birth,
            };
            cmd_register(&client, &registration).await
        }
        Command::Logout => cmd_logout(&client),
        Command::Status { json } => cmd_status(&config, &sessions, json),
        Command::Recent { from, to, json } => cmd_recent(&client, from, to, json).await,
    }
}

async fn cmd_login(client: &ApiClient, username: &str, password: Option<String>) -> Result<()> {
    let password = password_or_prompt(password)?;
    match client.login(username, &password).await {
        Ok(session) => {
            println!("Logged in as {}", session.username);
            Ok(())
        }
        Err(e) => bail!("login failed: {}", e.diagnostic()),
    }
}

async fn cmd_register(client: &ApiClient, registration: &Registration) -> Result<()> {
    match client.register(registration).await {
        Ok(session) => {
            println!("Registered and logged in as {}", session.username);
            Ok(())
        }
        Err(e) => bail!("registration failed: {}", e.diagnostic()),
    }
}

fn cmd_logout(client: &ApiClient) -> Result<()> {
    let previous = client.sessions().current();
    client.logout().context("failed to clear session")?;
    match previous {
        Some(session) => println!("Logged out {}", session.username),
        None => println!("Logged out"),
    }
    Ok(())
}

fn cmd_status(config: &Config, sessions: &SessionStore, json: bool) -> Result<()> {
    let current = sessions.current();
    let report = StatusReport {
        config_path: Config::config_path().display().to_string(),
        base_url: config.api.base_url.clone(),
        session_path: sessions.path().display().to_string(),
        username: current.as_ref().map(|s| s.username.clone()),
        has_token: sessions.token().is_some(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Account Status");
    println!("==============");
    println!();
    println!("Config:   {}", report.config_path);
    println!("Backend:  {}", report.base_url);
    println!("Session:  {}", report.session_path);
    println!(
        "Logs:     {}",
        eldercare_core::logging::log_file_path().display()
    );
    println!();
    match report.username {
        Some(username) => println!("Logged in as {}", username),
        None => println!("Not logged in"),
    }
    Ok(())
}

async fn cmd_recent(
    client: &ApiClient,
    from: Option<String>,
    to: Option<String>,
    json: bool,
) -> Result<()> {
    let now = Utc::now();
    let from = from.unwrap_or_else(|| {
        now.date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc()
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    });
    let to = to.unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Secs, true));

    let samples = match client.recent_heart_rate(&from, &to).await {
        Ok(samples) => samples,
        Err(e) => bail!("failed to fetch heart rate history: {}", e.diagnostic()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
        return Ok(());
    }

    println!("Heart rate {} .. {}", from, to);
    if samples.is_empty() {
        println!("No readings");
        return Ok(());
    }
    for sample in &samples {
        println!("  {:<28} {:>6} bpm", sample.timestamp, sample.measurement);
    }
    println!();
    println!("{} readings", samples.len());
    Ok(())
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }

    eprint!("Password: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("password must not be empty");
    }
    Ok(password)
}

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use secrecy::SecretString;
use std::io::BufRead;
use std::path::PathBuf;

use tubescan::config::Config;
use tubescan::fetch::{build_client, HttpFetcher};
use tubescan::search::{
    DateRange, FilterMode, Item, SearchRequest, SearchSession, SessionEvent, SessionState,
};
use tubescan::storage::{CredentialSettings, Database, DatabaseError};
use tubescan::util::display_title;

/// Get the config directory path (~/.config/tubescan/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("tubescan");
    Ok(config_dir)
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD ({})", e))
}

#[derive(Parser, Debug)]
#[command(
    name = "tubescan",
    version,
    about = "Search videos by keyword and keep only titles that match"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a search until results run out or Ctrl-C
    Search {
        /// Search terms
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Title filter: default (all words), phrase or exact
        #[arg(long, short)]
        mode: Option<FilterMode>,

        /// Only videos published on or after this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        after: Option<NaiveDate>,

        /// Only videos published on or before this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        before: Option<NaiveDate>,

        /// Print one JSON object per match instead of text lines
        #[arg(long)]
        json: bool,
    },

    /// Manage the personal API key
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Show the stored key (masked) and whether it is in use
    Show,
    /// Store an API key and start using it ("-" reads the key from stdin)
    SetKey { key: String },
    /// Remove the stored key and go back to the proxy
    ClearKey,
    /// Turn use of the stored key on or off
    UseCustom {
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        enabled: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // The settings database may hold an API key
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config = Config::load(&config_dir.join("config.toml")).context("Failed to load config")?;

    let db_path = config_dir.join("settings.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    match args.command {
        Command::Search {
            query,
            mode,
            after,
            before,
            json,
        } => {
            if let (Some(after), Some(before)) = (after, before) {
                if after > before {
                    anyhow::bail!("--after ({}) is later than --before ({})", after, before);
                }
            }
            let settings = db
                .load_credential_settings()
                .await
                .context("Failed to load credential settings")?;
            let request = SearchRequest::new(query.join(" "), mode.unwrap_or(config.default_mode))
                .with_date_range(DateRange::new(after, before))
                .with_credential(settings.into_active_credential());

            let succeeded = run_search(&config, request, json).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Command::Settings { action } => run_settings(&db, action).await?,
    }

    Ok(())
}

/// Runs one session to its end, printing matches as pages arrive.
///
/// Returns `false` for a rejected query or a failed session.
async fn run_search(config: &Config, request: SearchRequest, json: bool) -> Result<bool> {
    let client = build_client().context("Failed to build HTTP client")?;
    let fetcher =
        HttpFetcher::new(client, &config.endpoints()).context("Invalid search endpoint")?;
    let mut session = SearchSession::new(fetcher).with_page_delay(config.page_delay());

    let stop = session.stop_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupt received, stopping search");
            stop.stop();
        }
    });

    let mut events = session.subscribe();
    let title_width = config.title_width;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::PageRequested { page, total_matches } => {
                    tracing::debug!(page = page, total = total_matches, "Fetching page");
                }
                SessionEvent::PageScanned { matches, .. } => {
                    for item in &matches {
                        print_item(item, title_width, json);
                    }
                }
                SessionEvent::Started { .. } | SessionEvent::Finished { .. } => {}
            }
        }
    });

    let outcome = session.start(request).await;
    session.close_events();
    ctrl_c.abort();
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Result printer task failed");
    }

    match outcome {
        Ok(status) => {
            eprintln!("{}", status.message);
            Ok(status.state != SessionState::Failed)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(false)
        }
    }
}

fn print_item(item: &Item, title_width: usize, json: bool) {
    if json {
        match serde_json::to_string(item) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(id = %item.id, error = %e, "Failed to serialize item"),
        }
        return;
    }

    let date = item
        .published_at
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string());
    println!(
        "{}  {}  {}",
        date,
        display_title(&item.title, title_width),
        item.watch_url()
    );
}

async fn run_settings(db: &Database, action: SettingsAction) -> Result<()> {
    let mut settings = db
        .load_credential_settings()
        .await
        .context("Failed to load credential settings")?;

    match action {
        SettingsAction::Show => {
            print_settings(&settings);
            return Ok(());
        }
        SettingsAction::SetKey { key } => {
            let key = if key == "-" {
                read_key_from_stdin()?
            } else {
                key
            };
            let key = key.trim().to_string();
            if key.is_empty() {
                anyhow::bail!("API key is empty");
            }
            settings = CredentialSettings {
                use_custom_credential: true,
                credential: Some(SecretString::from(key)),
            };
        }
        SettingsAction::ClearKey => {
            settings = CredentialSettings::default();
        }
        SettingsAction::UseCustom { enabled } => {
            if enabled && settings.credential.is_none() {
                eprintln!("Warning: no API key stored; searches will use the proxy until one is set.");
            }
            settings.use_custom_credential = enabled;
        }
    }

    db.save_credential_settings(&settings)
        .await
        .context("Failed to save credential settings")?;
    print_settings(&settings);
    Ok(())
}

fn read_key_from_stdin() -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read API key from stdin")?;
    Ok(line)
}

fn print_settings(settings: &CredentialSettings) {
    println!(
        "Custom API key: {}",
        if settings.use_custom_credential {
            "on"
        } else {
            "off"
        }
    );
    println!(
        "Stored key:     {}",
        settings.masked().unwrap_or_else(|| "(none)".to_string())
    );
    let route = if settings.active_credential().is_some() {
        "direct"
    } else {
        "proxy"
    };
    println!("Requests go:    {}", route);
}

//! # Drive Harness CLI (`dh`)
//!
//! ## Usage
//!
//! ```bash
//! dh --config ./config/dh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dh init` | Create the SQLite database and run schema migrations |
//! | `dh auth-url` | Print the provider consent URL that starts an OAuth flow |
//! | `dh connect` | Store a provider token set for a user |
//! | `dh connections` | List a user's connections |
//! | `dh disconnect` | Remove a user's connection to a provider |
//! | `dh ingest` | Enumerate and extract documents from connected providers |
//! | `dh ask "<question>"` | Ingest, then answer from the readable documents |
//! | `dh summarize` | Ingest, then summarize the readable documents |
//! | `dh extract <path>` | Run the content extractor on a local file |
//! | `dh cache` | Show recently ingested document previews |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `drive_harness=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use drive_harness::ask::{self, AskRequest, Scope};
use drive_harness::connections::{self, ConnectArgs};
use drive_harness::extract::{self, Limits};
use drive_harness::ingest::{self, ProviderSelection};
use drive_harness::models::Provider;
use drive_harness::{config, migrate, oauth};

/// Drive Harness CLI: cloud document ingestion for question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Missing files fall back to defaults plus environment variables.
#[derive(Parser)]
#[command(
    name = "dh",
    about = "Drive Harness: ingest Google Drive, OneDrive and Notion documents for Q&A",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Print the consent URL for a provider's authorization-code flow.
    AuthUrl {
        #[arg(long)]
        provider: String,
        /// Opaque value echoed back to the redirect URI.
        #[arg(long)]
        state: Option<String>,
    },

    /// Store a token set for a user, as an OAuth callback would.
    Connect {
        #[arg(long)]
        user: String,
        /// `google`, `onedrive` or `notion`.
        #[arg(long)]
        provider: String,
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: Option<String>,
        /// Token lifetime in seconds as reported by the provider.
        #[arg(long)]
        expires_in: Option<i64>,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        account_email: Option<String>,
    },

    /// List a user's connections.
    Connections {
        #[arg(long)]
        user: String,
    },

    /// Remove a user's connection.
    Disconnect {
        #[arg(long)]
        user: String,
        #[arg(long)]
        provider: String,
    },

    /// Enumerate and extract documents.
    ///
    /// With `--provider auto` every provider the user is connected to is
    /// queried concurrently; a failing provider contributes nothing.
    Ingest {
        #[arg(long)]
        user: String,
        /// `auto`, or one of `google`, `onedrive`, `notion`.
        #[arg(long, default_value = "auto")]
        provider: String,
        /// Folder or file URL, share link, or item id.
        #[arg(long)]
        locator: Option<String>,
        /// Maximum documents per provider.
        #[arg(long, default_value_t = 10)]
        max: usize,
        /// Print documents as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ingest, then answer a question from the readable documents.
    Ask {
        question: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "auto")]
        provider: String,
        #[arg(long)]
        locator: Option<String>,
        #[arg(long, default_value_t = 10)]
        max: usize,
        #[arg(long)]
        json: bool,
    },

    /// Ingest, then summarize the readable documents.
    Summarize {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "auto")]
        provider: String,
        #[arg(long)]
        locator: Option<String>,
        #[arg(long, default_value_t = 10)]
        max: usize,
        #[arg(long)]
        json: bool,
    },

    /// Run the content extractor on a local file.
    Extract {
        path: PathBuf,
        /// Override the character budget for office documents and text.
        #[arg(long)]
        max_chars: Option<usize>,
    },

    /// Show cached document previews.
    Cache {
        #[arg(long)]
        user: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

fn parse_selection(s: &str) -> anyhow::Result<ProviderSelection> {
    if s.trim().eq_ignore_ascii_case("auto") {
        Ok(ProviderSelection::Auto)
    } else {
        Ok(ProviderSelection::single(s.parse::<Provider>()?))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("drive_harness=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::AuthUrl { provider, state } => {
            let url = oauth::authorize_url(&cfg.providers, provider.parse()?, state.as_deref())?;
            println!("{}", url);
        }
        Commands::Connect {
            user,
            provider,
            access_token,
            refresh_token,
            expires_in,
            scope,
            account_email,
        } => {
            let args = ConnectArgs {
                access_token,
                refresh_token,
                expires_in,
                scope,
                account_email,
            };
            connections::run_connect(&cfg, &user, provider.parse()?, args).await?;
        }
        Commands::Connections { user } => {
            connections::run_connections(&cfg, &user).await?;
        }
        Commands::Disconnect { user, provider } => {
            connections::run_disconnect(&cfg, &user, provider.parse()?).await?;
        }
        Commands::Ingest {
            user,
            provider,
            locator,
            max,
            json,
        } => {
            let selection = parse_selection(&provider)?;
            ingest::run_ingest(&cfg, &user, &selection, locator.as_deref(), max, json).await?;
        }
        Commands::Ask {
            question,
            user,
            provider,
            locator,
            max,
            json,
        } => {
            let request = AskRequest {
                question,
                scope: Scope {
                    user,
                    selection: parse_selection(&provider)?,
                    locator,
                    max_per_provider: max,
                },
            };
            ask::run_ask(&cfg, &request, json).await?;
        }
        Commands::Summarize {
            user,
            provider,
            locator,
            max,
            json,
        } => {
            let scope = Scope {
                user,
                selection: parse_selection(&provider)?,
                locator,
                max_per_provider: max,
            };
            ask::run_summarize(&cfg, &scope, json).await?;
        }
        Commands::Extract { path, max_chars } => {
            let mut limits = Limits::from(&cfg.extract);
            if let Some(n) = max_chars {
                limits = limits.with_max_chars(n);
            }
            extract::run_extract(&path, &limits)?;
        }
        Commands::Cache {
            user,
            provider,
            limit,
        } => {
            let provider = provider.map(|p| p.parse::<Provider>()).transpose()?;
            connections::run_cache(&cfg, &user, provider, limit).await?;
        }
    }

    Ok(())
}

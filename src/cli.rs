//! Command-line interface

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::resolve_credentials_path;
use crate::config::Config;
use crate::error::{MailError, Result};
use crate::export::export_csv;
use crate::gateway::{MailGateway, ProductionMailGateway};
use crate::generator::{DraftGenerator, GeminiGenerator};
use crate::models::{EmailDocument, EmailRecord, FetchedMessage, Generation, Outcome};
use crate::reconciler::Reconciler;
use crate::store::EmailStore;

#[derive(Parser, Debug)]
#[command(name = "intellimail")]
#[command(version)]
#[command(about = "Gmail inbox assistant with AI summaries and reply drafts", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file (defaults to $GOOGLE_APPLICATION_CREDENTIALS)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Path to token cache file
    #[arg(long, default_value = ".intellimail/token.json")]
    pub token_cache: PathBuf,

    /// Path to the processed-email store
    #[arg(long, default_value = ".intellimail/emails.json")]
    pub store: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Fetch recent mail, check reply status, and generate summaries and drafts
    Refresh {
        /// Number of recent messages to process (1-50)
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },

    /// Print every stored email
    Emails,

    /// Newest unreplied emails, generating any missing drafts
    Unreplied {
        /// Maximum number of emails to return
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Send a reply to a stored email and mark it replied
    Reply {
        /// Stored email id
        id: String,

        /// Reply body
        text: String,
    },

    /// Export stored emails as CSV
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize a piece of text
    Summarize { text: String },

    /// Draft a reply to a piece of text
    Draft { text: String },

    /// Fetch recent messages without generating or storing anything
    Recent {
        #[arg(short = 'n', long, default_value_t = 5)]
        count: u32,
    },

    /// Replace the store with emails read from a JSON file
    Save {
        /// JSON file holding `{"emails": [...]}` or a bare array
        file: PathBuf,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Spinner feedback on stderr so stdout stays machine-readable
pub struct ProgressReporter {
    enabled: bool,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new(enabled: bool) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            enabled,
            spinner_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the terminal
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        if self.enabled {
            eprintln!("  ✓ {}", msg);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true)
    }
}

/// What a command leaves on stdout
#[derive(Debug)]
pub enum CommandOutput {
    Json(Outcome<serde_json::Value>),
    Text(String),
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        match self {
            CommandOutput::Json(outcome) => outcome.success,
            CommandOutput::Text(_) => true,
        }
    }

    pub fn render(&self) -> String {
        match self {
            CommandOutput::Json(outcome) => serde_json::to_string_pretty(outcome)
                .unwrap_or_else(|e| format!("{{\"success\":false,\"error\":\"{}\"}}", e)),
            CommandOutput::Text(text) => text.clone(),
        }
    }
}

/// Stand-in for a collaborator the running command never calls
struct Unconfigured(&'static str);

impl Unconfigured {
    fn error(&self) -> MailError {
        MailError::ConfigError(format!("{} is not available for this command", self.0))
    }
}

#[async_trait]
impl MailGateway for Unconfigured {
    async fn list_recent(&self, _max_results: u32) -> Result<Vec<FetchedMessage>> {
        Err(self.error())
    }

    async fn owner_aliases(&self) -> Result<Vec<String>> {
        Err(self.error())
    }

    async fn thread_replied(&self, _thread_id: &str, _aliases: &[String]) -> Result<bool> {
        Err(self.error())
    }

    async fn send_reply(&self, _thread_id: &str, _text: &str) -> Result<()> {
        Err(self.error())
    }
}

#[async_trait]
impl DraftGenerator for Unconfigured {
    async fn summarize(&self, _text: &str) -> Generation {
        Generation::failed(self.error())
    }

    async fn draft_reply(&self, _text: &str) -> Generation {
        Generation::failed(self.error())
    }
}

/// Which collaborators a command needs
#[derive(Debug, Clone, Copy, Default)]
struct Needs {
    gateway: bool,
    generator: bool,
}

/// Input accepted by `save`: the store document or a bare list
#[derive(Deserialize)]
#[serde(untagged)]
enum SaveInput {
    Document(EmailDocument),
    List(Vec<EmailRecord>),
}

impl SaveInput {
    fn into_records(self) -> Vec<EmailRecord> {
        match self {
            SaveInput::Document(doc) => doc.emails,
            SaveInput::List(list) => list,
        }
    }
}

fn to_outcome<T: Serialize>(result: Result<T>) -> Outcome<serde_json::Value> {
    let result = result.and_then(|payload| serde_json::to_value(payload).map_err(MailError::from));
    Outcome::from(result)
}

fn generation_outcome(generation: Generation) -> Outcome<serde_json::Value> {
    Outcome {
        success: generation.success,
        error: generation.error.clone(),
        payload: serde_json::to_value(&generation).ok(),
    }
}

async fn build_reconciler(
    cli: &Cli,
    config: &Config,
    needs: Needs,
    reporter: &ProgressReporter,
) -> Result<Reconciler> {
    let gateway: Arc<dyn MailGateway> = if needs.gateway {
        let credentials = resolve_credentials_path(cli.credentials.as_deref())?;
        let spinner = reporter.add_spinner("Authenticating with Gmail API...");
        let gateway =
            ProductionMailGateway::connect(&credentials, &cli.token_cache, &config.gateway).await;
        spinner.finish_and_clear();
        Arc::new(gateway?)
    } else {
        Arc::new(Unconfigured("Mail gateway"))
    };

    let generator: Arc<dyn DraftGenerator> = if needs.generator {
        Arc::new(GeminiGenerator::from_config(&config.generator)?)
    } else {
        Arc::new(Unconfigured("Draft generator"))
    };

    Ok(Reconciler::new(
        gateway,
        generator,
        EmailStore::new(&cli.store),
        config.gateway.max_concurrent_requests,
    ))
}

/// Run the parsed command; failures are folded into the printed outcome
pub async fn execute(cli: &Cli) -> CommandOutput {
    let reporter = ProgressReporter::new(!cli.verbose);
    match dispatch(cli, &reporter).await {
        Ok(output) => output,
        Err(e) => CommandOutput::Json(Outcome::failed(e)),
    }
}

async fn dispatch(cli: &Cli, reporter: &ProgressReporter) -> Result<CommandOutput> {
    // init-config must work even when the existing file is invalid
    let config = match &cli.command {
        Commands::InitConfig { .. } => Config::default(),
        _ => Config::load(&cli.config).await?,
    };

    let output = match &cli.command {
        Commands::Auth { force } => {
            let payload = authenticate(cli, &config, *force, reporter).await;
            CommandOutput::Json(to_outcome(payload))
        }

        Commands::Refresh { count } => {
            let needs = Needs { gateway: true, generator: true };
            let reconciler = build_reconciler(cli, &config, needs, reporter).await?;
            let count = count.unwrap_or(config.refresh.default_max_results);

            let spinner = reporter.add_spinner("Refreshing recent emails...");
            let result = reconciler.refresh(count).await;
            match &result {
                Ok(records) => reporter
                    .finish_spinner(&spinner, &format!("Processed {} emails", records.len())),
                Err(_) => spinner.finish_and_clear(),
            }
            CommandOutput::Json(to_outcome(result))
        }

        Commands::Emails => {
            let reconciler = build_reconciler(cli, &config, Needs::default(), reporter).await?;
            CommandOutput::Json(to_outcome(Ok(reconciler.list_emails().await)))
        }

        Commands::Unreplied { limit } => {
            let needs = Needs { gateway: false, generator: true };
            let reconciler = build_reconciler(cli, &config, needs, reporter).await?;
            let limit = limit.unwrap_or(config.refresh.unreplied_limit);

            let spinner = reporter.add_spinner("Loading unreplied emails...");
            let result = reconciler.list_unreplied_with_drafts(limit).await;
            spinner.finish_and_clear();
            CommandOutput::Json(to_outcome(result))
        }

        Commands::Reply { id, text } => {
            let needs = Needs { gateway: true, generator: false };
            let reconciler = build_reconciler(cli, &config, needs, reporter).await?;
            CommandOutput::Json(to_outcome(reconciler.mark_replied(id, text).await))
        }

        Commands::Export { output } => {
            let csv = export_csv(&EmailStore::new(&cli.store)).await;
            match output {
                Some(path) => {
                    let result = write_export(path, &csv).await;
                    CommandOutput::Json(to_outcome(result))
                }
                None => CommandOutput::Text(csv),
            }
        }

        Commands::Summarize { text } => {
            let needs = Needs { gateway: false, generator: true };
            let reconciler = build_reconciler(cli, &config, needs, reporter).await?;
            CommandOutput::Json(generation_outcome(reconciler.generate_summary(text).await))
        }

        Commands::Draft { text } => {
            let needs = Needs { gateway: false, generator: true };
            let reconciler = build_reconciler(cli, &config, needs, reporter).await?;
            CommandOutput::Json(generation_outcome(reconciler.generate_draft(text).await))
        }

        Commands::Recent { count } => {
            let needs = Needs { gateway: true, generator: false };
            let reconciler = build_reconciler(cli, &config, needs, reporter).await?;
            CommandOutput::Json(to_outcome(reconciler.preview_recent(*count).await))
        }

        Commands::Save { file } => {
            let reconciler = build_reconciler(cli, &config, Needs::default(), reporter).await?;
            let result = match read_save_input(file).await {
                Ok(records) => reconciler
                    .save_emails(&records)
                    .await
                    .map(|saved| json!({ "saved": saved })),
                Err(e) => Err(e),
            };
            CommandOutput::Json(to_outcome(result))
        }

        Commands::InitConfig { output, force } => {
            CommandOutput::Json(to_outcome(init_config(output, *force).await))
        }
    };

    Ok(output)
}

async fn authenticate(
    cli: &Cli,
    config: &Config,
    force: bool,
    reporter: &ProgressReporter,
) -> Result<serde_json::Value> {
    if force && cli.token_cache.exists() {
        tokio::fs::remove_file(&cli.token_cache).await?;
        info!("Removed existing token cache");
    }

    let credentials = resolve_credentials_path(cli.credentials.as_deref())?;
    let spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let gateway =
        ProductionMailGateway::connect(&credentials, &cli.token_cache, &config.gateway).await;
    spinner.finish_and_clear();
    let aliases = gateway?.owner_aliases().await?;

    Ok(json!({
        "token_cache": cli.token_cache,
        "aliases": aliases,
    }))
}

async fn init_config(output: &Path, force: bool) -> Result<serde_json::Value> {
    if output.exists() && !force {
        return Err(MailError::ConfigError(format!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output
        )));
    }

    Config::create_example(output).await?;
    info!("Created example configuration file at {:?}", output);
    Ok(json!({ "path": output }))
}

async fn write_export(path: &Path, csv: &str) -> Result<serde_json::Value> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, csv).await?;
    info!("Exported CSV to {:?}", path);
    Ok(json!({ "path": path, "bytes": csv.len() }))
}

async fn read_save_input(path: &Path) -> Result<Vec<EmailRecord>> {
    let content = tokio::fs::read_to_string(path).await?;
    let input: SaveInput = serde_json::from_str(&content)?;
    Ok(input.into_records())
}

//! Command-line interface for paperfeed.
//!
//! Provides commands for running the paper pipeline, serving the reaction
//! listener, inspecting run journals and showing the resolved configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapters::{
    ArxivClient, EnrichmentService, NotificationChannel, OpenAiClient, ServiceError, SheetsLedger,
    SlackClient,
};
use crate::config::Settings;
use crate::core::{
    load_runs, Enricher, Journal, Ledger, MemoryLedger, Notifier, Pipeline, RunLock, RunParams,
};
use crate::domain::RunState;
use crate::listener::{serve, AppState, ReactionAnnotator, SignatureVerifier};

/// paperfeed - arXiv paper digest for Slack with a Google Sheets ledger
#[derive(Parser, Debug)]
#[command(name = "paperfeed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to .paperfeed/config.yaml in this or a parent directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "PAPERFEED_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, summarize, post and record a batch of papers
    Run(RunArgs),

    /// Serve the Slack reaction webhook
    Listen {
        /// Address to bind to (overrides listener.address)
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Replay a run's journal and list posts missing from the ledger
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// How many of the newest runs to print
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Show resolved configuration (secrets are not printed)
    Config,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// arXiv search query
    #[arg(long)]
    pub query: Option<String>,

    /// Slack channel for paper notifications
    #[arg(long)]
    pub slack_channel: Option<String>,

    /// Maximum number of search results to fetch
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Number of papers to post
    #[arg(long)]
    pub num_papers: Option<usize>,

    /// Log messages instead of posting and keep ledger rows in memory
    #[arg(long)]
    pub dry_run: bool,

    /// Seed for candidate selection
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Cli {
    /// Load settings and dispatch the subcommand
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load(self.config.as_deref())?;

        match self.command {
            Commands::Run(args) => run_papers(&settings, args).await,
            Commands::Listen { address } => listen(&settings, address).await,
            Commands::Status { run_id } => show_status(&settings, &run_id).await,
            Commands::Runs { limit } => list_runs(&settings, limit).await,
            Commands::Config => show_config(&settings),
        }
    }
}

/// Merge CLI overrides into the configured run parameters
fn run_params(settings: &Settings, args: &RunArgs) -> RunParams {
    RunParams {
        query: args.query.clone().unwrap_or_else(|| settings.query.clone()),
        max_results: args.max_results.unwrap_or(settings.max_results),
        num_papers: args.num_papers.unwrap_or(settings.num_papers),
        slack_channel: args
            .slack_channel
            .clone()
            .unwrap_or_else(|| settings.slack_channel.clone()),
        bundle_channel: settings.bundle_channel.clone(),
        bundle_prompt: settings.bundle_prompt.clone(),
    }
}

/// Run the paper pipeline once
async fn run_papers(settings: &Settings, args: RunArgs) -> Result<()> {
    let params = run_params(settings, &args);

    // Holds for the whole run; a concurrent run fails here
    let lock = RunLock::acquire(&settings.lock_path())?;
    debug!(path = %lock.path().display(), "Run lock held");

    let source = ArxivClient::new()
        .with_page_size(settings.arxiv.page_size)
        .with_page_delay(settings.arxiv.page_delay)
        .with_retry_policy(settings.arxiv.retry.clone());

    let service: Option<Arc<dyn EnrichmentService>> = match &settings.secrets.openai_api_key {
        Some(key) => {
            let mut client = OpenAiClient::new(key.clone(), settings.openai_model.clone());
            if let Some(url) = &settings.openai_base_url {
                client = client.with_base_url(url.clone());
            }
            info!(model = client.model(), "Enrichment enabled");
            Some(Arc::new(client) as Arc<dyn EnrichmentService>)
        }
        None => {
            warn!("OPENAI_API_KEY not set, papers will carry fallback summaries");
            None
        }
    };
    let enricher = Enricher::new(service, settings.enrichment.clone());

    let (channel, post_delay): (Arc<dyn NotificationChannel>, Duration) = if args.dry_run {
        (Arc::new(DryRunChannel::default()) as Arc<dyn NotificationChannel>, Duration::ZERO)
    } else {
        let token = settings.require_slack_token()?;
        (Arc::new(SlackClient::new(token)) as Arc<dyn NotificationChannel>, settings.post_delay)
    };

    let ledger: Option<Arc<dyn Ledger>> = if args.dry_run {
        Some(Arc::new(MemoryLedger::new()) as Arc<dyn Ledger>)
    } else {
        match settings.sheets_credentials() {
            Some((spreadsheet_id, key_json)) => {
                let ledger = open_sheets(settings, spreadsheet_id, key_json)?;
                Some(Arc::new(ledger) as Arc<dyn Ledger>)
            }
            None => {
                warn!("SPREADSHEET_ID or GOOGLE_SERVICE_ACCOUNT_JSON not set, ledger disabled");
                None
            }
        }
    };

    let mut pipeline = Pipeline::new(Arc::new(source), enricher, Notifier::new(channel, post_delay))
        .with_runs_dir(settings.runs_dir())
        .with_selection_seed(args.seed.or(settings.selection_seed));
    if let Some(ledger) = ledger {
        pipeline = pipeline.with_ledger(ledger);
    }

    match pipeline.run(&params).await {
        Ok(report) => {
            for posted in &report.posted {
                let note = match (posted.persisted, posted.fallback) {
                    (false, _) => " (not recorded)",
                    (true, true) => " (fallback summary)",
                    (true, false) => "",
                };
                println!("  {}  {}{}", posted.candidate_id, posted.title, note);
            }
            eprintln!(
                "\n[Run {} completed: {}/{} papers posted, {} recorded]",
                report.run_id,
                report.posted.len(),
                params.num_papers,
                report.persisted
            );
        }
        Err(e) => {
            // Fetch failures end the run without side effects; still a clean exit
            error!(error = %e, "Run aborted");
            eprintln!("\n[Run aborted: {}]", e);
        }
    }

    Ok(())
}

fn open_sheets(settings: &Settings, spreadsheet_id: &str, key_json: &str) -> Result<SheetsLedger> {
    Ok(SheetsLedger::from_service_account_json(key_json, spreadsheet_id)?
        .with_sheet(settings.sheet_id, settings.sheet_name.clone()))
}

/// Serve the reaction webhook until stopped
async fn listen(settings: &Settings, address: Option<String>) -> Result<()> {
    let secret = settings.require_signing_secret()?;
    let (spreadsheet_id, key_json) = settings.require_sheets_credentials()?;

    let address = address.unwrap_or_else(|| settings.listen_addr.clone());
    let addr: SocketAddr = address
        .parse()
        .with_context(|| format!("Invalid listen address: {}", address))?;

    let ledger = open_sheets(settings, spreadsheet_id, key_json)?;
    let state = AppState::new(
        SignatureVerifier::new(secret),
        ReactionAnnotator::new(Arc::new(ledger)),
    );

    serve(addr, state).await
}

async fn show_status(settings: &Settings, run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("'{}' is not a run id", run_id_str))?;

    let runs_dir = settings.runs_dir();
    if !runs_dir.join(run_id.to_string()).exists() {
        anyhow::bail!("Run not found: {}", run_id);
    }

    let journal = Journal::open(&runs_dir, run_id).await?;
    let run = journal
        .load_run()
        .await?
        .with_context(|| format!("Run {} has no events", run_id))?;

    println!("Run:     {}", run.id);
    println!("State:   {}", state_label(&run.state));
    if let RunState::Failed { error } = &run.state {
        println!("Error:   {}", error);
    }
    println!("Started: {}", run.started_at.to_rfc3339());
    if let Some(finished) = run.completed_at {
        println!("Ended:   {}", finished.to_rfc3339());
    } else if run.is_running() {
        println!("Ended:   - (still active, or interrupted before finishing)");
    }
    println!("Bundle:  {}", if run.bundle_posted { "posted" } else { "not posted" });

    println!("\nCandidates:");
    for (candidate_id, progress) in &run.candidates {
        let ts = progress.notification_ts.as_deref().unwrap_or("-");
        let recorded = if progress.persisted { "recorded" } else { "not recorded" };
        println!("  {}  ts={}  {}", candidate_id, ts, recorded);
        if let Some(error) = &progress.error {
            println!("      error: {}", error);
        }
    }

    let gap = run.unpersisted_posts();
    if !gap.is_empty() {
        println!("\nPosted but missing from the ledger:");
        for (candidate_id, progress) in gap {
            println!(
                "  {}  ts={}",
                candidate_id,
                progress.notification_ts.as_deref().unwrap_or_default()
            );
        }
    }

    Ok(())
}

/// List recent runs
async fn list_runs(settings: &Settings, limit: usize) -> Result<()> {
    let runs_dir = settings.runs_dir();
    let runs = load_runs(&runs_dir).await?;

    if runs.is_empty() {
        println!("No runs recorded under {}", runs_dir.display());
        return Ok(());
    }

    println!("{:<38} {:<22} {:<10} {:>6} {:>8}", "RUN ID", "STARTED", "STATE", "POSTED", "MISSING");
    println!("{}", "-".repeat(88));

    for run in runs.into_iter().take(limit) {
        println!(
            "{:<38} {:<22} {:<10} {:>6} {:>8}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            state_label(&run.state),
            run.posted().count(),
            run.unpersisted_posts().len()
        );
    }

    Ok(())
}

fn state_label(state: &RunState) -> &'static str {
    match state {
        RunState::Running => "running",
        RunState::Completed => "completed",
        RunState::Failed { .. } => "failed",
    }
}

/// Show resolved configuration
fn show_config(settings: &Settings) -> Result<()> {
    println!("paperfeed Configuration");
    println!("=======================\n");

    match &settings.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none, using defaults)"),
    }
    println!("Home:        {}", settings.home.display());
    println!("Runs:        {}", settings.runs_dir().display());

    println!("\nSearch:");
    println!("  query:       {}", settings.query);
    println!("  max_results: {}", settings.max_results);
    println!("  num_papers:  {}", settings.num_papers);

    println!("\nSlack:");
    println!("  channel:        {}", settings.slack_channel);
    println!(
        "  bundle channel: {}",
        settings.bundle_channel.as_deref().unwrap_or("(disabled)")
    );
    println!("  post delay:     {:?}", settings.post_delay);

    println!("\nOpenAI model: {}", settings.openai_model);
    println!("Listener:     {}", settings.listen_addr);

    println!("\nSecrets: {:?}", settings.secrets);

    Ok(())
}

/// Notification channel for `--dry-run`: logs messages and issues fake ids
#[derive(Default)]
struct DryRunChannel {
    posted: AtomicUsize,
}

#[async_trait]
impl NotificationChannel for DryRunChannel {
    async fn post(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<&[serde_json::Value]>,
    ) -> Result<String, ServiceError> {
        let n = self.posted.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            channel,
            blocks = blocks.map(|b| b.len()).unwrap_or(0),
            "[dry-run] {}",
            text
        );
        Ok(format!("dry-run.{:06}", n))
    }
}

use crate::backend::ollama::{Connector, OllamaClient};
use crate::backend::youtube::YouTubeTranscripts;
use crate::backend::{ChatBackend, Services};
use crate::error::ErrorKind;
use crate::model::{Feature, HubConfig, TaskEvent};
use crate::orchestrator::{PageController, PageInput};
use crate::text_output::{event_line, render_pull_progress, ReportBuilder};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Output line routing for stdout/stderr writer.
pub(crate) enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
pub(crate) fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "llm-hub",
    version,
    about = "Translate and summarize text or YouTube videos with a local Ollama model"
)]
pub struct Cli {
    /// Base URL of the Ollama service
    #[arg(long, env = "OLLAMA_HOST", default_value = "http://localhost:11434", global = true)]
    pub host: String,

    /// Model used for every chat call
    #[arg(long, env = "LLM_HUB_MODEL", default_value = "ibm/granite3.2:8b", global = true)]
    pub model: String,

    /// Use --pull true or --pull false to control pulling a missing model at startup
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, global = true)]
    pub pull: bool,

    /// Timeout for a single request to Ollama or YouTube
    #[arg(long, default_value = "5m", global = true)]
    pub request_timeout: humantime::Duration,

    /// How long shutdown waits for each running task before abandoning it
    #[arg(long, default_value = "1s", global = true)]
    pub shutdown_timeout: humantime::Duration,

    /// Preferred transcript language (repeatable, first match wins)
    #[arg(long = "transcript-lang", default_value = "en", global = true)]
    pub transcript_lang: Vec<String>,

    /// Capacity of each task's event channel
    #[arg(long, default_value_t = 16, global = true)]
    pub event_capacity: usize,

    /// Write logs to this file (TUI mode logs to the cache directory by default)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Print a JSON report instead of plain text (subcommands only)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// One-shot tasks. Without a subcommand the terminal UI starts.
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Summarize a block of text
    Summarize { text: String },
    /// Detect the language of TEXT and translate it
    Translate {
        text: String,
        /// Target language, by name or code (e.g. Japanese, ja)
        #[arg(long)]
        to: String,
    },
    /// Fetch a YouTube transcript and summarize it
    Video { url: String },
}

pub async fn run(args: Cli) -> Result<()> {
    let tui_mode = args.command.is_none();
    if tui_mode && !cfg!(feature = "tui") {
        return Err(anyhow::anyhow!(
            "built without the terminal UI; use a subcommand such as `llm-hub summarize <TEXT>`"
        ));
    }
    init_logging(&args, tui_mode)?;

    let cfg = build_config(&args);
    info!(host = %cfg.host, model = %cfg.model, "starting llm-hub");
    let services = establish_services(&cfg).await?;

    match args.command.clone() {
        Some(command) => run_text(&args, &cfg, services, command).await,
        None => run_tui(cfg, services).await,
    }
}

#[cfg(feature = "tui")]
async fn run_tui(cfg: HubConfig, services: Services) -> Result<()> {
    crate::tui::run(cfg, services).await
}

#[cfg(not(feature = "tui"))]
async fn run_tui(_cfg: HubConfig, _services: Services) -> Result<()> {
    Err(anyhow::anyhow!("built without the terminal UI"))
}

/// Build a `HubConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> HubConfig {
    HubConfig {
        host: args.host.clone(),
        model: args.model.clone(),
        pull: args.pull,
        request_timeout: Duration::from(args.request_timeout),
        shutdown_timeout: Duration::from(args.shutdown_timeout),
        transcript_languages: args.transcript_lang.clone(),
        event_capacity: args.event_capacity,
        user_agent: format!("llm-hub/{}", env!("CARGO_PKG_VERSION")),
    }
}

fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("llm-hub").join("llm-hub.log"))
}

/// TUI mode logs to a file so the alternate screen stays intact; text mode logs
/// warnings to stderr unless `RUST_LOG` says otherwise.
fn init_logging(args: &Cli, tui_mode: bool) -> Result<()> {
    let default_level = if tui_mode { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let path = args
        .log_file
        .clone()
        .or_else(|| tui_mode.then(default_log_path).flatten());

    let res = match path {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("create log directory {}", dir.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    res.map_err(|e| anyhow::anyhow!("init logging: {e}"))
}

/// Make the model ready (pulling it if allowed) and build the shared services.
///
/// The HTTP clients are blocking, so construction and the readiness check run on
/// the blocking pool.
async fn establish_services(cfg: &HubConfig) -> Result<Services> {
    let (out_tx, out_handle) = spawn_output_writer();
    let startup_cfg = cfg.clone();
    let built = tokio::task::spawn_blocking(move || {
        let client = OllamaClient::new(&startup_cfg)?;
        let mut last_line = String::new();
        let connector =
            Connector::establish(client, &startup_cfg.model, startup_cfg.pull, |chunk| {
                if let Some(line) = render_pull_progress(chunk) {
                    if line != last_line {
                        let _ = out_tx.send(OutputLine::Stderr(line.clone()));
                        last_line = line;
                    }
                }
            })?;
        let transcripts = YouTubeTranscripts::new(&startup_cfg)?;
        Ok::<_, crate::error::HubError>((connector, transcripts))
    })
    .await
    .context("startup task failed")?;
    let _ = out_handle.await;

    let (connector, transcripts) = built.with_context(|| {
        format!(
            "could not prepare model {} at {}; is the Ollama service running?",
            cfg.model, cfg.host
        )
    })?;
    if !connector.is_ready() {
        error!(model = %cfg.model, "model is not available");
        return Err(anyhow::anyhow!(
            "model {} is not installed and --pull false was given",
            cfg.model
        ));
    }
    Ok(Services::new(Arc::new(connector), Arc::new(transcripts)))
}

fn page_input(command: Command) -> (Feature, PageInput) {
    match command {
        Command::Summarize { text } => (Feature::Summarize, PageInput::text(text)),
        Command::Translate { text, to } => (Feature::Translate, PageInput::translation(text, to)),
        Command::Video { url } => (Feature::VideoSummarize, PageInput::text(url)),
    }
}

/// Run one submission to completion. Ctrl-C cancels within the shutdown timeout.
async fn run_text(args: &Cli, cfg: &HubConfig, services: Services, command: Command) -> Result<()> {
    let (feature, input) = page_input(command);
    let model = services.chat.model().to_string();
    let mut page = PageController::new(feature, services, cfg.event_capacity);
    let request = page.validate(input.clone())?;
    let mut report = ReportBuilder::new(&model, request);

    let (out_tx, out_handle) = spawn_output_writer();
    let started = Instant::now();
    page.submit(input)?;

    follow_run(
        &mut page,
        &mut report,
        &out_tx,
        args.json,
        cfg.shutdown_timeout,
        tokio::signal::ctrl_c(),
    )
    .await;

    let failure = report.failed().and_then(|e| {
        event_line(&TaskEvent::Error {
            kind: e.kind,
            step: e.step.clone(),
            detail: e.detail.clone(),
        })
    });
    if args.json {
        let out = serde_json::to_string_pretty(&report.finish(started.elapsed()))?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    }
    drop(out_tx);
    let _ = out_handle.await;

    match failure {
        Some(msg) => Err(anyhow::anyhow!(msg)),
        None => Ok(()),
    }
}

/// Forward the page's events until its run is done or `interrupt` resolves.
///
/// `interrupt` is created once by the caller, so a signal that arrives between
/// two events is still observed.
async fn follow_run<F: Future>(
    page: &mut PageController,
    report: &mut ReportBuilder,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    json: bool,
    shutdown_timeout: Duration,
    interrupt: F,
) {
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            ev = page.recv() => {
                let Some(ev) = ev else { break };
                report.observe(&ev.event);
                if json {
                    continue;
                }
                match &ev.event {
                    TaskEvent::Result { payload } => {
                        let _ = out_tx.send(OutputLine::Stdout(payload.clone()));
                    }
                    TaskEvent::Error { .. } => {}
                    other => {
                        if let Some(line) = event_line(other) {
                            let _ = out_tx.send(OutputLine::Stderr(line));
                        }
                    }
                }
            }
            _ = &mut interrupt => {
                let _ = out_tx.send(OutputLine::Stderr("Cancelling…".into()));
                let shutdown = tokio::task::block_in_place(|| page.shutdown(shutdown_timeout));
                if let Some(r) = shutdown {
                    warn!(task = r.task_id, outcome = ?r.outcome, "interrupted");
                }
                if report.failed().is_none() {
                    report.observe(&TaskEvent::Error {
                        kind: ErrorKind::Cancelled,
                        step: None,
                        detail: "interrupted".into(),
                    });
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_a_usable_config() {
        let args = Cli::parse_from(["llm-hub"]);
        let cfg = build_config(&args);
        assert_eq!(cfg.model, "ibm/granite3.2:8b");
        assert!(cfg.pull);
        assert_eq!(cfg.request_timeout, Duration::from_secs(300));
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(cfg.transcript_languages, vec!["en".to_string()]);
        assert_eq!(cfg.event_capacity, 16);
        assert!(cfg.user_agent.starts_with("llm-hub/"));
        assert!(args.command.is_none());
    }

    #[test]
    fn subcommands_and_global_options() {
        let args = Cli::parse_from([
            "llm-hub",
            "translate",
            "This is a test.",
            "--to",
            "ja",
            "--pull",
            "false",
            "--transcript-lang",
            "de",
            "--transcript-lang",
            "en",
            "--shutdown-timeout",
            "250ms",
        ]);
        let cfg = build_config(&args);
        assert!(!cfg.pull);
        assert_eq!(cfg.transcript_languages, vec!["de", "en"]);
        assert_eq!(cfg.shutdown_timeout, Duration::from_millis(250));

        let (feature, input) = page_input(args.command.unwrap());
        assert_eq!(feature, Feature::Translate);
        assert_eq!(input.target.as_deref(), Some("ja"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interrupt_cancels_a_stuck_run() {
        use crate::backend::mock::{self, Reply, ScriptedChat};

        let chat = ScriptedChat::new([Reply::Hang]);
        let mut page = PageController::new(Feature::Summarize, mock::chat_only(&chat), 16);
        let input = PageInput::text("some long text");
        let mut report = ReportBuilder::new("test-model", page.validate(input.clone()).unwrap());
        page.submit(input).unwrap();

        // Fires while the worker is inside its chat call and no event is pending.
        let interrupt = async {
            while chat.calls() == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        follow_run(
            &mut page,
            &mut report,
            &out_tx,
            false,
            Duration::from_millis(50),
            interrupt,
        )
        .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!page.is_busy());
        assert_eq!(report.failed().map(|e| e.kind), Some(ErrorKind::Cancelled));
        assert!(matches!(out_rx.try_recv(), Ok(OutputLine::Stderr(ref l)) if l == "Cancelling…"));
    }
}

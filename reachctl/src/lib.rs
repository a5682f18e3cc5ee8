pub mod commands;

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use reach_core::browser::BrowserProfile;
use reach_core::engage::{LedgerCounts, LedgerEntry, LedgerError};
use reach_core::{
    load_reach_config, ActionExecutor, BrowserError, BrowserLauncher, ContentDiscoverer,
    Credentials, EngageError, LaunchOverrides, LoginGate, LoginState, OpenAiTextGenerator,
    Orchestrator, PageHandle, ReachConfig, ReplyComposer, RunSummary, SessionProfiles,
    SqliteActionLedger, TextGenerator, TracingReporter,
};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use commands::{HistoryArgs, LoginArgs, RunArgs, SessionsArgs};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] reach_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("{0}")]
    Engage(#[from] EngageError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("run failed: {0}")]
    RunFailed(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Discovery and engagement runner", long_about = None)]
pub struct Cli {
    /// Path to reach.toml
    #[arg(long, default_value = "configs/reach.toml", global = true)]
    pub config: PathBuf,
    /// Override storage.base_dir
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    /// Log at debug level unless RUST_LOG is set
    #[arg(long, global = true)]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover items and favorite or reply to them
    Run(RunArgs),
    /// Check or establish a logged-in session
    Login(LoginArgs),
    /// Show replies recorded in the ledger
    History(HistoryArgs),
    /// List stored browser sessions
    Sessions(SessionsArgs),
}

pub fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Run(args) => {
            let report = context.run(args).await?;
            render(&report, cli.format)?;
            if !report.summary.is_success() {
                return Err(AppError::RunFailed(report.summary.message.clone()));
            }
        }
        Commands::Login(args) => {
            let report = context.login(args).await?;
            render(&report, cli.format)?;
        }
        Commands::History(args) => {
            let history = context.history(args)?;
            render(&history, cli.format)?;
        }
        Commands::Sessions(args) => {
            let sessions = context.sessions(args)?;
            render(&sessions, cli.format)?;
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub session: String,
    pub account: String,
    pub ledger: PathBuf,
    pub summary: RunSummary,
}

#[derive(Debug, Serialize)]
pub struct LoginReport {
    pub session: String,
    pub state: LoginState,
}

#[derive(Debug, Serialize)]
pub struct HistoryReport {
    pub account: Option<String>,
    pub counts: LedgerCounts,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Serialize)]
pub struct SessionEntry {
    pub session: String,
    pub path: PathBuf,
    pub last_used: Option<DateTime<Utc>>,
}

impl From<&BrowserProfile> for SessionEntry {
    fn from(profile: &BrowserProfile) -> Self {
        Self {
            session: profile.session().to_string(),
            path: profile.path().to_path_buf(),
            last_used: profile.last_used(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub platform: String,
    pub removed: usize,
    pub sessions: Vec<SessionEntry>,
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for RunReport {
    fn display(&self) -> String {
        let summary = &self.summary;
        let counters = &summary.counters;
        let mut out = format!(
            "Run {} ({:?}): {}\nSession: {} as {}\nCriterion: {} | Plan: {} | Target: {}\n",
            summary.run_id,
            summary.status,
            summary.message,
            self.session,
            self.account,
            summary.criterion,
            summary.plan,
            summary.target,
        );
        let _ = writeln!(
            out,
            "Succeeded: {} | Attempted: {} | Failed: {} | Skipped: {}",
            counters.succeeded, counters.attempted, counters.failed, counters.skipped
        );
        let metrics = &summary.metrics;
        let _ = writeln!(
            out,
            "Favorites verified: {} | Replies posted: {} | Verification failures: {}",
            metrics.favorites_verified, metrics.replies_posted, metrics.verification_failures
        );
        if !metrics.strategy_wins.is_empty() {
            let wins = metrics
                .strategy_wins
                .iter()
                .map(|(name, count)| format!("{name}={count}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "Strategies: {wins}");
        }
        for error in &summary.errors {
            let _ = writeln!(out, "- {error}");
        }
        out.trim_end().to_string()
    }
}

impl DisplayFallback for LoginReport {
    fn display(&self) -> String {
        format!("Session {}: {:?}", self.session, self.state)
    }
}

impl DisplayFallback for HistoryReport {
    fn display(&self) -> String {
        let mut out = format!(
            "Replies: {} | Failures: {}\n",
            self.counts.replies, self.counts.failures
        );
        if self.entries.is_empty() {
            out.push_str("No replies recorded");
            return out;
        }
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "{} [{}] {} -> {}",
                entry.created_at.to_rfc3339(),
                entry.account,
                entry.item_id,
                entry.reply_text
            );
        }
        out.trim_end().to_string()
    }
}

impl DisplayFallback for SessionReport {
    fn display(&self) -> String {
        let mut out = String::new();
        if self.removed > 0 {
            let _ = writeln!(out, "Removed {} expired session(s)", self.removed);
        }
        if self.sessions.is_empty() {
            let _ = write!(out, "No sessions stored for {}", self.platform);
            return out;
        }
        for session in &self.sessions {
            let last_used = session
                .last_used
                .map(|value| value.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            let _ = writeln!(
                out,
                "{}/{} (last used: {}) {}",
                self.platform,
                session.session,
                last_used,
                session.path.display()
            );
        }
        out.trim_end().to_string()
    }
}

#[derive(Debug)]
struct AppContext {
    config: Arc<ReachConfig>,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = load_reach_config(&cli.config)?;
        if let Some(dir) = &cli.data_dir {
            config.storage.base_dir = dir.to_string_lossy().to_string();
        }
        Ok(Self {
            config: Arc::new(config),
        })
    }

    fn profiles(&self) -> Result<SessionProfiles> {
        let ttl = Duration::from_secs(self.config.storage.profile_ttl_hours * 3600);
        Ok(SessionProfiles::new(self.config.profiles_path(), ttl)?)
    }

    fn ledger(&self) -> Result<SqliteActionLedger> {
        Ok(SqliteActionLedger::open(self.config.ledger_path())?)
    }

    fn composer(&self, fixed: Option<String>) -> ReplyComposer {
        let generator = self.config.reply.generator.as_ref().and_then(|section| {
            match OpenAiTextGenerator::from_section(section) {
                Ok(generator) => Some(Arc::new(generator) as Arc<dyn TextGenerator>),
                Err(err) => {
                    warn!(error = %err, "reply generator unavailable, using fallback text");
                    None
                }
            }
        });
        ReplyComposer::new(&self.config.reply, generator).with_fixed(fixed)
    }

    async fn run(&self, args: &RunArgs) -> Result<RunReport> {
        let criterion = args.criterion()?;
        let plan = args.action.into();
        let credentials = Credentials::from_env();
        let account = args
            .account
            .clone()
            .or_else(|| credentials.as_ref().map(|c| c.username.clone()))
            .unwrap_or_else(|| args.session.clone());
        let ledger = self.ledger()?;
        let composer = self.composer(args.reply_text.clone());

        let launcher = BrowserLauncher::new(Arc::clone(&self.config), self.profiles()?);
        let automation = launcher
            .launch_with_overrides(
                &args.session,
                LaunchOverrides {
                    headless: args.headless,
                },
            )
            .await?;
        let session = automation.profile().id();

        let outcome = async {
            let context = automation.new_context().await?;
            let page: Arc<dyn PageHandle> = Arc::new(context);
            let cancel = CancellationToken::new();
            let executor =
                ActionExecutor::new(Arc::clone(&self.config), account.clone(), Arc::new(ledger));
            let mut orchestrator = Orchestrator::new(
                Arc::clone(&self.config),
                page,
                Box::new(ContentDiscoverer::new(Arc::clone(&self.config))),
                executor,
                composer,
                Arc::new(TracingReporter),
            )
            .with_cancellation(cancel.clone());

            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, finishing current item");
                    cancel.cancel();
                }
            });
            let mut gate = LoginGate::new(Arc::clone(&self.config));
            let summary = orchestrator
                .run_session(&mut gate, credentials.as_ref(), &criterion, plan, args.target)
                .await;
            watcher.abort();
            Ok::<_, AppError>(summary)
        }
        .await;

        automation.shutdown().await?;
        let summary = outcome?;
        info!(run_id = %summary.run_id, status = ?summary.status, "run finished");
        Ok(RunReport {
            session,
            account,
            ledger: self.config.ledger_path(),
            summary,
        })
    }

    async fn login(&self, args: &LoginArgs) -> Result<LoginReport> {
        let credentials = Credentials::from_env();
        let launcher = BrowserLauncher::new(Arc::clone(&self.config), self.profiles()?);
        let automation = launcher
            .launch_with_overrides(
                &args.session,
                LaunchOverrides {
                    headless: args.headless,
                },
            )
            .await?;
        let session = automation.profile().id();

        let outcome = async {
            let context = automation.new_context().await?;
            let mut gate = LoginGate::new(Arc::clone(&self.config));
            gate.ensure_authenticated(&context, credentials.as_ref())
                .await?;
            Ok::<_, AppError>(gate.login_state(&context).await)
        }
        .await;

        automation.shutdown().await?;
        Ok(LoginReport {
            session,
            state: outcome?,
        })
    }

    fn history(&self, args: &HistoryArgs) -> Result<HistoryReport> {
        let ledger = self.ledger()?;
        let account = args.account.as_deref();
        Ok(HistoryReport {
            account: args.account.clone(),
            counts: ledger.counts(account)?,
            entries: ledger.recent(account, args.limit)?,
        })
    }

    fn sessions(&self, args: &SessionsArgs) -> Result<SessionReport> {
        let profiles = self.profiles()?;
        let removed = if args.cleanup {
            profiles.cleanup_expired()?
        } else {
            0
        };
        let platform = self.config.platform.name.clone();
        let sessions = profiles
            .list(&platform)?
            .iter()
            .map(SessionEntry::from)
            .collect();
        Ok(SessionReport {
            platform,
            removed,
            sessions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn prepare_test_context(command: Commands) -> Result<(TempDir, Cli, AppContext)> {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let configs_dir = root.join("configs");
        fs::create_dir_all(&configs_dir).unwrap();
        fs::copy("../configs/reach.toml", configs_dir.join("reach.toml")).unwrap();

        let cli = Cli {
            config: configs_dir.join("reach.toml"),
            data_dir: Some(root.join("data")),
            format: OutputFormat::Json,
            debug: false,
            command,
        };
        let context = AppContext::new(&cli)?;
        Ok((temp, cli, context))
    }

    fn history_args(account: Option<&str>) -> HistoryArgs {
        HistoryArgs {
            account: account.map(str::to_string),
            limit: 10,
        }
    }

    #[test]
    fn cli_parses_run_arguments() {
        let cli = Cli::try_parse_from([
            "reachctl", "--format", "json", "run", "--tag", "#Rust", "--action", "both",
            "--target", "3", "--headless", "false",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.target, 3);
        assert_eq!(args.headless, Some(false));
        assert_eq!(args.session, "default");
        assert_eq!(
            args.criterion().unwrap(),
            reach_core::SearchCriterion::Tag("rust".into())
        );
        assert_eq!(
            reach_core::ActionPlan::from(args.action),
            reach_core::ActionPlan::Both
        );
    }

    #[test]
    fn run_requires_exactly_one_criterion() {
        assert!(Cli::try_parse_from(["reachctl", "run"]).is_err());
        assert!(
            Cli::try_parse_from(["reachctl", "run", "--tag", "a", "--query", "b"]).is_err()
        );
    }

    #[test]
    fn data_dir_overrides_storage_paths() {
        let (temp, _cli, context) = prepare_test_context(Commands::History(history_args(None)))
            .unwrap();
        assert_eq!(
            context.config.ledger_path(),
            temp.path().join("data").join("ledger.sqlite")
        );
    }

    #[test]
    fn history_lists_recorded_replies() {
        let (_temp, _cli, context) =
            prepare_test_context(Commands::History(history_args(None))).unwrap();
        let ledger = context.ledger().unwrap();
        ledger
            .insert_reply("alice", "https://www.instagram.com/p/a/", "Nice!")
            .unwrap();
        ledger
            .insert_reply("bob", "https://www.instagram.com/p/b/", "Cool")
            .unwrap();

        let all = context.history(&history_args(None)).unwrap();
        assert_eq!(all.counts.replies, 2);
        assert_eq!(all.entries.len(), 2);

        let alice = context.history(&history_args(Some("alice"))).unwrap();
        assert_eq!(alice.entries.len(), 1);
        assert!(alice.display().contains("https://www.instagram.com/p/a/ -> Nice!"));
        let json = serde_json::to_value(&alice).unwrap();
        assert_eq!(json["counts"]["replies"], 1);
    }

    #[test]
    fn empty_history_renders_placeholder() {
        let (_temp, _cli, context) =
            prepare_test_context(Commands::History(history_args(None))).unwrap();
        let report = context.history(&history_args(None)).unwrap();
        assert!(report.display().contains("No replies recorded"));
    }

    #[test]
    fn sessions_lists_profiles_for_the_platform() {
        let (_temp, _cli, context) =
            prepare_test_context(Commands::Sessions(SessionsArgs { cleanup: false })).unwrap();
        let profiles = context.profiles().unwrap();
        profiles.open("instagram", "main").unwrap();
        profiles.open("instagram", "alt").unwrap();
        profiles.open("other", "ignored").unwrap();

        let report = context
            .sessions(&SessionsArgs { cleanup: true })
            .unwrap();
        assert_eq!(report.removed, 0);
        let names = report
            .sessions
            .iter()
            .map(|entry| entry.session.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["alt", "main"]);
        assert!(report.display().contains("instagram/main (last used: never)"));
    }

    #[test]
    fn missing_config_is_reported() {
        let cli = Cli {
            config: PathBuf::from("does/not/exist.toml"),
            data_dir: None,
            format: OutputFormat::Text,
            debug: false,
            command: Commands::Sessions(SessionsArgs { cleanup: false }),
        };
        let err = AppContext::new(&cli).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}

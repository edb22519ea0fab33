//! `vizor` entry point: session and analysis management from the
//! terminal.
//!
//! ## Commands
//!
//! - `vizor login --user <LOGIN>`
//! - `vizor logout`
//! - `vizor whoami [--json]`
//! - `vizor analyze --brand <NAME> --category <CATEGORY> --website <URL>`
//! - `vizor status [--json]`
//! - `vizor clear`
//! - `vizor watch`

mod render;

use std::sync::Arc;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use vizor_core::vizor_home;
use vizor_core::AnalysisManager;
use vizor_core::ApiClient;
use vizor_core::Config;
use vizor_core::LocalStore;
use vizor_core::SessionStore;
use vizor_core::StorageWatcher;
use vizor_protocol::AnalysisEvent;
use vizor_protocol::AnalysisRequest;

#[derive(Debug, Parser)]
#[command(name = "vizor", version, about = "AI visibility analysis from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and persist the session.
    Login(LoginArgs),
    /// End the session and clear local credentials.
    Logout,
    /// Show the signed-in user.
    Whoami(WhoamiArgs),
    /// Run an analysis and print the report.
    Analyze(AnalyzeArgs),
    /// Show the cached analysis without contacting the service.
    Status(StatusArgs),
    /// Discard the cached analysis.
    Clear,
    /// Follow analysis changes written by other Vizor processes.
    Watch,
}

#[derive(Debug, Parser)]
struct LoginArgs {
    /// Account login (email).
    #[arg(long = "user", short = 'u')]
    user: String,

    /// Password; falls back to $VIZOR_PASSWORD.
    #[arg(long = "password", env = "VIZOR_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Debug, Parser)]
struct WhoamiArgs {
    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    json: bool,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    /// Brand to analyze.
    #[arg(long = "brand", short = 'b')]
    brand: String,

    /// Industry category (e.g. Fashion, SaaS).
    #[arg(long = "category", short = 'c')]
    category: String,

    /// Brand website; bare domains gain https://.
    #[arg(long = "website", short = 'w')]
    website: String,

    /// Target market.
    #[arg(long = "location", default_value = "Global")]
    location: String,

    /// Keyword to track (repeatable).
    #[arg(long = "keyword", short = 'k')]
    keywords: Vec<String>,

    /// Output the raw result as JSON.
    #[arg(long = "json", short = 'j')]
    json: bool,
}

#[derive(Debug, Parser)]
struct StatusArgs {
    /// Output the full snapshot as JSON.
    #[arg(long = "json", short = 'j')]
    json: bool,
}

/// Everything a command needs, wired over one home directory.
struct AppContext {
    store: Arc<LocalStore>,
    session: SessionStore,
    manager: AnalysisManager,
}

impl AppContext {
    fn init() -> Result<Self> {
        let home = vizor_home().context("resolve Vizor home")?;
        let config = Config::load(&home).context("load configuration")?;
        let store = Arc::new(LocalStore::new(&home).context("open local storage")?);
        let client = Arc::new(ApiClient::new(&config).context("build HTTP client")?);
        let session = SessionStore::new(store.clone(), client.clone());
        let manager = AnalysisManager::new(store.clone(), client, session.clone());
        Ok(Self {
            store,
            session,
            manager,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Login(args) => login(args).await,
        Command::Logout => logout().await,
        Command::Whoami(args) => whoami(&args),
        Command::Analyze(args) => analyze(args).await,
        Command::Status(args) => status(&args),
        Command::Clear => clear(),
        Command::Watch => watch().await,
    }
}

async fn login(args: LoginArgs) -> Result<()> {
    let ctx = AppContext::init()?;
    let session = ctx.session.login(&args.user, &args.password).await?;
    println!(
        "Signed in as {} ({})",
        session.user.email, session.user.plan
    );
    Ok(())
}

async fn logout() -> Result<()> {
    let ctx = AppContext::init()?;
    ctx.session.logout().await?;
    println!("Signed out.");
    Ok(())
}

fn whoami(args: &WhoamiArgs) -> Result<()> {
    let ctx = AppContext::init()?;
    let Some(session) = ctx.session.current()? else {
        bail!("not signed in");
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&session.user)?);
    } else {
        println!(
            "{} <{}> on {}",
            session.user.name, session.user.email, session.user.plan
        );
    }
    Ok(())
}

async fn analyze(args: AnalyzeArgs) -> Result<()> {
    let ctx = AppContext::init()?;
    let request = AnalysisRequest {
        category: args.category,
        brand_name: args.brand,
        location: args.location,
        keywords: args.keywords,
        website: args.website,
    };

    // Ctrl-C aborts the in-flight request instead of killing the process
    // mid-write.
    {
        let manager = ctx.manager.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            manager.shutdown();
        });
    }

    let result = ctx.manager.analyze(request).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let snapshot = ctx.manager.snapshot();
        render::print_report(&result, snapshot.fetched_at);
    }
    Ok(())
}

fn status(args: &StatusArgs) -> Result<()> {
    let ctx = AppContext::init()?;
    let snapshot = ctx.manager.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    match &snapshot.result {
        Some(result) => render::print_report(result, snapshot.fetched_at),
        None => println!("No analysis cached. Run `vizor analyze` first."),
    }
    if let Some(failure) = &snapshot.error {
        println!();
        println!("Last sync failed: {}", failure.message);
    }
    Ok(())
}

fn clear() -> Result<()> {
    let ctx = AppContext::init()?;
    ctx.manager.clear()?;
    println!("Cached analysis cleared.");
    Ok(())
}

async fn watch() -> Result<()> {
    let ctx = AppContext::init()?;
    let watcher = StorageWatcher::new(&ctx.store, vizor_core::watcher::DEFAULT_DEBOUNCE_MS)?;
    let cancel = CancellationToken::new();
    let mut events = ctx.manager.subscribe();
    let watch_task = tokio::spawn(watcher.run(ctx.manager.clone(), cancel.clone()));

    println!(
        "Watching {} (Ctrl-C to stop)",
        ctx.store.base_dir().display()
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(AnalysisEvent::Updated { result, fetched_at }) => {
                    println!(
                        "Updated at {}: {} LLM citations, AI visibility {:.1}",
                        fetched_at.to_rfc3339(),
                        result.llm_citations,
                        result.ai_visibility
                    );
                }
                Ok(AnalysisEvent::Cleared) => println!("Analysis cleared."),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("missed {skipped} events, still watching");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    cancel.cancel();
    let _ = watch_task.await;
    println!("Stopped.");
    Ok(())
}

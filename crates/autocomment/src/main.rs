use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use autocomment::config::AppConfig;
use autocomment::context_store::ContextStore;
use autocomment::prompts::PROMPT_VERSION;
use autocomment::provider::GeminiGenerator;
use autocomment::runner::{BatchRunner, RunnerOptions};
use autocomment::scanner::{batch_by_lines, filter_comment_worthy, scan};
use autocomment::summarizer::ContextBuilder;
use clap::{Args, Parser, Subcommand};
use guardrails::{FileOutcome, GuardedPipeline};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Add high-value comments to a source tree, verifying that no code changes.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug-level logging (RUST_LOG still takes precedence)
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List comment-worthy files and how they would be batched
    Scan(ScanArgs),
    /// Summarise files into the context store used by `gen`
    Context(ContextArgs),
    /// Generate comments and write verified results back
    Gen(GenArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Project root
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Line budget per batch (overrides batch_max_lines)
    #[arg(long)]
    batch_lines: Option<usize>,
}

#[derive(Args, Debug)]
struct ContextArgs {
    /// Project root
    #[arg(default_value = ".")]
    root: PathBuf,

    /// TOML config file (default: ./autocomment.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Files summarised at once (overrides concurrency)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Context store to write (overrides context_store)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Discard existing entries instead of updating them
    #[arg(long, default_value_t = false)]
    fresh: bool,
}

#[derive(Args, Debug)]
struct GenArgs {
    /// Project root
    #[arg(default_value = ".")]
    root: PathBuf,

    /// TOML config file (default: ./autocomment.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Files processed at once (overrides concurrency)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Run everything but never write files
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Comment blocks kept per file (overrides guard.max_comment_blocks)
    #[arg(long)]
    max_blocks: Option<usize>,

    /// Context store to read (overrides context_store)
    #[arg(long)]
    context: Option<PathBuf>,

    /// Do not pass stored file summaries to prompts
    #[arg(long, default_value_t = false, conflicts_with = "context")]
    no_context: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Scan(args) => run_scan(args),
        Command::Context(args) => run_context(args).await,
        Command::Gen(args) => run_gen(args).await,
    }
}

fn run_scan(args: ScanArgs) -> Result<ExitCode> {
    let config = AppConfig::load(None)?;
    let max_lines = args.batch_lines.unwrap_or(config.batch_max_lines);

    let files = filter_comment_worthy(scan(&args.root)?);
    let batches = batch_by_lines(&files, max_lines.max(1));

    for (i, batch) in batches.iter().enumerate() {
        let lines: usize = batch.iter().map(|f| f.lines).sum();
        println!("batch {} ({} files, {} lines)", i + 1, batch.len(), lines);
        for file in batch {
            println!("  {:>6}  {}", file.lines, file.path.display());
        }
    }
    println!("{} files in {} batches", files.len(), batches.len());
    Ok(ExitCode::SUCCESS)
}

/// Cancel `token` on Ctrl-C. In-flight files still finish.
fn cancel_on_interrupt(token: &CancellationToken) {
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight files");
            on_signal.cancel();
        }
    });
}

async fn run_context(args: ContextArgs) -> Result<ExitCode> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(n) = args.concurrency {
        config.concurrency = n;
    }
    if let Some(path) = args.store {
        config.context_store = Some(path);
    }
    config.validate()?;
    config.api_key()?;

    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("cannot open project root {}", args.root.display()))?;
    let store_path = config.context_store_path(&root);

    let mut store = if args.fresh {
        ContextStore::new()
    } else {
        ContextStore::load(&store_path)?
    };
    let dropped = store.retain_existing(&root);
    if dropped > 0 {
        info!(dropped, "removed summaries of deleted files");
    }

    let files = filter_comment_worthy(scan(&root)?);
    if files.is_empty() {
        info!("no comment-worthy files found");
        return Ok(ExitCode::SUCCESS);
    }
    let batches = batch_by_lines(&files, config.batch_max_lines);

    let generator = GeminiGenerator::from_config(&config).context("failed to set up Gemini client")?;
    info!(
        root = %root.display(),
        store = %store_path.display(),
        model = %config.primary_model,
        prompt_version = PROMPT_VERSION,
        "building context"
    );

    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel);
    let builder = ContextBuilder::new(Arc::new(generator), config.guard.retry_policy())
        .with_concurrency(config.concurrency)
        .with_cancellation(cancel);
    let report = builder.build(&root, &batches, &mut store).await;

    for (path, message) in &report.failed {
        eprintln!("FAILED {}: {message}", path.display());
    }
    if report.summarized > 0 || dropped > 0 || args.fresh {
        store.save(&store_path)?;
    }
    println!(
        "{} summarised, {} failed, {} skipped; {} entries in {}",
        report.summarized,
        report.failed.len(),
        report.skipped,
        store.len(),
        store_path.display()
    );

    if report.failed.is_empty() && report.skipped == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn run_gen(args: GenArgs) -> Result<ExitCode> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(n) = args.concurrency {
        config.concurrency = n;
    }
    if let Some(n) = args.max_blocks {
        config.guard.max_comment_blocks = n;
    }
    if let Some(path) = args.context {
        config.context_store = Some(path);
    }
    config.validate()?;

    let context: Option<Arc<str>> = if args.no_context {
        None
    } else {
        let root = args
            .root
            .canonicalize()
            .with_context(|| format!("cannot open project root {}", args.root.display()))?;
        let store = ContextStore::load(&config.context_store_path(&root))?;
        info!(entries = store.len(), "loaded context store");
        store.render().map(Arc::from)
    };

    config.api_key()?;
    let generator = GeminiGenerator::from_config(&config).context("failed to set up Gemini client")?;
    let pipeline = GuardedPipeline::new(Arc::new(generator), config.guard.clone());

    info!(
        root = %args.root.display(),
        primary = %config.primary_model,
        repair = %config.repair_model,
        concurrency = config.concurrency,
        dry_run = args.dry_run,
        context = context.is_some(),
        prompt_version = PROMPT_VERSION,
        "autocomment starting"
    );

    let files = filter_comment_worthy(scan(&args.root)?);
    if files.is_empty() {
        info!("no comment-worthy files found");
        return Ok(ExitCode::SUCCESS);
    }
    let batches = batch_by_lines(&files, config.batch_max_lines);

    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel);

    let runner = BatchRunner::new(
        pipeline,
        RunnerOptions {
            concurrency: config.concurrency,
            dry_run: args.dry_run,
            context,
        },
    )
    .with_cancellation(cancel);

    let report = runner.run_batches(&batches).await;

    for (path, outcome) in runner.aggregator().snapshot().await {
        if let FileOutcome::Failed { kind, message } = outcome {
            eprintln!("FAILED [{kind}] {}: {message}", path.display());
        }
    }
    println!("{}", report.summary);
    if args.dry_run {
        println!("dry run: no files written");
    }
    if report.skipped > 0 {
        println!("{} files skipped after interrupt", report.skipped);
    }

    if report.summary.has_failures() || report.skipped > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use translalia::backoff::BackoffConfig;
use translalia::cli::{Cli, Command};
use translalia::config::TranslaliaConfig;
use translalia::job::record::{JobStatus, TranslationJob};
use translalia::job::store::{InMemoryJobStore, JobStore};
use translalia::notify::Notifier;
use translalia::progress;
use translalia::provider::{GenerationClient, Generator, OfflineGenerator};
use translalia::ratelimit::{InMemoryCounterStore, LimiterPolicy, RateLimiter};
use translalia::scheduler::{SchedulerConfig, TickScheduler};
use translalia::segment::{self, Granularity, JobRequest};
use translalia::translator::{TranslatorConfig, UnitTranslator};
use translalia::ui::JobProgress;

/// Time budget handed to each tick; the CLI polls in a loop, so a modest
/// budget keeps the progress bar responsive.
const TICK_BUDGET: Duration = Duration::from_secs(10);

/// Consecutive ticks without a new translated unit before the CLI gives up.
const STALL_LIMIT: u32 = 8;

const DEMO_POEM: &str = "\
No meio do caminho tinha uma pedra
tinha uma pedra no meio do caminho
tinha uma pedra
no meio do caminho tinha uma pedra.";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = TranslaliaConfig::load()?;
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }

    match cli.command {
        Command::Translate {
            file,
            from,
            to,
            style,
            stanza,
            output,
        } => {
            let poem = read_poem(file.as_deref())?;
            let granularity = if stanza {
                Granularity::Stanza
            } else {
                default_granularity(&config)
            };
            let request = JobRequest {
                source_lang: from,
                target_lang: to,
                style_notes: style,
            };
            let client =
                GenerationClient::new(config.api_key.clone(), config.request_timeout_secs);
            run_job(
                client,
                &config,
                &poem,
                granularity,
                request,
                cli.verbose,
                output,
            )
            .await
        }
        Command::Status { file } => show_status(&file),
        Command::Retry {
            file,
            unit,
            stanza,
            force,
        } => run_retry(&config, &file, unit, stanza, force, cli.verbose).await,
        Command::Demo => {
            // Demo mode never touches the network, so any non-empty key
            // satisfies job creation.
            config.api_key = "demo".into();
            let request = JobRequest {
                source_lang: "pt".into(),
                target_lang: "en".into(),
                style_notes: None,
            };
            run_job(
                OfflineGenerator,
                &config,
                DEMO_POEM,
                Granularity::Line,
                request,
                cli.verbose,
                None,
            )
            .await
        }
    }
}

fn read_poem(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read poem from {}", path.display())),
        None => {
            let mut poem = String::new();
            std::io::stdin()
                .read_to_string(&mut poem)
                .context("failed to read poem from stdin")?;
            Ok(poem)
        }
    }
}

fn default_granularity(config: &TranslaliaConfig) -> Granularity {
    if config.granularity == "stanza" {
        Granularity::Stanza
    } else {
        Granularity::Line
    }
}

fn build_scheduler<G: Generator + 'static>(
    generator: G,
    config: &TranslaliaConfig,
    store: Arc<InMemoryJobStore>,
) -> TickScheduler<InMemoryJobStore, G, InMemoryCounterStore> {
    let translator = UnitTranslator::new(
        generator,
        TranslatorConfig {
            model: config.model.clone(),
            fallback_model: config.fallback_model.clone(),
            temperature: config.temperature,
        },
    );
    let policy = if config.fail_closed {
        LimiterPolicy::FailClosed
    } else {
        LimiterPolicy::FailOpen
    };
    let limiter = RateLimiter::new(InMemoryCounterStore::new(), policy);
    let mut scheduler = TickScheduler::new(
        store,
        translator,
        limiter,
        SchedulerConfig {
            concurrency: config.concurrency,
            rate_limit: config.rate_limit,
            rate_window_secs: config.rate_window_secs,
            backoff: BackoffConfig {
                base_delay_ms: config.base_delay_ms,
                max_delay_ms: config.max_delay_ms,
            },
            subject: "cli".into(),
        },
    );
    if let Some(url) = &config.notify_url {
        scheduler = scheduler.with_notifier(Notifier::new(url.clone()));
    }
    scheduler
}

async fn run_job<G: Generator + 'static>(
    generator: G,
    config: &TranslaliaConfig,
    poem: &str,
    granularity: Granularity,
    request: JobRequest,
    verbose: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let job = segment::create_job(poem, granularity, request, config)?;
    let job_id = job.id.clone();
    let total_units = job.units.len();

    let store = Arc::new(InMemoryJobStore::new());
    store.insert_job(job)?;
    let scheduler = build_scheduler(generator, config, Arc::clone(&store));

    let ui = JobProgress::start("translating", total_units);
    let mut last_translated = 0usize;
    let mut stalled = 0u32;
    let final_report = loop {
        let report = scheduler.tick(&job_id, TICK_BUDGET).await?;
        ui.update(&report);

        if report.job_status == JobStatus::Completed {
            break report;
        }
        if report.summary.translated > last_translated {
            last_translated = report.summary.translated;
            stalled = 0;
        } else {
            stalled += 1;
        }
        if stalled >= STALL_LIMIT {
            ui.complete(report.job_status, &report.summary);
            let job = store
                .get_job(&job_id)?
                .context("job disappeared from the store")?;
            let last_error = job
                .units
                .iter()
                .find_map(|unit| unit.last_error.clone())
                .unwrap_or_else(|| "unknown".into());
            bail!("no progress after {STALL_LIMIT} ticks; last unit error: {last_error}");
        }
        if report.rate_limited {
            tokio::time::sleep(Duration::from_secs(2)).await;
        } else if report.attempted.is_empty() {
            // Every remaining unit sits inside a backoff window.
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    };

    ui.complete(final_report.job_status, &final_report.summary);
    if verbose {
        ui.print_report(&final_report);
    }

    let job = store
        .get_job(&job_id)?
        .context("job disappeared from the store")?;
    print_translations(&job, verbose);

    if let Some(path) = output {
        std::fs::write(&path, serde_json::to_string_pretty(&job)?)
            .with_context(|| format!("failed to write job record to {}", path.display()))?;
        println!("\nJob record written to {}", path.display());
    }
    Ok(())
}

fn print_translations(job: &TranslationJob, verbose: bool) {
    println!();
    for unit in &job.units {
        match unit.translations.first() {
            Some(best) => {
                println!("{:>4}  {}", unit.line_number, best.text);
                if verbose {
                    for variant in unit.translations.iter().skip(1) {
                        println!("      · {}", variant.text);
                    }
                }
            }
            None => println!("{:>4}  [untranslated] {}", unit.line_number, unit.original_text),
        }
    }
}

async fn run_retry(
    config: &TranslaliaConfig,
    file: &Path,
    unit: Option<usize>,
    stanza: Option<usize>,
    force: bool,
    verbose: bool,
) -> Result<()> {
    if config.api_key.trim().is_empty() {
        bail!("missing provider API key; set ANTHROPIC_API_KEY or translalia.toml api_key");
    }
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read job record from {}", file.display()))?;
    let job: TranslationJob = serde_json::from_str(&contents)?;
    let job_id = job.id.clone();

    let store = Arc::new(InMemoryJobStore::new());
    store.insert_job(job)?;
    let client = GenerationClient::new(config.api_key.clone(), config.request_timeout_secs);
    let scheduler = build_scheduler(client, config, Arc::clone(&store));

    let report = match (unit, stanza) {
        (Some(index), None) => scheduler.retry_unit(&job_id, index, force).await?,
        (None, Some(index)) => {
            scheduler
                .retry_stanza(&job_id, index, force, TICK_BUDGET)
                .await?
        }
        _ => bail!("pass exactly one of --unit or --stanza"),
    };

    let job = store
        .get_job(&job_id)?
        .context("job disappeared from the store")?;
    std::fs::write(file, serde_json::to_string_pretty(&job)?)
        .with_context(|| format!("failed to write job record to {}", file.display()))?;

    if verbose {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    println!(
        "retried {:?}; {} of {} units translated",
        report.attempted, report.summary.translated, report.summary.total
    );
    print_translations(&job, verbose);
    Ok(())
}

fn show_status(file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read job record from {}", file.display()))?;
    let job: TranslationJob = serde_json::from_str(&contents)?;
    let summary = progress::summarize(&job);
    println!("job {}  ({:?})", job.id, job.status);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

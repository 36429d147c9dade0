mod cli;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bucketsync::config::Config;
use bucketsync::fs::{Endpoints, LocalBackend, Location};
use bucketsync::sync::{
    encode, read_plan, write_plan, BandwidthLimit, ExecutionProgress, ProgressCallback, SyncConfig,
    SyncEngine, SyncPlan,
};
use cli::Cli;

const EXIT_FAILED_OPERATIONS: u8 = 1;
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_ordered();
    cli::init_logging(cli.debug, cli.quiet, cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(plan_path) = cli.apply.clone() {
        if cli.source.is_some() || cli.destination.is_some() {
            warn!("--apply given: ignoring SOURCE/DESTINATION arguments");
        }
        return apply(&cli, &config, &plan_path).await;
    }

    let (Some(source), Some(destination)) = (cli.source.as_deref(), cli.destination.as_deref())
    else {
        bail!("SOURCE and DESTINATION are required unless --apply is given");
    };

    let options = cli.sync_options();
    options.validate()?;
    let filters = cli.filter_rules()?;

    let endpoints = Endpoints::resolve(Location::parse(source)?, Location::parse(destination)?)?;
    let sync_config = SyncConfig {
        options,
        filters,
        ..engine_config(&cli, &config)
    };
    let engine = build_engine(&endpoints, &config, sync_config)?;

    let plan = engine.plan().await?;

    if cli.dry_run {
        print!("{}", encode(&plan)?);
        if !cli.quiet {
            cli::print_plan_banner(&plan);
        }
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(path) = &cli.plan {
        write_plan(&plan, path)?;
        cli::print_plan_banner(&plan);
        eprintln!("  Plan written to {}", path.display().to_string().cyan());
        return Ok(ExitCode::SUCCESS);
    }

    execute(&cli, &engine, &plan).await
}

async fn apply(cli: &Cli, config: &Config, plan_path: &Path) -> Result<ExitCode> {
    let plan = read_plan(plan_path)
        .with_context(|| format!("Refusing to apply {}", plan_path.display()))?;
    let header = &plan.header;

    let endpoints = Endpoints::resolve(
        Location::parse(&header.source_uri)?,
        Location::parse(&header.destination_uri)?,
    )?;
    if endpoints.direction != header.direction {
        bail!(
            "Plan header says '{}' but {} -> {} is a {}",
            header.direction.as_str(),
            header.source_uri,
            header.destination_uri,
            endpoints.direction.as_str()
        );
    }

    let sync_config = SyncConfig {
        options: header.options,
        ..engine_config(cli, config)
    };
    let engine = build_engine(&endpoints, config, sync_config)?
        .with_uris(header.source_uri.clone(), header.destination_uri.clone());

    info!(plan = %plan_path.display(), operations = plan.len(), "applying saved plan");
    execute(cli, &engine, &plan).await
}

/// Executor and bandwidth settings: config file values, overridden by flags.
fn engine_config(cli: &Cli, config: &Config) -> SyncConfig {
    let mut executor = config.executor_config();
    if let Some(concurrency) = cli.concurrency {
        executor.concurrency = concurrency.max(1);
    }
    let bandwidth_limit = cli
        .bwlimit
        .map(BandwidthLimit::new)
        .unwrap_or_else(|| config.bandwidth());
    debug!(
        concurrency = executor.concurrency,
        bandwidth = %bandwidth_limit.display(),
        "executor settings"
    );

    SyncConfig {
        executor,
        bandwidth_limit,
        ..Default::default()
    }
}

fn build_engine(
    endpoints: &Endpoints,
    config: &Config,
    sync_config: SyncConfig,
) -> Result<SyncEngine> {
    let remote = endpoints
        .remote
        .open(&config.s3, config.gcs.credential_path.as_deref())?;
    let local = Arc::new(LocalBackend::new(endpoints.local.clone()));
    let (source_uri, destination_uri) = endpoints.uris();

    Ok(SyncEngine::new(local, remote, endpoints.direction, sync_config)
        .with_uris(source_uri, destination_uri))
}

fn progress_bar(plan: &SyncPlan) -> ProgressBar {
    let total = plan.pending_work().count() as u64;
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ops ({percent}%) | {msg}")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar
}

async fn execute(cli: &Cli, engine: &SyncEngine, plan: &SyncPlan) -> Result<ExitCode> {
    if !cli.quiet {
        cli::print_plan_banner(plan);
    }
    if plan.is_noop() {
        if !cli.quiet {
            eprintln!("  Nothing to do");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: finishing in-flight operations");
            interrupt.cancel();
        }
    });

    let bar = (!cli.quiet && !cli.verbose).then(|| progress_bar(plan));
    let progress = bar.clone().map(|bar| -> ProgressCallback {
        Arc::new(move |p: &ExecutionProgress| {
            bar.set_position(p.completed as u64);
            bar.set_message(format!(
                "{} | {}",
                humansize::format_size(p.bytes_done, humansize::BINARY),
                p.current
            ));
        })
    });

    let report = engine.execute(plan, cancel, progress).await?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    cli::print_report(&report);

    let summary = report.summary();
    if summary.has_failures() || summary.cancelled {
        Ok(ExitCode::from(EXIT_FAILED_OPERATIONS))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

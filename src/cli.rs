// Command-line surface for bucketsync

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use colored::Colorize;
use std::path::PathBuf;

use bucketsync::error::FilterError;
use bucketsync::sync::{ExecutionReport, FilterRules, Polarity, SyncOptions, SyncPlan};

/// Synchronize a local directory with an S3/GCS bucket prefix
#[derive(Parser, Debug)]
#[command(
    name = "bucketsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Synchronize a local directory with a bucket prefix",
    long_about = "Compares a local directory with an s3://, gs:// or file:// location and\n\
                  transfers whatever differs. Plans can be written with --plan, reviewed\n\
                  or edited, and applied later with --apply."
)]
pub struct Cli {
    /// Source: a local directory or a bucket URI
    #[arg(required_unless_present = "apply")]
    pub source: Option<String>,

    /// Destination: a local directory or a bucket URI
    #[arg(required_unless_present = "apply")]
    pub destination: Option<String>,

    /// Delete destination files that do not exist in the source
    #[arg(long)]
    pub delete: bool,

    /// Include files matching PATTERN (repeatable, order matters)
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Exclude files matching PATTERN (repeatable, order matters)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Read '+ PATTERN' / '- PATTERN' rules from FILE, after the flags
    #[arg(long, value_name = "FILE")]
    pub filter_from: Vec<PathBuf>,

    /// Do not compare modification times
    #[arg(long)]
    pub ignore_times: bool,

    /// Do not compare sizes
    #[arg(long)]
    pub ignore_sizes: bool,

    /// Only update files that already exist at the destination
    #[arg(long)]
    pub existing: bool,

    /// Only create files that do not exist at the destination
    #[arg(long)]
    pub ignore_existing: bool,

    /// Write the plan to FILE instead of executing it
    #[arg(long, value_name = "FILE", conflicts_with_all = ["apply", "dry_run"])]
    pub plan: Option<PathBuf>,

    /// Execute a saved plan; positional arguments are ignored
    #[arg(long, value_name = "FILE")]
    pub apply: Option<PathBuf>,

    /// Print the plan as JSON lines on stdout and exit
    #[arg(long, conflicts_with = "apply")]
    pub dry_run: bool,

    /// Number of concurrent transfers
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Bandwidth limit in bytes per second (0 = unlimited)
    #[arg(long, value_name = "BYTES_PER_SEC")]
    pub bwlimit: Option<u64>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log every operation as it starts and finishes
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print the final summary or a hard error
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// --include/--exclude values in command-line order.
    #[arg(skip)]
    pub ordered_filters: Vec<(String, Polarity)>,
}

impl Cli {
    /// Parse the process arguments, keeping include/exclude interleaving.
    pub fn parse_ordered() -> Self {
        let matches = Self::command().get_matches();
        Self::from_matches_ordered(&matches).unwrap_or_else(|e| e.exit())
    }

    #[cfg(test)]
    pub fn try_parse_ordered<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        Self::from_matches_ordered(&matches)
    }

    fn from_matches_ordered(matches: &ArgMatches) -> Result<Self, clap::Error> {
        let mut cli = Self::from_arg_matches(matches)?;
        cli.ordered_filters = ordered_filters(matches);
        Ok(cli)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            delete: self.delete,
            ignore_times: self.ignore_times,
            ignore_sizes: self.ignore_sizes,
            existing: self.existing,
            ignore_existing: self.ignore_existing,
        }
    }

    /// Flag rules first, in the order given, then each filter file's rules.
    pub fn filter_rules(&self) -> Result<FilterRules, FilterError> {
        let pairs = self
            .ordered_filters
            .iter()
            .map(|(pattern, polarity)| (pattern.as_str(), *polarity));
        let mut rules = FilterRules::from_pairs(pairs)?;
        for path in &self.filter_from {
            rules.extend_from_file(path)?;
        }
        Ok(rules)
    }
}

fn ordered_filters(matches: &ArgMatches) -> Vec<(String, Polarity)> {
    let mut tagged = Vec::new();
    for (id, polarity) in [("include", Polarity::Include), ("exclude", Polarity::Exclude)] {
        let (Some(indices), Some(values)) = (matches.indices_of(id), matches.get_many::<String>(id))
        else {
            continue;
        };
        tagged.extend(
            indices
                .zip(values)
                .map(|(index, value)| (index, value.clone(), polarity)),
        );
    }
    tagged.sort_by_key(|(index, _, _)| *index);
    tagged.into_iter().map(|(_, value, polarity)| (value, polarity)).collect()
}

pub fn init_logging(debug: bool, quiet: bool, verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// One-paragraph plan description, written to stderr.
pub fn print_plan_banner(plan: &SyncPlan) {
    let header = &plan.header;
    eprintln!(
        "{} {} {} {} ({})",
        "Plan:".bold(),
        header.source_uri.cyan(),
        "->".dimmed(),
        header.destination_uri.cyan(),
        header.direction.as_str()
    );
    eprintln!("  {}", plan.summary());
}

/// Final report: totals, then failures with their reasons.
pub fn print_report(report: &ExecutionReport) {
    let summary = report.summary();
    let failed = summary.total_failed();

    if failed > 0 {
        println!("{}", format!("Sync finished with {} failed operations", failed).red().bold());
    } else if summary.cancelled {
        println!("{}", "Sync cancelled".yellow().bold());
    } else {
        println!("{}", "Sync complete".green().bold());
    }
    print!("{}", summary.to_plain_text());

    if !summary.errors.is_empty() {
        println!("{}", "Failures:".red());
        for error in &summary.errors {
            println!("  {}", error);
        }
        let hidden = failed.saturating_sub(summary.errors.len());
        if hidden > 0 {
            println!("  ... and {} more", hidden);
        }
    }
}

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use goldset_harness::consistency::{run_consistency_check, ConsistencyConfig};
use goldset_harness::export::{export_errors, ExportOutcome};
use goldset_harness::gateway::{ChatGateway, NoopUsageSink, ProviderGateway, StderrUsageSink};
use goldset_harness::session::StdConsole;
use goldset_harness::{
    compute_stats, load_corpus, render_report, CheckpointStore, Console, LiveOracle,
    NormalizationKind, NormalizationOracle, SessionConfig, SessionOutcome, ValidationRecord,
    ValidationSession,
};

#[derive(Parser)]
#[command(name = "goldset", version, about = "Gold-set builder for LLM normalization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or resume) a gold set interactively, then report on it
    Run {
        /// Normalization task variant
        #[arg(long, value_enum)]
        kind: CliKind,

        /// Input corpus CSV
        #[arg(long)]
        input: PathBuf,

        /// Gold-set checkpoint CSV
        #[arg(long, default_value = "gold_set.csv")]
        gold: PathBuf,

        /// Error-sample export CSV
        #[arg(long, default_value = "error_samples.csv")]
        errors: PathBuf,

        /// Consistency report CSV
        #[arg(long, default_value = "consistency_check.csv")]
        consistency: PathBuf,

        /// Provider model ID
        #[arg(long, default_value = "gpt-4.1")]
        model: String,

        /// Pause between validated items, in milliseconds
        #[arg(long, default_value_t = 300)]
        delay_ms: u64,

        /// Pause between repeated consistency calls, in milliseconds
        #[arg(long, default_value_t = 500)]
        consistency_delay_ms: u64,

        /// Records to probe in the consistency pass
        #[arg(long, default_value_t = 20)]
        sample_size: usize,

        /// Fixed seed for consistency sampling
        #[arg(long)]
        rng_seed: Option<u64>,

        /// Skip the consistency pass entirely
        #[arg(long)]
        skip_consistency: bool,

        /// Log provider call accounting to stderr as JSON lines
        #[arg(long)]
        log_usage: bool,
    },
    /// Report on an existing gold set without any validation
    Stats {
        /// Normalization task variant
        #[arg(long, value_enum)]
        kind: CliKind,

        /// Gold-set checkpoint CSV
        #[arg(long, default_value = "gold_set.csv")]
        gold: PathBuf,

        /// Error-sample export CSV
        #[arg(long, default_value = "error_samples.csv")]
        errors: PathBuf,

        /// Consistency report CSV
        #[arg(long, default_value = "consistency_check.csv")]
        consistency: PathBuf,

        /// Provider model ID (for the consistency pass)
        #[arg(long, default_value = "gpt-4.1")]
        model: String,

        /// Pause between repeated consistency calls, in milliseconds
        #[arg(long, default_value_t = 500)]
        consistency_delay_ms: u64,

        /// Records to probe in the consistency pass
        #[arg(long, default_value_t = 20)]
        sample_size: usize,

        /// Fixed seed for consistency sampling
        #[arg(long)]
        rng_seed: Option<u64>,

        /// Skip the consistency pass entirely
        #[arg(long)]
        skip_consistency: bool,

        /// Log provider call accounting to stderr as JSON lines
        #[arg(long)]
        log_usage: bool,
    },
}

/// CLI-facing variant selector (clap::ValueEnum).
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliKind {
    Affiliation,
    Address,
}

impl From<CliKind> for NormalizationKind {
    fn from(k: CliKind) -> Self {
        match k {
            CliKind::Affiliation => NormalizationKind::Affiliation,
            CliKind::Address => NormalizationKind::Address,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            kind,
            input,
            gold,
            errors,
            consistency,
            model,
            delay_ms,
            consistency_delay_ms,
            sample_size,
            rng_seed,
            skip_consistency,
            log_usage,
        } => {
            let kind = NormalizationKind::from(kind);
            let store = CheckpointStore::new(&gold, kind);
            let oracle = build_oracle(kind, &model, log_usage);
            let mut console = StdConsole;

            // A populated store makes this a pure reporting run: neither the
            // input corpus nor the oracle is required for it.
            let (records, outcome) = match store.load_if_present()? {
                Some(existing) => {
                    console.report(&format!(
                        "\n{b}\nEXISTING GOLD SET FOUND\n{b}\n",
                        b = "=".repeat(70)
                    ));
                    console.report(&format!(
                        "Found {} entries in {}\nProceeding directly to statistics and analysis...",
                        existing.len(),
                        gold.display()
                    ));
                    (existing, SessionOutcome::Finished)
                }
                None => {
                    let corpus = load_corpus(&input, kind)?;
                    let oracle = oracle.as_deref().ok_or(
                        "OPENAI_API_KEY environment variable not set! \
                         Set it with: export OPENAI_API_KEY='your-key-here'",
                    )?;
                    let config = SessionConfig {
                        inter_item_delay: Duration::from_millis(delay_ms),
                        model_label: model.clone(),
                    };
                    let session = ValidationSession::new(oracle, &store, &mut console, config);
                    session.run(&corpus).await?
                }
            };

            if outcome == SessionOutcome::Declined {
                return Ok(());
            }
            if let SessionOutcome::Aborted { completed } = outcome {
                println!("\nAborted after {completed} validated entries.");
            }

            report_and_export(
                kind,
                &records,
                &errors,
                &consistency,
                oracle.as_deref().map(|o| o as &dyn NormalizationOracle),
                consistency_config(sample_size, consistency_delay_ms, rng_seed),
                skip_consistency,
            )
            .await?;
        }
        Commands::Stats {
            kind,
            gold,
            errors,
            consistency,
            model,
            consistency_delay_ms,
            sample_size,
            rng_seed,
            skip_consistency,
            log_usage,
        } => {
            let kind = NormalizationKind::from(kind);
            let store = CheckpointStore::new(&gold, kind);
            let records = store
                .load_if_present()?
                .ok_or_else(|| format!("no gold set found at {}", gold.display()))?;

            println!("Found {} entries in {}", records.len(), gold.display());

            let oracle = build_oracle(kind, &model, log_usage);
            report_and_export(
                kind,
                &records,
                &errors,
                &consistency,
                oracle.as_deref().map(|o| o as &dyn NormalizationOracle),
                consistency_config(sample_size, consistency_delay_ms, rng_seed),
                skip_consistency,
            )
            .await?;
        }
    }

    Ok(())
}

/// Build the live oracle, or `None` when no API key is configured.
fn build_oracle(kind: NormalizationKind, model: &str, log_usage: bool) -> Option<Arc<LiveOracle>> {
    let gateway: Arc<dyn ChatGateway> = if log_usage {
        Arc::new(ProviderGateway::from_env(Arc::new(StderrUsageSink)).ok()?)
    } else {
        Arc::new(ProviderGateway::from_env(Arc::new(NoopUsageSink)).ok()?)
    };
    Some(Arc::new(LiveOracle::new(gateway, kind, model)))
}

fn consistency_config(
    sample_size: usize,
    delay_ms: u64,
    rng_seed: Option<u64>,
) -> ConsistencyConfig {
    ConsistencyConfig {
        sample_size,
        run_delay: Duration::from_millis(delay_ms),
        rng_seed,
        ..ConsistencyConfig::default()
    }
}

/// Statistics, error export, and the optional consistency pass — shared by
/// both subcommands.
async fn report_and_export(
    kind: NormalizationKind,
    records: &[ValidationRecord],
    errors_path: &PathBuf,
    consistency_path: &PathBuf,
    oracle: Option<&dyn NormalizationOracle>,
    config: ConsistencyConfig,
    skip_consistency: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if records.is_empty() {
        println!("\nNo validated entries; nothing to report.");
        return Ok(());
    }

    let stats = compute_stats(records);
    println!("{}", render_report(&stats));

    match export_errors(errors_path, kind, records)? {
        ExportOutcome::Written { path, count } => {
            println!("\nError samples saved to: {}", path.display());
            println!("Total error cases: {count}");
        }
        ExportOutcome::Skipped => {
            println!("\nNo error cases to save (all normalizations were correct!)");
        }
    }

    if skip_consistency {
        return Ok(());
    }
    let mut console = StdConsole;
    match oracle {
        Some(oracle) => {
            run_consistency_check(oracle, records, consistency_path, &mut console, &config)
                .await?;
        }
        None => {
            console.report("Skipping consistency check: OPENAI_API_KEY not set");
        }
    }

    Ok(())
}

//! Reproducibility probe over the accepted slice of a gold set.
//!
//! Re-asks the oracle the same question several times at temperature 0 and
//! counts distinct answers. Variance for a sample is `unique_outputs - 1`:
//! 0 means every repeat agreed, `repeats - 1` means every repeat differed.
//! An errored repeat is itself a distinct outcome and counts against
//! consistency rather than aborting the pass.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;
use tokio::time::sleep;

use crate::checkpoint::{Label, ValidationRecord};
use crate::corpus::NormalizationKind;
use crate::oracle::{NormalizationOracle, NormalizedValue, OracleOutcome};
use crate::session::Console;

#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ConsistencyConfig {
    /// How many accepted records to probe.
    pub sample_size: usize,
    /// Minimum accepted-record count before the pass runs at all.
    pub min_accepted: usize,
    /// Oracle calls per sampled record.
    pub repeats: usize,
    /// Pause between repeated calls.
    pub run_delay: Duration,
    /// Fixed seed for reproducible sampling; `None` draws from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            sample_size: 20,
            min_accepted: 20,
            repeats: 3,
            run_delay: Duration::from_millis(500),
            rng_seed: None,
        }
    }
}

/// One probed record with its repeat outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencySample {
    pub record_id: String,
    pub raw_text: String,
    pub human: NormalizedValue,
    pub runs: Vec<OracleOutcome>,
    pub unique_outputs: usize,
    pub variance: usize,
}

impl ConsistencySample {
    pub fn is_consistent(&self) -> bool {
        self.variance == 0
    }
}

/// Aggregates over one consistency pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencySummary {
    pub tested: usize,
    pub consistent: usize,
    pub inconsistent: usize,
    pub consistency_rate_pct: f64,
    pub total_variance: usize,
    pub avg_variance: f64,
    pub report_path: PathBuf,
}

/// Run the consistency pass over the accepted records.
///
/// Returns `None` without touching the report file when the gold set holds
/// fewer accepted records than `min_accepted`.
pub async fn run_consistency_check(
    oracle: &dyn NormalizationOracle,
    records: &[ValidationRecord],
    report_path: &Path,
    console: &mut dyn Console,
    config: &ConsistencyConfig,
) -> Result<Option<ConsistencySummary>, ConsistencyError> {
    let kind = oracle.kind();
    let accepted: Vec<&ValidationRecord> = records
        .iter()
        .filter(|r| r.label == Label::Accepted)
        .collect();

    let b = "=".repeat(70);
    console.report(&format!("\n{b}\nCONSISTENCY CHECK\n{b}"));

    if accepted.len() < config.min_accepted {
        console.report(&format!(
            "Not enough correct samples for consistency check (need {}, have {})",
            config.min_accepted,
            accepted.len()
        ));
        return Ok(None);
    }

    console.report(&format!(
        "Running consistency check on {} correct samples...\nTesting each sample {} times to measure variance...\n",
        config.sample_size.min(accepted.len()),
        config.repeats
    ));

    let mut rng = match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let chosen: Vec<&ValidationRecord> = accepted
        .choose_multiple(&mut rng, config.sample_size.min(accepted.len()))
        .copied()
        .collect();

    let mut samples = Vec::with_capacity(chosen.len());
    for (idx, record) in chosen.iter().enumerate() {
        console.report(&format!(
            "[{}/{}] RFC: {} - Testing: {}",
            idx + 1,
            chosen.len(),
            record.record_id,
            record.raw_text
        ));

        let mut runs = Vec::with_capacity(config.repeats);
        for run in 0..config.repeats {
            runs.push(oracle.normalize(&record.raw_text, 0.0).await);
            if run + 1 < config.repeats && !config.run_delay.is_zero() {
                sleep(config.run_delay).await;
            }
        }

        let unique_outputs = runs.iter().collect::<HashSet<_>>().len();
        let variance = unique_outputs.saturating_sub(1);

        for (run_idx, outcome) in runs.iter().enumerate() {
            console.report(&format!(
                "  Run {}: {}",
                run_idx + 1,
                outcome_display(outcome)
            ));
        }
        console.report(&format!(
            "  Unique outputs: {unique_outputs}, Variance: {variance}"
        ));
        console.report(if variance == 0 {
            "  Consistent\n"
        } else {
            "  Inconsistent\n"
        });

        samples.push(ConsistencySample {
            record_id: record.record_id.clone(),
            raw_text: record.raw_text.clone(),
            human: record.human.clone(),
            runs,
            unique_outputs,
            variance,
        });
    }

    write_report(report_path, kind, config.repeats, &samples)?;

    let summary = summarize(&samples, report_path);
    console.report(&render_summary(&summary));
    Ok(Some(summary))
}

fn summarize(samples: &[ConsistencySample], report_path: &Path) -> ConsistencySummary {
    let tested = samples.len();
    let consistent = samples.iter().filter(|s| s.is_consistent()).count();
    let inconsistent = tested - consistent;
    let total_variance: usize = samples.iter().map(|s| s.variance).sum();

    let (consistency_rate_pct, avg_variance) = if tested == 0 {
        (0.0, 0.0)
    } else {
        (
            consistent as f64 / tested as f64 * 100.0,
            total_variance as f64 / tested as f64,
        )
    };

    ConsistencySummary {
        tested,
        consistent,
        inconsistent,
        consistency_rate_pct,
        total_variance,
        avg_variance,
        report_path: report_path.to_path_buf(),
    }
}

fn render_summary(summary: &ConsistencySummary) -> String {
    let b = "=".repeat(70);
    format!(
        "{b}\nCONSISTENCY RESULTS:\n{b}\n\
         Total samples tested: {tested}\n\
         Consistent outputs (variance = 0): {consistent}\n\
         Inconsistent outputs (variance > 0): {inconsistent}\n\
         Consistency rate: {rate:.1}%\n\
         \nVariance Metrics:\n  \
         Total variance: {total}\n  \
         Average variance per sample: {avg:.2}\n  \
         (Variance = number of unique outputs - 1)\n\
         \nConsistency check results saved to: {path}",
        tested = summary.tested,
        consistent = summary.consistent,
        inconsistent = summary.inconsistent,
        rate = summary.consistency_rate_pct,
        total = summary.total_variance,
        avg = summary.avg_variance,
        path = summary.report_path.display(),
    )
}

// =============================================================================
// Report file
// =============================================================================

fn write_report(
    path: &Path,
    kind: NormalizationKind,
    repeats: usize,
    samples: &[ConsistencySample],
) -> Result<(), ConsistencyError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(report_headers(kind, repeats))?;
    for sample in samples {
        writer.write_record(report_row(kind, sample))?;
    }
    writer.flush()?;
    Ok(())
}

fn report_headers(kind: NormalizationKind, repeats: usize) -> Vec<String> {
    let mut headers = vec!["rfc_id".to_string()];
    match kind {
        NormalizationKind::Affiliation => {
            headers.push("original_affiliation".to_string());
            headers.push("human_normalized".to_string());
            for run in 1..=repeats {
                headers.push(format!("run_{run}"));
            }
        }
        NormalizationKind::Address => {
            headers.push("original_address".to_string());
            headers.push("human_country".to_string());
            headers.push("human_continent".to_string());
            for run in 1..=repeats {
                headers.push(format!("run_{run}_country"));
                headers.push(format!("run_{run}_continent"));
            }
        }
    }
    headers.push("unique_outputs".to_string());
    headers.push("variance".to_string());
    headers.push("consistent".to_string());
    headers
}

fn report_row(kind: NormalizationKind, sample: &ConsistencySample) -> Vec<String> {
    let mut row = vec![sample.record_id.clone(), sample.raw_text.clone()];
    match (kind, &sample.human) {
        (NormalizationKind::Affiliation, NormalizedValue::Affiliation { name }) => {
            row.push(name.clone());
            for outcome in &sample.runs {
                row.push(outcome_display(outcome));
            }
        }
        (NormalizationKind::Address, NormalizedValue::Address { country, continent }) => {
            row.push(country.clone());
            row.push(continent.clone());
            for outcome in &sample.runs {
                match outcome {
                    OracleOutcome::Value(NormalizedValue::Address { country, continent }) => {
                        row.push(country.clone());
                        row.push(continent.clone());
                    }
                    _ => {
                        row.push("ERROR".to_string());
                        row.push("ERROR".to_string());
                    }
                }
            }
        }
        // A mixed-variant gold set is rejected at load time; serialize the
        // runs flat so the row is still inspectable if it ever happens.
        _ => {
            for outcome in &sample.runs {
                row.push(outcome_display(outcome));
            }
        }
    }
    row.push(sample.unique_outputs.to_string());
    row.push(sample.variance.to_string());
    row.push(if sample.variance == 0 { "Yes" } else { "No" }.to_string());
    row
}

fn outcome_display(outcome: &OracleOutcome) -> String {
    match outcome {
        OracleOutcome::Value(NormalizedValue::Affiliation { name }) => name.clone(),
        OracleOutcome::Value(NormalizedValue::Address { country, continent }) => {
            format!("{country}, {continent}")
        }
        OracleOutcome::Error => "ERROR".to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, runs: Vec<OracleOutcome>) -> ConsistencySample {
        let unique_outputs = runs.iter().collect::<HashSet<_>>().len();
        ConsistencySample {
            record_id: id.to_string(),
            raw_text: format!("raw {id}"),
            human: NormalizedValue::affiliation("AT&T"),
            runs,
            unique_outputs,
            variance: unique_outputs - 1,
        }
    }

    #[test]
    fn variance_counts_distinct_outcomes() {
        let same = sample(
            "a",
            vec![
                OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
                OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
                OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
            ],
        );
        assert_eq!(same.variance, 0);
        assert!(same.is_consistent());

        let split = sample(
            "b",
            vec![
                OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
                OracleOutcome::Value(NormalizedValue::affiliation("ATT")),
                OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
            ],
        );
        assert_eq!(split.unique_outputs, 2);
        assert_eq!(split.variance, 1);
        assert!(!split.is_consistent());
    }

    #[test]
    fn errored_run_is_a_distinct_outcome() {
        let mixed = sample(
            "c",
            vec![
                OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
                OracleOutcome::Error,
                OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
            ],
        );
        assert_eq!(mixed.unique_outputs, 2);
        assert_eq!(mixed.variance, 1);
    }

    #[test]
    fn summary_aggregates() {
        let samples = vec![
            sample(
                "a",
                vec![
                    OracleOutcome::Value(NormalizedValue::affiliation("x")),
                    OracleOutcome::Value(NormalizedValue::affiliation("x")),
                    OracleOutcome::Value(NormalizedValue::affiliation("x")),
                ],
            ),
            sample(
                "b",
                vec![
                    OracleOutcome::Value(NormalizedValue::affiliation("x")),
                    OracleOutcome::Value(NormalizedValue::affiliation("y")),
                    OracleOutcome::Value(NormalizedValue::affiliation("z")),
                ],
            ),
        ];

        let summary = summarize(&samples, Path::new("consistency_check.csv"));
        assert_eq!(summary.tested, 2);
        assert_eq!(summary.consistent, 1);
        assert_eq!(summary.inconsistent, 1);
        assert_eq!(summary.total_variance, 2);
        assert!((summary.consistency_rate_pct - 50.0).abs() < 1e-9);
        assert!((summary.avg_variance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn affiliation_report_headers() {
        assert_eq!(
            report_headers(NormalizationKind::Affiliation, 3),
            vec![
                "rfc_id",
                "original_affiliation",
                "human_normalized",
                "run_1",
                "run_2",
                "run_3",
                "unique_outputs",
                "variance",
                "consistent",
            ]
        );
    }

    #[test]
    fn address_report_headers() {
        assert_eq!(
            report_headers(NormalizationKind::Address, 3),
            vec![
                "rfc_id",
                "original_address",
                "human_country",
                "human_continent",
                "run_1_country",
                "run_1_continent",
                "run_2_country",
                "run_2_continent",
                "run_3_country",
                "run_3_continent",
                "unique_outputs",
                "variance",
                "consistent",
            ]
        );
    }

    #[test]
    fn address_error_run_fills_both_cells() {
        let s = ConsistencySample {
            record_id: "rfc9".to_string(),
            raw_text: "Paris".to_string(),
            human: NormalizedValue::address("France", "Europe"),
            runs: vec![
                OracleOutcome::Value(NormalizedValue::address("France", "Europe")),
                OracleOutcome::Error,
            ],
            unique_outputs: 2,
            variance: 1,
        };
        let row = report_row(NormalizationKind::Address, &s);
        assert_eq!(
            row,
            vec![
                "rfc9", "Paris", "France", "Europe", "France", "Europe", "ERROR", "ERROR", "2",
                "1", "No",
            ]
        );
    }
}

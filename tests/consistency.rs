use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use goldset_harness::{
    run_consistency_check, ConsistencyConfig, Console, NormalizationKind, NormalizationOracle,
    NormalizedValue, OracleOutcome, PromptReply, ValidationRecord,
};
use tempfile::tempdir;

/// Oracle whose reply depends only on the call index, cycling through the
/// given outputs.
struct CyclingOracle {
    kind: NormalizationKind,
    outputs: Vec<OracleOutcome>,
    calls: AtomicUsize,
}

impl CyclingOracle {
    fn constant(kind: NormalizationKind, outcome: OracleOutcome) -> Self {
        Self {
            kind,
            outputs: vec![outcome],
            calls: AtomicUsize::new(0),
        }
    }

    fn cycling(kind: NormalizationKind, outputs: Vec<OracleOutcome>) -> Self {
        Self {
            kind,
            outputs,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NormalizationOracle for CyclingOracle {
    fn kind(&self) -> NormalizationKind {
        self.kind
    }

    async fn normalize(&self, _raw_text: &str, _temperature: f32) -> OracleOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.outputs[n % self.outputs.len()].clone()
    }
}

struct SilentConsole;

impl Console for SilentConsole {
    fn confirm(&mut self, _message: &str) -> io::Result<bool> {
        Ok(true)
    }

    fn prompt(&mut self, _message: &str) -> io::Result<PromptReply> {
        Ok(PromptReply::Text(String::new()))
    }

    fn report(&mut self, _message: &str) {}
}

fn accepted_records(n: usize) -> Vec<ValidationRecord> {
    (0..n)
        .map(|i| {
            ValidationRecord::new(
                format!("rfc{i}"),
                format!("raw {i}"),
                NormalizedValue::affiliation("AT&T"),
                NormalizedValue::affiliation("AT&T"),
            )
        })
        .collect()
}

fn test_config(sample_size: usize, min_accepted: usize) -> ConsistencyConfig {
    ConsistencyConfig {
        sample_size,
        min_accepted,
        repeats: 3,
        run_delay: Duration::ZERO,
        rng_seed: Some(42),
    }
}

#[tokio::test]
async fn constant_oracle_is_fully_consistent() {
    let dir = tempdir().unwrap();
    let report = dir.path().join("consistency_check.csv");
    let oracle = CyclingOracle::constant(
        NormalizationKind::Affiliation,
        OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
    );
    let mut console = SilentConsole;

    let summary = run_consistency_check(
        &oracle,
        &accepted_records(5),
        &report,
        &mut console,
        &test_config(5, 5),
    )
    .await
    .unwrap()
    .expect("pass should run");

    assert_eq!(summary.tested, 5);
    assert_eq!(summary.consistent, 5);
    assert_eq!(summary.inconsistent, 0);
    assert_eq!(summary.total_variance, 0);
    assert!((summary.consistency_rate_pct - 100.0).abs() < 1e-9);
    assert!((summary.avg_variance - 0.0).abs() < 1e-9);

    let contents = std::fs::read_to_string(&report).unwrap();
    let mut lines = contents.lines();
    assert_eq!(
        lines.next().unwrap(),
        "rfc_id,original_affiliation,human_normalized,run_1,run_2,run_3,unique_outputs,variance,consistent"
    );
    assert_eq!(lines.count(), 5);
    assert!(contents.contains(",1,0,Yes"));
}

#[tokio::test]
async fn cycling_oracle_is_flagged_inconsistent() {
    let dir = tempdir().unwrap();
    let report = dir.path().join("consistency_check.csv");
    let oracle = CyclingOracle::cycling(
        NormalizationKind::Affiliation,
        vec![
            OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
            OracleOutcome::Value(NormalizedValue::affiliation("ATT")),
            OracleOutcome::Value(NormalizedValue::affiliation("A.T.T.")),
        ],
    );
    let mut console = SilentConsole;

    let summary = run_consistency_check(
        &oracle,
        &accepted_records(4),
        &report,
        &mut console,
        &test_config(4, 4),
    )
    .await
    .unwrap()
    .expect("pass should run");

    // Every sample sees three distinct replies.
    assert_eq!(summary.tested, 4);
    assert_eq!(summary.consistent, 0);
    assert_eq!(summary.total_variance, 8);
    assert!((summary.avg_variance - 2.0).abs() < 1e-9);
    assert!((summary.consistency_rate_pct - 0.0).abs() < 1e-9);
}

#[tokio::test]
async fn too_few_accepted_records_skips_the_pass() {
    let dir = tempdir().unwrap();
    let report = dir.path().join("consistency_check.csv");
    let oracle = CyclingOracle::constant(
        NormalizationKind::Affiliation,
        OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
    );
    let mut console = SilentConsole;

    let summary = run_consistency_check(
        &oracle,
        &accepted_records(3),
        &report,
        &mut console,
        &test_config(20, 20),
    )
    .await
    .unwrap();

    assert!(summary.is_none());
    assert!(!report.exists());
}

#[tokio::test]
async fn rejected_records_are_never_sampled() {
    let dir = tempdir().unwrap();
    let report = dir.path().join("consistency_check.csv");
    let oracle = CyclingOracle::constant(
        NormalizationKind::Affiliation,
        OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
    );
    let mut console = SilentConsole;

    let mut records = accepted_records(4);
    records.push(ValidationRecord::new(
        "rfc-bad",
        "raw bad",
        NormalizedValue::affiliation("ATT"),
        NormalizedValue::affiliation("AT&T"),
    ));

    run_consistency_check(&oracle, &records, &report, &mut console, &test_config(4, 4))
        .await
        .unwrap()
        .expect("pass should run");

    let contents = std::fs::read_to_string(&report).unwrap();
    assert!(!contents.contains("rfc-bad"));
}

#[tokio::test]
async fn sampling_is_without_replacement() {
    let dir = tempdir().unwrap();
    let report = dir.path().join("consistency_check.csv");
    let oracle = CyclingOracle::constant(
        NormalizationKind::Affiliation,
        OracleOutcome::Value(NormalizedValue::affiliation("AT&T")),
    );
    let mut console = SilentConsole;

    run_consistency_check(
        &oracle,
        &accepted_records(10),
        &report,
        &mut console,
        &test_config(10, 10),
    )
    .await
    .unwrap()
    .expect("pass should run");

    let contents = std::fs::read_to_string(&report).unwrap();
    let ids: Vec<&str> = contents
        .lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap())
        .collect();
    let distinct: HashSet<&&str> = ids.iter().collect();
    assert_eq!(ids.len(), 10);
    assert_eq!(distinct.len(), 10);
}

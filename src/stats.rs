//! Accuracy and error-rate statistics over a gold set.
//!
//! Pure computation over in-memory records; rendering is separate so callers
//! can consume the numbers without the banner text.

use crate::checkpoint::{Label, ValidationRecord};

/// Aggregate counts over a gold set. Invariant: `accepted + rejected == total`
/// and the percentages are `0.0` for an empty set, never NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationStats {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub accuracy_pct: f64,
    pub error_rate_pct: f64,
}

pub fn compute_stats(records: &[ValidationRecord]) -> ValidationStats {
    let total = records.len();
    let accepted = records
        .iter()
        .filter(|r| r.label == Label::Accepted)
        .count();
    let rejected = total - accepted;

    let (accuracy_pct, error_rate_pct) = if total == 0 {
        (0.0, 0.0)
    } else {
        (
            accepted as f64 / total as f64 * 100.0,
            rejected as f64 / total as f64 * 100.0,
        )
    };

    ValidationStats {
        total,
        accepted,
        rejected,
        accuracy_pct,
        error_rate_pct,
    }
}

/// Render the operator-facing statistics report.
pub fn render_report(stats: &ValidationStats) -> String {
    let b = "=".repeat(70);
    format!(
        "\n{b}\nSTATISTICAL VALIDATION\n{b}\n\
         N = Total number of manually evaluated entries: {n}\n\
         R = Number of correct normalizations (label = r): {r}\n\
         W = Number of incorrect normalizations (label = w): {w}\n\
         \n{b}\n1. ACCURACY\n{b}\n\
         Proportion of entries the LLM normalized correctly:\n\
         Accuracy = R / N = {r} / {n} = {acc:.2}%\n\
         \n{b}\n2. ERROR RATE\n{b}\n\
         Proportion of incorrect normalizations:\n\
         Error Rate = W / N = {w} / {n} = {err:.2}%",
        n = stats.total,
        r = stats.accepted,
        w = stats.rejected,
        acc = stats.accuracy_pct,
        err = stats.error_rate_pct,
    )
}

// =============================================================================
// TESTS
// =============================================================================

//! Error-sample export for downstream audit.
//!
//! Rejected records are the interesting ones for prompt iteration; this pulls
//! them out of the gold set into a standalone CSV. The label column is
//! dropped — every exported row is rejected by construction.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::checkpoint::{CheckpointStore, Label, ValidationRecord};
use crate::corpus::NormalizationKind;
use crate::oracle::NormalizedValue;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record variant does not match export kind")]
    VariantMismatch,
}

/// What the exporter did. `Skipped` means a fully-correct gold set; no file
/// is created or touched in that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written { path: PathBuf, count: usize },
    Skipped,
}

/// Write all rejected records to `path`.
pub fn export_errors(
    path: impl AsRef<Path>,
    kind: NormalizationKind,
    records: &[ValidationRecord],
) -> Result<ExportOutcome, ExportError> {
    let rejected: Vec<&ValidationRecord> = records
        .iter()
        .filter(|r| r.label == Label::Rejected)
        .collect();
    if rejected.is_empty() {
        return Ok(ExportOutcome::Skipped);
    }

    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)?;

    let headers = CheckpointStore::headers(kind);
    writer.write_record(&headers[..headers.len() - 1])?;

    for record in rejected.iter() {
        writer.write_record(&error_row(kind, record)?)?;
    }
    writer.flush()?;

    Ok(ExportOutcome::Written {
        path: path.to_path_buf(),
        count: rejected.len(),
    })
}

fn error_row(kind: NormalizationKind, record: &ValidationRecord) -> Result<Vec<String>, ExportError> {
    match (kind, &record.machine, &record.human) {
        (
            NormalizationKind::Affiliation,
            NormalizedValue::Affiliation { name: machine },
            NormalizedValue::Affiliation { name: human },
        ) => Ok(vec![
            record.record_id.clone(),
            record.raw_text.clone(),
            machine.clone(),
            human.clone(),
        ]),
        (
            NormalizationKind::Address,
            NormalizedValue::Address {
                country: m_country,
                continent: m_continent,
            },
            NormalizedValue::Address {
                country: h_country,
                continent: h_continent,
            },
        ) => Ok(vec![
            record.record_id.clone(),
            record.raw_text.clone(),
            m_country.clone(),
            m_continent.clone(),
            h_country.clone(),
            h_continent.clone(),
        ]),
        _ => Err(ExportError::VariantMismatch),
    }
}

// =============================================================================
// TESTS
// =============================================================================

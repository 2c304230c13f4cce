//! Durable gold-set persistence.
//!
//! The checkpoint file is rewritten in full after every recorded item:
//! idempotent full-overwrite on disk, semantically append-only in content.
//! A write failure is fatal for the run — continuing past an unflushed record
//! risks silent data loss.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::corpus::NormalizationKind;
use crate::oracle::NormalizedValue;

/// Human verdict on one machine output. Serialized as `r` / `w` in CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Accepted,
    Rejected,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Accepted => "r",
            Label::Rejected => "w",
        }
    }

    pub fn parse(s: &str) -> Option<Label> {
        match s.trim().to_lowercase().as_str() {
            "r" => Some(Label::Accepted),
            "w" => Some(Label::Rejected),
            _ => None,
        }
    }
}

/// One unit of the gold set. Created exactly once per corpus item,
/// immutable thereafter.
///
/// Invariant: `label == Accepted` iff `human == machine` field-wise. The
/// human value is always populated; accepting the machine output verbatim
/// stores a copy of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRecord {
    pub record_id: String,
    pub raw_text: String,
    pub machine: NormalizedValue,
    pub human: NormalizedValue,
    pub label: Label,
}

impl ValidationRecord {
    /// Construct a record, deriving the label from the equality invariant.
    /// A human correction that textually equals the machine output yields
    /// `Accepted` — the correction was redundant.
    pub fn new(
        record_id: impl Into<String>,
        raw_text: impl Into<String>,
        machine: NormalizedValue,
        human: NormalizedValue,
    ) -> Self {
        let label = if human == machine {
            Label::Accepted
        } else {
            Label::Rejected
        };
        Self {
            record_id: record_id.into(),
            raw_text: raw_text.into(),
            machine,
            human,
            label,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("unexpected checkpoint header: expected {expected:?}, found {found:?}")]
    BadHeader {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("unrecognized label '{0}' in checkpoint row")]
    BadLabel(String),

    #[error("record variant does not match store kind")]
    VariantMismatch,
}

/// CSV-backed store for the gold set, one file per run.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    kind: NormalizationKind,
}

impl CheckpointStore {
    pub fn new(path: impl AsRef<Path>, kind: NormalizationKind) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> NormalizationKind {
        self.kind
    }

    /// Column headers for this store's variant, in file order.
    pub fn headers(kind: NormalizationKind) -> &'static [&'static str] {
        match kind {
            NormalizationKind::Affiliation => &[
                "rfc_id",
                "original_affiliation",
                "llm_normalized",
                "human_normalized",
                "label",
            ],
            NormalizationKind::Address => &[
                "rfc_id",
                "original_address",
                "llm_normalized_country",
                "llm_normalized_continent",
                "human_normalized_country",
                "human_normalized_continent",
                "label",
            ],
        }
    }

    /// Load the gold set if the file exists and holds at least one data row.
    ///
    /// `None` means "no prior progress": absent file or header-only file.
    /// A present-but-corrupt file is an error, not a silent restart — the
    /// caller must not re-label over an unreadable gold set.
    pub fn load_if_present(&self) -> Result<Option<Vec<ValidationRecord>>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let expected = Self::headers(self.kind);
        let found = reader.headers()?.clone();
        if found.iter().ne(expected.iter().copied()) {
            return Err(StoreError::BadHeader {
                expected: expected.iter().map(|h| h.to_string()).collect(),
                found: found.iter().map(|h| h.to_string()).collect(),
            });
        }

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            records.push(self.row_to_record(&row)?);
        }

        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(records))
    }

    /// Rewrite the store with the full accumulated record list.
    pub fn write_all(&self, records: &[ValidationRecord]) -> Result<(), StoreError> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(Self::headers(self.kind))?;
        for record in records {
            writer.write_record(&self.record_to_row(record)?)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn record_to_row(&self, record: &ValidationRecord) -> Result<Vec<String>, StoreError> {
        match (self.kind, &record.machine, &record.human) {
            (
                NormalizationKind::Affiliation,
                NormalizedValue::Affiliation { name: machine },
                NormalizedValue::Affiliation { name: human },
            ) => Ok(vec![
                record.record_id.clone(),
                record.raw_text.clone(),
                machine.clone(),
                human.clone(),
                record.label.as_str().to_string(),
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
                record.label.as_str().to_string(),
            ]),
            _ => Err(StoreError::VariantMismatch),
        }
    }

    fn row_to_record(&self, row: &csv::StringRecord) -> Result<ValidationRecord, StoreError> {
        let field = |idx: usize| row.get(idx).unwrap_or_default().to_string();

        let (machine, human, label_idx) = match self.kind {
            NormalizationKind::Affiliation => (
                NormalizedValue::affiliation(field(2)),
                NormalizedValue::affiliation(field(3)),
                4,
            ),
            NormalizationKind::Address => (
                NormalizedValue::address(field(2), field(3)),
                NormalizedValue::address(field(4), field(5)),
                6,
            ),
        };

        let label_text = field(label_idx);
        let label =
            Label::parse(&label_text).ok_or_else(|| StoreError::BadLabel(label_text.clone()))?;

        Ok(ValidationRecord {
            record_id: field(0),
            raw_text: field(1),
            machine,
            human,
            label,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

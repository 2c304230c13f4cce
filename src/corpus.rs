//! Input corpus loading and the normalization variant selector.
//!
//! The corpus extraction step that walks the document registry lives outside
//! this crate; all we require here is its output contract: a finite, ordered
//! CSV of (record id, raw string) pairs with the variant's column names.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Which normalization task a run performs.
///
/// The kind selects the oracle prompt, the reply-repair policy, and every CSV
/// header set, so one binary serves both datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationKind {
    /// Raw affiliation string -> canonical organization name.
    Affiliation,
    /// Raw postal address -> country + continent pair.
    Address,
}

impl NormalizationKind {
    /// Header of the record-id column in the input corpus.
    pub fn id_column(&self) -> &'static str {
        "rfc_id"
    }

    /// Header of the raw-text column in the input corpus.
    pub fn raw_column(&self) -> &'static str {
        match self {
            NormalizationKind::Affiliation => "original_affiliation",
            NormalizationKind::Address => "original_address",
        }
    }

    /// Noun used in operator-facing messages.
    pub fn noun(&self) -> &'static str {
        match self {
            NormalizationKind::Affiliation => "affiliation",
            NormalizationKind::Address => "address",
        }
    }
}

/// One raw string awaiting validation. IDs need not be unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusItem {
    pub record_id: String,
    pub raw_text: String,
}

/// Precondition failures while loading the corpus. All of these are fatal and
/// occur before any session state is mutated.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("input file not found: {0}")]
    NotFound(PathBuf),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV must have '{id}' and '{raw}' columns; found: {found:?}")]
    MissingColumns {
        id: &'static str,
        raw: &'static str,
        found: Vec<String>,
    },

    #[error("no {0} rows found in input file")]
    Empty(&'static str),
}

/// Load the input corpus, validating the required columns up front.
pub fn load_corpus(
    path: impl AsRef<Path>,
    kind: NormalizationKind,
) -> Result<Vec<CorpusItem>, CorpusError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CorpusError::NotFound(path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let id_idx = headers.iter().position(|h| h == kind.id_column());
    let raw_idx = headers.iter().position(|h| h == kind.raw_column());

    let (id_idx, raw_idx) = match (id_idx, raw_idx) {
        (Some(i), Some(r)) => (i, r),
        _ => {
            return Err(CorpusError::MissingColumns {
                id: kind.id_column(),
                raw: kind.raw_column(),
                found: headers.iter().map(|h| h.to_string()).collect(),
            })
        }
    };

    let mut items = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record_id = row.get(id_idx).unwrap_or_default().trim().to_string();
        let raw_text = row.get(raw_idx).unwrap_or_default().trim().to_string();
        if raw_text.is_empty() {
            continue;
        }
        items.push(CorpusItem {
            record_id,
            raw_text,
        });
    }

    if items.is_empty() {
        return Err(CorpusError::Empty(kind.noun()));
    }

    Ok(items)
}

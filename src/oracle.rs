//! The normalization oracle: one LLM call plus reply repair.
//!
//! Implements the contract between raw model replies and structured values.
//! Transport failures and (for the address variant) unparseable replies are
//! classified into the `OracleOutcome::Error` sentinel; nothing in here can
//! terminate a validation session.

use async_trait::async_trait;
use serde_json::Value as Json;
use std::sync::Arc;
use tracing::warn;

use crate::corpus::NormalizationKind;
use crate::gateway::{ChatGateway, ChatRequest};
use crate::prompts::prompt_for;

// =============================================================================
// Constants
// =============================================================================

/// Hard cap on generation for an affiliation normalization.
pub const AFFILIATION_MAX_OUTPUT_TOKENS: u32 = 150;
/// Hard cap on generation for an address lookup.
pub const ADDRESS_MAX_OUTPUT_TOKENS: u32 = 100;

/// Sentinel for a field the model could not resolve.
pub const UNKNOWN: &str = "Unknown";

// =============================================================================
// Structured values
// =============================================================================

/// A well-formed normalization result. Equality is field-wise over the
/// active variant, which is exactly the label and consistency contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NormalizedValue {
    Affiliation { name: String },
    Address { country: String, continent: String },
}

impl NormalizedValue {
    pub fn affiliation(name: impl Into<String>) -> Self {
        NormalizedValue::Affiliation { name: name.into() }
    }

    pub fn address(country: impl Into<String>, continent: impl Into<String>) -> Self {
        NormalizedValue::Address {
            country: country.into(),
            continent: continent.into(),
        }
    }

    pub fn kind(&self) -> NormalizationKind {
        match self {
            NormalizedValue::Affiliation { .. } => NormalizationKind::Affiliation,
            NormalizedValue::Address { .. } => NormalizationKind::Address,
        }
    }
}

/// What one oracle invocation produced. Callers branch on the tag; transport
/// faults never escape as errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OracleOutcome {
    Value(NormalizedValue),
    Error,
}

impl OracleOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, OracleOutcome::Error)
    }

    pub fn value(&self) -> Option<&NormalizedValue> {
        match self {
            OracleOutcome::Value(v) => Some(v),
            OracleOutcome::Error => None,
        }
    }
}

// =============================================================================
// Reply repair
// =============================================================================

/// Result of parsing a cleaned model reply, before any fallback policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    Parsed(NormalizedValue),
    Malformed(String),
}

/// Strip markdown code-fence markers the model sometimes wraps replies in.
pub fn strip_code_fences(reply: &str) -> String {
    let trimmed = reply.trim();
    if trimmed.starts_with("```json") {
        trimmed.replace("```json", "").replace("```", "").trim().to_string()
    } else if trimmed.starts_with("```") {
        trimmed.replace("```", "").trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse an affiliation reply.
///
/// Replies are usually the bare normalized name, but some models echo a JSON
/// object keyed by the input string, or a JSON string. A reply that is not
/// JSON at all is `Malformed` and the caller falls back to the cleaned text
/// verbatim rather than failing the item.
pub fn parse_affiliation_reply(raw_text: &str, reply: &str) -> RepairOutcome {
    let cleaned = strip_code_fences(reply);

    match serde_json::from_str::<Json>(&cleaned) {
        Ok(Json::Object(map)) => {
            let picked = map
                .get(raw_text)
                .or_else(|| map.values().next())
                .map(json_to_text)
                .unwrap_or_else(|| cleaned.clone());
            RepairOutcome::Parsed(NormalizedValue::affiliation(picked))
        }
        Ok(Json::String(s)) => RepairOutcome::Parsed(NormalizedValue::affiliation(s)),
        _ => RepairOutcome::Malformed(cleaned),
    }
}

/// Parse an address reply.
///
/// Expects a JSON object with `country` and `continent`; a missing field
/// defaults to `"Unknown"`, never an error. Anything that does not parse as
/// an object is `Malformed` and the caller maps it to `OracleOutcome::Error`.
pub fn parse_address_reply(reply: &str) -> RepairOutcome {
    let cleaned = strip_code_fences(reply);

    match serde_json::from_str::<Json>(&cleaned) {
        Ok(Json::Object(map)) => {
            let country = map
                .get("country")
                .map(json_to_text)
                .unwrap_or_else(|| UNKNOWN.to_string());
            let continent = map
                .get("continent")
                .map(json_to_text)
                .unwrap_or_else(|| UNKNOWN.to_string());
            RepairOutcome::Parsed(NormalizedValue::address(country, continent))
        }
        _ => RepairOutcome::Malformed(cleaned),
    }
}

fn json_to_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Oracle
// =============================================================================

/// The oracle seam. `LiveOracle` drives the real provider; tests inject
/// scripted implementations.
#[async_trait]
pub trait NormalizationOracle: Send + Sync {
    fn kind(&self) -> NormalizationKind;

    /// Normalize one raw string at the given sampling temperature.
    /// Temperature 0 requests maximally reproducible output; whether the
    /// provider honors that is what the consistency pass measures.
    async fn normalize(&self, raw_text: &str, temperature: f32) -> OracleOutcome;
}

/// Oracle backed by a chat gateway.
pub struct LiveOracle {
    gateway: Arc<dyn ChatGateway>,
    kind: NormalizationKind,
    model: String,
}

impl LiveOracle {
    pub fn new(gateway: Arc<dyn ChatGateway>, kind: NormalizationKind, model: impl Into<String>) -> Self {
        Self {
            gateway,
            kind,
            model: model.into(),
        }
    }

    fn max_output_tokens(&self) -> u32 {
        match self.kind {
            NormalizationKind::Affiliation => AFFILIATION_MAX_OUTPUT_TOKENS,
            NormalizationKind::Address => ADDRESS_MAX_OUTPUT_TOKENS,
        }
    }
}

#[async_trait]
impl NormalizationOracle for LiveOracle {
    fn kind(&self) -> NormalizationKind {
        self.kind
    }

    async fn normalize(&self, raw_text: &str, temperature: f32) -> OracleOutcome {
        let messages = prompt_for(self.kind).render(raw_text);

        let request = ChatRequest::new(&self.model, messages, "oracle::normalize")
            .temperature(temperature)
            .max_tokens(self.max_output_tokens());
        // The address task contract is a JSON object; ask the provider to
        // enforce that. Fence stripping still covers models that ignore it.
        let request = match self.kind {
            NormalizationKind::Address => request.json(),
            NormalizationKind::Affiliation => request,
        };

        let response = match self.gateway.chat(request).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, raw_text, "oracle call failed");
                return OracleOutcome::Error;
            }
        };

        match self.kind {
            NormalizationKind::Affiliation => {
                match parse_affiliation_reply(raw_text, &response.content) {
                    RepairOutcome::Parsed(value) => OracleOutcome::Value(value),
                    // Degraded but non-fatal: the cleaned text stands in for
                    // the structured value and the human adjudicates it.
                    RepairOutcome::Malformed(text) => {
                        OracleOutcome::Value(NormalizedValue::affiliation(text))
                    }
                }
            }
            NormalizationKind::Address => match parse_address_reply(&response.content) {
                RepairOutcome::Parsed(value) => OracleOutcome::Value(value),
                RepairOutcome::Malformed(text) => {
                    warn!(raw_text, reply = %text, "unparseable address reply");
                    OracleOutcome::Error
                }
            },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! The human-in-the-loop validation session.
//!
//! Drives the per-item cycle: oracle call, human verdict, synchronous
//! checkpoint. The console is an injected capability so a scripted source can
//! drive the state machine in tests with no behavioral change.
//!
//! Lifecycle: NotStarted -> Bootstrapped -> per-item
//! {AwaitingOracle, AwaitingHuman, Recorded} -> Finished | Aborted.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

use crate::checkpoint::{CheckpointStore, Label, StoreError, ValidationRecord};
use crate::corpus::{CorpusItem, NormalizationKind};
use crate::oracle::{NormalizationOracle, NormalizedValue, OracleOutcome};

// =============================================================================
// Console abstraction
// =============================================================================

/// A human reply at a prompt. The quit sentinel is recognized
/// case-insensitively at every input point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply {
    Text(String),
    Quit,
}

impl PromptReply {
    pub fn from_line(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("quit") {
            PromptReply::Quit
        } else {
            PromptReply::Text(trimmed.to_string())
        }
    }
}

/// Blocking line-oriented operator interface.
pub trait Console: Send {
    /// Ask a yes/no question; `true` means proceed.
    fn confirm(&mut self, message: &str) -> io::Result<bool>;

    /// Solicit one line of input.
    fn prompt(&mut self, message: &str) -> io::Result<PromptReply>;

    /// Emit a progress/report message.
    fn report(&mut self, message: &str);
}

/// Console backed by stdin/stdout.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn confirm(&mut self, message: &str) -> io::Result<bool> {
        print!("{message}");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().eq_ignore_ascii_case("y"))
    }

    fn prompt(&mut self, message: &str) -> io::Result<PromptReply> {
        print!("{message}");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(PromptReply::from_line(&line))
    }

    fn report(&mut self, message: &str) {
        println!("{message}");
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("checkpoint error: {0}")]
    Store(#[from] StoreError),

    #[error("console error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pause between items to respect provider rate limits. Not part of the
    /// correctness contract; tests set it to zero.
    pub inter_item_delay: Duration,
    /// Model name shown in the bootstrap banner.
    pub model_label: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inter_item_delay: Duration::from_millis(300),
            model_label: "gpt-4.1".to_string(),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// All items handled, or the operator quit cleanly; the recorded set is
    /// the gold set for this run.
    Finished,
    /// The operator aborted at an oracle failure. Everything checkpointed so
    /// far survives; `completed` is the partial progress count.
    Aborted { completed: usize },
    /// The operator declined the bootstrap confirmation; nothing was mutated.
    Declined,
}

/// The interactive per-item state machine.
pub struct ValidationSession<'a> {
    oracle: &'a dyn NormalizationOracle,
    store: &'a CheckpointStore,
    console: &'a mut dyn Console,
    config: SessionConfig,
}

impl<'a> ValidationSession<'a> {
    pub fn new(
        oracle: &'a dyn NormalizationOracle,
        store: &'a CheckpointStore,
        console: &'a mut dyn Console,
        config: SessionConfig,
    ) -> Self {
        Self {
            oracle,
            store,
            console,
            config,
        }
    }

    /// Run the session over the corpus.
    ///
    /// Resume rule: a store that already holds records is authoritative. The
    /// session reports the find and finishes immediately — zero oracle calls,
    /// zero prompts — so re-running on a populated store is a pure reporting
    /// operation, never a re-labeling one.
    pub async fn run(
        mut self,
        corpus: &[CorpusItem],
    ) -> Result<(Vec<ValidationRecord>, SessionOutcome), SessionError> {
        let kind = self.oracle.kind();

        if let Some(existing) = self.store.load_if_present()? {
            self.console.report(&format!(
                "\n{}\nEXISTING GOLD SET FOUND\n{}\n",
                banner(),
                banner()
            ));
            self.console.report(&format!(
                "Found {} entries in {}\nProceeding directly to statistics and analysis...",
                existing.len(),
                self.store.path().display()
            ));
            return Ok((existing, SessionOutcome::Finished));
        }

        self.console
            .report("NO EXISTING GOLD SET FOUND\nProceeding with human validation...\n");
        self.console.report(&format!(
            "{}\n{} NORMALIZATION & VALIDATION\n{}",
            banner(),
            kind.noun().to_uppercase(),
            banner()
        ));
        self.console.report(&format!(
            "Total {}s: {}\nModel: {}",
            kind.noun(),
            corpus.len(),
            self.config.model_label
        ));

        let proceed = self.console.confirm(&format!(
            "\nProceed with {} normalization and validation? (y/n): ",
            self.config.model_label
        ))?;
        if !proceed {
            self.console.report("Cancelled.");
            return Ok((Vec::new(), SessionOutcome::Declined));
        }

        self.console.report(&instructions(kind));

        let mut records: Vec<ValidationRecord> = Vec::new();

        for (idx, item) in corpus.iter().enumerate() {
            self.console.report(&format!(
                "\n[{}/{}] {}\nRFC: {}\nProcessing: {}",
                idx + 1,
                corpus.len(),
                "=".repeat(50),
                item.record_id,
                item.raw_text
            ));
            self.console.report("Getting LLM normalization...");

            // AwaitingOracle
            let machine = match self.oracle.normalize(&item.raw_text, 0.0).await {
                OracleOutcome::Value(value) => value,
                OracleOutcome::Error => {
                    self.console
                        .report("ERROR: Failed to get LLM normalization. Skipping this entry.");
                    match self
                        .console
                        .prompt("Press ENTER to continue or 'quit' to abort: ")?
                    {
                        PromptReply::Quit => {
                            return Ok((
                                records.clone(),
                                SessionOutcome::Aborted {
                                    completed: records.len(),
                                },
                            ));
                        }
                        PromptReply::Text(_) => continue,
                    }
                }
            };

            // AwaitingHuman
            self.present(item, &machine);
            let human = match self.solicit_verdict(kind, &machine)? {
                Verdict::Value(value) => value,
                Verdict::Quit => {
                    self.console.report(&format!(
                        "\nSaving progress... Validated {} out of {}.",
                        records.len(),
                        corpus.len()
                    ));
                    return Ok((records, SessionOutcome::Finished));
                }
            };

            // Recorded: full rewrite before the next item, so an interruption
            // loses at most the in-flight item.
            let record =
                ValidationRecord::new(&item.record_id, &item.raw_text, machine, human);
            self.console.report(match record.label {
                Label::Accepted => "LLM correct (label = r)",
                Label::Rejected => "LLM incorrect (label = w)",
            });
            records.push(record);
            self.store.write_all(&records)?;

            if idx + 1 < corpus.len() && !self.config.inter_item_delay.is_zero() {
                sleep(self.config.inter_item_delay).await;
            }
        }

        Ok((records, SessionOutcome::Finished))
    }

    fn present(&mut self, item: &CorpusItem, machine: &NormalizedValue) {
        match machine {
            NormalizedValue::Affiliation { name } => {
                self.console.report(&format!(
                    "\nOriginal:       {}\nLLM Normalized: {}\n{}",
                    item.raw_text,
                    name,
                    "-".repeat(60)
                ));
            }
            NormalizedValue::Address { country, continent } => {
                self.console.report(&format!(
                    "\nOriginal:        {}\nLLM Country:     {}\nLLM Continent:   {}\n{}",
                    item.raw_text,
                    country,
                    continent,
                    "-".repeat(60)
                ));
            }
        }
    }

    /// Block for the human verdict. An empty reply accepts the machine value;
    /// a malformed address correction re-prompts the same item.
    fn solicit_verdict(
        &mut self,
        kind: NormalizationKind,
        machine: &NormalizedValue,
    ) -> Result<Verdict, SessionError> {
        let message = match kind {
            NormalizationKind::Affiliation => {
                "Correct normalization (ENTER if LLM correct, or type correction): "
            }
            NormalizationKind::Address => {
                "Correct normalization (ENTER if correct, or type 'country, continent'): "
            }
        };

        loop {
            match self.console.prompt(message)? {
                PromptReply::Quit => return Ok(Verdict::Quit),
                PromptReply::Text(text) if text.is_empty() => {
                    return Ok(Verdict::Value(machine.clone()));
                }
                PromptReply::Text(text) => match parse_correction(kind, &text) {
                    Some(value) => return Ok(Verdict::Value(value)),
                    None => {
                        self.console.report(
                            "ERROR: Please enter 'country, continent' separated by a comma",
                        );
                    }
                },
            }
        }
    }
}

enum Verdict {
    Value(NormalizedValue),
    Quit,
}

/// Parse a non-empty human correction for the active variant.
fn parse_correction(kind: NormalizationKind, text: &str) -> Option<NormalizedValue> {
    match kind {
        NormalizationKind::Affiliation => Some(NormalizedValue::affiliation(text)),
        NormalizationKind::Address => {
            let parts: Vec<&str> = text.split(',').map(|p| p.trim()).collect();
            if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
                return None;
            }
            Some(NormalizedValue::address(parts[0], parts[1]))
        }
    }
}

fn banner() -> String {
    "=".repeat(70)
}

fn instructions(kind: NormalizationKind) -> String {
    match kind {
        NormalizationKind::Affiliation => format!(
            "\n{b}\nVALIDATION INSTRUCTIONS:\n  \
             - Review LLM's normalization\n  \
             - Press ENTER if LLM is correct (label = r)\n  \
             - Type correct normalization if LLM is wrong (label = w)\n  \
             - Type 'quit' to save and exit\n{b}\n",
            b = banner()
        ),
        NormalizationKind::Address => format!(
            "\n{b}\nVALIDATION INSTRUCTIONS:\n  \
             - Review LLM's country and continent extraction\n  \
             - Press ENTER if LLM is completely correct (label = r)\n  \
             - Enter correct country and continent (comma-separated) otherwise\n  \
             - Label = r ONLY if BOTH country AND continent are correct\n  \
             - Type 'quit' to save and exit\n{b}\n",
            b = banner()
        ),
    }
}

// =============================================================================
// TESTS
// =============================================================================

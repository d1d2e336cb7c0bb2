//! Encoded suspension reason → human-readable labels.

use crate::error::{Result, SsrError};
use crate::symbols::{SymbolTable, SEPARATOR, UNKNOWN_LABEL};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// UnknownPolicy
// ---------------------------------------------------------------------------

/// What to do with a character that has no entry in the symbol table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPolicy {
    /// Emit [`UNKNOWN_LABEL`] in its place and keep going.
    #[default]
    Substitute,
    /// Fail the decode with [`SsrError::MalformedInput`].
    Reject,
}

impl UnknownPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            UnknownPolicy::Substitute => "substitute",
            UnknownPolicy::Reject => "reject",
        }
    }
}

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Decoded
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decoded {
    /// Labels joined with [`SEPARATOR`], one per input character.
    pub text: String,
    /// Characters that were missing from the table, in first-seen order.
    /// Only ever non-empty under [`UnknownPolicy::Substitute`].
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmapped: Vec<char>,
}

impl Decoded {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.text.split(SEPARATOR)
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Decoder {
    symbols: SymbolTable,
    policy: UnknownPolicy,
    case_insensitive: bool,
}

impl Decoder {
    /// Substituting, case-insensitive decoder over `symbols`.
    pub fn new(symbols: SymbolTable) -> Self {
        Self {
            symbols,
            policy: UnknownPolicy::default(),
            case_insensitive: true,
        }
    }

    pub fn with_policy(mut self, policy: UnknownPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upper-case each character before lookup. On by default; feeds are
    /// not consistent about the casing of the code letters.
    pub fn with_case_insensitive(mut self, yes: bool) -> Self {
        self.case_insensitive = yes;
        self
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn policy(&self) -> UnknownPolicy {
        self.policy
    }

    /// Decode one encoded string.
    ///
    /// Absent and empty input is "no data" and yields `Ok(None)`.
    pub fn decode(&self, text: Option<&str>) -> Result<Option<Decoded>> {
        let Some(text) = text.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let mut labels = Vec::with_capacity(text.len());
        let mut unmapped = Vec::new();
        for raw in text.chars() {
            let symbol = if self.case_insensitive {
                raw.to_ascii_uppercase()
            } else {
                raw
            };
            match self.symbols.label(symbol) {
                Some(label) => labels.push(label),
                None => {
                    if !unmapped.contains(&raw) {
                        unmapped.push(raw);
                    }
                    labels.push(UNKNOWN_LABEL);
                }
            }
        }

        if !unmapped.is_empty() && self.policy == UnknownPolicy::Reject {
            return Err(SsrError::MalformedInput {
                encoded: text.to_string(),
                symbols: unmapped,
            });
        }

        Ok(Some(Decoded {
            text: labels.join(SEPARATOR),
            unmapped,
        }))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(SymbolTable::builtin())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! The suspension reason symbol table.
//!
//! Every character of an encoded suspension reason string flags one reason.
//! The table here is the catalogue used by upstream feeds for the SSR
//! (selection) and LSR (line) fields.

use std::collections::BTreeMap;

/// Joins decoded labels, first character's reason first.
pub const SEPARATOR: &str = ";";

/// Label emitted for characters missing from the table when substituting.
pub const UNKNOWN_LABEL: &str = "Unknown";

const BUILTIN: &[(char, &str)] = &[
    ('-', "Unknown"),
    ('A', "StalePricing"),
    ('B', "Settled"),
    ('C', "OutsideLineRange"),
    ('D', "BelowMinimumPrice"),
    ('E', "NoSelection"),
    ('F', "MatchVoided"),
    ('H', "NoMainLine"),
    ('I', "NoUnsettledLines"),
    ('J', "NoUnsuspendedLines"),
    ('K', "SettlementCorrection"),
];

// ---------------------------------------------------------------------------
// SymbolTable
// ---------------------------------------------------------------------------

/// Immutable character → reason label mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTable {
    entries: BTreeMap<char, String>,
}

impl SymbolTable {
    /// The catalogue shipped with the binary.
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN.iter().copied())
    }

    pub fn from_entries<I, L>(entries: I) -> Self
    where
        I: IntoIterator<Item = (char, L)>,
        L: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(symbol, label)| (symbol, label.into()))
                .collect(),
        }
    }

    pub fn label(&self, symbol: char) -> Option<&str> {
        self.entries.get(&symbol).map(String::as_str)
    }

    pub fn contains(&self, symbol: char) -> bool {
        self.entries.contains_key(&symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, &str)> {
        self.entries.iter().map(|(c, l)| (*c, l.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Bank code translation
//!
//! Maps the internal bank codes used by merchants (`IDR_014`) to the bank
//! identifiers the disbursement provider expects, and back. The table is
//! immutable once built; it is loaded at start-up and shared via `Arc`.
//!
//! The module also scores how closely the account holder name returned by the
//! provider's account inquiry matches the name the merchant typed in.

use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;

use crate::types::LedgerError;

/// Default minimum similarity below which a name mismatch is flagged
pub const DEFAULT_NAME_MATCH_THRESHOLD: f64 = 0.3;

/// Provider-side bank identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderBank {
    pub provider_id: u32,
    pub name: String,
}

/// One row of a bank code table file
#[derive(Debug, Clone, Deserialize)]
pub struct BankCodeEntry {
    pub internal_code: String,
    pub provider_id: u32,
    pub provider_bank_name: String,
}

#[derive(Debug, Error)]
pub enum BankTableError {
    #[error("Invalid bank code table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate internal bank code '{0}'")]
    DuplicateCode(String),

    #[error("Duplicate provider bank id {0}")]
    DuplicateProviderId(u32),
}

/// Result of comparing an expected account holder name with the inquired one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NameCheck {
    /// Similarity in [0, 1]; 1 means identical after normalisation
    pub similarity: f64,
    /// True when the similarity is below the configured threshold
    pub flagged: bool,
}

/// Bidirectional, exact-match bank code table
#[derive(Debug, Clone)]
pub struct BankCodeTranslator {
    by_code: HashMap<String, ProviderBank>,
    by_provider_id: HashMap<u32, String>,
    name_match_threshold: f64,
}

impl BankCodeTranslator {
    /// Build a translator from table rows
    ///
    /// Both the internal code and the provider id must be unique, otherwise
    /// the reverse lookup would be ambiguous.
    pub fn from_entries(entries: Vec<BankCodeEntry>) -> Result<Self, BankTableError> {
        let mut by_code = HashMap::with_capacity(entries.len());
        let mut by_provider_id = HashMap::with_capacity(entries.len());

        for entry in entries {
            if by_provider_id.contains_key(&entry.provider_id) {
                return Err(BankTableError::DuplicateProviderId(entry.provider_id));
            }
            if by_code.contains_key(&entry.internal_code) {
                return Err(BankTableError::DuplicateCode(entry.internal_code));
            }
            by_provider_id.insert(entry.provider_id, entry.internal_code.clone());
            by_code.insert(
                entry.internal_code,
                ProviderBank {
                    provider_id: entry.provider_id,
                    name: entry.provider_bank_name,
                },
            );
        }

        Ok(Self {
            by_code,
            by_provider_id,
            name_match_threshold: DEFAULT_NAME_MATCH_THRESHOLD,
        })
    }

    /// Load a JSON array of [`BankCodeEntry`] rows
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, BankTableError> {
        let entries: Vec<BankCodeEntry> = serde_json::from_reader(reader)?;
        Self::from_entries(entries)
    }

    /// The built-in table of supported Indonesian banks
    pub fn default_table() -> Self {
        const TABLE: &[(&str, u32, &str)] = &[
            ("IDR_002", 1, "bri"),
            ("IDR_008", 2, "mandiri"),
            ("IDR_014", 3, "bca"),
            ("IDR_009", 4, "bni"),
            ("IDR_011", 5, "danamon"),
            ("IDR_013", 6, "permata"),
            ("IDR_022", 7, "cimb"),
            ("IDR_016", 8, "maybank"),
            ("IDR_028", 9, "ocbc"),
            ("IDR_200", 10, "btn"),
            ("IDR_451", 11, "bsi"),
            ("IDR_426", 12, "mega"),
            ("IDR_147", 13, "muamalat"),
            ("IDR_490", 14, "neo"),
            ("IDR_542", 15, "jago"),
        ];

        let mut by_code = HashMap::with_capacity(TABLE.len());
        let mut by_provider_id = HashMap::with_capacity(TABLE.len());
        for (code, provider_id, name) in TABLE {
            by_code.insert(
                code.to_string(),
                ProviderBank {
                    provider_id: *provider_id,
                    name: name.to_string(),
                },
            );
            by_provider_id.insert(*provider_id, code.to_string());
        }

        Self {
            by_code,
            by_provider_id,
            name_match_threshold: DEFAULT_NAME_MATCH_THRESHOLD,
        }
    }

    pub fn with_name_match_threshold(mut self, threshold: f64) -> Self {
        self.name_match_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn name_match_threshold(&self) -> f64 {
        self.name_match_threshold
    }

    /// Translate an internal bank code into the provider's bank identity
    pub fn translate(&self, internal_code: &str) -> Result<&ProviderBank, LedgerError> {
        self.by_code
            .get(internal_code)
            .ok_or_else(|| LedgerError::unknown_bank_code(internal_code))
    }

    /// Reverse lookup from provider bank id to internal code
    pub fn internal_code_for(&self, provider_id: u32) -> Option<&str> {
        self.by_provider_id.get(&provider_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Similarity of two account holder names in [0, 1]
    ///
    /// Names are case-folded, stripped of punctuation and whitespace-collapsed
    /// before a normalised Levenshtein distance is taken.
    pub fn match_account_name(&self, expected: &str, returned: &str) -> f64 {
        let a = normalize_name(expected);
        let b = normalize_name(returned);

        let longest = a.len().max(b.len());
        if longest == 0 {
            return 1.0;
        }
        1.0 - levenshtein(&a, &b) as f64 / longest as f64
    }

    /// Score a name pair and flag it against the configured threshold
    pub fn check_account_name(&self, expected: &str, returned: &str) -> NameCheck {
        let similarity = self.match_account_name(expected, returned);
        NameCheck {
            similarity,
            flagged: similarity < self.name_match_threshold,
        }
    }
}

fn normalize_name(name: &str) -> Vec<char> {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .collect()
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PartitionError;

/// Customer row as stored in the `customers` table
///
/// Only ever built by the store's row decoder; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

impl fmt::Display for Customer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Customer[id={}, firstName='{}', lastName='{}']",
            self.id, self.first_name, self.last_name
        )
    }
}

/// First/last name pair waiting to be inserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameFragment {
    pub first_name: String,
    pub last_name: String,
}

impl NameFragment {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// Split a raw "First Last" string on whitespace
///
/// The first token is the first name; every remaining token, joined by a
/// single space, is the last name ("Guido van Rossum" -> "Guido", "van Rossum").
pub fn split_name(raw: &str) -> Result<NameFragment, PartitionError> {
    let mut tokens = raw.split_whitespace();
    let first = tokens.next();
    let rest: Vec<&str> = tokens.collect();

    match first {
        Some(first) if !rest.is_empty() => Ok(NameFragment::new(first, rest.join(" "))),
        _ => Err(PartitionError::MalformedName(raw.to_string())),
    }
}

/// Split every raw name, failing on the first malformed entry
pub fn split_names<S: AsRef<str>>(raws: &[S]) -> Result<Vec<NameFragment>, PartitionError> {
    raws.iter().map(|raw| split_name(raw.as_ref())).collect()
}

/// Contiguous slice of the input dataset assigned to one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubBatch {
    /// Position of this sub-batch in the partitioned sequence
    pub index: usize,
    pub rows: Vec<NameFragment>,
}

/// Affected-row counts, one inner vector per transport chunk
pub type UpdateCounts = Vec<Vec<u64>>;

/// Aggregated outcome of a join phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl JoinSummary {
    pub fn record(&mut self, success: bool) {
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name_two_tokens() {
        let fragment = split_name("Josh Bloch").unwrap();
        assert_eq!(fragment, NameFragment::new("Josh", "Bloch"));
    }

    #[test]
    fn test_split_name_collapses_whitespace_and_keeps_compound_last_name() {
        let fragment = split_name("  Guido   van  Rossum ").unwrap();
        assert_eq!(fragment.first_name, "Guido");
        assert_eq!(fragment.last_name, "van Rossum");
    }

    #[test]
    fn test_split_name_rejects_single_token() {
        assert!(matches!(
            split_name("Cher"),
            Err(PartitionError::MalformedName(name)) if name == "Cher"
        ));
        assert!(split_name("   ").is_err());
    }

    #[test]
    fn test_customer_display() {
        let customer = Customer {
            id: 1003,
            first_name: "Josh".into(),
            last_name: "Bloch".into(),
        };
        assert_eq!(
            customer.to_string(),
            "Customer[id=1003, firstName='Josh', lastName='Bloch']"
        );
    }
}

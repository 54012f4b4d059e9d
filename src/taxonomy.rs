//! The four-level account classification taxonomy.
//!
//! The hierarchy is `account type → primary → secondary → [tertiary]`,
//! loaded from JSON of the shape
//! `{"Asset": {"Cash and Cash Equivalents": {"Bank Balances": ["Bank Balances"]}}}`.
//!
//! A default taxonomy covering the common trial-balance chart of accounts is
//! bundled with the crate; callers with their own chart pass a JSON file via
//! [`Taxonomy::from_json`] or the CLI's `--taxonomy` flag.
//!
//! `BTreeMap` rather than `HashMap` keeps the serialised prompt stable
//! across runs, which matters for caching and for diffing two runs.

use crate::error::TbClassifyError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tertiary labels grouped under a secondary classification.
pub type SecondaryMap = BTreeMap<String, Vec<String>>;
/// Secondary groups under a primary classification.
pub type PrimaryMap = BTreeMap<String, SecondaryMap>;

/// The full classification hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Taxonomy {
    tree: BTreeMap<String, PrimaryMap>,
}

/// Default taxonomy bundled with the crate.
const DEFAULT_TAXONOMY_JSON: &str = include_str!("../assets/classifications.json");

impl Default for Taxonomy {
    fn default() -> Self {
        // The bundled asset is validated by unit test; a parse failure here
        // is a packaging bug, not a runtime condition.
        serde_json::from_str(DEFAULT_TAXONOMY_JSON)
            .unwrap_or_else(|_| Taxonomy {
                tree: BTreeMap::new(),
            })
    }
}

impl Taxonomy {
    /// Parse a taxonomy from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, TbClassifyError> {
        serde_json::from_str(json).map_err(|e| TbClassifyError::InvalidTaxonomy {
            detail: e.to_string(),
        })
    }

    /// Serialise back to pretty JSON (embedded verbatim into the system prompt).
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.tree).unwrap_or_else(|_| "{}".to_string())
    }

    /// True when the taxonomy has no account types at all.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// All account-type labels.
    pub fn account_types(&self) -> impl Iterator<Item = &str> {
        self.tree.keys().map(String::as_str)
    }

    /// Primary labels under an account type, if it exists.
    pub fn primaries(&self, account_type: &str) -> Option<impl Iterator<Item = &str>> {
        self.tree
            .get(account_type)
            .map(|m| m.keys().map(String::as_str))
    }

    /// Secondary labels under `account_type → primary`.
    pub fn secondaries(&self, account_type: &str, primary: &str) -> Option<impl Iterator<Item = &str>> {
        self.tree
            .get(account_type)
            .and_then(|m| m.get(primary))
            .map(|m| m.keys().map(String::as_str))
    }

    /// Tertiary labels under `account_type → primary → secondary`.
    pub fn tertiaries(&self, account_type: &str, primary: &str, secondary: &str) -> Option<&[String]> {
        self.tree
            .get(account_type)
            .and_then(|m| m.get(primary))
            .and_then(|m| m.get(secondary))
            .map(Vec::as_slice)
    }

    /// Check whether a full four-level path exists in the hierarchy.
    ///
    /// An empty tertiary is accepted when the secondary exists: some charts
    /// stop at three levels for catch-all accounts.
    pub fn contains(&self, account_type: &str, primary: &str, secondary: &str, tertiary: &str) -> bool {
        match self.tertiaries(account_type, primary, secondary) {
            Some(terts) => tertiary.is_empty() || terts.iter().any(|t| t == tertiary),
            None => false,
        }
    }

    /// Case-insensitive label lookup at a given level.
    ///
    /// Returns the canonical spelling so response parsing can normalise
    /// whatever casing the model produced.
    pub fn canonical_account_type(&self, label: &str) -> Option<&str> {
        lookup(self.tree.keys(), label)
    }

    /// Canonical primary under `account_type` matching `label`.
    pub fn canonical_primary(&self, account_type: &str, label: &str) -> Option<&str> {
        self.tree
            .get(account_type)
            .and_then(|m| lookup(m.keys(), label))
    }

    /// Canonical secondary under `account_type → primary` matching `label`.
    pub fn canonical_secondary(&self, account_type: &str, primary: &str, label: &str) -> Option<&str> {
        self.tree
            .get(account_type)
            .and_then(|m| m.get(primary))
            .and_then(|m| lookup(m.keys(), label))
    }

    /// Canonical tertiary under the full path matching `label`.
    pub fn canonical_tertiary(
        &self,
        account_type: &str,
        primary: &str,
        secondary: &str,
        label: &str,
    ) -> Option<&str> {
        self.tertiaries(account_type, primary, secondary)
            .and_then(|terts| lookup(terts.iter(), label))
    }
}

fn lookup<'a, I, S>(candidates: I, label: &str) -> Option<&'a str>
where
    I: Iterator<Item = &'a S>,
    S: AsRef<str> + 'a + ?Sized,
{
    let wanted = label.trim();
    for c in candidates {
        if c.as_ref().eq_ignore_ascii_case(wanted) {
            return Some(c.as_ref());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_taxonomy_parses() {
        let t = Taxonomy::default();
        assert!(!t.is_empty(), "bundled taxonomy must not be empty");
        assert!(t.account_types().any(|a| a == "Asset"));
        assert!(t.account_types().any(|a| a == "Revenue/Income"));
    }

    #[test]
    fn contains_full_path() {
        let t = Taxonomy::default();
        assert!(t.contains(
            "Asset",
            "Cash and Cash Equivalents",
            "Bank Balances",
            "Bank Balances"
        ));
        assert!(!t.contains("Asset", "Cash and Cash Equivalents", "Bank Balances", "Gold Bars"));
        assert!(!t.contains("Nonsense", "Cash", "Bank", ""));
    }

    #[test]
    fn empty_tertiary_accepted_when_secondary_exists() {
        let t = Taxonomy::default();
        assert!(t.contains("Asset", "Cash and Cash Equivalents", "Bank Balances", ""));
    }

    #[test]
    fn comma_bearing_labels_survive() {
        // "Property, plant and equipment" is the reason response parsing
        // cannot naively split on commas.
        let t = Taxonomy::default();
        assert!(t
            .primaries("Asset")
            .unwrap()
            .any(|p| p == "Property, plant and equipment"));
        assert!(t.contains(
            "Cost/Expense",
            "Administration and Other Expenses",
            "Professional Service Charges",
            "Accounting, Audit, Tax and Secretarial Expenses"
        ));
    }

    #[test]
    fn canonical_lookup_is_case_insensitive() {
        let t = Taxonomy::default();
        assert_eq!(t.canonical_account_type("asset"), Some("Asset"));
        assert_eq!(
            t.canonical_primary("Asset", "cash and cash equivalents"),
            Some("Cash and Cash Equivalents")
        );
        assert_eq!(t.canonical_account_type("not-a-type"), None);
    }

    #[test]
    fn from_json_rejects_wrong_shape() {
        let err = Taxonomy::from_json(r#"["a", "b"]"#);
        assert!(err.is_err());
        let err = Taxonomy::from_json("not json");
        assert!(err.is_err());
    }
}

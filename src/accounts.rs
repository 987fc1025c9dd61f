//! Member roster ingestion.
//!
//! The roster is a CSV of `account_id,contact_address` rows. Bad rows are
//! reported and skipped so one typo does not block the rest of the roster.
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// One member account from the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub account_id: String,
    pub contact_address: String,
}

/// Ordered, de-duplicated roster of member accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    records: Vec<AccountRecord>,
}

impl Roster {
    /// Build a roster; a repeated account id keeps its first position and the
    /// last contact address.
    pub fn from_records(records: impl IntoIterator<Item = AccountRecord>) -> Self {
        let mut ordered: Vec<AccountRecord> = Vec::new();
        let mut index: BTreeMap<String, usize> = BTreeMap::new();
        for record in records {
            match index.get(&record.account_id) {
                Some(&position) => ordered[position].contact_address = record.contact_address,
                None => {
                    index.insert(record.account_id.clone(), ordered.len());
                    ordered.push(record);
                }
            }
        }
        Self { records: ordered }
    }

    pub fn records(&self) -> &[AccountRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn account_id_regex() -> &'static regex::Regex {
    static ACCOUNT_ID: OnceLock<regex::Regex> = OnceLock::new();
    ACCOUNT_ID.get_or_init(|| regex::Regex::new(r"^[0-9]{12}$").expect("regex for account id"))
}

/// True when `value` is a 12-digit account id.
pub fn is_account_id(value: &str) -> bool {
    account_id_regex().is_match(value)
}

/// Parse roster text, logging and skipping malformed rows.
pub fn parse_roster(text: &str) -> Roster {
    let mut records = Vec::new();
    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let [account_id, contact_address] = fields.as_slice() else {
            tracing::error!(line_number, line, "unable to process roster line");
            continue;
        };
        let account_id = account_id.trim();
        if !is_account_id(account_id) {
            tracing::error!(
                line_number,
                account_id,
                "invalid account number, skipping; expected exactly 12 digits"
            );
            continue;
        }
        records.push(AccountRecord {
            account_id: account_id.to_string(),
            contact_address: contact_address.trim().to_string(),
        });
    }
    Roster::from_records(records)
}

/// Read and parse the roster file at `path`.
pub fn read_roster(path: &Path) -> Result<Roster> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read account roster {}", path.display()))?;
    let roster = parse_roster(&text);
    tracing::info!(
        path = %path.display(),
        accounts = roster.len(),
        "loaded account roster"
    );
    Ok(roster)
}

#[cfg(test)]
#[path = "accounts_tests.rs"]
mod tests;

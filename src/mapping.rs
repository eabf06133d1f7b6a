use crate::period::Period;
use crate::schema::{AccountMapping, LedgerEntry, UNMAPPED_POOL};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A ledger entry joined to its pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedLedgerEntry {
    pub period: Period,
    pub account: String,
    pub amount: f64,
    pub entity: Option<String>,
    pub pool: String,
    pub base_category: Option<String>,
    pub is_unallowable: bool,
}

impl MappedLedgerEntry {
    pub fn is_unmapped(&self) -> bool {
        self.pool == UNMAPPED_POOL
    }
}

/// Joins ledger entries to the account map.
///
/// Entries without a mapping land in the `Unmapped` pool flagged unallowable, so they
/// never reach a pool total. When an account is mapped twice the first mapping wins.
pub fn map_accounts_to_pools(
    ledger: &[LedgerEntry],
    account_map: &[AccountMapping],
) -> (Vec<MappedLedgerEntry>, Vec<String>) {
    let mut warnings = Vec::new();
    let mut lookup: HashMap<&str, &AccountMapping> = HashMap::with_capacity(account_map.len());
    let mut duplicates = BTreeSet::new();

    for mapping in account_map {
        let account = mapping.account.trim();
        if lookup.contains_key(account) {
            duplicates.insert(account.to_string());
        } else {
            lookup.insert(account, mapping);
        }
    }

    if !duplicates.is_empty() {
        warnings.push(format!(
            "Account_Map lists {} account(s) more than once ({}); the first mapping is used.",
            duplicates.len(),
            duplicates.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }

    let mut missing = 0usize;
    let mapped = ledger
        .iter()
        .map(|entry| match lookup.get(entry.account.trim()) {
            Some(mapping) => MappedLedgerEntry {
                period: entry.period,
                account: entry.account.clone(),
                amount: entry.amount,
                entity: entry.entity.clone(),
                pool: mapping.pool.clone(),
                base_category: mapping.base_category.clone(),
                is_unallowable: mapping.is_unallowable,
            },
            None => {
                missing += 1;
                MappedLedgerEntry {
                    period: entry.period,
                    account: entry.account.clone(),
                    amount: entry.amount,
                    entity: entry.entity.clone(),
                    pool: UNMAPPED_POOL.to_string(),
                    base_category: None,
                    is_unallowable: true,
                }
            }
        })
        .collect();

    if missing > 0 {
        warnings.push(format!(
            "{} GL rows have no Account_Map match; treated as Unmapped (excluded from pools).",
            missing
        ));
    }

    for warning in &warnings {
        warn!("{}", warning);
    }

    (mapped, warnings)
}

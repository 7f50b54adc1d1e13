//! Declarative currency table.
//!
//! Replaces stacked string heuristics for coin matching with a table of
//! denominations built from the item catalogue. Each currency item carries
//! a value in the smallest denomination; synonyms are derived from the item
//! names, so prose echoes always use real catalogue names.

use serde::{Deserialize, Serialize};

use crate::{ItemDefinition, ItemKind};

/// One currency denomination known to the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Denomination {
    pub item_name: String,
    /// Worth in units of the smallest denomination.
    pub value: i64,
    /// The denomination's distinguishing token ("crown", "shard").
    pub token: String,
}

/// Result of resolving a user-typed currency word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrencyMatch {
    /// A single denomination was named outright.
    Specific(String),
    /// A family word ("glimmer") was used; resolution needs holdings.
    Family,
    /// The word is not currency at all.
    None,
}

#[derive(Debug, Clone, Default)]
pub struct CurrencyTable {
    /// Sorted by descending value.
    denominations: Vec<Denomination>,
    /// Words that refer to the currency family as a whole.
    family_synonyms: Vec<String>,
}

impl CurrencyTable {
    /// Build from the item catalogue. Currency items without a value are
    /// skipped. Family synonyms are the shared leading token of the
    /// denomination names plus its common abbreviations.
    pub fn from_items(items: &[ItemDefinition]) -> CurrencyTable {
        let mut denominations: Vec<Denomination> = items
            .iter()
            .filter(|i| i.kind == ItemKind::Currency)
            .filter_map(|i| {
                let value = i.currency_value?;
                let token = i
                    .name
                    .split_whitespace()
                    .last()
                    .unwrap_or(&i.name)
                    .to_lowercase();
                Some(Denomination {
                    item_name: i.name.clone(),
                    value,
                    token,
                })
            })
            .collect();
        denominations.sort_by(|a, b| b.value.cmp(&a.value));

        let mut family_synonyms = Vec::new();
        if let Some(first) = denominations.first() {
            if let Some(family) = first.item_name.split_whitespace().next() {
                let family = family.to_lowercase();
                let shared = denominations.iter().all(|d| {
                    d.item_name
                        .to_lowercase()
                        .starts_with(&family)
                });
                if shared {
                    if family.len() > 4 {
                        family_synonyms.push(family[..4].to_string());
                    }
                    if let Some(initial) = family.chars().next() {
                        family_synonyms.push(initial.to_string());
                    }
                    family_synonyms.push(family);
                }
            }
        }

        CurrencyTable {
            denominations,
            family_synonyms,
        }
    }

    pub fn denominations(&self) -> &[Denomination] {
        &self.denominations
    }

    pub fn by_name(&self, item_name: &str) -> Option<&Denomination> {
        self.denominations
            .iter()
            .find(|d| d.item_name.eq_ignore_ascii_case(item_name))
    }

    /// The smallest denomination, used for wealth totals.
    pub fn smallest(&self) -> Option<&Denomination> {
        self.denominations.last()
    }

    /// Classify a user-typed currency word.
    pub fn classify(&self, word: &str) -> CurrencyMatch {
        let word = singular(&word.trim().to_lowercase());
        if word.is_empty() {
            return CurrencyMatch::None;
        }
        // Distinguishing token names exactly one denomination.
        if let Some(d) = self.denominations.iter().find(|d| d.token == word) {
            return CurrencyMatch::Specific(d.item_name.clone());
        }
        // Full item name.
        if let Some(d) = self
            .denominations
            .iter()
            .find(|d| singular(&d.item_name.to_lowercase()) == word)
        {
            return CurrencyMatch::Specific(d.item_name.clone());
        }
        if self.family_synonyms.iter().any(|s| *s == word) {
            return CurrencyMatch::Family;
        }
        CurrencyMatch::None
    }

    /// Resolve a currency word against actual holdings. Family words pick
    /// the highest-value denomination the holder has; on a value tie the
    /// "crown" token wins over "shard".
    pub fn resolve<F>(&self, word: &str, held_quantity: F) -> Option<&Denomination>
    where
        F: Fn(&str) -> u32,
    {
        match self.classify(word) {
            CurrencyMatch::Specific(name) => self.by_name(&name),
            CurrencyMatch::Family => self
                .denominations
                .iter()
                .filter(|d| held_quantity(&d.item_name) > 0)
                .max_by_key(|d| (d.value, d.token == "crown")),
            CurrencyMatch::None => None,
        }
    }

    /// Total worth of a set of holdings in the smallest denomination.
    pub fn total_value(&self, holdings: &[(String, u32)]) -> i64 {
        holdings
            .iter()
            .filter_map(|(name, qty)| {
                self.by_name(name)
                    .map(|d| d.value * i64::from(*qty))
            })
            .sum()
    }
}

fn singular(word: &str) -> String {
    word.strip_suffix('s').unwrap_or(word).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemId;

    fn catalogue() -> Vec<ItemDefinition> {
        vec![
            ItemDefinition {
                id: ItemId::new(),
                name: "Glimmer Crown".to_string(),
                kind: ItemKind::Currency,
                encumbrance: 0.01,
                poofable: false,
                warehouse_key: None,
                currency_value: Some(100),
            },
            ItemDefinition {
                id: ItemId::new(),
                name: "Glimmer Shard".to_string(),
                kind: ItemKind::Currency,
                encumbrance: 0.01,
                poofable: false,
                warehouse_key: None,
                currency_value: Some(1),
            },
            ItemDefinition {
                id: ItemId::new(),
                name: "Iron Key".to_string(),
                kind: ItemKind::Sundries,
                encumbrance: 0.5,
                poofable: false,
                warehouse_key: None,
                currency_value: None,
            },
        ]
    }

    #[test]
    fn table_only_contains_valued_currency() {
        let table = CurrencyTable::from_items(&catalogue());
        assert_eq!(table.denominations().len(), 2);
        assert_eq!(table.denominations()[0].item_name, "Glimmer Crown");
        assert_eq!(table.smallest().map(|d| d.value), Some(1));
    }

    #[test]
    fn singular_and_plural_tokens_name_denominations() {
        let table = CurrencyTable::from_items(&catalogue());
        assert_eq!(
            table.classify("crowns"),
            CurrencyMatch::Specific("Glimmer Crown".to_string())
        );
        assert_eq!(
            table.classify("shard"),
            CurrencyMatch::Specific("Glimmer Shard".to_string())
        );
        assert_eq!(
            table.classify("glimmer crowns"),
            CurrencyMatch::Specific("Glimmer Crown".to_string())
        );
    }

    #[test]
    fn family_synonyms_cover_abbreviations() {
        let table = CurrencyTable::from_items(&catalogue());
        assert_eq!(table.classify("glimmer"), CurrencyMatch::Family);
        assert_eq!(table.classify("glim"), CurrencyMatch::Family);
        assert_eq!(table.classify("g"), CurrencyMatch::Family);
        assert_eq!(table.classify("gold"), CurrencyMatch::None);
    }

    #[test]
    fn family_resolution_prefers_highest_held_value() {
        let table = CurrencyTable::from_items(&catalogue());

        // Holds both: crowns win.
        let both = |name: &str| match name {
            "Glimmer Crown" => 3,
            "Glimmer Shard" => 40,
            _ => 0,
        };
        assert_eq!(
            table.resolve("glimmer", both).map(|d| d.item_name.as_str()),
            Some("Glimmer Crown")
        );

        // Holds only shards: shards resolve.
        let shards_only = |name: &str| u32::from(name == "Glimmer Shard");
        assert_eq!(
            table
                .resolve("glim", shards_only)
                .map(|d| d.item_name.as_str()),
            Some("Glimmer Shard")
        );

        // Holds nothing: no match.
        assert!(table.resolve("g", |_| 0).is_none());
    }

    #[test]
    fn total_value_converts_to_smallest_denomination() {
        let table = CurrencyTable::from_items(&catalogue());
        let holdings = vec![
            ("Glimmer Crown".to_string(), 3),
            ("Glimmer Shard".to_string(), 40),
        ];
        assert_eq!(table.total_value(&holdings), 340);
    }
}

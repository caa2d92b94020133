//! In-memory lookup over headwords and forms
//!
//! The index answers free-text queries in three stages: exact key matches,
//! then keys sharing a short prefix, then a substring scan over all keys.
//! Results are record positions into the slice the index was built from.

use crate::records::{LemmaRecord, RecordField, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Longest prefix recorded in the prefix map.
pub const MAX_PREFIX_LEN: usize = 5;

/// Default cap on autocomplete suggestions.
pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;

fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Lowercased key → positions, iterated in first-insertion order.
#[derive(Debug, Default)]
struct KeyedPositions {
    slots: HashMap<String, usize>,
    entries: Vec<(String, Vec<usize>)>,
}

impl KeyedPositions {
    fn insert(&mut self, key: &str, position: usize) {
        match self.slots.get(key) {
            Some(&slot) => self.entries[slot].1.push(position),
            None => {
                self.slots.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), vec![position]));
            }
        }
    }

    fn get(&self, key: &str) -> &[usize] {
        self.slots
            .get(key)
            .map(|&slot| self.entries[slot].1.as_slice())
            .unwrap_or(&[])
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Prefix → distinct full keys, kept in insertion order.
#[derive(Debug, Default)]
struct PrefixMap {
    keys: HashMap<String, Vec<String>>,
    seen: HashSet<(String, String)>,
}

impl PrefixMap {
    fn insert_all(&mut self, key: &str) {
        let ends = key.char_indices().map(|(i, c)| i + c.len_utf8()).take(MAX_PREFIX_LEN);
        for end in ends {
            let prefix = &key[..end];
            if self.seen.insert((prefix.to_string(), key.to_string())) {
                self.keys.entry(prefix.to_string()).or_default().push(key.to_string());
            }
        }
    }

    fn get(&self, prefix: &str) -> &[String] {
        self.keys.get(prefix).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Accumulates unique positions up to a limit.
struct Collector {
    seen: HashSet<usize>,
    positions: Vec<usize>,
    limit: usize,
}

impl Collector {
    fn new(limit: usize) -> Self {
        Self { seen: HashSet::new(), positions: Vec::new(), limit }
    }

    fn is_full(&self) -> bool {
        self.positions.len() >= self.limit
    }

    /// Adds positions until full; returns `true` once the limit is reached.
    fn extend(&mut self, positions: &[usize]) -> bool {
        for &position in positions {
            if self.is_full() {
                break;
            }
            if self.seen.insert(position) {
                self.positions.push(position);
            }
        }
        self.is_full()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub headwords: usize,
    pub forms: usize,
    pub prefixes: usize,
}

/// A completion offered while the user types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: RecordId,
    pub headword: String,
    pub form: String,
}

/// Immutable lookup structures over one record collection.
#[derive(Debug, Default)]
pub struct SearchIndex {
    headwords: KeyedPositions,
    forms: KeyedPositions,
    prefixes: PrefixMap,
    len: usize,
}

impl SearchIndex {
    pub fn build(records: &[LemmaRecord]) -> Self {
        let mut index = Self { len: records.len(), ..Self::default() };

        for (position, record) in records.iter().enumerate() {
            for field in [RecordField::Headword, RecordField::Form] {
                let key = field.value(record).to_lowercase();
                match field {
                    RecordField::Headword => index.headwords.insert(&key, position),
                    _ => index.forms.insert(&key, position),
                }
                index.prefixes.insert_all(&key);
            }
        }
        index.prefixes.seen = HashSet::new();

        let stats = index.stats();
        tracing::info!(
            headwords = stats.headwords,
            forms = stats.forms,
            prefixes = stats.prefixes,
            "search index built"
        );
        index
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            headwords: self.headwords.len(),
            forms: self.forms.len(),
            prefixes: self.prefixes.keys.len(),
        }
    }

    /// Number of records the index was built over.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Positions of records whose headword or form matches `query`,
    /// case-insensitively, in stage order: exact, prefix, substring.
    pub fn search(&self, query: &str, limit: usize) -> Vec<usize> {
        let query = normalize_query(query);
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut found = Collector::new(limit);

        if found.extend(self.headwords.get(&query)) || found.extend(self.forms.get(&query)) {
            return found.positions;
        }

        for key in self.prefixes.get(&query) {
            if found.extend(self.headwords.get(key)) || found.extend(self.forms.get(key)) {
                return found.positions;
            }
        }

        for table in [&self.headwords, &self.forms] {
            for (key, positions) in &table.entries {
                if key.contains(query.as_str()) && found.extend(positions) {
                    return found.positions;
                }
            }
        }

        found.positions
    }

    /// Search results resolved against `records` and deduplicated by
    /// (headword, form), keeping the first occurrence of each pair.
    pub fn suggest(&self, records: &[LemmaRecord], query: &str, limit: usize) -> Vec<Suggestion> {
        let mut pairs = HashSet::new();
        let mut suggestions = Vec::new();
        if limit == 0 {
            return suggestions;
        }
        for position in self.search(query, self.len.max(limit)) {
            let Some(record) = records.get(position) else { continue };
            if !pairs.insert((record.headword.as_str(), record.form.as_str())) {
                continue;
            }
            suggestions.push(Suggestion {
                id: record.id.clone(),
                headword: record.headword.clone(),
                form: record.form.clone(),
            });
            if suggestions.len() >= limit {
                break;
            }
        }
        suggestions
    }

    /// Distinct lowercase headwords and forms recorded under `prefix`.
    pub fn completions(&self, prefix: &str, limit: usize) -> Vec<&str> {
        let prefix = normalize_query(prefix);
        self.prefixes
            .get(&prefix)
            .iter()
            .take(limit)
            .map(String::as_str)
            .collect()
    }
}

//! Filter state and the multi-criterion filtering pipeline

use crate::records::{parse_year, LemmaRecord, RecordId};
use crate::search::SearchIndex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Minimum search limit used when the text query seeds the pipeline.
pub const FULL_SEARCH_LIMIT: usize = 10_000;

/// The query currently active for a consumer.
///
/// Dimensions combine with AND; `categories` and `periods` are OR within
/// themselves. Empty sets and `None` impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterState {
    pub categories: BTreeSet<String>,
    pub periods: BTreeSet<String>,
    pub search_query: String,
    #[serde(deserialize_with = "deserialize_letter")]
    pub selected_letter: Option<char>,
    #[serde(deserialize_with = "deserialize_year")]
    pub selected_year: Option<i32>,
    pub selected_record_id: Option<RecordId>,
    /// Every attestation of one lemma.
    pub selected_lemma_id: Option<RecordId>,
}

/// A partial update merged into a [`FilterState`].
///
/// A missing field keeps the current value; an explicit `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterPatch {
    #[serde(deserialize_with = "deserialize_patch_set")]
    pub categories: Option<BTreeSet<String>>,
    #[serde(deserialize_with = "deserialize_patch_set")]
    pub periods: Option<BTreeSet<String>>,
    pub search_query: Option<String>,
    #[serde(deserialize_with = "deserialize_patch_letter")]
    pub selected_letter: Option<Option<char>>,
    #[serde(deserialize_with = "deserialize_patch_year")]
    pub selected_year: Option<Option<i32>>,
    #[serde(deserialize_with = "deserialize_patch_id")]
    pub selected_record_id: Option<Option<RecordId>>,
    #[serde(deserialize_with = "deserialize_patch_id")]
    pub selected_lemma_id: Option<Option<RecordId>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum YearRepr {
    Number(i64),
    Text(String),
}

fn year_from_repr<E: serde::de::Error>(repr: YearRepr) -> Result<i32, E> {
    match repr {
        YearRepr::Number(n) => i32::try_from(n).map_err(|_| E::custom(format!("year out of range: {n}"))),
        YearRepr::Text(s) => parse_year(&s).ok_or_else(|| E::custom(format!("invalid year: {s:?}"))),
    }
}

fn letter_from_text<E: serde::de::Error>(text: &str) -> Result<char, E> {
    let mut chars = text.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(uppercase_char(c)),
        _ => Err(E::custom(format!("expected a single letter, got {text:?}"))),
    }
}

fn uppercase_char(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

fn deserialize_letter<'de, D: Deserializer<'de>>(d: D) -> Result<Option<char>, D::Error> {
    Option::<String>::deserialize(d)?
        .map(|s| letter_from_text::<D::Error>(&s))
        .transpose()
}

fn deserialize_year<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    Option::<YearRepr>::deserialize(d)?.map(year_from_repr::<D::Error>).transpose()
}

fn deserialize_patch_letter<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<char>>, D::Error> {
    deserialize_letter(d).map(Some)
}

fn deserialize_patch_year<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<i32>>, D::Error> {
    deserialize_year(d).map(Some)
}

/// `null` clears the selection, like an empty list.
fn deserialize_patch_set<'de, D: Deserializer<'de>>(d: D) -> Result<Option<BTreeSet<String>>, D::Error> {
    Option::<BTreeSet<String>>::deserialize(d).map(|set| Some(set.unwrap_or_default()))
}

fn deserialize_patch_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<RecordId>>, D::Error> {
    Option::<RecordId>::deserialize(d).map(Some)
}

impl FilterState {
    /// True when no dimension constrains the result.
    pub fn is_unconstrained(&self) -> bool {
        self.categories.is_empty()
            && self.periods.is_empty()
            && self.search_query.is_empty()
            && self.selected_letter.is_none()
            && self.selected_year.is_none()
            && self.selected_record_id.is_none()
            && self.selected_lemma_id.is_none()
    }

    /// Shallow-merge `patch` into this state.
    pub fn merge(&mut self, patch: FilterPatch) {
        if let Some(categories) = patch.categories {
            self.categories = categories;
        }
        if let Some(periods) = patch.periods {
            self.periods = periods;
        }
        if let Some(query) = patch.search_query {
            self.search_query = query;
        }
        if let Some(letter) = patch.selected_letter {
            self.selected_letter = letter.map(uppercase_char);
        }
        if let Some(year) = patch.selected_year {
            self.selected_year = year;
        }
        if let Some(id) = patch.selected_record_id {
            self.selected_record_id = id;
        }
        if let Some(id) = patch.selected_lemma_id {
            self.selected_lemma_id = id;
        }
    }

    fn matches(&self, record: &LemmaRecord) -> bool {
        if !self.categories.is_empty() && !record.has_any_category(&self.categories) {
            return false;
        }
        if !self.periods.is_empty() && !self.periods.contains(&record.period) {
            return false;
        }
        if let Some(letter) = self.selected_letter {
            let wanted = uppercase_char(letter);
            match record.headword.chars().next() {
                Some(first) if uppercase_char(first) == wanted => {}
                _ => return false,
            }
        }
        if let Some(year) = self.selected_year {
            if record.year != Some(year) {
                return false;
            }
        }
        if let Some(id) = &self.selected_record_id {
            if &record.id != id {
                return false;
            }
        }
        if let Some(lemma_id) = &self.selected_lemma_id {
            if &record.lemma_id != lemma_id {
                return false;
            }
        }
        true
    }
}

/// Positions (ascending, i.e. dataset order) of the records satisfying `filters`.
pub fn filter_positions(records: &[LemmaRecord], filters: &FilterState, index: &SearchIndex) -> Vec<usize> {
    // A whitespace-only query is still a query, and it matches nothing.
    let query = filters.search_query.as_str();
    let base: Vec<usize> = if query.is_empty() {
        (0..records.len()).collect()
    } else {
        let mut hits = index.search(query, records.len().max(FULL_SEARCH_LIMIT));
        hits.sort_unstable();
        hits
    };

    base.into_iter()
        .filter(|&position| records.get(position).is_some_and(|r| filters.matches(r)))
        .collect()
}

/// The records satisfying `filters`, in dataset order.
pub fn apply_filters<'a>(records: &'a [LemmaRecord], filters: &FilterState, index: &SearchIndex) -> Vec<&'a LemmaRecord> {
    filter_positions(records, filters, index)
        .into_iter()
        .map(|position| &records[position])
        .collect()
}

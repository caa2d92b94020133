//! Derived views over the active record set
//!
//! Every function here is a pure function of its input slice. An empty slice
//! yields zeroed metrics or empty groupings.

use crate::records::{Coordinates, LemmaRecord, RecordField, RecordId};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Decimal digits kept when deciding whether two points coincide.
pub const COORDINATE_PRECISION: i32 = 6;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Row count of the active set.
    pub records: usize,
    /// Distinct `lemma_id` values.
    pub lemmas: usize,
    pub headwords: usize,
    pub forms: usize,
    pub locations: usize,
    pub years: usize,
    /// Sum of `frequency`, the occurrence count.
    pub occurrences: u64,
}

fn distinct_nonempty<'a>(records: &[&'a LemmaRecord], field: RecordField) -> usize {
    records
        .iter()
        .map(|r| field.value(r))
        .filter(|v| !v.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

pub fn metrics(records: &[&LemmaRecord]) -> Metrics {
    Metrics {
        records: records.len(),
        lemmas: records.iter().map(|r| &r.lemma_id).collect::<HashSet<_>>().len(),
        headwords: distinct_nonempty(records, RecordField::Headword),
        forms: distinct_nonempty(records, RecordField::Form),
        locations: distinct_nonempty(records, RecordField::Location),
        years: records.iter().filter_map(|r| r.year).collect::<HashSet<_>>().len(),
        occurrences: records.iter().map(|r| r.frequency).sum(),
    }
}

// === Timeline ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Quarter,
    Decade,
    Century,
}

const QUARTERS: [&str; 4] = ["I", "II", "III", "IV"];

impl Granularity {
    pub fn span(self) -> i32 {
        match self {
            Granularity::Quarter => 25,
            Granularity::Decade => 10,
            Granularity::Century => 100,
        }
    }

    /// First year of the bucket containing `year`.
    pub fn bucket_start(self, year: i32) -> i32 {
        year.div_euclid(self.span()) * self.span()
    }

    /// `"13I"` for quarters, `"1350s"` for decades, `"1300s"` for centuries.
    pub fn label(self, start: i32) -> String {
        match self {
            Granularity::Quarter => {
                let century = start.div_euclid(100);
                let quarter = (start.rem_euclid(100) / 25) as usize;
                format!("{}{}", century, QUARTERS[quarter])
            }
            Granularity::Decade | Granularity::Century => format!("{start}s"),
        }
    }
}

/// Quarter-century label for `year`, e.g. 1310 → `"13I"`.
pub fn quarter_label(year: i32) -> String {
    let granularity = Granularity::Quarter;
    granularity.label(granularity.bucket_start(year))
}

fn quarter_label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(-?\d+)(IV|III|II|I)$").expect("quarter label pattern"))
}

/// Inclusive year range of a quarter label: `"13I"` → `(1300, 1324)`.
pub fn parse_quarter_label(label: &str) -> Option<(i32, i32)> {
    let caps = quarter_label_pattern().captures(label.trim())?;
    let century: i32 = caps.get(1)?.as_str().parse().ok()?;
    let roman = caps.get(2)?.as_str();
    let quarter = QUARTERS.iter().position(|q| *q == roman)? as i32;
    let start = century.checked_mul(100)?.checked_add(quarter * 25)?;
    Some((start, start + 24))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    pub label: String,
    pub start_year: i32,
    pub end_year: i32,
    pub years: Vec<i32>,
    pub headwords: Vec<String>,
    pub locations: Vec<String>,
    pub records: usize,
    pub occurrences: u64,
}

#[derive(Default)]
struct BucketAccumulator {
    years: BTreeSet<i32>,
    headwords: BTreeSet<String>,
    locations: BTreeSet<String>,
    records: usize,
    occurrences: u64,
}

/// Histogram of the dated records, ascending by start year. Undated
/// records fall in no bucket.
pub fn timeline(records: &[&LemmaRecord], granularity: Granularity) -> Vec<TimeBucket> {
    let mut buckets: BTreeMap<i32, BucketAccumulator> = BTreeMap::new();

    for record in records {
        let Some(year) = record.year else { continue };
        let acc = buckets.entry(granularity.bucket_start(year)).or_default();
        acc.years.insert(year);
        acc.headwords.insert(record.headword.clone());
        if !record.location.is_empty() {
            acc.locations.insert(record.location.clone());
        }
        acc.records += 1;
        acc.occurrences += record.frequency;
    }

    buckets
        .into_iter()
        .map(|(start, acc)| TimeBucket {
            label: granularity.label(start),
            start_year: start,
            end_year: start + granularity.span() - 1,
            years: acc.years.into_iter().collect(),
            headwords: acc.headwords.into_iter().collect(),
            locations: acc.locations.into_iter().collect(),
            records: acc.records,
            occurrences: acc.occurrences,
        })
        .collect()
}

// === Map markers ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationGroup {
    pub lat: f64,
    pub lng: f64,
    /// Distinct place names sharing this point, in order of appearance.
    pub locations: Vec<String>,
    pub record_ids: Vec<RecordId>,
    pub records: usize,
    pub occurrences: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationGrouping {
    pub groups: Vec<LocationGroup>,
    /// Active records with no usable coordinates.
    pub unplaced: usize,
}

fn point_key(coordinates: Coordinates) -> (i64, i64) {
    let scale = 10f64.powi(COORDINATE_PRECISION);
    ((coordinates.lat * scale).round() as i64, (coordinates.lng * scale).round() as i64)
}

/// One group per distinct rounded coordinate pair, largest first.
pub fn group_by_coordinates(records: &[&LemmaRecord]) -> LocationGrouping {
    let scale = 10f64.powi(COORDINATE_PRECISION);
    let mut slots: HashMap<(i64, i64), usize> = HashMap::new();
    let mut groups: Vec<LocationGroup> = Vec::new();
    let mut unplaced = 0;

    for record in records {
        let Some(coordinates) = record.coordinates else {
            unplaced += 1;
            continue;
        };
        let key = point_key(coordinates);
        let slot = *slots.entry(key).or_insert_with(|| {
            groups.push(LocationGroup {
                lat: key.0 as f64 / scale,
                lng: key.1 as f64 / scale,
                locations: Vec::new(),
                record_ids: Vec::new(),
                records: 0,
                occurrences: 0,
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        if !record.location.is_empty() && !group.locations.contains(&record.location) {
            group.locations.push(record.location.clone());
        }
        group.record_ids.push(record.id.clone());
        group.records += 1;
        group.occurrences += record.frequency;
    }

    groups.sort_by(|a, b| b.records.cmp(&a.records));
    LocationGrouping { groups, unplaced }
}

// === Alphabetical entries ===

/// Sort key approximating Italian dictionary order: accents folded, case ignored.
pub fn collation_key(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadwordGroup {
    pub headword: String,
    pub forms: Vec<String>,
    pub record_ids: Vec<RecordId>,
    pub occurrences: u64,
}

/// One entry per headword (case-sensitive), in collation order.
pub fn group_by_headword(records: &[&LemmaRecord]) -> Vec<HeadwordGroup> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<HeadwordGroup> = Vec::new();

    for record in records {
        let slot = *slots.entry(record.headword.as_str()).or_insert_with(|| {
            groups.push(HeadwordGroup {
                headword: record.headword.clone(),
                forms: Vec::new(),
                record_ids: Vec::new(),
                occurrences: 0,
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        if !group.forms.contains(&record.form) {
            group.forms.push(record.form.clone());
        }
        group.record_ids.push(record.id.clone());
        group.occurrences += record.frequency;
    }

    groups.sort_by_cached_key(|g| (collation_key(&g.headword), g.headword.clone()));
    groups
}

// === Region and area joins ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionCount {
    pub code: String,
    pub records: usize,
    pub occurrences: u64,
}

/// Records and occurrences per administrative region code, sorted by code.
pub fn region_counts(records: &[&LemmaRecord]) -> Vec<RegionCount> {
    let mut counts: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
    for record in records {
        let Some(code) = record.region_code.as_deref().map(str::trim) else { continue };
        if code.is_empty() {
            continue;
        }
        let entry = counts.entry(code).or_default();
        entry.0 += 1;
        entry.1 += record.frequency;
    }
    counts
        .into_iter()
        .map(|(code, (records, occurrences))| RegionCount { code: code.to_string(), records, occurrences })
        .collect()
}

/// Records per dialect area id, sorted by id.
pub fn area_counts(records: &[&LemmaRecord]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for area in records.iter().filter_map(|r| r.area_id) {
        *counts.entry(area).or_insert(0) += 1;
    }
    counts
}

// === Facets ===

/// Values available for the filter controls, computed over the full dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facets {
    pub categories: Vec<String>,
    pub periods: Vec<String>,
    pub years: Vec<i32>,
    /// Initial letters that have at least one headword.
    pub letters: Vec<String>,
}

pub fn facets(records: &[LemmaRecord]) -> Facets {
    let mut categories = BTreeSet::new();
    let mut periods = BTreeSet::new();
    let mut years = BTreeSet::new();
    let mut letters = BTreeSet::new();

    for record in records {
        categories.extend(record.categories.iter().cloned());
        if !record.period.is_empty() {
            periods.insert(record.period.clone());
        }
        if let Some(year) = record.year {
            years.insert(year);
        }
        if let Some(initial) = record.initial() {
            letters.insert(initial);
        }
    }

    Facets {
        categories: categories.into_iter().collect(),
        periods: periods.into_iter().collect(),
        years: years.into_iter().collect(),
        letters: letters.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(records: &[LemmaRecord]) -> Vec<&LemmaRecord> {
        records.iter().collect()
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(metrics(&[]), Metrics::default());
        assert!(timeline(&[], Granularity::Quarter).is_empty());
        assert_eq!(group_by_coordinates(&[]), LocationGrouping::default());
        assert!(group_by_headword(&[]).is_empty());
        assert!(region_counts(&[]).is_empty());
    }

    #[test]
    fn occurrences_sum_frequency_not_rows() {
        let recs = vec![
            LemmaRecord::new("1", "sale", "sale").with_frequency(25).with_year(1310),
            LemmaRecord::new("2", "sale", "sale").with_frequency(11),
        ];
        let m = metrics(&refs(&recs));
        assert_eq!(m.records, 2);
        assert_eq!(m.lemmas, 2);
        assert_eq!(m.headwords, 1);
        assert_eq!(m.years, 1);
        assert_eq!(m.occurrences, 36);
    }

    #[test]
    fn attestations_of_one_lemma_count_once() {
        let recs = vec![
            LemmaRecord::new("1", "sale", "sale").with_lemma_id("9").with_frequency(3),
            LemmaRecord::new("2", "sale", "sal").with_lemma_id("9").with_frequency(4),
            LemmaRecord::new("3", "pepe", "pepe").with_lemma_id("10"),
        ];
        let m = metrics(&refs(&recs));
        assert_eq!(m.records, 3);
        assert_eq!(m.lemmas, 2);
        assert_eq!(m.forms, 3);
        assert_eq!(m.occurrences, 7);
    }

    #[test]
    fn quarter_labels_follow_arithmetic_formula() {
        assert_eq!(quarter_label(1310), "13I");
        assert_eq!(quarter_label(1324), "13I");
        assert_eq!(quarter_label(1325), "13II");
        assert_eq!(quarter_label(1399), "13IV");
        assert_eq!(quarter_label(1400), "14I");
        assert_eq!(parse_quarter_label("13I"), Some((1300, 1324)));
        assert_eq!(parse_quarter_label("13IV"), Some((1375, 1399)));
        assert_eq!(parse_quarter_label("13V"), None);
    }

    #[test]
    fn timeline_skips_undated_records() {
        let recs = vec![
            LemmaRecord::new("1", "sale", "sale").with_year(1310).with_frequency(25).with_location("Firenze", None),
            LemmaRecord::new("2", "pepe", "pepe").with_year(1360).with_frequency(20),
            LemmaRecord::new("3", "sale", "sal").with_year(1390).with_frequency(11),
            LemmaRecord::new("4", "olio", "olio").with_frequency(99),
        ];
        let buckets = timeline(&refs(&recs), Granularity::Quarter);
        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["13I", "13III", "13IV"]);
        assert_eq!(buckets[0].start_year, 1300);
        assert_eq!(buckets[0].end_year, 1324);
        assert_eq!(buckets[0].locations, vec!["Firenze"]);
        assert_eq!(buckets.iter().map(|b| b.occurrences).sum::<u64>(), 56);

        let centuries = timeline(&refs(&recs), Granularity::Century);
        assert_eq!(centuries.len(), 1);
        assert_eq!(centuries[0].label, "1300s");
        assert_eq!(centuries[0].headwords, vec!["pepe", "sale"]);
        assert_eq!(centuries[0].years, vec![1310, 1360, 1390]);
    }

    #[test]
    fn nearby_points_merge_after_rounding() {
        let recs = vec![
            LemmaRecord::new("1", "a", "a").with_location("Firenze", Coordinates::new(43.769600001, 11.255800001)),
            LemmaRecord::new("2", "b", "b").with_location("Florentia", Coordinates::new(43.7696, 11.2558)),
            LemmaRecord::new("3", "c", "c").with_location("Siena", Coordinates::new(43.3188, 11.3308)),
            LemmaRecord::new("4", "d", "d").with_location("Toscana", None),
        ];
        let grouping = group_by_coordinates(&refs(&recs));
        assert_eq!(grouping.unplaced, 1);
        assert_eq!(grouping.groups.len(), 2);
        assert_eq!(grouping.groups[0].locations, vec!["Firenze", "Florentia"]);
        assert_eq!(grouping.groups[0].records, 2);
    }

    #[test]
    fn headwords_sort_ignoring_accents_and_case() {
        let recs = vec![
            LemmaRecord::new("1", "zucchero", "zuccaro"),
            LemmaRecord::new("2", "Àgresto", "agresto"),
            LemmaRecord::new("3", "burro", "butiro"),
            LemmaRecord::new("4", "burro", "burro").with_frequency(4),
            LemmaRecord::new("5", "Burro", "Burro"),
        ];
        let groups = group_by_headword(&refs(&recs));
        let names: Vec<&str> = groups.iter().map(|g| g.headword.as_str()).collect();
        assert_eq!(names, vec!["Àgresto", "Burro", "burro", "zucchero"]);
        assert_eq!(groups[2].forms, vec!["butiro", "burro"]);
        assert_eq!(groups[2].occurrences, 4);
    }

    #[test]
    fn regions_and_facets() {
        let recs = vec![
            LemmaRecord::new("1", "sale", "sale").with_region("Region", "09").with_frequency(2).with_categories("Spezie"),
            LemmaRecord::new("2", "pepe", "pepe").with_region("Region", "09").with_year(1300).with_period("XIV sec."),
            LemmaRecord::new("3", "olio", "olio").with_categories("Condimenti, Spezie"),
        ];
        let regions = region_counts(&refs(&recs));
        assert_eq!(regions, vec![RegionCount { code: "09".into(), records: 2, occurrences: 2 }]);

        let f = facets(&recs);
        assert_eq!(f.categories, vec!["Condimenti", "Spezie"]);
        assert_eq!(f.periods, vec!["XIV sec."]);
        assert_eq!(f.years, vec![1300]);
        assert_eq!(f.letters, vec!["O", "P", "S"]);
    }
}

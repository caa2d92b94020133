//! Dataset snapshots and per-consumer session state

use crate::aggregate::{
    self, area_counts, group_by_coordinates, group_by_headword, region_counts, timeline, Facets, Granularity,
    HeadwordGroup, LocationGrouping, Metrics, RegionCount, TimeBucket,
};
use crate::cache::{FilterCache, FilterKey};
use crate::error::{LemmarioError, Result};
use crate::filters::{filter_positions, FilterPatch, FilterState};
use crate::loader::{self, LoadReport};
use crate::records::{LemmaRecord, RecordId};
use crate::search::{SearchIndex, Suggestion};
use anyhow::Context;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// An immutable record collection with its search index.
///
/// Every dataset gets a fresh generation number, so memoized filter results
/// from an earlier load never match a later one.
#[derive(Debug)]
pub struct Dataset {
    records: Vec<LemmaRecord>,
    index: SearchIndex,
    by_id: HashMap<RecordId, usize>,
    by_lemma: HashMap<RecordId, Vec<usize>>,
    generation: u64,
    fingerprint: Option<String>,
}

impl Dataset {
    /// Fails with [`LemmarioError::DuplicateId`] if two records share an id.
    pub fn new(records: Vec<LemmaRecord>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(records.len());
        let mut by_lemma: HashMap<RecordId, Vec<usize>> = HashMap::new();
        for (position, record) in records.iter().enumerate() {
            if by_id.insert(record.id.clone(), position).is_some() {
                return Err(LemmarioError::DuplicateId(record.id.to_string()));
            }
            by_lemma.entry(record.lemma_id.clone()).or_default().push(position);
        }

        let index = SearchIndex::build(&records);
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        tracing::info!(records = records.len(), lemmas = by_lemma.len(), generation, "dataset loaded");

        Ok(Self { records, index, by_id, by_lemma, generation, fingerprint: None })
    }

    pub fn from_report(report: LoadReport) -> Result<Self> {
        Self::new(report.records)
    }

    /// Load a `.json` or `.csv` file from disk.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let report = loader::load_path(path).with_context(|| format!("Failed to load {}", path.display()))?;
        let dataset = Self::from_report(report).with_context(|| format!("Invalid dataset in {}", path.display()))?;
        Ok(dataset)
    }

    /// Attach a content checksum identifying the source bytes.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn records(&self) -> &[LemmaRecord] {
        &self.records
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&LemmaRecord> {
        self.by_id.get(id).map(|&position| &self.records[position])
    }

    /// Every attestation of one lemma, in dataset order.
    pub fn lemma_rows(&self, lemma_id: &RecordId) -> Vec<&LemmaRecord> {
        self.by_lemma
            .get(lemma_id)
            .map(|positions| self.resolve(positions))
            .unwrap_or_default()
    }

    /// Raw search results resolved to records, in stage order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&LemmaRecord> {
        self.resolve(&self.index.search(query, limit))
    }

    pub fn suggest(&self, query: &str, limit: usize) -> Vec<Suggestion> {
        self.index.suggest(&self.records, query, limit)
    }

    /// Records satisfying `filters`, in dataset order.
    pub fn filter(&self, filters: &FilterState) -> Vec<&LemmaRecord> {
        self.resolve(&filter_positions(&self.records, filters, &self.index))
    }

    pub fn facets(&self) -> Facets {
        aggregate::facets(&self.records)
    }

    /// Filtered positions, memoized in `cache` under this dataset's generation.
    pub fn cached_positions(&self, filters: &FilterState, cache: &FilterCache) -> Arc<Vec<usize>> {
        cache.get_or_compute(FilterKey::new(self.generation, filters), || {
            filter_positions(&self.records, filters, &self.index)
        })
    }

    pub fn resolve(&self, positions: &[usize]) -> Vec<&LemmaRecord> {
        positions.iter().filter_map(|&position| self.records.get(position)).collect()
    }

    /// The records at `positions` together with every derived view.
    pub fn view(&self, positions: &[usize], granularity: Granularity) -> ActiveView {
        let active = self.resolve(positions);
        ActiveView {
            metrics: aggregate::metrics(&active),
            timeline: timeline(&active, granularity),
            locations: group_by_coordinates(&active),
            headwords: group_by_headword(&active),
            regions: region_counts(&active),
            areas: area_counts(&active),
            granularity,
            records: active.into_iter().cloned().collect(),
        }
    }
}

/// The active record set and all aggregates computed from it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveView {
    pub records: Vec<LemmaRecord>,
    pub metrics: Metrics,
    pub granularity: Granularity,
    pub timeline: Vec<TimeBucket>,
    pub locations: LocationGrouping,
    pub headwords: Vec<HeadwordGroup>,
    pub regions: Vec<RegionCount>,
    pub areas: BTreeMap<u32, usize>,
}

/// One consumer's view onto a shared dataset.
///
/// Filter changes go through [`Session::set_filters`]; the dataset is only
/// ever swapped whole.
pub struct Session {
    dataset: Arc<Dataset>,
    filters: FilterState,
    cache: Arc<FilterCache>,
}

impl Session {
    pub fn new(dataset: Arc<Dataset>, cache: Arc<FilterCache>) -> Self {
        Self { dataset, filters: FilterState::default(), cache }
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn set_filters(&mut self, patch: FilterPatch) -> &FilterState {
        self.filters.merge(patch);
        tracing::debug!(filters = ?self.filters, "filters updated");
        &self.filters
    }

    pub fn reset_filters(&mut self) {
        self.filters = FilterState::default();
    }

    /// Swap in a new dataset. Filters are reset since they may reference
    /// ids or categories the new data lacks.
    pub fn replace_dataset(&mut self, dataset: Arc<Dataset>) {
        self.dataset = dataset;
        self.reset_filters();
    }

    pub fn active_positions(&self) -> Arc<Vec<usize>> {
        self.dataset.cached_positions(&self.filters, &self.cache)
    }

    pub fn active(&self) -> Vec<&LemmaRecord> {
        self.dataset.resolve(&self.active_positions())
    }

    pub fn metrics(&self) -> Metrics {
        aggregate::metrics(&self.active())
    }

    pub fn view(&self, granularity: Granularity) -> ActiveView {
        self.dataset.view(&self.active_positions(), granularity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Coordinates;

    fn dataset() -> Dataset {
        Dataset::new(vec![
            LemmaRecord::new("1", "sale", "sale")
                .with_year(1310)
                .with_frequency(25)
                .with_categories("Condimenti")
                .with_location("Firenze", Coordinates::new(43.7696, 11.2558)),
            LemmaRecord::new("2", "sale", "sal")
                .with_year(1390)
                .with_frequency(11)
                .with_categories("Spezie")
                .with_region("Region", "09"),
            LemmaRecord::new("3", "pepe", "pepe")
                .with_year(1360)
                .with_frequency(20)
                .with_categories("Spezie")
                .with_location("Siena", Coordinates::new(43.3188, 11.3308)),
        ])
        .unwrap()
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = Dataset::new(vec![LemmaRecord::new("1", "a", "a"), LemmaRecord::new(1u64, "b", "b")]).unwrap_err();
        assert!(matches!(err, LemmarioError::DuplicateId(id) if id == "1"));
    }

    #[test]
    fn generations_increase() {
        let a = dataset();
        let b = dataset();
        assert!(b.generation() > a.generation());
    }

    #[test]
    fn lookup_by_id() {
        let data = dataset();
        assert_eq!(data.get(&RecordId::from("3")).map(|r| r.headword.as_str()), Some("pepe"));
        assert!(data.get(&RecordId::from("9")).is_none());
    }

    #[test]
    fn lemma_rows_gather_attestations() {
        let data = Dataset::new(vec![
            LemmaRecord::new("1", "sale", "sale").with_lemma_id("9"),
            LemmaRecord::new("2", "pepe", "pepe").with_lemma_id("10"),
            LemmaRecord::new("3", "sale", "sal").with_lemma_id("9"),
        ])
        .unwrap();
        let forms: Vec<&str> = data.lemma_rows(&RecordId::from("9")).iter().map(|r| r.form.as_str()).collect();
        assert_eq!(forms, vec!["sale", "sal"]);
        assert!(data.lemma_rows(&RecordId::from("11")).is_empty());
    }

    #[test]
    fn session_filters_and_views() {
        let cache = Arc::new(FilterCache::new(8));
        let mut session = Session::new(Arc::new(dataset()), Arc::clone(&cache));
        assert_eq!(session.active().len(), 3);

        let patch: FilterPatch = serde_json::from_str(r#"{"categories": ["Spezie"]}"#).unwrap();
        session.set_filters(patch);
        let view = session.view(Granularity::Quarter);
        let ids: Vec<&str> = view.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(view.metrics.occurrences, 31);
        assert_eq!(view.locations.unplaced, 1);
        assert_eq!(view.regions.len(), 1);

        session.metrics();
        assert!(cache.stats().hits >= 1);
    }

    #[test]
    fn replacing_the_dataset_resets_filters() {
        let cache = Arc::new(FilterCache::default());
        let mut session = Session::new(Arc::new(dataset()), cache);
        session.set_filters(FilterPatch { search_query: Some("pepe".into()), ..FilterPatch::default() });
        assert_eq!(session.active().len(), 1);

        session.replace_dataset(Arc::new(Dataset::new(vec![LemmaRecord::new("x", "olio", "olio")]).unwrap()));
        assert!(session.filters().is_unconstrained());
        assert_eq!(session.active().len(), 1);
    }

    #[test]
    fn open_reads_json_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lemmi.json");
        std::fs::write(&path, r#"[{"IdLemma": "1", "Lemma": "sale", "Forma": "sale"}]"#).unwrap();
        let data = Dataset::open(&path).unwrap();
        assert_eq!(data.len(), 1);
        assert!(Dataset::open(&dir.path().join("missing.json")).is_err());
    }
}

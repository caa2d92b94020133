//! Property tests for the search index and filter pipeline

use lemmario_lib::{apply_filters, metrics, FilterState, LemmaRecord, SearchIndex};
use proptest::prelude::*;
use std::collections::BTreeSet;

const CATEGORIES: [&str; 4] = ["Condimenti", "Spezie", "Dolci", "Bevande"];

prop_compose! {
    fn arb_record(id: usize)(
        headword in "[a-zàè]{1,9}",
        form in "[a-zàè]{1,9}",
        frequency in 0u64..50,
        year in proptest::option::of(1200i32..1600),
        cats in proptest::sample::subsequence(CATEGORIES.to_vec(), 0..=3),
    ) -> LemmaRecord {
        let mut record = LemmaRecord::new(id.to_string(), headword, form)
            .with_frequency(frequency)
            .with_categories(&cats.join(", "));
        if let Some(year) = year {
            record = record.with_year(year);
        }
        record
    }
}

fn arb_records() -> impl Strategy<Value = Vec<LemmaRecord>> {
    (0usize..40).prop_flat_map(|n| (0..n).map(arb_record).collect::<Vec<_>>())
}

proptest! {
    #[test]
    fn substring_matches_are_never_missed(records in arb_records(), query in "[a-z]{1,3}") {
        let index = SearchIndex::build(&records);
        let found: BTreeSet<usize> = index.search(&query, records.len().max(1)).into_iter().collect();
        for (position, record) in records.iter().enumerate() {
            if record.headword.contains(&query) || record.form.contains(&query) {
                prop_assert!(found.contains(&position), "missed {:?} for {:?}", record, query);
            }
        }
    }

    #[test]
    fn blank_queries_match_nothing(records in arb_records(), blank in "[ \t]{0,4}") {
        let index = SearchIndex::build(&records);
        prop_assert!(index.search(&blank, 100).is_empty());
    }

    #[test]
    fn search_results_are_unique_and_bounded(records in arb_records(), query in "[a-z]{1,2}", limit in 0usize..20) {
        let index = SearchIndex::build(&records);
        let hits = index.search(&query, limit);
        prop_assert!(hits.len() <= limit);
        let unique: BTreeSet<_> = hits.iter().collect();
        prop_assert_eq!(unique.len(), hits.len());
    }

    #[test]
    fn filtering_is_idempotent(records in arb_records(), query in "[a-z]{0,2}", cat in proptest::sample::select(CATEGORIES.to_vec())) {
        let index = SearchIndex::build(&records);
        let filters = FilterState {
            search_query: query,
            categories: [cat.to_string()].into(),
            ..FilterState::default()
        };
        let once: Vec<LemmaRecord> = apply_filters(&records, &filters, &index).into_iter().cloned().collect();
        let reindexed = SearchIndex::build(&once);
        let twice: Vec<LemmaRecord> = apply_filters(&once, &filters, &reindexed).into_iter().cloned().collect();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn adding_a_category_never_shrinks_the_result(
        records in arb_records(),
        first in proptest::sample::select(CATEGORIES.to_vec()),
        second in proptest::sample::select(CATEGORIES.to_vec()),
    ) {
        let index = SearchIndex::build(&records);
        let narrow = FilterState { categories: [first.to_string()].into(), ..FilterState::default() };
        let mut wide = narrow.clone();
        wide.categories.insert(second.to_string());

        let narrow_ids: BTreeSet<_> = apply_filters(&records, &narrow, &index).iter().map(|r| r.id.clone()).collect();
        let wide_ids: BTreeSet<_> = apply_filters(&records, &wide, &index).iter().map(|r| r.id.clone()).collect();
        prop_assert!(narrow_ids.is_subset(&wide_ids));
    }

    #[test]
    fn occurrences_sum_frequency_not_rows(records in arb_records()) {
        let active: Vec<&LemmaRecord> = records.iter().collect();
        let expected: u64 = records.iter().map(|r| r.frequency).sum();
        let m = metrics(&active);
        prop_assert_eq!(m.occurrences, expected);
        prop_assert_eq!(m.records, records.len());
    }
}

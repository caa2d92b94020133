//! End-to-end checks over small hand-built datasets

use lemmario_lib::{
    group_by_coordinates, group_by_headword, parse_json, quarter_label, timeline, Coordinates, Dataset, FilterCache,
    FilterPatch, FilterState, Granularity, LemmaRecord, Session,
};
use std::sync::Arc;

fn spice_records() -> Vec<LemmaRecord> {
    vec![
        LemmaRecord::new(1u64, "sale", "sale").with_year(1310).with_frequency(25).with_categories("Condimenti"),
        LemmaRecord::new(2u64, "sale", "sale").with_year(1390).with_frequency(11).with_categories("Spezie"),
        LemmaRecord::new(3u64, "pepe", "pepe").with_year(1360).with_frequency(20).with_categories("Spezie"),
    ]
}

#[test]
fn spice_category_selects_two_records() {
    let dataset = Dataset::new(spice_records()).unwrap();
    let filters = FilterState { categories: ["Spezie".to_string()].into(), ..FilterState::default() };
    let active = dataset.filter(&filters);

    let ids: Vec<&str> = active.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "3"]);

    let m = lemmario_lib::metrics(&active);
    assert_eq!(m.occurrences, 31);
    assert_eq!(m.headwords, 2);
    assert_eq!(m.years, 2);
}

#[test]
fn near_identical_coordinates_share_a_marker() {
    let records = vec![
        LemmaRecord::new("a", "sale", "sale").with_location("Firenze", Coordinates::new(43.769600001, 11.255800001)),
        LemmaRecord::new("b", "pepe", "pepe").with_location("Fiorenza", Coordinates::new(43.7696, 11.2558)),
    ];
    let active: Vec<&LemmaRecord> = records.iter().collect();
    let grouping = group_by_coordinates(&active);
    assert_eq!(grouping.groups.len(), 1);
    assert_eq!(grouping.groups[0].records, 2);
    assert_eq!(grouping.groups[0].locations, vec!["Firenze", "Fiorenza"]);
}

#[test]
fn quarter_buckets_follow_the_arithmetic_formula() {
    assert_eq!(quarter_label(1310), "13I");
    assert_eq!(quarter_label(1325), "13II");
    assert_eq!(quarter_label(1399), "13IV");

    let records = spice_records();
    let active: Vec<&LemmaRecord> = records.iter().collect();
    let buckets = timeline(&active, Granularity::Quarter);
    let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["13I", "13III", "13IV"]);
    assert_eq!((buckets[0].start_year, buckets[0].end_year), (1300, 1324));
    assert_eq!(buckets[0].occurrences, 25);
}

#[test]
fn undated_records_fall_in_no_bucket() {
    let records = vec![LemmaRecord::new("1", "olio", "olio").with_frequency(4)];
    let active: Vec<&LemmaRecord> = records.iter().collect();
    assert!(timeline(&active, Granularity::Quarter).is_empty());
}

#[test]
fn headwords_sort_with_accents_folded() {
    let records = vec![
        LemmaRecord::new("1", "zucca", "zucca"),
        LemmaRecord::new("2", "èrba", "erba"),
        LemmaRecord::new("3", "Aglio", "aglio"),
        LemmaRecord::new("4", "zucca", "cucuzza"),
    ];
    let active: Vec<&LemmaRecord> = records.iter().collect();
    let groups = group_by_headword(&active);
    let headwords: Vec<&str> = groups.iter().map(|g| g.headword.as_str()).collect();
    assert_eq!(headwords, vec!["Aglio", "èrba", "zucca"]);
    assert_eq!(groups[2].forms, vec!["zucca", "cucuzza"]);
}

#[test]
fn empty_active_set_is_a_valid_view() {
    let dataset = Dataset::new(spice_records()).unwrap();
    let filters = FilterState { search_query: "zafferano".into(), ..FilterState::default() };
    let cache = FilterCache::default();
    let positions = dataset.cached_positions(&filters, &cache);
    let view = dataset.view(&positions, Granularity::Quarter);
    assert!(view.records.is_empty());
    assert_eq!(view.metrics.occurrences, 0);
    assert!(view.timeline.is_empty());
    assert!(view.locations.groups.is_empty());
    assert!(view.headwords.is_empty());
}

#[test]
fn session_drives_the_whole_pipeline_from_json() {
    let json = r#"[
        {"IdLemma": "1", "Lemma": "sale", "Forma": "sale", "Anno": "1310", "Frequenza": "25", "Categoria": "Condimenti"},
        {"IdLemma": "2", "Lemma": "sale", "Forma": "sale", "Anno": "1390", "Frequenza": "11", "Categoria": "Spezie"},
        {"IdLemma": "3", "Lemma": "pepe", "Forma": "pepe", "Anno": "1360", "Frequenza": "20", "Categoria": "Spezie"}
    ]"#;
    let dataset = Dataset::from_report(parse_json(json).unwrap()).unwrap();
    let mut session = Session::new(Arc::new(dataset), Arc::new(FilterCache::default()));

    let patch: FilterPatch = serde_json::from_str(r#"{"selectedYear": "1390"}"#).unwrap();
    session.set_filters(patch);
    assert_eq!(session.metrics().occurrences, 11);

    let patch: FilterPatch = serde_json::from_str(r#"{"selectedYear": null, "selectedLetter": "p"}"#).unwrap();
    session.set_filters(patch);
    let active = session.active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].headword, "pepe");

    session.reset_filters();
    assert_eq!(session.view(Granularity::Century).timeline.len(), 1);
}

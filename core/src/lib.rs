//! Lemmario - Italian gastronomic lemma atlas
//!
//! Library providing the record model, search index, filter pipeline and
//! aggregated views behind the atlas map and timeline.

// Record types must be defined first as they're used by everything else
pub mod records;
pub mod error;
pub mod loader;
pub mod search;
pub mod filters;
pub mod aggregate;
pub mod cache;
pub mod state;

pub use error::LemmarioError;
pub use records::{Coordinates, LemmaRecord, RecordField, RecordId};
pub use loader::{export_json, load_path, parse_csv, parse_json, LoadReport, RowWarning, WarningKind};
pub use search::{IndexStats, SearchIndex, Suggestion, DEFAULT_SUGGESTION_LIMIT, MAX_PREFIX_LEN};
pub use filters::{apply_filters, filter_positions, FilterPatch, FilterState, FULL_SEARCH_LIMIT};
pub use aggregate::{
    facets, group_by_coordinates, group_by_headword, metrics, quarter_label, parse_quarter_label, timeline, Facets,
    Granularity, HeadwordGroup, LocationGroup, LocationGrouping, Metrics, RegionCount, TimeBucket,
};
pub use cache::{CacheStats, FilterCache, FilterKey};
pub use state::{ActiveView, Dataset, Session};

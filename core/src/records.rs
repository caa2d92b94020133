//! Lemma record model and field parsing

use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

/// Opaque record identifier. Numeric and textual ids compare by their text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.len() == id.len() {
            Self(id)
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Unsigned(u64),
    Signed(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match IdRepr::deserialize(deserializer)? {
            IdRepr::Unsigned(n) => RecordId::from(n),
            IdRepr::Signed(n) => RecordId(n.to_string()),
            IdRepr::Text(s) => RecordId::new(s),
        })
    }
}

/// A validated point on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Parse a latitude/longitude pair as found in the source sheet.
    ///
    /// Returns `None` for the `#N/A` sentinel, blanks, non-numeric text,
    /// out-of-range values and points lying on the zero axes.
    pub fn parse(lat: &str, lng: &str) -> Option<Self> {
        let lat = parse_coordinate(lat)?;
        let lng = parse_coordinate(lng)?;
        Self::new(lat, lng)
    }

    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        if lat.abs() > 90.0 || lng.abs() > 180.0 {
            return None;
        }
        if lat == 0.0 || lng == 0.0 {
            return None;
        }
        Some(Self { lat, lng })
    }
}

const MISSING_SENTINEL: &str = "#N/A";

fn parse_coordinate(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(MISSING_SENTINEL) {
        return None;
    }
    trimmed.replace(',', ".").parse::<f64>().ok()
}

fn leading_integer() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[+-]?\d+").expect("leading integer pattern"))
}

fn parse_leading_integer(raw: &str) -> Option<i64> {
    leading_integer()
        .find(raw.trim())
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Parse an attestation year. `"1350 ca."` yields 1350; `"ca. 1350"` and
/// blanks yield `None`.
pub fn parse_year(raw: &str) -> Option<i32> {
    parse_leading_integer(raw).and_then(|n| i32::try_from(n).ok())
}

/// Parse an occurrence count. Negative or non-numeric values are absent.
pub fn parse_frequency(raw: &str) -> Option<u64> {
    parse_leading_integer(raw).and_then(|n| u64::try_from(n).ok())
}

/// Split a comma separated category cell into a label set.
pub fn split_categories(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// One attested occurrence of a word form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LemmaRecord {
    /// Unique per row.
    pub id: RecordId,
    /// Source `IdLemma`, shared by every attestation of the same lemma.
    pub lemma_id: RecordId,
    pub headword: String,
    pub form: String,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub location_type: String,
    pub year: Option<i32>,
    pub period: String,
    pub categories: BTreeSet<String>,
    pub frequency: u64,
    pub external_url: Option<String>,
    pub region_code: Option<String>,
    /// Dialect area polygon id (IdAmbito).
    pub area_id: Option<u32>,
    /// Free-text dating note (Datazione).
    pub dating: Option<String>,
}

impl LemmaRecord {
    /// A record whose lemma id equals its row id.
    pub fn new(id: impl Into<RecordId>, headword: impl Into<String>, form: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            lemma_id: id.clone(),
            id,
            headword: headword.into(),
            form: form.into(),
            location: String::new(),
            coordinates: None,
            location_type: String::new(),
            year: None,
            period: String::new(),
            categories: BTreeSet::new(),
            frequency: 0,
            external_url: None,
            region_code: None,
            area_id: None,
            dating: None,
        }
    }

    pub fn with_lemma_id(mut self, lemma_id: impl Into<RecordId>) -> Self {
        self.lemma_id = lemma_id.into();
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_frequency(mut self, frequency: u64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_categories(mut self, raw: &str) -> Self {
        self.categories = split_categories(raw);
        self
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = period.into();
        self
    }

    pub fn with_location(mut self, name: impl Into<String>, coordinates: Option<Coordinates>) -> Self {
        self.location = name.into();
        self.coordinates = coordinates;
        self
    }

    pub fn with_region(mut self, location_type: impl Into<String>, region_code: impl Into<String>) -> Self {
        self.location_type = location_type.into();
        self.region_code = Some(region_code.into());
        self
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.contains(category)
    }

    pub fn has_any_category(&self, wanted: &BTreeSet<String>) -> bool {
        wanted.iter().any(|c| self.categories.contains(c))
    }

    /// Uppercased first character of the headword, used by the alphabetical index.
    pub fn initial(&self) -> Option<String> {
        self.headword.chars().next().map(|c| c.to_uppercase().collect())
    }
}

/// Text fields that take part in lookups and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordField {
    Headword,
    Form,
    Location,
}

impl RecordField {
    pub fn matches(&self, record: &LemmaRecord, value: &str) -> bool {
        self.value(record) == value
    }

    pub fn value<'a>(&self, record: &'a LemmaRecord) -> &'a str {
        match self {
            RecordField::Headword => &record.headword,
            RecordField::Form => &record.form,
            RecordField::Location => &record.location,
        }
    }
}

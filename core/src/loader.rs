//! Load boundary: raw sheet rows into typed records
//!
//! Accepts the pre-processed JSON export (`lemmi.json`) and the CSV sheet the
//! editors upload. Column names are the source sheet's Italian headers.
//! Rows that cannot be identified are rejected; unparsable optional fields
//! are dropped. Both outcomes are reported as [`RowWarning`]s.

use crate::error::{LemmarioError, Result};
use crate::records::{parse_frequency, parse_year, split_categories, Coordinates, LemmaRecord, RecordId};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    RowId,
    LemmaId,
    Headword,
    Form,
    Location,
    Latitude,
    Longitude,
    LocationType,
    Year,
    Period,
    Dating,
    Category,
    Frequency,
    Url,
    AreaId,
    RegionCode,
}

fn column_for(header: &str) -> Option<Column> {
    let header = header.trim_start_matches('\u{feff}').trim();
    Some(match header {
        "IdRecord" => Column::RowId,
        "IdLemma" => Column::LemmaId,
        "Lemma" => Column::Headword,
        "Forma" => Column::Form,
        "CollGeografica" | "Coll.Geografica" => Column::Location,
        "Latitudine" => Column::Latitude,
        "Longitudine" => Column::Longitude,
        "TipoCollGeografica" | "Tipo coll.Geografica" => Column::LocationType,
        "Anno" => Column::Year,
        "Periodo" => Column::Period,
        "Datazione" => Column::Dating,
        "Categoria" => Column::Category,
        "Frequenza" => Column::Frequency,
        "URL" => Column::Url,
        "IdAmbito" => Column::AreaId,
        "RegionIstatCode" | "reg_istat_code" => Column::RegionCode,
        _ => return None,
    })
}

#[derive(Debug, Default)]
struct RawRow {
    row_id: String,
    lemma_id: String,
    headword: String,
    form: String,
    location: String,
    latitude: String,
    longitude: String,
    location_type: String,
    year: String,
    period: String,
    dating: String,
    category: String,
    frequency: String,
    url: String,
    area_id: String,
    region_code: String,
}

impl RawRow {
    fn set(&mut self, column: Column, value: String) {
        let slot = match column {
            Column::RowId => &mut self.row_id,
            Column::LemmaId => &mut self.lemma_id,
            Column::Headword => &mut self.headword,
            Column::Form => &mut self.form,
            Column::Location => &mut self.location,
            Column::Latitude => &mut self.latitude,
            Column::Longitude => &mut self.longitude,
            Column::LocationType => &mut self.location_type,
            Column::Year => &mut self.year,
            Column::Period => &mut self.period,
            Column::Dating => &mut self.dating,
            Column::Category => &mut self.category,
            Column::Frequency => &mut self.frequency,
            Column::Url => &mut self.url,
            Column::AreaId => &mut self.area_id,
            Column::RegionCode => &mut self.region_code,
        };
        *slot = value;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum WarningKind {
    MissingId,
    DuplicateRowId(String),
    UnparsableYear(String),
    UnparsableFrequency(String),
    InvalidCoordinates(String),
    InvalidAreaId(String),
}

/// A data-quality problem found while normalising one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowWarning {
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub lemma_id: Option<RecordId>,
    #[serde(flatten)]
    pub kind: WarningKind,
}

impl RowWarning {
    /// Whether the row was dropped rather than partially kept.
    pub fn rejected(&self) -> bool {
        matches!(self.kind, WarningKind::MissingId | WarningKind::DuplicateRowId(_))
    }
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub records: Vec<LemmaRecord>,
    pub warnings: Vec<RowWarning>,
}

impl LoadReport {
    pub fn rejected_rows(&self) -> usize {
        self.warnings.iter().filter(|w| w.rejected()).count()
    }
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_rows(rows: Vec<RawRow>) -> LoadReport {
    let mut report = LoadReport::default();
    let mut seen: HashSet<RecordId> = HashSet::new();

    for (i, raw) in rows.into_iter().enumerate() {
        let row = i + 1;
        let lemma_id = RecordId::new(raw.lemma_id);
        if lemma_id.is_empty() {
            report.warnings.push(RowWarning { row, lemma_id: None, kind: WarningKind::MissingId });
            continue;
        }
        // An exported file carries its row ids; a fresh sheet is numbered by row.
        let id = match RecordId::new(raw.row_id) {
            explicit if !explicit.is_empty() => explicit,
            _ => RecordId::from(row as u64),
        };
        if !seen.insert(id.clone()) {
            let kind = WarningKind::DuplicateRowId(id.to_string());
            report.warnings.push(RowWarning { row, lemma_id: Some(lemma_id), kind });
            continue;
        }

        let mut warn = |kind: WarningKind| {
            report.warnings.push(RowWarning { row, lemma_id: Some(lemma_id.clone()), kind });
        };

        let year = parse_year(&raw.year);
        if year.is_none() && !raw.year.trim().is_empty() {
            warn(WarningKind::UnparsableYear(raw.year.clone()));
        }

        let frequency = parse_frequency(&raw.frequency);
        if frequency.is_none() && !raw.frequency.trim().is_empty() {
            warn(WarningKind::UnparsableFrequency(raw.frequency.clone()));
        }

        let coordinates = Coordinates::parse(&raw.latitude, &raw.longitude);
        let has_coordinate_text = [&raw.latitude, &raw.longitude]
            .iter()
            .any(|v| !v.trim().is_empty() && !v.trim().eq_ignore_ascii_case("#N/A"));
        if coordinates.is_none() && has_coordinate_text {
            warn(WarningKind::InvalidCoordinates(format!("{}, {}", raw.latitude.trim(), raw.longitude.trim())));
        }

        let area_id = raw.area_id.trim().parse::<u32>().ok();
        if area_id.is_none() && !raw.area_id.trim().is_empty() {
            warn(WarningKind::InvalidAreaId(raw.area_id.clone()));
        }

        report.records.push(LemmaRecord {
            id,
            lemma_id,
            headword: raw.headword.trim().to_string(),
            form: raw.form.trim().to_string(),
            location: raw.location.trim().to_string(),
            coordinates,
            location_type: raw.location_type.trim().to_string(),
            year,
            period: raw.period.trim().to_string(),
            categories: split_categories(&raw.category),
            frequency: frequency.unwrap_or(0),
            external_url: optional(raw.url),
            region_code: optional(raw.region_code),
            area_id,
            dating: optional(raw.dating),
        });
    }

    if !report.warnings.is_empty() {
        tracing::warn!(
            warnings = report.warnings.len(),
            rejected = report.rejected_rows(),
            "data-quality warnings while loading lemma rows"
        );
        for warning in &report.warnings {
            tracing::debug!(row = warning.row, lemma_id = ?warning.lemma_id, kind = ?warning.kind, "row warning");
        }
    }
    report
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Parse the JSON export: an array of objects keyed by source column name.
pub fn parse_json(text: &str) -> Result<LoadReport> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(items) = value else {
        return Err(LemmarioError::InvalidInput("expected a JSON array of lemma rows".to_string()));
    };

    let mut rows = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Value::Object(fields) = item else {
            return Err(LemmarioError::InvalidInput(format!("row {} is not a JSON object", i + 1)));
        };
        let mut raw = RawRow::default();
        for (name, value) in fields {
            if let (Some(column), Some(text)) = (column_for(name), scalar_text(value)) {
                raw.set(column, text);
            }
        }
        rows.push(raw);
    }
    Ok(normalize_rows(rows))
}

/// Parse the editors' CSV sheet. A sheet without data rows is rejected.
pub fn parse_csv<R: Read>(reader: R) -> Result<LoadReport> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns: Vec<Option<Column>> = csv_reader.headers()?.iter().map(column_for).collect();
    if !columns.contains(&Some(Column::LemmaId)) {
        return Err(LemmarioError::InvalidInput("CSV header has no IdLemma column".to_string()));
    }

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let mut raw = RawRow::default();
        for (column, field) in columns.iter().zip(record.iter()) {
            if let Some(column) = column {
                raw.set(*column, field.to_string());
            }
        }
        rows.push(raw);
    }

    if rows.is_empty() {
        return Err(LemmarioError::InvalidInput("CSV file is empty".to_string()));
    }
    Ok(normalize_rows(rows))
}

/// Load a `.json` or `.csv` file.
pub fn load_path(path: &Path) -> Result<LoadReport> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "json" => parse_json(&std::fs::read_to_string(path)?),
        "csv" => parse_csv(File::open(path)?),
        other => Err(LemmarioError::InvalidInput(format!("unsupported data file extension: {other:?}"))),
    }
}

/// Source-keyed row as written to `lemmi.json`.
#[derive(Serialize)]
struct SourceRow<'a> {
    #[serde(rename = "IdRecord")]
    id: &'a str,
    #[serde(rename = "IdLemma")]
    lemma_id: &'a str,
    #[serde(rename = "Lemma")]
    headword: &'a str,
    #[serde(rename = "Forma")]
    form: &'a str,
    #[serde(rename = "CollGeografica")]
    location: &'a str,
    #[serde(rename = "Latitudine")]
    latitude: Option<f64>,
    #[serde(rename = "Longitudine")]
    longitude: Option<f64>,
    #[serde(rename = "TipoCollGeografica")]
    location_type: &'a str,
    #[serde(rename = "Anno")]
    year: Option<i32>,
    #[serde(rename = "Periodo")]
    period: &'a str,
    #[serde(rename = "Datazione")]
    dating: Option<&'a str>,
    #[serde(rename = "Categoria")]
    category: String,
    #[serde(rename = "Frequenza")]
    frequency: u64,
    #[serde(rename = "URL")]
    url: Option<&'a str>,
    #[serde(rename = "IdAmbito")]
    area_id: Option<u32>,
    #[serde(rename = "RegionIstatCode")]
    region_code: Option<&'a str>,
}

impl<'a> From<&'a LemmaRecord> for SourceRow<'a> {
    fn from(record: &'a LemmaRecord) -> Self {
        Self {
            id: record.id.as_str(),
            lemma_id: record.lemma_id.as_str(),
            headword: &record.headword,
            form: &record.form,
            location: &record.location,
            latitude: record.coordinates.map(|c| c.lat),
            longitude: record.coordinates.map(|c| c.lng),
            location_type: &record.location_type,
            year: record.year,
            period: &record.period,
            dating: record.dating.as_deref(),
            category: record.categories.iter().map(String::as_str).collect::<Vec<_>>().join(", "),
            frequency: record.frequency,
            url: record.external_url.as_deref(),
            area_id: record.area_id,
            region_code: record.region_code.as_deref(),
        }
    }
}

/// Serialise records back to the source-keyed JSON array that
/// [`parse_json`] reads.
pub fn export_json(records: &[LemmaRecord]) -> Result<String> {
    let rows: Vec<SourceRow<'_>> = records.iter().map(SourceRow::from).collect();
    Ok(serde_json::to_string(&rows)?)
}

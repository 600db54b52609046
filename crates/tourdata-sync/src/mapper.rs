//! Field mapping from upstream items to table rows
//!
//! Each source has a fixed field table naming the destination column, the
//! upstream key it is read from and the column's type. Upstream keys are
//! camelCase in places; columns are always lowercase.

use crate::error::{Result, SyncError};
use crate::models::{ColumnValue, NormalizedRecord};
use crate::source::SourceType;
use serde_json::{Map, Value};
use tourdata_common::hash::data_hash;
use tracing::warn;

/// Destination type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Nullable text
    Text,
    /// Single-column natural key; absent becomes ""
    Key,
    Float,
    Int,
}

/// One column of a source's field table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub column: &'static str,
    pub source_key: &'static str,
    pub kind: FieldKind,
}

const fn text(column: &'static str, source_key: &'static str) -> FieldSpec {
    FieldSpec {
        column,
        source_key,
        kind: FieldKind::Text,
    }
}

const fn key(column: &'static str, source_key: &'static str) -> FieldSpec {
    FieldSpec {
        column,
        source_key,
        kind: FieldKind::Key,
    }
}

const fn float(column: &'static str, source_key: &'static str) -> FieldSpec {
    FieldSpec {
        column,
        source_key,
        kind: FieldKind::Float,
    }
}

const fn int(column: &'static str, source_key: &'static str) -> FieldSpec {
    FieldSpec {
        column,
        source_key,
        kind: FieldKind::Int,
    }
}

const GREENTOUR_FIELDS: &[FieldSpec] = &[
    key("contentid", "contentid"),
    text("areacode", "areacode"),
    text("sigungucode", "sigungucode"),
    text("title", "title"),
    text("addr", "addr"),
    text("tel", "tel"),
    text("telname", "telname"),
    text("mainimage", "mainimage"),
    text("summary", "summary"),
    text("createdtime", "createdtime"),
    text("modifiedtime", "modifiedtime"),
    text("cpyrhtdivcd", "cpyrhtDivCd"),
];

const BARRIER_FREE_FIELDS: &[FieldSpec] = &[
    key("contentid", "contentid"),
    text("contenttypeid", "contenttypeid"),
    text("areacode", "areacode"),
    text("sigungucode", "sigungucode"),
    text("cat1", "cat1"),
    text("cat2", "cat2"),
    text("cat3", "cat3"),
    text("title", "title"),
    text("addr1", "addr1"),
    text("addr2", "addr2"),
    text("tel", "tel"),
    text("firstimage", "firstimage"),
    text("firstimage2", "firstimage2"),
    float("mapx", "mapx"),
    float("mapy", "mapy"),
    int("mlevel", "mlevel"),
    text("zipcode", "zipcode"),
    text("createdtime", "createdtime"),
    text("modifiedtime", "modifiedtime"),
    text("cpyrhtdivcd", "cpyrhtDivCd"),
    text("lclssystm1", "lclsSystm1"),
    text("lclssystm2", "lclsSystm2"),
    text("lclssystm3", "lclsSystm3"),
    text("ldongregn_cd", "lDongRegnCd"),
    text("ldongsigngu_cd", "lDongSignguCd"),
];

// Composite key parts stay nullable; only a single-column key defaults to "".
const BASE_TOUR_FIELDS: &[FieldSpec] = &[
    key("hubtatscode", "hubTatsCd"),
    text("baseym", "baseYm"),
    text("areacd", "areaCd"),
    text("areanm", "areaNm"),
    text("signgucd", "signguCd"),
    text("signgunm", "signguNm"),
    text("hubtatsname", "hubTatsNm"),
    text("hubctgrylclsnm", "hubCtgryLclsNm"),
    text("hubctgrymclsnm", "hubCtgryMclsNm"),
    int("hubrank", "hubRank"),
    float("mapx", "mapX"),
    float("mapy", "mapY"),
];

/// Field table of `source`
pub fn field_specs(source: SourceType) -> &'static [FieldSpec] {
    match source {
        SourceType::GreenTour => GREENTOUR_FIELDS,
        SourceType::BarrierFree => BARRIER_FREE_FIELDS,
        SourceType::BaseTour => BASE_TOUR_FIELDS,
    }
}

/// Normalize one upstream item.
///
/// The fingerprint is computed over the whole raw item, so a change in an
/// unmapped field still counts as a change.
pub fn try_map(source: SourceType, item: &Value) -> Result<NormalizedRecord> {
    let object = item.as_object().ok_or_else(|| {
        SyncError::mapping(source.api_type(), format!("expected an object, got {}", kind_of(item)))
    })?;

    let columns = field_specs(source)
        .iter()
        .map(|spec| Ok((spec.column, coerce(source, spec, object)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(NormalizedRecord::new(
        source,
        columns,
        data_hash(item),
        item.clone(),
    ))
}

/// Normalize one item, logging and dropping it on failure
pub fn map(source: SourceType, item: &Value) -> Option<NormalizedRecord> {
    match try_map(source, item) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(api_type = source.api_type(), error = %e, "Skipping item");
            None
        },
    }
}

/// Records mapped from a batch of items
#[derive(Debug, Default)]
pub struct MappedBatch {
    pub records: Vec<NormalizedRecord>,
    /// Items that could not be mapped
    pub failed: usize,
}

/// Normalize every item, keeping input order
pub fn map_items(source: SourceType, items: &[Value]) -> MappedBatch {
    let mut batch = MappedBatch::default();
    for item in items {
        match map(source, item) {
            Some(record) => batch.records.push(record),
            None => batch.failed += 1,
        }
    }
    batch
}

fn coerce(source: SourceType, spec: &FieldSpec, object: &Map<String, Value>) -> Result<ColumnValue> {
    let raw = object.get(spec.source_key);
    match spec.kind {
        FieldKind::Text => Ok(ColumnValue::Text(raw.and_then(as_text))),
        FieldKind::Key => Ok(ColumnValue::Text(Some(
            raw.and_then(as_text).unwrap_or_default(),
        ))),
        FieldKind::Float => as_float(raw)
            .map(ColumnValue::Float)
            .map_err(|reason| field_error(source, spec, reason)),
        FieldKind::Int => as_int(raw)
            .map(ColumnValue::Int)
            .map_err(|reason| field_error(source, spec, reason)),
    }
}

fn field_error(source: SourceType, spec: &FieldSpec, reason: String) -> SyncError {
    SyncError::mapping(source.api_type(), format!("field '{}': {}", spec.source_key, reason))
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        nested => Some(nested.to_string()),
    }
}

/// Absent, null and blank strings are "no value"
fn numeric_text(value: Option<&Value>) -> Option<&Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(v),
    }
}

fn as_float(value: Option<&Value>) -> std::result::Result<Option<f64>, String> {
    let Some(value) = numeric_text(value) else {
        return Ok(None);
    };
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("{} is not a finite number", n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Some)
            .ok_or_else(|| format!("'{}' is not a number", s)),
        other => Err(format!("expected a number, got {}", kind_of(other))),
    }
}

fn as_int(value: Option<&Value>) -> std::result::Result<Option<i64>, String> {
    let Some(value) = numeric_text(value) else {
        return Ok(None);
    };
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .map(Some)
            .ok_or_else(|| format!("{} is out of range", n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("'{}' is not an integer", s)),
        other => Err(format!("expected an integer, got {}", kind_of(other))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/*!
 * Annotated-CSV decoding for store query results
 *
 * Flux query responses arrive as annotated CSV: `#datatype`, `#group`, and
 * `#default` annotation rows, a header row, then data rows, with the block
 * repeating per result table. The `#datatype` row is authoritative for field
 * typing, so a `3` in a `long` column stays an integer and a `3` in a
 * `double` column stays a float all the way through to the write side.
 *
 * Columns `_time`, `_value`, `_field`, and `_measurement` are structural;
 * `result`, `table`, `_start`, and `_stop` are bookkeeping; every remaining
 * column is a tag.
 */

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::store::point::{DataPoint, FieldValue};
use crate::store::StoreError;

const STRUCTURAL_COLUMNS: &[&str] = &["", "result", "table", "_start", "_stop"];

/// Decode a full annotated-CSV response body into points.
pub fn decode_points(body: &str) -> Result<Vec<DataPoint>, StoreError> {
    let mut points = Vec::new();
    let mut table = TableLayout::default();

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            table.reset();
            continue;
        }
        if line.starts_with('#') {
            // A new annotation block starts a new table layout.
            if table.header_seen() {
                table.reset();
            }
            // Annotation cells align with header columns one-to-one, the
            // `#datatype` label sitting in the bookkeeping column.
            if line.starts_with("#datatype,") {
                table.datatypes = split_row(line);
            }
            continue;
        }

        let cells = split_row(line);
        if !table.header_seen() {
            table.set_header(cells);
            continue;
        }

        if let Some(point) = table.decode_row(&cells)? {
            points.push(point);
        }
    }

    Ok(points)
}

/// Scan a response body for the greatest `_time` value.
///
/// Used for watermark discovery, where the query already reduces each table
/// to its last row and only the timestamp matters.
pub fn max_time(body: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let points = decode_points(body)?;
    Ok(points.into_iter().map(|p| p.time).max())
}

/// Column layout of the table currently being decoded.
#[derive(Debug, Default)]
struct TableLayout {
    datatypes: Vec<String>,
    time_idx: Option<usize>,
    value_idx: Option<usize>,
    field_idx: Option<usize>,
    measurement_idx: Option<usize>,
    tag_columns: Vec<(usize, String)>,
    header: bool,
}

impl TableLayout {
    fn reset(&mut self) {
        *self = TableLayout::default();
    }

    fn header_seen(&self) -> bool {
        self.header
    }

    fn set_header(&mut self, cells: Vec<String>) {
        for (i, name) in cells.iter().enumerate() {
            match name.as_str() {
                "_time" => self.time_idx = Some(i),
                "_value" => self.value_idx = Some(i),
                "_field" => self.field_idx = Some(i),
                "_measurement" => self.measurement_idx = Some(i),
                other if STRUCTURAL_COLUMNS.contains(&other) => {}
                other => self.tag_columns.push((i, other.to_string())),
            }
        }
        self.header = true;
    }

    fn decode_row(&self, cells: &[String]) -> Result<Option<DataPoint>, StoreError> {
        let (time_idx, value_idx, field_idx, measurement_idx) = match (
            self.time_idx,
            self.value_idx,
            self.field_idx,
            self.measurement_idx,
        ) {
            (Some(t), Some(v), Some(f), Some(m)) => (t, v, f, m),
            // Tables without the structural columns (e.g. an error table)
            // carry no points.
            _ => return Ok(None),
        };

        let cell = |idx: usize| -> Result<&str, StoreError> {
            cells.get(idx).map(|s| s.as_str()).ok_or_else(|| {
                StoreError::Decode(format!("row has {} cells, need column {}", cells.len(), idx))
            })
        };

        let time_raw = cell(time_idx)?;
        let time = DateTime::parse_from_rfc3339(time_raw)
            .map_err(|e| StoreError::Decode(format!("bad _time '{}': {}", time_raw, e)))?
            .with_timezone(&Utc);

        let value = decode_value(cell(value_idx)?, self.datatypes.get(value_idx))?;

        let mut tags = BTreeMap::new();
        for (idx, name) in &self.tag_columns {
            let raw = cell(*idx)?;
            if !raw.is_empty() {
                tags.insert(name.clone(), raw.to_string());
            }
        }

        Ok(Some(DataPoint {
            measurement: cell(measurement_idx)?.to_string(),
            tags,
            fields: BTreeMap::from([(cell(field_idx)?.to_string(), value)]),
            time,
        }))
    }
}

fn decode_value(raw: &str, datatype: Option<&String>) -> Result<FieldValue, StoreError> {
    let parse_err =
        |kind: &str| StoreError::Decode(format!("bad {} field value '{}'", kind, raw));

    match datatype.map(|s| s.as_str()) {
        Some("double") => raw
            .parse::<f64>()
            .map(FieldValue::Float)
            .map_err(|_| parse_err("double")),
        Some("long") => raw
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| parse_err("long")),
        Some("unsignedLong") => raw
            .parse::<u64>()
            .map(FieldValue::UInteger)
            .map_err(|_| parse_err("unsignedLong")),
        Some("boolean") => raw
            .parse::<bool>()
            .map(FieldValue::Boolean)
            .map_err(|_| parse_err("boolean")),
        Some("string") => Ok(FieldValue::Text(raw.to_string())),
        // No annotation available: numeric if it parses, text otherwise.
        _ => Ok(raw
            .parse::<f64>()
            .map(FieldValue::Float)
            .unwrap_or_else(|_| FieldValue::Text(raw.to_string()))),
    }
}

/// Split one CSV row, honoring double-quoted cells and doubled quotes.
fn split_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => quoted = false,
                other => cell.push(other),
            }
        } else {
            match c {
                '"' => quoted = true,
                ',' => cells.push(std::mem::take(&mut cell)),
                other => cell.push(other),
            }
        }
    }
    cells.push(cell);
    cells
}

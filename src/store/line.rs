/*!
 * Line-protocol encoding for store writes
 *
 * Renders `DataPoint` batches into the store's text write format:
 *
 * ```text
 * measurement,tag=value field=1.5,other="text" 1672531200000000000
 * ```
 *
 * Timestamps are encoded at nanosecond precision; write requests must set
 * `precision=ns` to match.
 */

use crate::store::point::{DataPoint, FieldValue};

/// Encode a batch of points, one line each, newline-terminated.
pub fn encode_batch(points: &[DataPoint]) -> String {
    let mut out = String::new();
    for point in points {
        encode_point(point, &mut out);
        out.push('\n');
    }
    out
}

fn encode_point(point: &DataPoint, out: &mut String) {
    out.push_str(&escape_measurement(&point.measurement));

    for (key, value) in &point.tags {
        out.push(',');
        out.push_str(&escape_key(key));
        out.push('=');
        out.push_str(&escape_key(value));
    }

    out.push(' ');
    let mut first = true;
    for (key, value) in &point.fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape_key(key));
        out.push('=');
        out.push_str(&encode_field_value(value));
    }

    // Timestamps outside the ns-representable range (~1677..2262) have no
    // line-protocol encoding; clamp to the epoch.
    let nanos = point.time.timestamp_nanos_opt().unwrap_or(0);
    out.push(' ');
    out.push_str(&nanos.to_string());
}

fn encode_field_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format_float(*v),
        FieldValue::Integer(v) => format!("{}i", v),
        FieldValue::UInteger(v) => format!("{}u", v),
        FieldValue::Text(v) => format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")),
        FieldValue::Boolean(v) => v.to_string(),
    }
}

/// Floats must stay floats on re-read: a value like `3.0` rendered as `3`
/// would be stored as an integer and change the series schema.
fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Measurements escape commas and spaces
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values, and field keys escape commas, equals, and spaces
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

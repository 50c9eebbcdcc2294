//! Decoding delimited text into row objects

use super::detect::detect_delimiter;
use super::encode::BOM;
use super::options::{DecodeOptions, check_delimiter};
use super::parse::{parse_line, split_records};
use crate::error::Result;
use serde_json::{Map, Value};

/// Decode delimited text into one JSON object per record
///
/// The delimiter is auto-detected when not supplied. Headers come from the
/// first record, or are synthesised as `column_1`, `column_2`, ... when
/// `has_headers` is false. Short records are padded with empty strings and
/// fields beyond the header row get synthesised names.
///
/// # Examples
///
/// ```
/// use tabula_export::csv::{DecodeOptions, decode_table};
///
/// let rows = decode_table("sku;qty\r\nA1;4\r\n", &DecodeOptions::default()).unwrap();
/// assert_eq!(rows.len(), 1);
/// assert_eq!(rows[0]["sku"], "A1");
/// assert_eq!(rows[0]["qty"], "4");
/// ```
pub fn decode_table(text: &str, options: &DecodeOptions) -> Result<Vec<Map<String, Value>>> {
    let text = text.strip_prefix(BOM).unwrap_or(text);

    let delimiter = match options.delimiter {
        Some(d) => d,
        None => detect_delimiter(text, &options.detection),
    };
    check_delimiter(delimiter, options.quote_char)?;

    let mut records = split_records(text, options.quote_char)
        .into_iter()
        .filter(|record| !(options.skip_empty_lines && record.trim().is_empty()))
        .map(|record| {
            let mut fields = parse_line(record, delimiter, options.quote_char);
            if options.trim_values {
                for field in &mut fields {
                    *field = field.trim().to_string();
                }
            }
            fields
        });

    let headers: Vec<String> = if options.has_headers {
        match records.next() {
            Some(header) => header,
            None => return Ok(Vec::new()),
        }
    } else {
        Vec::new()
    };

    let rows: Vec<Map<String, Value>> = records
        .map(|fields| {
            let width = headers.len().max(fields.len());
            let mut fields = fields.into_iter();
            (0..width)
                .map(|i| {
                    let key = headers
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| synthetic_header(i));
                    (key, Value::String(fields.next().unwrap_or_default()))
                })
                .collect()
        })
        .collect();

    tracing::debug!(
        rows = rows.len(),
        columns = headers.len(),
        delimiter = ?delimiter,
        "decoded table"
    );
    Ok(rows)
}

fn synthetic_header(index: usize) -> String {
    format!("column_{}", index + 1)
}

//! Encoding rows and tables into delimited text

use super::cell::Cell;
use super::column::{ColumnDescriptor, infer_columns};
use super::dataset::Dataset;
use super::options::{DatasetNameStyle, EncodeOptions, MultiDatasetOptions};
use serde::Serialize;
use serde_json::Value;

/// UTF-8 byte order mark
pub const BOM: char = '\u{FEFF}';

/// Summary of one encode call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EncodeReport {
    /// Data rows written (header excluded)
    pub rows_written: usize,
    /// Rows skipped because they could not be resolved
    pub rows_skipped: usize,
    /// Widest column count across encoded tables
    pub columns: usize,
    /// One message per skipped row
    pub warnings: Vec<String>,
}

impl EncodeReport {
    fn absorb(&mut self, other: EncodeReport) {
        self.rows_written += other.rows_written;
        self.rows_skipped += other.rows_skipped;
        self.columns = self.columns.max(other.columns);
        self.warnings.extend(other.warnings);
    }
}

/// Returns true if `text` must be quoted under `options`
///
/// A field is quoted iff it is empty, contains the delimiter, the quote
/// character or a line terminator, or has leading/trailing whitespace.
pub fn needs_quoting(text: &str, options: &EncodeOptions) -> bool {
    options.always_quote
        || text.is_empty()
        || text.contains(options.delimiter)
        || text.contains(options.quote_char)
        || text.contains(['\r', '\n'])
        || text.starts_with(char::is_whitespace)
        || text.ends_with(char::is_whitespace)
}

fn quote_text(text: &str, options: &EncodeOptions) -> String {
    if !needs_quoting(text, options) {
        return text.to_string();
    }

    let q = options.quote_char;
    let mut out = String::with_capacity(text.len() + 2);
    out.push(q);
    for ch in text.chars() {
        if ch == q {
            out.push(q);
        }
        out.push(ch);
    }
    out.push(q);
    out
}

/// Normalise a cell to text and quote it if needed
///
/// # Examples
///
/// ```
/// use tabula_export::csv::{Cell, EncodeOptions, escape_value};
///
/// let opts = EncodeOptions::default();
/// assert_eq!(escape_value(&Cell::from("plain"), &opts), "plain");
/// assert_eq!(escape_value(&Cell::from("x,y"), &opts), "\"x,y\"");
/// assert_eq!(escape_value(&Cell::from("say \"hi\""), &opts), "\"say \"\"hi\"\"\"");
/// ```
pub fn escape_value(cell: &Cell, options: &EncodeOptions) -> String {
    quote_text(&cell.stringify(options), options)
}

/// Escape every cell and join with the delimiter (no line terminator)
pub fn encode_row(cells: &[Cell], options: &EncodeOptions) -> String {
    let mut buf = [0u8; 4];
    let delimiter: &str = options.delimiter.encode_utf8(&mut buf);
    cells
        .iter()
        .map(|cell| escape_value(cell, options))
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Encode rows into a table, post-processed per `options`
///
/// # Examples
///
/// ```
/// use tabula_export::csv::{ColumnDescriptor, EncodeOptions, encode_table};
/// use serde_json::json;
///
/// let rows = vec![json!({"a": "x,y", "b": 1})];
/// let columns = vec![ColumnDescriptor::new("a"), ColumnDescriptor::new("b")];
/// let text = encode_table(&rows, &columns, &EncodeOptions::default());
/// assert_eq!(text, "a,b\r\n\"x,y\",1\r\n");
/// ```
pub fn encode_table(rows: &[Value], columns: &[ColumnDescriptor], options: &EncodeOptions) -> String {
    encode_table_with_report(rows, columns, options).0
}

/// Like [`encode_table`], also returning what was written and skipped
pub fn encode_table_with_report(
    rows: &[Value],
    columns: &[ColumnDescriptor],
    options: &EncodeOptions,
) -> (String, EncodeReport) {
    let (raw, report) = encode_table_raw(rows, columns, options);
    (post_process(&raw, options), report)
}

fn encode_table_raw(
    rows: &[Value],
    columns: &[ColumnDescriptor],
    options: &EncodeOptions,
) -> (String, EncodeReport) {
    let inferred;
    let columns = if columns.is_empty() {
        inferred = infer_columns(rows);
        inferred.as_slice()
    } else {
        columns
    };

    let eol = options.line_ending.as_str();
    let mut out = String::new();
    let mut report = EncodeReport {
        columns: columns.len(),
        ..Default::default()
    };

    if options.include_headers && !columns.is_empty() {
        let labels: Vec<Cell> = columns.iter().map(|c| Cell::from(c.label())).collect();
        out.push_str(&encode_row(&labels, options));
        out.push_str(eol);
    }

    'rows: for (index, row) in rows.iter().enumerate() {
        let mut cells = Vec::with_capacity(columns.len());
        for column in columns {
            match column.resolve(row, index) {
                Ok(cell) => cells.push(cell),
                Err(e) => {
                    tracing::warn!(row = index, error = %e, "skipping row that failed to resolve");
                    report.rows_skipped += 1;
                    report.warnings.push(format!("row {index} skipped: {e}"));
                    continue 'rows;
                }
            }
        }
        out.push_str(&encode_row(&cells, options));
        out.push_str(eol);
        report.rows_written += 1;
    }

    (out, report)
}

/// Encode several datasets into one output separated into sections
pub fn encode_multi_dataset(
    datasets: &[Dataset],
    options: &EncodeOptions,
    multi: &MultiDatasetOptions,
) -> String {
    encode_multi_dataset_with_report(datasets, options, multi).0
}

/// Like [`encode_multi_dataset`], also returning the combined report
pub fn encode_multi_dataset_with_report(
    datasets: &[Dataset],
    options: &EncodeOptions,
    multi: &MultiDatasetOptions,
) -> (String, EncodeReport) {
    let mut report = EncodeReport::default();
    let mut sections = Vec::with_capacity(datasets.len());

    for dataset in datasets {
        let dataset_options = dataset.options.as_ref().unwrap_or(options);
        let mut section = String::new();

        if multi.include_dataset_names && !dataset.name.is_empty() {
            section.push_str(&name_line(&dataset.name, multi.dataset_name_style, dataset_options));
            section.push_str(options.line_ending.as_str());
        }

        let (table, table_report) = encode_table_raw(&dataset.rows, &dataset.columns, dataset_options);
        section.push_str(&table);
        report.absorb(table_report);
        sections.push(section);
    }

    (post_process(&sections.join(multi.section_separator.as_str()), options), report)
}

fn name_line(name: &str, style: DatasetNameStyle, options: &EncodeOptions) -> String {
    match style {
        DatasetNameStyle::Comment => format!("# === {name} ==="),
        DatasetNameStyle::Header => escape_value(&Cell::from(name), options),
        DatasetNameStyle::Section => format!("[{name}]"),
    }
}

/// Normalise line terminators, optionally drop empty or trim lines, optionally add a BOM
///
/// Terminators inside quoted fields are normalised as well, so a value
/// containing `\n` decodes back with the configured line ending (`\r\n` by
/// default). Round trips are exact only for values without line breaks.
pub fn post_process(text: &str, options: &EncodeOptions) -> String {
    let eol = options.line_ending.as_str();
    let mut normalized = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                normalized.push_str(eol);
            }
            '\n' => normalized.push_str(eol),
            other => normalized.push(other),
        }
    }

    if options.skip_empty_lines || options.trim_lines {
        let terminated = normalized.ends_with(eol);
        let body = normalized.strip_suffix(eol).unwrap_or(&normalized);
        let lines: Vec<&str> = body
            .split(eol)
            .map(|line| if options.trim_lines { line.trim() } else { line })
            .filter(|line| !(options.skip_empty_lines && line.is_empty()))
            .collect();
        let mut joined = lines.join(eol);
        if terminated && !joined.is_empty() {
            joined.push_str(eol);
        }
        normalized = joined;
    }

    if options.include_bom {
        normalized.insert(0, BOM);
    }
    normalized
}

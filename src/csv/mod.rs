//! RFC-4180 style CSV codec
//!
//! Pure functions for converting between tabular data and delimited text; no
//! I/O and no state.
//!
//! ## Encoding
//!
//! Values are normalised to text ([`Cell::stringify`]) and quoted only when
//! required: a field is quoted iff it is empty, contains the delimiter, the
//! quote character or a line terminator, or has leading/trailing whitespace.
//! Embedded quotes are doubled. After encoding, line terminators are normalised
//! to the configured [`LineEnding`] and an optional BOM is prepended.
//!
//! ```
//! use tabula_export::csv::{ColumnDescriptor, EncodeOptions, encode_table};
//! use serde_json::json;
//!
//! let rows = vec![json!({"sku": "A1", "stock": {"qty": 4}})];
//! let columns = vec![
//!     ColumnDescriptor::new("sku").with_header("SKU"),
//!     ColumnDescriptor::new("stock.qty").with_header("Qty"),
//! ];
//! assert_eq!(encode_table(&rows, &columns, &EncodeOptions::default()), "SKU,Qty\r\nA1,4\r\n");
//! ```
//!
//! ## Decoding
//!
//! [`decode_table`] splits records with a quote-aware scanner, parses each with
//! the two-state [`parse_line`] automaton, and auto-detects the delimiter with
//! [`detect_delimiter`] when none is given.

mod cell;
mod column;
mod dataset;
mod decode;
mod detect;
mod encode;
mod options;
mod parse;
mod validate;

pub use cell::Cell;
pub use column::{ColumnDescriptor, Formatter, infer_columns, lookup_path};
pub use dataset::Dataset;
pub use decode::decode_table;
pub use detect::{DelimiterProfile, detect_delimiter, score_delimiters};
pub use encode::{
    BOM, EncodeReport, encode_multi_dataset, encode_multi_dataset_with_report, encode_row,
    encode_table, encode_table_with_report, escape_value, needs_quoting, post_process,
};
pub use options::{
    BooleanFormat, DatasetNameStyle, DecodeOptions, DetectOptions, EncodeOptions, LineEnding,
    MultiDatasetOptions,
};
pub use parse::{parse_line, split_records};
pub use validate::{
    DEFAULT_OVERSIZE_THRESHOLD, ValidationReport, validate, validate_rows, validate_with_threshold,
};

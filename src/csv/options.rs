//! Encode, decode and detection options for the CSV codec

use crate::error::{CsvError, Result};
use serde::{Deserialize, Serialize};

/// How boolean cells are written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanFormat {
    /// `TRUE` / `FALSE` (default)
    #[default]
    Text,
    /// `1` / `0`
    Number,
    /// `✓` / `✗`
    Symbol,
}

impl BooleanFormat {
    /// Render a boolean in this format
    pub fn render(self, value: bool) -> &'static str {
        match (self, value) {
            (BooleanFormat::Text, true) => "TRUE",
            (BooleanFormat::Text, false) => "FALSE",
            (BooleanFormat::Number, true) => "1",
            (BooleanFormat::Number, false) => "0",
            (BooleanFormat::Symbol, true) => "✓",
            (BooleanFormat::Symbol, false) => "✗",
        }
    }
}

/// Line terminator written between records
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// `\r\n` (default, RFC 4180)
    #[default]
    Crlf,
    /// `\n`
    Lf,
    /// `\r`
    Cr,
}

impl LineEnding {
    /// The terminator as a string slice
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Crlf => "\r\n",
            LineEnding::Lf => "\n",
            LineEnding::Cr => "\r",
        }
    }
}

/// Style of the name line written before each section of a multi-dataset export
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetNameStyle {
    /// `# === name ===` (default)
    #[default]
    Comment,
    /// The name as a single escaped field
    Header,
    /// `[name]`
    Section,
}

/// Options controlling how values, rows and tables are encoded
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Field separator (default: ',')
    pub delimiter: char,

    /// Quoting character (default: '"')
    pub quote_char: char,

    /// Line terminator (default: CRLF)
    pub line_ending: LineEnding,

    /// Write a header row from column labels (default: true)
    pub include_headers: bool,

    /// Prefix the output with a UTF-8 byte order mark (default: false)
    pub include_bom: bool,

    /// Boolean rendering (default: TRUE/FALSE)
    pub boolean_format: BooleanFormat,

    /// Substitution for null values (default: empty string)
    pub null_value: String,

    /// Substitution for missing values (default: empty string)
    pub undefined_value: String,

    /// Quote every field regardless of content (default: false)
    pub always_quote: bool,

    /// Drop empty lines during post-processing (default: false)
    pub skip_empty_lines: bool,

    /// Trim surrounding whitespace from every line during post-processing (default: false)
    pub trim_lines: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote_char: '"',
            line_ending: LineEnding::Crlf,
            include_headers: true,
            include_bom: false,
            boolean_format: BooleanFormat::Text,
            null_value: String::new(),
            undefined_value: String::new(),
            always_quote: false,
            skip_empty_lines: false,
            trim_lines: false,
        }
    }
}

impl EncodeOptions {
    /// Reject delimiter/quote combinations that would make the output ambiguous
    pub fn check(&self) -> Result<()> {
        check_delimiter(self.delimiter, self.quote_char)
    }
}

/// Options for combining several datasets into one output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiDatasetOptions {
    /// Text placed between sections (default: one blank line)
    pub section_separator: String,

    /// Write a name line before each section (default: true)
    pub include_dataset_names: bool,

    /// Style of the name line (default: comment)
    pub dataset_name_style: DatasetNameStyle,
}

impl Default for MultiDatasetOptions {
    fn default() -> Self {
        Self {
            section_separator: "\n".to_string(),
            include_dataset_names: true,
            dataset_name_style: DatasetNameStyle::Comment,
        }
    }
}

/// Options for delimiter auto-detection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectOptions {
    /// Candidate separators in priority order (default: `,` `;` `\t` `|`)
    pub candidates: Vec<char>,

    /// Minimum fraction of sampled lines that must agree on the column count (default: 0.8)
    pub min_consistency: f64,

    /// Number of non-empty lines to sample (default: 5)
    pub sample_lines: usize,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            candidates: vec![',', ';', '\t', '|'],
            min_consistency: 0.8,
            sample_lines: 5,
        }
    }
}

/// Options controlling how delimited text is decoded into rows
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Field separator; auto-detected when `None`
    pub delimiter: Option<char>,

    /// Quoting character (default: '"')
    pub quote_char: char,

    /// Treat the first record as the header row (default: true)
    pub has_headers: bool,

    /// Ignore blank records (default: true)
    pub skip_empty_lines: bool,

    /// Trim whitespace around every decoded value (default: false)
    pub trim_values: bool,

    /// Delimiter detection settings
    pub detection: DetectOptions,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote_char: '"',
            has_headers: true,
            skip_empty_lines: true,
            trim_values: false,
            detection: DetectOptions::default(),
        }
    }
}

pub(crate) fn check_delimiter(delimiter: char, quote_char: char) -> Result<()> {
    if delimiter == quote_char {
        return Err(CsvError::InvalidDelimiter {
            delimiter,
            reason: "delimiter must differ from the quote character".to_string(),
        }
        .into());
    }
    if delimiter == '\r' || delimiter == '\n' {
        return Err(CsvError::InvalidDelimiter {
            delimiter,
            reason: "delimiter cannot be a line terminator".to_string(),
        }
        .into());
    }
    Ok(())
}

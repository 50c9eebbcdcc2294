//! Export artifacts: bytes plus the metadata needed to save or serve them

use crate::csv::EncodeReport;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// MIME type of CSV artifacts
pub const MIME_CSV: &str = "text/csv;charset=utf-8";

/// MIME type of JSON artifacts
pub const MIME_JSON: &str = "application/json";

/// MIME type used when nothing better is known
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Default maximum filename length in characters
pub const DEFAULT_MAX_FILENAME_LEN: usize = 200;

/// Counts describing what went into an artifact
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStats {
    /// Number of datasets encoded
    pub datasets: usize,
    /// Rows written
    pub rows: usize,
    /// Rows skipped because they failed to resolve
    pub skipped_rows: usize,
    /// Widest column count across datasets
    pub columns: usize,
    /// Lines in the encoded output
    pub lines: usize,
    /// Size of the content in bytes
    pub bytes: usize,
}

impl ArtifactStats {
    /// Build stats for encoded text from the encoder's report
    pub fn from_report(report: &EncodeReport, datasets: usize, text: &str) -> Self {
        Self {
            datasets,
            rows: report.rows_written,
            skipped_rows: report.rows_skipped,
            columns: report.columns,
            lines: text.lines().count(),
            bytes: text.len(),
        }
    }
}

/// The result of one successful export or download
///
/// Ownership of the content passes to the caller; nothing else keeps a copy.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportArtifact {
    /// Encoded bytes
    pub content: Vec<u8>,
    /// MIME type of `content`
    pub mime_type: String,
    /// Sanitised filename suggested for saving
    pub suggested_filename: String,
    /// Format key that produced the artifact (e.g. "csv")
    pub format: String,
    /// What went into the artifact
    pub stats: ArtifactStats,
    /// Free-form extra information (source URL, dataset names, ...)
    pub metadata: Map<String, Value>,
}

impl ExportArtifact {
    /// Create an artifact; the filename defaults to a timestamped name for `format`
    pub fn new(content: Vec<u8>, mime_type: impl Into<String>, format: impl Into<String>) -> Self {
        let format = format.into();
        let stats = ArtifactStats {
            bytes: content.len(),
            ..Default::default()
        };
        Self {
            suggested_filename: default_filename("export", &format),
            content,
            mime_type: mime_type.into(),
            format,
            stats,
            metadata: Map::new(),
        }
    }

    /// Set the suggested filename (sanitised)
    #[must_use]
    pub fn with_filename(mut self, filename: &str, extension: Option<&str>) -> Self {
        self.suggested_filename = sanitize_filename(filename, extension, DEFAULT_MAX_FILENAME_LEN);
        self
    }

    /// Replace the stats; `bytes` is always taken from the content
    #[must_use]
    pub fn with_stats(mut self, stats: ArtifactStats) -> Self {
        self.stats = ArtifactStats {
            bytes: self.content.len(),
            ..stats
        };
        self
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Content length in bytes
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// True for empty content
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// The content as UTF-8 text, if it is valid UTF-8
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

fn illegal_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F\x7F]"#).expect("static regex is valid"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

/// Make `name` safe to use as a filename on common filesystems
///
/// Illegal characters (`<>:"/\|?*` and control characters) and runs of
/// whitespace become `_`. When `extension` is given it is appended unless the
/// name already ends with it. The result is at most `max_len` characters; the
/// stem is shortened first so the extension survives.
///
/// ```
/// use tabula_export::artifact::sanitize_filename;
///
/// assert_eq!(sanitize_filename("Q1 report: final?", Some("csv"), 200), "Q1_report__final_.csv");
/// assert_eq!(sanitize_filename("data.CSV", Some("csv"), 200), "data.CSV");
/// ```
pub fn sanitize_filename(name: &str, extension: Option<&str>, max_len: usize) -> String {
    let cleaned = illegal_chars().replace_all(name.trim(), "_");
    let cleaned = whitespace_runs().replace_all(&cleaned, "_");
    let cleaned = cleaned.trim_end_matches('.');

    let extension = extension
        .map(|e| e.trim_start_matches('.'))
        .filter(|e| !e.is_empty());

    let (stem, suffix) = match extension {
        Some(ext) => {
            let dotted = format!(".{ext}");
            let tail = cleaned
                .len()
                .checked_sub(dotted.len())
                .and_then(|i| cleaned.get(i..).map(|tail| (i, tail)));
            match tail {
                Some((i, tail)) if tail.eq_ignore_ascii_case(&dotted) => {
                    (&cleaned[..i], tail.to_string())
                }
                _ => (cleaned, dotted),
            }
        }
        None => (cleaned, String::new()),
    };
    let stem = if stem.is_empty() { "export" } else { stem };

    let suffix_len = suffix.chars().count();
    let stem_budget = max_len.saturating_sub(suffix_len).max(1);
    let stem: String = stem.chars().take(stem_budget).collect();

    let mut out = stem;
    out.push_str(&suffix);
    if out.chars().count() > max_len {
        out = out.chars().take(max_len).collect();
    }
    out
}

/// Timestamped filename such as `export_2024-05-01_134501.csv`
pub fn default_filename(prefix: &str, extension: &str) -> String {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H%M%S");
    sanitize_filename(
        &format!("{prefix}_{stamp}"),
        Some(extension),
        DEFAULT_MAX_FILENAME_LEN,
    )
}

/// Best-effort MIME type for a file extension
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "csv" => MIME_CSV,
        "json" => MIME_JSON,
        "txt" => "text/plain;charset=utf-8",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pdf" => "application/pdf",
        _ => MIME_OCTET_STREAM,
    }
}

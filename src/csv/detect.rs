//! Delimiter detection heuristic
//!
//! Best-effort: each candidate is scored on how consistently it splits the
//! first few lines into the same number of columns. The split is deliberately
//! cheap and ignores quoting, so a sample dominated by quoted delimiters can
//! still fool it.

use super::options::DetectOptions;
use serde::Serialize;

/// Consistency score of one candidate delimiter over a sample
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DelimiterProfile {
    /// The candidate separator
    pub delimiter: char,
    /// Column count of the first sampled line
    pub column_count: usize,
    /// Fraction of sampled lines with that column count
    pub consistency: f64,
    /// `consistency * column_count`, or 0 when disqualified
    pub score: f64,
}

/// Score every candidate in `options.candidates` against `sample`
pub fn score_delimiters(sample: &str, options: &DetectOptions) -> Vec<DelimiterProfile> {
    let lines: Vec<&str> = sample
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(options.sample_lines.max(1))
        .collect();

    options
        .candidates
        .iter()
        .map(|&delimiter| profile(&lines, delimiter, options.min_consistency))
        .collect()
}

fn profile(lines: &[&str], delimiter: char, min_consistency: f64) -> DelimiterProfile {
    let Some(first) = lines.first() else {
        return DelimiterProfile {
            delimiter,
            column_count: 0,
            consistency: 0.0,
            score: 0.0,
        };
    };

    let column_count = first.split(delimiter).count();
    let matching = lines
        .iter()
        .filter(|line| line.split(delimiter).count() == column_count)
        .count();
    let consistency = matching as f64 / lines.len() as f64;

    let score = if column_count < 2 || consistency < min_consistency {
        0.0
    } else {
        consistency * column_count as f64
    };

    DelimiterProfile {
        delimiter,
        column_count,
        consistency,
        score,
    }
}

/// Pick the most likely delimiter for `sample`
///
/// The highest-scoring candidate wins; ties go to the candidate listed first.
/// When no candidate qualifies the first candidate (or `,`) is returned.
///
/// # Examples
///
/// ```
/// use tabula_export::csv::{DetectOptions, detect_delimiter};
///
/// let sample = "sku;name;qty\nA1;Pen;4\nB2;Ink;9\n";
/// assert_eq!(detect_delimiter(sample, &DetectOptions::default()), ';');
/// ```
pub fn detect_delimiter(sample: &str, options: &DetectOptions) -> char {
    let fallback = options.candidates.first().copied().unwrap_or(',');

    let mut best: Option<&DelimiterProfile> = None;
    let profiles = score_delimiters(sample, options);
    for candidate in profiles.iter().filter(|p| p.score > 0.0) {
        if best.is_none_or(|b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }

    let chosen = best.map(|p| p.delimiter).unwrap_or(fallback);
    tracing::debug!(delimiter = ?chosen, "detected delimiter");
    chosen
}

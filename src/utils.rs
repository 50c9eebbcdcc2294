//! Utility functions for file operations and HTTP filename handling

use crate::config::FileCollisionAction;
use crate::error::{Result, SinkError};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Get a unique path for a file, handling collisions according to the specified action
///
/// # Arguments
///
/// * `path` - The desired file path
/// * `action` - How to handle file collisions
///
/// # Returns
///
/// Returns the final path to use. For Rename action, this may have a suffix added.
/// For Skip action, returns an error if the file already exists.
/// For Overwrite action, returns the original path unchanged.
///
/// # Examples
///
/// ```
/// use tabula_export::utils::get_unique_path;
/// use tabula_export::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/report.csv");
/// let unique = get_unique_path(path, FileCollisionAction::Rename).unwrap();
/// // If /tmp/report.csv exists, returns /tmp/report (1).csv
/// // If that exists too, returns /tmp/report (2).csv, etc.
/// ```
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(SinkError::FileCollision {
                    path: path.to_path_buf(),
                    reason: "File already exists and collision action is Skip".to_string(),
                }
                .into());
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| SinkError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "Cannot extract file stem".to_string(),
                })?;

            let extension = path.extension().and_then(|e| e.to_str());

            let parent = path.parent().ok_or_else(|| SinkError::InvalidPath {
                path: path.to_path_buf(),
                reason: "Cannot extract parent directory".to_string(),
            })?;

            // Try adding (1), (2), (3), ... until we find a unique name
            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(SinkError::FileCollision {
                path: path.to_path_buf(),
                reason: format!("Could not find unique filename after {MAX_RENAME_ATTEMPTS} attempts"),
            }
            .into())
        }
    }
}

/// Parse the filename out of a `Content-Disposition` header value
///
/// Handles both `filename="report.csv"` and the RFC 5987 form
/// `filename*=UTF-8''report%20q1.csv`. The extension is kept.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    for part in value.split(';') {
        let part = part.trim();
        if let Some(filename) = part.strip_prefix("filename*=") {
            // Format is: charset'lang'encoded-filename
            if let Some(idx) = filename.rfind('\'')
                && let Ok(decoded) = urlencoding::decode(&filename[idx + 1..])
                && !decoded.is_empty()
            {
                return Some(decoded.into_owned());
            }
        } else if let Some(filename) = part.strip_prefix("filename=") {
            let filename = filename.trim_matches('"');
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }
    None
}

/// Extract filename from HTTP response
///
/// Tries the Content-Disposition header first, falls back to the last URL
/// path segment, and finally to `"download"`.
///
/// # Examples
///
/// ```ignore
/// let response = reqwest::get("https://example.com/files/sales.csv").await?;
/// let filename = extract_filename_from_response(&response, "https://example.com/files/sales.csv");
/// // Returns "sales.csv"
/// ```
pub fn extract_filename_from_response(response: &reqwest::Response, url: &str) -> String {
    if let Some(content_disposition) = response.headers().get(reqwest::header::CONTENT_DISPOSITION)
        && let Ok(value) = content_disposition.to_str()
        && let Some(filename) = filename_from_content_disposition(value)
    {
        return filename;
    }

    filename_from_url(url).unwrap_or_else(|| "download".to_string())
}

/// Last non-empty path segment of `url`, percent-decoded
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed_url = url::Url::parse(url).ok()?;
    let last_segment = parsed_url.path_segments()?.next_back()?;
    if last_segment.is_empty() {
        return None;
    }
    Some(
        urlencoding::decode(last_segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| last_segment.to_string()),
    )
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;
    use tempfile::TempDir;
    use wiremock::MockServer;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[test]
    fn test_get_unique_path_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.csv");

        // File doesn't exist, should return original path for all actions
        assert_eq!(
            get_unique_path(&path, FileCollisionAction::Rename).unwrap(),
            path
        );
        assert_eq!(
            get_unique_path(&path, FileCollisionAction::Overwrite).unwrap(),
            path
        );
        assert_eq!(
            get_unique_path(&path, FileCollisionAction::Skip).unwrap(),
            path
        );
    }

    #[test]
    fn test_get_unique_path_rename_with_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.csv");
        fs::write(&path, "original").unwrap();

        let unique = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(unique, temp_dir.path().join("test (1).csv"));

        fs::write(&unique, "first rename").unwrap();
        let unique2 = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(unique2, temp_dir.path().join("test (2).csv"));
    }

    #[test]
    fn test_get_unique_path_rename_without_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test");
        fs::write(&path, "original").unwrap();

        let unique = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(unique, temp_dir.path().join("test (1)"));
    }

    #[test]
    fn test_get_unique_path_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.csv");
        fs::write(&path, "original").unwrap();

        let result = get_unique_path(&path, FileCollisionAction::Overwrite).unwrap();
        assert_eq!(result, path);
    }

    #[test]
    fn test_get_unique_path_skip_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.csv");
        fs::write(&path, "original").unwrap();

        match get_unique_path(&path, FileCollisionAction::Skip) {
            Err(Error::Sink(SinkError::FileCollision { path: p, .. })) => assert_eq!(p, path),
            other => panic!("Expected FileCollision error, got {other:?}"),
        }
    }

    #[test]
    fn test_get_unique_path_multiple_dots() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sales.2024.csv");
        fs::write(&path, "original").unwrap();

        // Only the last extension is preserved after the counter
        let unique = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(unique, temp_dir.path().join("sales.2024 (1).csv"));
    }

    #[test]
    fn test_get_unique_path_sequential() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.csv");

        fs::write(&path, "original").unwrap();
        fs::write(temp_dir.path().join("test (1).csv"), "first").unwrap();
        fs::write(temp_dir.path().join("test (2).csv"), "second").unwrap();

        let unique = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(unique, temp_dir.path().join("test (3).csv"));
    }

    // =========================================================================
    // Content-Disposition / URL parsing
    // =========================================================================

    #[test]
    fn content_disposition_variants() {
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="report.csv""#).as_deref(),
            Some("report.csv")
        );
        assert_eq!(
            filename_from_content_disposition("attachment; filename=report.csv").as_deref(),
            Some("report.csv")
        );
        assert_eq!(
            filename_from_content_disposition("attachment; filename*=UTF-8''q1%20sales.csv")
                .as_deref(),
            Some("q1 sales.csv")
        );
        assert_eq!(filename_from_content_disposition("inline"), None);
        assert_eq!(filename_from_content_disposition(r#"attachment; filename="""#), None);
    }

    #[test]
    fn url_filename_variants() {
        assert_eq!(
            filename_from_url("https://example.com/files/q1%20sales.csv").as_deref(),
            Some("q1 sales.csv")
        );
        assert_eq!(filename_from_url("https://example.com/"), None);
        assert_eq!(filename_from_url("not a url at all"), None);
    }

    /// Helper: start a mock server, register a response, make a GET request, return the response.
    async fn mock_response(
        path_str: &str,
        template: ResponseTemplate,
    ) -> (reqwest::Response, String) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(path_str))
            .respond_with(template)
            .mount(&server)
            .await;

        let url = format!("{}{}", server.uri(), path_str);
        let resp = reqwest::get(&url).await.unwrap();
        (resp, url)
    }

    #[tokio::test]
    async fn extract_filename_from_content_disposition_keeps_extension() {
        let (resp, url) = mock_response(
            "/export/123",
            ResponseTemplate::new(200).insert_header(
                "Content-Disposition",
                r#"attachment; filename="inventory_2024.csv""#,
            ),
        )
        .await;

        assert_eq!(extract_filename_from_response(&resp, &url), "inventory_2024.csv");
    }

    #[tokio::test]
    async fn extract_filename_from_rfc5987_encoded_header() {
        let (resp, url) = mock_response(
            "/export/789",
            ResponseTemplate::new(200).insert_header(
                "Content-Disposition",
                "attachment; filename*=UTF-8''file%20name%20with%20spaces.json",
            ),
        )
        .await;

        assert_eq!(
            extract_filename_from_response(&resp, &url),
            "file name with spaces.json"
        );
    }

    #[tokio::test]
    async fn extract_filename_falls_back_to_url_path_without_header() {
        let (resp, url) = mock_response("/files/orders.csv", ResponseTemplate::new(200)).await;

        assert_eq!(
            extract_filename_from_response(&resp, &url),
            "orders.csv",
            "without Content-Disposition, should use the URL path"
        );
    }

    #[tokio::test]
    async fn extract_filename_content_disposition_takes_priority_over_url() {
        let (resp, url) = mock_response(
            "/api/v1/export/generic-id",
            ResponseTemplate::new(200).insert_header(
                "Content-Disposition",
                r#"attachment; filename="Real.Report.csv""#,
            ),
        )
        .await;

        assert_eq!(extract_filename_from_response(&resp, &url), "Real.Report.csv");
    }

    #[tokio::test]
    async fn extract_filename_falls_back_to_download_when_no_useful_url() {
        let (resp, _url) = mock_response("/", ResponseTemplate::new(200)).await;

        assert_eq!(
            extract_filename_from_response(&resp, "http://example.com/"),
            "download",
            "should return 'download' when URL has no useful filename"
        );
    }
}

//! Retrying remote download
//!
//! A download runs as a single lifecycle execution. Inside it, every failed
//! attempt except a cancelled one is retried with linear backoff (see
//! [`crate::retry`]), each bounded by the per-attempt timeout from
//! [`DownloadConfig`]. Observers therefore see one `on_start` and, at most,
//! one `on_error` for the final failure.

use crate::artifact::{ExportArtifact, mime_for_extension, sanitize_filename, DEFAULT_MAX_FILENAME_LEN};
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::lifecycle::{CancelReason, ExecuteOptions, Operation, Outcome};
use crate::retry::retry_with_policy;
use crate::utils::extract_filename_from_response;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Progress callback receiving `(bytes_loaded, total_bytes_if_known)`
pub type ProgressFn = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Body and metadata returned by a [`Fetcher`]
#[derive(Clone, Debug, PartialEq)]
pub struct FetchedResource {
    /// Response body
    pub bytes: Vec<u8>,
    /// `Content-Type` header, if present
    pub content_type: Option<String>,
    /// Filename derived from the response and URL
    pub filename: String,
}

/// Network primitive used by [`RetryingDownloader`]
///
/// Implementations must return [`Error::Cancelled`] promptly once `token`
/// fires. Any other error is retried by [`RetryingDownloader`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` once
    async fn fetch(
        &self,
        url: &str,
        token: &CancellationToken,
        progress: Option<&ProgressFn>,
    ) -> Result<FetchedResource>;

    /// Get the name of this implementation
    fn name(&self) -> &'static str;
}

/// [`Fetcher`] backed by `reqwest`
///
/// Streams the body chunk by chunk, checking the token between chunks. Any
/// non-success status is reported as [`Error::TransientIo`].
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client using the configured User-Agent
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }

    /// Use an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        token: &CancellationToken,
        progress: Option<&ProgressFn>,
    ) -> Result<FetchedResource> {
        let mut response = tokio::select! {
            _ = token.cancelled() => return Err(Error::Cancelled(CancelReason::Parent)),
            response = self.client.get(url).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::TransientIo {
                message: format!("HTTP {status} from {url}"),
            });
        }

        let filename = extract_filename_from_response(&response, url);
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let total = response.content_length();

        let mut bytes = Vec::with_capacity(total.unwrap_or(0).min(8 * 1024 * 1024) as usize);
        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled(CancelReason::Parent)),
                chunk = response.chunk() => chunk?,
            };
            let Some(chunk) = chunk else { break };
            bytes.extend_from_slice(&chunk);
            if let Some(progress) = progress {
                progress(bytes.len() as u64, total);
            }
        }

        Ok(FetchedResource {
            bytes,
            content_type,
            filename,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// What to download and how to label the result
#[derive(Clone)]
pub struct DownloadRequest {
    /// Source URL
    pub url: String,
    /// Overrides the filename derived from the response
    pub filename: Option<String>,
    /// Format key recorded on the artifact; derived from the extension when absent
    pub format: Option<String>,
    /// Called as body chunks arrive
    pub progress: Option<ProgressFn>,
}

impl DownloadRequest {
    /// Request for `url` with no overrides
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: None,
            format: None,
            progress: None,
        }
    }

    /// Override the suggested filename
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the format key
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Attach a progress callback
    #[must_use]
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(progress));
        self
    }
}

impl fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("url", &self.url)
            .field("filename", &self.filename)
            .field("format", &self.format)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Downloads remote artifacts with bounded retries
pub struct RetryingDownloader {
    fetcher: Arc<dyn Fetcher>,
    config: DownloadConfig,
}

impl RetryingDownloader {
    /// Downloader using [`HttpFetcher`]
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Downloader using a custom [`Fetcher`]
    pub fn with_fetcher(config: DownloadConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher, config }
    }

    /// The active configuration
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Download through `operation`, so state and observers follow the lifecycle
    ///
    /// `options.timeout` bounds the whole download including retries; the
    /// per-attempt timeout comes from the configuration.
    pub async fn download(
        &self,
        operation: &Operation<ExportArtifact>,
        request: DownloadRequest,
        options: ExecuteOptions,
    ) -> Outcome<ExportArtifact> {
        operation
            .execute(
                move |token| async move { self.fetch_with_retry(&request, &token).await },
                options,
            )
            .await
    }

    /// Download without a lifecycle wrapper, still honouring `token`
    pub async fn fetch_with_retry(
        &self,
        request: &DownloadRequest,
        token: &CancellationToken,
    ) -> Result<ExportArtifact> {
        let url = request.url.as_str();
        let progress = request.progress.as_ref();
        let max_attempts = self.config.retries.saturating_add(1);
        let attempt_timeout = self.config.timeout;

        // Any fetch failure other than cancellation earns another attempt
        let retry_any = |e: &Error| !e.is_cancelled();
        let fetched = retry_with_policy(&self.config, token, retry_any, |attempt| async move {
            tracing::info!(
                url = %url,
                attempt = attempt + 1,
                max_attempts,
                fetcher = self.fetcher.name(),
                "download attempt"
            );
            match tokio::time::timeout(attempt_timeout, self.fetcher.fetch(url, token, progress)).await {
                Ok(result) => result,
                Err(_) => Err(Error::TransientIo {
                    message: format!(
                        "attempt timed out after {}ms",
                        attempt_timeout.as_millis()
                    ),
                }),
            }
        })
        .await?;

        tracing::info!(url = %url, bytes = fetched.bytes.len(), "download finished");
        Ok(self.into_artifact(request, fetched))
    }

    fn into_artifact(&self, request: &DownloadRequest, fetched: FetchedResource) -> ExportArtifact {
        let filename = request
            .filename
            .clone()
            .unwrap_or_else(|| fetched.filename.clone());
        let extension = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let format = request
            .format
            .clone()
            .or_else(|| extension.clone())
            .unwrap_or_else(|| "download".to_string());
        let mime_type = fetched
            .content_type
            .clone()
            .unwrap_or_else(|| mime_for_extension(extension.as_deref().unwrap_or("")).to_string());

        let mut artifact = ExportArtifact::new(fetched.bytes, mime_type, format)
            .with_metadata("source_url", request.url.clone());
        artifact.suggested_filename = sanitize_filename(&filename, None, DEFAULT_MAX_FILENAME_LEN);
        artifact
    }
}

impl fmt::Debug for RetryingDownloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingDownloader")
            .field("fetcher", &self.fetcher.name())
            .field("config", &self.config)
            .finish()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{OperationObserver, StateSnapshot};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config(retries: u32) -> DownloadConfig {
        DownloadConfig {
            retries,
            retry_delay: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
            ..DownloadConfig::default()
        }
    }

    #[derive(Default)]
    struct Hooks {
        starts: AtomicU32,
        errors: AtomicU32,
        successes: AtomicU32,
        finals: Mutex<Vec<StateSnapshot>>,
    }

    impl OperationObserver<ExportArtifact> for Hooks {
        fn on_start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_success(&self, _result: &ExportArtifact) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_error(&self, _error: &Error) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        fn on_finally(&self, snapshot: &StateSnapshot) {
            self.finals.lock().unwrap().push(snapshot.clone());
        }
    }

    /// Fails with a transient error for the first `failures` calls
    struct Scripted {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetcher for Scripted {
        async fn fetch(
            &self,
            _url: &str,
            _token: &CancellationToken,
            _progress: Option<&ProgressFn>,
        ) -> Result<FetchedResource> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(Error::TransientIo {
                    message: format!("flaky #{call}"),
                })
            } else {
                Ok(FetchedResource {
                    bytes: b"a,b\r\n".to_vec(),
                    content_type: None,
                    filename: "data.csv".into(),
                })
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn transient_failures_retry_inside_one_execution() {
        let fetcher = Arc::new(Scripted {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let downloader = RetryingDownloader::with_fetcher(fast_config(3), fetcher.clone());
        let hooks = Arc::new(Hooks::default());
        let operation = Operation::new("download").with_observer(hooks.clone());

        let outcome = downloader
            .download(
                &operation,
                DownloadRequest::new("https://example.com/data.csv"),
                ExecuteOptions::default(),
            )
            .await;

        let artifact = outcome.into_result().unwrap();
        assert_eq!(artifact.content, b"a,b\r\n");
        assert_eq!(artifact.format, "csv");
        assert_eq!(artifact.mime_type, "text/csv;charset=utf-8");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(hooks.starts.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.errors.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.successes.load(Ordering::SeqCst), 1);
    }

    /// Fails with a plain I/O error for the first `failures` calls
    struct Hiccup {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetcher for Hiccup {
        async fn fetch(
            &self,
            _url: &str,
            _token: &CancellationToken,
            _progress: Option<&ProgressFn>,
        ) -> Result<FetchedResource> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(Error::Io(std::io::Error::other("socket hiccup")))
            } else {
                Ok(FetchedResource {
                    bytes: b"ok".to_vec(),
                    content_type: Some("text/plain".into()),
                    filename: "ok.txt".into(),
                })
            }
        }

        fn name(&self) -> &'static str {
            "hiccup"
        }
    }

    #[tokio::test]
    async fn any_fetch_error_is_retried() {
        let fetcher = Arc::new(Hiccup {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let downloader = RetryingDownloader::with_fetcher(fast_config(3), fetcher.clone());

        let artifact = downloader
            .fetch_with_retry(&DownloadRequest::new("https://example.com/ok.txt"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(artifact.content, b"ok");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_end_as_terminal_io() {
        let fetcher = Arc::new(Hiccup {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let downloader = RetryingDownloader::with_fetcher(fast_config(1), fetcher.clone());

        let err = downloader
            .fetch_with_retry(&DownloadRequest::new("https://example.com/ok.txt"), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::TerminalIo { attempts, source } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, Error::Io(_)));
            }
            other => panic!("expected TerminalIo, got {other:?}"),
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_fire_on_error_once() {
        let fetcher = Arc::new(Scripted {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let downloader = RetryingDownloader::with_fetcher(fast_config(2), fetcher.clone());
        let hooks = Arc::new(Hooks::default());
        let operation = Operation::new("download").with_observer(hooks.clone());

        let outcome = downloader
            .download(
                &operation,
                DownloadRequest::new("https://example.com/x"),
                ExecuteOptions::default(),
            )
            .await;

        assert!(matches!(outcome, Outcome::Failed(Error::TerminalIo { attempts: 3, .. })));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(hooks.errors.load(Ordering::SeqCst), 1);
        assert_eq!(
            operation.state().error().unwrap().code,
            "terminal_io_error"
        );
    }

    #[tokio::test]
    async fn http_retry_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/report.csv"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/report.csv"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/csv")
                    .set_body_string("x\r\n1\r\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let downloader = RetryingDownloader::new(fast_config(3)).unwrap();
        let artifact = downloader
            .fetch_with_retry(
                &DownloadRequest::new(format!("{}/report.csv", server.uri())),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(artifact.as_text(), Some("x\r\n1\r\n"));
        assert_eq!(artifact.mime_type, "text/csv");
        assert_eq!(artifact.suggested_filename, "report.csv");
        assert_eq!(artifact.metadata["source_url"], format!("{}/report.csv", server.uri()));
    }

    #[tokio::test]
    async fn zero_retries_means_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let downloader = RetryingDownloader::new(fast_config(0)).unwrap();
        let err = downloader
            .fetch_with_retry(&DownloadRequest::new(server.uri()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TerminalIo { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn slow_attempt_times_out_and_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let config = DownloadConfig {
            timeout: Duration::from_millis(200),
            ..fast_config(1)
        };
        let downloader = RetryingDownloader::new(config).unwrap();
        let artifact = downloader
            .fetch_with_retry(
                &DownloadRequest::new(format!("{}/slow", server.uri())),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(artifact.as_text(), Some("ok"));
    }

    #[tokio::test]
    async fn abort_mid_download_settles_idle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let downloader = RetryingDownloader::new(fast_config(3)).unwrap();
        let hooks = Arc::new(Hooks::default());
        let operation = Operation::new("download").with_observer(hooks.clone());

        let parent = CancellationToken::new();
        {
            let parent = parent.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                parent.cancel();
            });
        }

        let start = std::time::Instant::now();
        let outcome = downloader
            .download(
                &operation,
                DownloadRequest::new(server.uri()),
                ExecuteOptions {
                    timeout: Some(Duration::from_millis(30_000)),
                    cancel_token: Some(parent),
                    reset_on_start: true,
                },
            )
            .await;

        assert!(matches!(outcome, Outcome::Cancelled(CancelReason::Parent)));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!operation.is_loading());
        assert_eq!(hooks.errors.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.successes.load(Ordering::SeqCst), 0);
        assert_eq!(
            hooks.finals.lock().unwrap().as_slice(),
            [StateSnapshot {
                loading: false,
                success: false,
                error: None
            }]
        );
    }

    #[tokio::test]
    async fn progress_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let loaded = Arc::new(AtomicU64::new(0));
        let request = {
            let loaded = loaded.clone();
            DownloadRequest::new(format!("{}/blob.bin", server.uri()))
                .with_filename("payload.bin")
                .with_progress(move |bytes, _total| loaded.store(bytes, Ordering::SeqCst))
        };

        let downloader = RetryingDownloader::new(fast_config(0)).unwrap();
        let artifact = downloader
            .fetch_with_retry(&request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(artifact.len(), 4096);
        assert_eq!(loaded.load(Ordering::SeqCst), 4096);
        assert_eq!(artifact.suggested_filename, "payload.bin");
        assert_eq!(artifact.format, "bin");
    }

    #[test]
    fn request_debug_hides_callback() {
        let request = DownloadRequest::new("https://example.com").with_progress(|_, _| {});
        assert!(format!("{request:?}").contains("progress: true"));
    }
}

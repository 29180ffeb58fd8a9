//! Download requests and handlers
//!
//! The run loop hands accepted image URLs and failure artifacts to a
//! [`DownloadHandler`] and moves on; outcomes come back through run events.
//! [`HttpDownloadHandler`] saves into a base directory on the local
//! filesystem. Hosts with their own download side channel implement the
//! trait instead, or use [`NoOpDownloadHandler`] for dry runs.

use crate::error::DownloadError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Timeout for fetching one artifact. Generated images are a few megabytes;
/// anything slower than this is a stuck connection, not a slow CDN.
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// A request to save one generated artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Source: an `http(s)` URL or a percent-encoded `data:` URL
    pub url: String,
    /// Destination path relative to the handler's base directory, using `/`
    /// separators (`"AI_Images/00042.png"`)
    pub relative_filename: String,
}

/// Sink for download requests issued during a run.
///
/// Requests are fire-and-forget from the run loop's perspective; a slow
/// handler never blocks prompt processing.
#[async_trait]
pub trait DownloadHandler: Send + Sync {
    /// Fetch `request.url` and persist it at `request.relative_filename`
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be fetched or decoded, when
    /// the relative filename is unsafe, or when writing fails.
    async fn request(&self, request: DownloadRequest) -> Result<(), DownloadError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Saves artifacts into a base directory on the local filesystem.
///
/// Supports `http`/`https` sources and percent-encoded `data:` URLs (used
/// for failure logs). Relative filenames are confined to the base
/// directory; a leading slash is tolerated and stripped, parent-directory
/// components are rejected.
///
/// # Examples
///
/// ```no_run
/// use imagegen_dl::download::{DownloadHandler, DownloadRequest, HttpDownloadHandler};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let handler = HttpDownloadHandler::new("./output")?;
/// handler
///     .request(DownloadRequest {
///         url: "https://cdn.example.com/image.png".to_string(),
///         relative_filename: "AI_Images/00001.png".to_string(),
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpDownloadHandler {
    base_dir: PathBuf,
    client: reqwest::Client,
}

impl HttpDownloadHandler {
    /// Create a handler saving under `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            base_dir: base_dir.into(),
            client,
        })
    }

    async fn fetch_http(&self, raw_url: &str) -> Result<Vec<u8>, DownloadError> {
        let url = Url::parse(raw_url).map_err(|e| DownloadError::InvalidUrl {
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(DownloadError::InvalidUrl {
                    reason: format!("unsupported scheme '{other}'"),
                });
            }
        }

        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl DownloadHandler for HttpDownloadHandler {
    async fn request(&self, request: DownloadRequest) -> Result<(), DownloadError> {
        let relative = sanitized_relative_path(&request.relative_filename)?;
        let target = self.base_dir.join(relative);

        let bytes = if request.url.starts_with("data:") {
            decode_data_url(&request.url)?
        } else {
            self.fetch_http(&request.url).await?
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Discards every request, reporting success.
///
/// For dry runs and tests where the generated URLs themselves (observable
/// through run events) are the interesting output.
pub struct NoOpDownloadHandler;

#[async_trait]
impl DownloadHandler for NoOpDownloadHandler {
    async fn request(&self, _request: DownloadRequest) -> Result<(), DownloadError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Confine a caller-supplied relative filename to the base directory.
///
/// A leading slash is stripped (paths arrive as `folder/file` but some
/// callers prepend one). Parent-directory and root components are rejected.
fn sanitized_relative_path(relative_filename: &str) -> Result<PathBuf, DownloadError> {
    let trimmed = relative_filename.trim_start_matches('/');

    let mut clean = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(DownloadError::UnsafeFilename {
                    filename: relative_filename.to_string(),
                });
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(DownloadError::UnsafeFilename {
            filename: relative_filename.to_string(),
        });
    }
    Ok(clean)
}

/// Decode a percent-encoded `data:` URL payload.
///
/// Base64 payloads are not supported; failure artifacts are generated
/// percent-encoded precisely so no decoder beyond this is needed.
fn decode_data_url(url: &str) -> Result<Vec<u8>, DownloadError> {
    let body = url.strip_prefix("data:").unwrap_or(url);
    let (metadata, payload) = body.split_once(',').ok_or_else(|| DownloadError::InvalidUrl {
        reason: "data url has no ',' separator".to_string(),
    })?;

    if metadata.contains("base64") {
        return Err(DownloadError::InvalidUrl {
            reason: "base64 data urls are not supported, use percent encoding".to_string(),
        });
    }

    let decoded = urlencoding::decode(payload).map_err(|e| DownloadError::InvalidUrl {
        reason: format!("percent decoding failed: {e}"),
    })?;
    Ok(decoded.into_owned().into_bytes())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn handler_in(dir: &tempfile::TempDir) -> HttpDownloadHandler {
        HttpDownloadHandler::new(dir.path()).unwrap()
    }

    #[tokio::test]
    async fn http_download_writes_file_under_base_dir() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let temp_dir = tempfile::tempdir().unwrap();
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/image.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png bytes".as_slice()))
            .mount(&mock_server)
            .await;

        let request = DownloadRequest {
            url: format!("{}/image.png", mock_server.uri()),
            relative_filename: "AI_Images/00001.png".to_string(),
        };
        assert_ok!(handler_in(&temp_dir).request(request).await);

        let saved = tokio::fs::read(temp_dir.path().join("AI_Images/00001.png"))
            .await
            .unwrap();
        assert_eq!(saved, b"png bytes");
    }

    #[tokio::test]
    async fn http_error_status_fails_the_request() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let temp_dir = tempfile::tempdir().unwrap();
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let request = DownloadRequest {
            url: format!("{}/gone.png", mock_server.uri()),
            relative_filename: "AI_Images/00002.png".to_string(),
        };
        let result = handler_in(&temp_dir).request(request).await;

        assert!(matches!(result, Err(DownloadError::Http(_))));
        assert!(!temp_dir.path().join("AI_Images/00002.png").exists());
    }

    #[tokio::test]
    async fn leading_slash_in_filename_is_stripped() {
        let temp_dir = tempfile::tempdir().unwrap();

        let request = DownloadRequest {
            url: "data:text/plain;charset=utf-8,hello".to_string(),
            relative_filename: "/Foo/00003-ERROR-log.txt".to_string(),
        };
        assert_ok!(handler_in(&temp_dir).request(request).await);

        assert!(temp_dir.path().join("Foo/00003-ERROR-log.txt").exists());
    }

    #[tokio::test]
    async fn parent_directory_components_are_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();

        let request = DownloadRequest {
            url: "data:text/plain;charset=utf-8,escape".to_string(),
            relative_filename: "../outside.txt".to_string(),
        };
        let result = handler_in(&temp_dir).request(request).await;

        assert!(matches!(result, Err(DownloadError::UnsafeFilename { .. })));
        assert!(!temp_dir.path().parent().unwrap().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn empty_filename_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();

        let request = DownloadRequest {
            url: "data:text/plain;charset=utf-8,x".to_string(),
            relative_filename: "/".to_string(),
        };
        let result = handler_in(&temp_dir).request(request).await;

        assert!(matches!(result, Err(DownloadError::UnsafeFilename { .. })));
    }

    #[tokio::test]
    async fn data_url_payload_is_percent_decoded() {
        let temp_dir = tempfile::tempdir().unwrap();

        let request = DownloadRequest {
            url: "data:text/plain;charset=utf-8,Failed%20to%20generate%0APrompt%3A%20'x'"
                .to_string(),
            relative_filename: "logs/00004-ERROR-log.txt".to_string(),
        };
        assert_ok!(handler_in(&temp_dir).request(request).await);

        let saved = tokio::fs::read_to_string(temp_dir.path().join("logs/00004-ERROR-log.txt"))
            .await
            .unwrap();
        assert_eq!(saved, "Failed to generate\nPrompt: 'x'");
    }

    #[tokio::test]
    async fn base64_data_url_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();

        let request = DownloadRequest {
            url: "data:image/png;base64,aGVsbG8=".to_string(),
            relative_filename: "a.png".to_string(),
        };
        let result = handler_in(&temp_dir).request(request).await;

        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn data_url_without_separator_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();

        let request = DownloadRequest {
            url: "data:text/plain".to_string(),
            relative_filename: "a.txt".to_string(),
        };
        let result = handler_in(&temp_dir).request(request).await;

        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();

        let request = DownloadRequest {
            url: "ftp://example.com/file.png".to_string(),
            relative_filename: "a.png".to_string(),
        };
        let result = handler_in(&temp_dir).request(request).await;

        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn noop_handler_accepts_and_discards() {
        let handler = NoOpDownloadHandler;

        let request = DownloadRequest {
            url: "https://cdn.example.com/image.png".to_string(),
            relative_filename: "AI_Images/00001.png".to_string(),
        };
        assert_ok!(handler.request(request).await);
        assert_eq!(handler.name(), "noop");
    }
}

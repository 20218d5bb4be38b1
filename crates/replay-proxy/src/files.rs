//! Local filesystem responses.
//!
//! Serves the application's UI bundle and local-file archive sources. Bodies
//! stream straight from the file handle and only cover the requested window.

use std::io::SeekFrom;
use std::path::Path;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, Method, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use url::Url;

use crate::config::FILE_PROTOCOL;
use crate::not_found::not_found;
use crate::range::{parse_range, RangeResult};
use crate::request::{InterceptedRequest, InterceptedResponse, ResponseBody};

/// Read buffer size for streamed files.
const CHUNK_SIZE: usize = 64 * 1024;

/// Default content type for files without a caller-supplied type.
const OCTET_STREAM: &str = "application/octet-stream";

/// Serves files from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileResponder;

impl FileResponder {
    /// Creates a file responder.
    pub fn new() -> Self {
        Self
    }

    /// Serves `path`, honouring the request's `Range` header.
    ///
    /// Missing paths and anything that is not a regular file (symlinks
    /// included) produce the not-found response naming the path.
    pub async fn serve_file(
        &self,
        path: &Path,
        method: &Method,
        request_headers: &HeaderMap,
        content_type: Option<HeaderValue>,
    ) -> InterceptedResponse {
        let shown = path.display().to_string();
        self.serve_file_as(path, &shown, method, request_headers, content_type)
            .await
    }

    /// Like [`serve_file`](Self::serve_file), but a missing file is reported
    /// under `requested` (usually the URL that mapped to `path`).
    pub async fn serve_file_as(
        &self,
        path: &Path,
        requested: &str,
        method: &Method,
        request_headers: &HeaderMap,
        content_type: Option<HeaderValue>,
    ) -> InterceptedResponse {
        let meta = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return not_found(requested),
            Err(e) => {
                tracing::debug!("Failed to stat {}: {}", path.display(), e);
                return not_found(requested);
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            content_type.unwrap_or_else(|| HeaderValue::from_static(OCTET_STREAM)),
        );

        let size = meta.len();
        let range = parse_range(request_headers, Some(&mut headers), size);

        let body = if *method == Method::HEAD {
            None
        } else {
            match open_window(path, &range, size).await {
                Ok(body) => Some(body),
                Err(e) => {
                    tracing::warn!("Failed to open {}: {}", path.display(), e);
                    return not_found(requested);
                }
            }
        };

        InterceptedResponse {
            status: range.status,
            headers,
            body,
        }
    }

    /// Handles a request on the local-file archive scheme (`file2://`).
    pub async fn serve_file_url(&self, request: &InterceptedRequest) -> InterceptedResponse {
        if request.url == format!("{}://localhost", FILE_PROTOCOL) {
            return InterceptedResponse::new(StatusCode::OK);
        }

        match file_url_to_path(&request.url) {
            Some(path) => {
                self.serve_file(&path, &request.method, &request.headers, None)
                    .await
            }
            None => not_found("No Resource Specified"),
        }
    }
}

/// Opens `path` and returns a body covering the range window.
async fn open_window(path: &Path, range: &RangeResult, size: u64) -> std::io::Result<ResponseBody> {
    let mut file = File::open(path).await?;
    if let Some(start) = range.start() {
        file.seek(SeekFrom::Start(start)).await?;
    }

    let reader = file.take(range.len(size));
    Ok(ResponseBody::from_stream(ReaderStream::with_capacity(
        reader, CHUNK_SIZE,
    )))
}

/// Converts a `file2://` URL into a filesystem path.
fn file_url_to_path(url: &str) -> Option<std::path::PathBuf> {
    let rest = url.strip_prefix(FILE_PROTOCOL)?.strip_prefix(':')?;
    Url::parse(&format!("file:{}", rest))
        .ok()?
        .to_file_path()
        .ok()
}

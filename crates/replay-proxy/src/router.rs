//! Request classification and dispatch.
//!
//! Every intercepted request lands here and is sent down exactly one path:
//! the local UI bundle, the archive, or the live network.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use hyper::header::HeaderValue;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::archive::{ArchiveCoordinates, ArchiveResolver};
use crate::config::{RouterConfig, FILE_PROTOCOL, REPLAY_PATH};
use crate::files::FileResponder;
use crate::live::LiveProxy;
use crate::not_found::not_found;
use crate::request::{InterceptedRequest, InterceptedResponse};

/// `<collection>/<timestamp>[<xx>_]/<url>` below the replay prefix.
static REPLAY_URL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^/]+)/(\d{14,})(?:\w\w_)?/(.*)$").expect("valid replay url regex")
});

/// Where a request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Local-file archive scheme.
    FileProtocol,
    /// Archive replay with the parsed coordinates and archive-relative URL.
    Replay {
        coordinates: ArchiveCoordinates,
        target: String,
    },
    /// File from the UI bundle.
    Static {
        path: PathBuf,
        content_type: HeaderValue,
    },
    /// Archived page reaching for the live network; answered from the archive.
    LiveLeak,
    /// Everything else goes to the network.
    Live,
    /// Local URL with nothing to serve.
    NotFound,
}

/// Decides how `request` is handled. Has no side effects.
pub fn classify(config: &RouterConfig, request: &InterceptedRequest) -> Route {
    if is_file_protocol(&request.url) {
        return Route::FileProtocol;
    }

    if let Some(local) = request.url.strip_prefix(&config.static_prefix) {
        return match local.strip_prefix(REPLAY_PATH) {
            Some(replay) => parse_replay_url(replay)
                .map(|(coordinates, target)| Route::Replay {
                    coordinates,
                    target,
                })
                .unwrap_or(Route::NotFound),
            None => static_asset(&config.content_root, local)
                .map(|(path, content_type)| Route::Static { path, content_type })
                .unwrap_or(Route::NotFound),
        };
    }

    if request
        .referrer
        .as_deref()
        .is_some_and(|referrer| config.is_replay(referrer))
    {
        return Route::LiveLeak;
    }

    Route::Live
}

fn is_file_protocol(url: &str) -> bool {
    url.strip_prefix(FILE_PROTOCOL)
        .is_some_and(|rest| rest.starts_with(':'))
}

/// Splits the part of a replay URL after the replay prefix.
pub fn parse_replay_url(rest: &str) -> Option<(ArchiveCoordinates, String)> {
    let caps = REPLAY_URL_RX.captures(rest)?;
    Some((
        ArchiveCoordinates::new(&caps[1], &caps[2]),
        caps[3].to_string(),
    ))
}

/// Maps a local path to a file below `content_root` and its content type.
fn static_asset(content_root: &Path, local: &str) -> Option<(PathBuf, HeaderValue)> {
    let path = local.split(['?', '#']).next().unwrap_or_default();

    let mut filename = match path {
        "" => "index.html".to_string(),
        "docs" => "docs/index.html".to_string(),
        other => other.to_string(),
    };

    let ext = match Path::new(&filename).extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_string(),
        None => {
            filename.push_str(".html");
            "html".to_string()
        }
    };

    let content_type = content_type_for(&ext)?;

    let relative = Path::new(&filename);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        tracing::warn!("Refusing static path outside content root: {}", filename);
        return None;
    }

    Some((content_root.join(relative), content_type))
}

/// Content type for a file extension; text types are marked UTF-8.
fn content_type_for(ext: &str) -> Option<HeaderValue> {
    let mime = mime_guess::from_ext(ext).first()?;
    let value = if mime.type_() == mime_guess::mime::TEXT
        || mime.subtype() == mime_guess::mime::JAVASCRIPT
        || mime.subtype() == mime_guess::mime::JSON
    {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    };
    HeaderValue::from_str(&value).ok()
}

/// Routes intercepted requests.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    config: Arc<RouterConfig>,
    files: FileResponder,
    archive: ArchiveResolver,
    live: LiveProxy,
}

impl RequestRouter {
    /// Creates a router.
    pub fn new(config: RouterConfig, archive: ArchiveResolver, live: LiveProxy) -> Self {
        Self {
            config: Arc::new(config),
            files: FileResponder::new(),
            archive,
            live,
        }
    }

    /// The router configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The archive resolver.
    pub fn archive(&self) -> &ArchiveResolver {
        &self.archive
    }

    /// Produces the one response for `request`.
    pub async fn route(&self, mut request: InterceptedRequest) -> InterceptedResponse {
        tracing::info!(
            "{} {} from {}",
            request.method,
            request.url,
            request.referrer.as_deref().unwrap_or("-")
        );

        match classify(&self.config, &request) {
            Route::FileProtocol => self.files.serve_file_url(&request).await,
            Route::Replay {
                coordinates,
                target,
            } => {
                self.archive.context().set(coordinates);
                request.url = target;
                self.archive.resolve(request).await
            }
            Route::Static { path, content_type } => {
                tracing::debug!("fullPath: {}", path.display());
                self.files
                    .serve_file_as(
                        &path,
                        &request.url,
                        &request.method,
                        &request.headers,
                        Some(content_type),
                    )
                    .await
            }
            Route::LiveLeak => {
                tracing::debug!("Live leak from archived page: {}", request.url);
                self.archive.resolve(request).await
            }
            Route::Live => self.live.proxy(request).await,
            Route::NotFound => not_found(&request.url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{
        ArchiveContext, LookupReply, LookupRequest, PassthroughRewriter, PendingResolutions,
    };
    use crate::live::MemoryBlobStore;
    use hyper::body::Bytes;
    use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
    use hyper::{HeaderMap, Method, StatusCode};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    const REPLAY_URL: &str = "http://localhost:5471/w/mycoll/20230101000000/https://example.com/";

    fn classify_url(url: &str) -> Route {
        classify(&RouterConfig::new("/srv/ui"), &InterceptedRequest::get(url))
    }

    fn router(content_root: &Path) -> (RequestRouter, mpsc::UnboundedReceiver<LookupRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let archive = ArchiveResolver::new(
            ArchiveContext::new(),
            PendingResolutions::new(),
            Arc::new(tx),
            Arc::new(PassthroughRewriter),
        );
        let live = LiveProxy::new(Arc::new(MemoryBlobStore::new())).unwrap();
        (
            RequestRouter::new(RouterConfig::new(content_root), archive, live),
            rx,
        )
    }

    #[test]
    fn replay_url_is_parsed() {
        assert_eq!(
            classify_url(REPLAY_URL),
            Route::Replay {
                coordinates: ArchiveCoordinates::new("mycoll", "20230101000000"),
                target: "https://example.com/".to_string(),
            }
        );
    }

    #[test]
    fn replay_url_modifier_is_ignored() {
        let route =
            classify_url("http://localhost:5471/w/c/20230101000000mp_/https://example.com/a?b=1");
        assert_eq!(
            route,
            Route::Replay {
                coordinates: ArchiveCoordinates::new("c", "20230101000000"),
                target: "https://example.com/a?b=1".to_string(),
            }
        );
    }

    #[test]
    fn short_timestamp_is_not_found() {
        assert_eq!(
            classify_url("http://localhost:5471/w/mycoll/2023/https://example.com/"),
            Route::NotFound
        );
        assert_eq!(classify_url("http://localhost:5471/w/garbage"), Route::NotFound);
    }

    #[test]
    fn root_maps_to_index() {
        assert_eq!(
            classify_url("http://localhost:5471/"),
            Route::Static {
                path: PathBuf::from("/srv/ui/index.html"),
                content_type: HeaderValue::from_static("text/html; charset=utf-8"),
            }
        );
    }

    #[test]
    fn docs_maps_to_docs_index() {
        match classify_url("http://localhost:5471/docs") {
            Route::Static { path, .. } => assert_eq!(path, PathBuf::from("/srv/ui/docs/index.html")),
            other => panic!("unexpected route {:?}", other),
        }
    }

    #[test]
    fn extensionless_path_gets_html() {
        match classify_url("http://localhost:5471/about?x=1#top") {
            Route::Static { path, content_type } => {
                assert_eq!(path, PathBuf::from("/srv/ui/about.html"));
                assert!(content_type.to_str().unwrap().starts_with("text/html"));
            }
            other => panic!("unexpected route {:?}", other),
        }
    }

    #[test]
    fn asset_content_types() {
        match classify_url("http://localhost:5471/ui.js") {
            Route::Static { content_type, .. } => {
                assert!(content_type.to_str().unwrap().contains("javascript"))
            }
            other => panic!("unexpected route {:?}", other),
        }
        match classify_url("http://localhost:5471/icon.png") {
            Route::Static { content_type, .. } => assert_eq!(content_type, "image/png"),
            other => panic!("unexpected route {:?}", other),
        }
    }

    #[test]
    fn unknown_extension_is_not_found() {
        assert_eq!(
            classify_url("http://localhost:5471/file.notarealextension"),
            Route::NotFound
        );
    }

    #[test]
    fn parent_directory_is_not_found() {
        assert_eq!(
            classify_url("http://localhost:5471/../secret.html"),
            Route::NotFound
        );
    }

    #[test]
    fn live_leak_is_detected() {
        let request = InterceptedRequest::get("https://other.example/")
            .with_referrer("http://localhost:5471/w/mycoll/20230101000000/https://example.com/page");
        assert_eq!(
            classify(&RouterConfig::default(), &request),
            Route::LiveLeak
        );
    }

    #[test]
    fn plain_request_is_live() {
        let request = InterceptedRequest::get("https://other.example/")
            .with_referrer("http://localhost:5471/index.html");
        assert_eq!(classify(&RouterConfig::default(), &request), Route::Live);
        assert_eq!(classify_url("https://other.example/"), Route::Live);
    }

    #[test]
    fn file_protocol_is_detected() {
        assert_eq!(classify_url("file2://localhost"), Route::FileProtocol);
        assert_eq!(classify_url("file2:///tmp/a.warc"), Route::FileProtocol);
        assert_eq!(classify_url("file2x://localhost"), Route::Live);
    }

    #[tokio::test]
    async fn replay_request_updates_context_and_rewrites_url() {
        let dir = TempDir::new().unwrap();
        let (router, mut rx) = router(dir.path());
        let pending = router.archive().pending().clone();

        let answer = tokio::spawn(async move {
            let lookup = rx.recv().await.unwrap();
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
            pending.fulfill(
                &lookup.token,
                LookupReply::new(200, headers, Some(Bytes::from_static(b"<html>archived</html>"))),
            );
            lookup
        });

        let response = router.route(InterceptedRequest::get(REPLAY_URL)).await;
        let lookup = answer.await.unwrap();

        assert_eq!(lookup.request.url, "https://example.com/");
        assert_eq!(lookup.collection.as_deref(), Some("mycoll"));
        assert_eq!(lookup.timestamp.as_deref(), Some("20230101000000"));
        assert_eq!(
            router.archive().context().current(),
            Some(ArchiveCoordinates::new("mycoll", "20230101000000"))
        );

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header(CONTENT_TYPE), Some("text/html"));
        assert_eq!(response.header(CONTENT_LENGTH), Some("21"));
        assert_eq!(
            &response.body_bytes().await.unwrap()[..],
            b"<html>archived</html>"
        );
    }

    #[tokio::test]
    async fn live_leak_goes_to_archive_with_original_url() {
        let dir = TempDir::new().unwrap();
        let (router, mut rx) = router(dir.path());
        router
            .archive()
            .context()
            .set(ArchiveCoordinates::new("mycoll", "20230101000000"));
        let pending = router.archive().pending().clone();

        let answer = tokio::spawn(async move {
            let lookup = rx.recv().await.unwrap();
            pending.fulfill(&lookup.token, LookupReply::miss());
            lookup
        });

        let request = InterceptedRequest::get("https://other.example/")
            .with_referrer("http://localhost:5471/w/mycoll/20230101000000/https://example.com/page");
        let response = router.route(request).await;
        let lookup = answer.await.unwrap();

        assert_eq!(lookup.request.url, "https://other.example/");
        assert_eq!(lookup.collection.as_deref(), Some("mycoll"));
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn root_serves_index_from_content_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), b"<html>ui</html>").unwrap();
        let (router, _rx) = router(dir.path());

        let response = router
            .route(InterceptedRequest::get("http://localhost:5471/"))
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.header(CONTENT_TYPE).unwrap().starts_with("text/html"));
        assert_eq!(&response.body_bytes().await.unwrap()[..], b"<html>ui</html>");
    }

    #[tokio::test]
    async fn head_on_static_asset_has_no_body() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.css"), b"body{}").unwrap();
        let (router, _rx) = router(dir.path());

        let response = router
            .route(InterceptedRequest::new(
                Method::HEAD,
                "http://localhost:5471/app.css",
            ))
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header(CONTENT_LENGTH), Some("6"));
        assert!(response.body.is_none());
    }

    #[tokio::test]
    async fn missing_static_asset_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (router, _rx) = router(dir.path());

        let response = router
            .route(InterceptedRequest::get("http://localhost:5471/missing.js"))
            .await;

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let body = response.body_bytes().await.unwrap();
        let page = String::from_utf8_lossy(&body);
        assert!(page.contains("<b>http://localhost:5471/missing.js</b>"));
    }

    #[tokio::test]
    async fn malformed_replay_url_is_not_found_without_lookup() {
        let dir = TempDir::new().unwrap();
        let (router, mut rx) = router(dir.path());

        let response = router
            .route(InterceptedRequest::get("http://localhost:5471/w/nope"))
            .await;

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(rx.try_recv().is_err());
        assert_eq!(router.archive().context().current(), None);
    }
}

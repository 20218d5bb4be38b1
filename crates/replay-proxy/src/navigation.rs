//! Window-open policy and the initial UI URL.

use std::path::PathBuf;

use url::form_urlencoded;

use crate::config::RouterConfig;

/// What to do when a page asks to open a new window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowOpenAction {
    /// Open it inside the app.
    Allow,
    /// Hand the URL to the system browser.
    OpenExternal(String),
}

/// Decides how a window-open request for `url` is handled.
pub fn window_open_action(config: &RouterConfig, url: &str) -> WindowOpenAction {
    match url.strip_prefix(&config.static_prefix) {
        Some("docs") => WindowOpenAction::OpenExternal(config.docs_url.clone()),
        Some(_) => WindowOpenAction::Allow,
        None => WindowOpenAction::OpenExternal(url.to_string()),
    }
}

/// Archive and page to show at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchTarget {
    /// Archive file to load.
    pub source_file: Option<PathBuf>,
    /// Page inside the archive.
    pub url: Option<String>,
    /// Capture timestamp of the page.
    pub timestamp: Option<String>,
}

impl LaunchTarget {
    /// Target for an archive file.
    pub fn file(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: Some(source_file.into()),
            ..Self::default()
        }
    }

    /// Sets the page to open.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the capture timestamp.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// Builds the URL the UI is first loaded from.
///
/// Without a source file this is just the index page. The page and
/// timestamp only apply to a loaded archive and go in the fragment.
pub fn launch_url(config: &RouterConfig, target: &LaunchTarget) -> String {
    let mut url = format!("{}index.html", config.static_prefix);

    let Some(source) = &target.source_file else {
        return url;
    };

    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("source", &format!("file://{}", source.display()))
        .finish();
    url.push('?');
    url.push_str(&query);

    let mut hash = form_urlencoded::Serializer::new(String::new());
    if let Some(page) = &target.url {
        hash.append_pair("url", page);
    }
    if let Some(ts) = &target.timestamp {
        hash.append_pair("ts", ts);
    }
    let hash = hash.finish();
    if !hash.is_empty() {
        url.push('#');
        url.push_str(&hash);
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docs_opens_externally() {
        let config = RouterConfig::default();
        assert_eq!(
            window_open_action(&config, "http://localhost:5471/docs"),
            WindowOpenAction::OpenExternal("https://replayweb.page/docs/".to_string())
        );
    }

    #[test]
    fn local_pages_stay_in_app() {
        let config = RouterConfig::default();
        assert_eq!(
            window_open_action(&config, "http://localhost:5471/w/c/20230101000000/https://a.com/"),
            WindowOpenAction::Allow
        );
    }

    #[test]
    fn foreign_pages_open_externally() {
        let config = RouterConfig::default();
        assert_eq!(
            window_open_action(&config, "https://example.com/"),
            WindowOpenAction::OpenExternal("https://example.com/".to_string())
        );
    }

    #[test]
    fn launch_without_source_is_index() {
        assert_eq!(
            launch_url(&RouterConfig::default(), &LaunchTarget::default()),
            "http://localhost:5471/index.html"
        );
    }

    #[test]
    fn launch_with_source_and_page() {
        let target = LaunchTarget::file("/data/my archive.wacz")
            .with_url("https://example.com/?a=b")
            .with_timestamp("20230101000000");
        assert_eq!(
            launch_url(&RouterConfig::default(), &target),
            "http://localhost:5471/index.html?source=file%3A%2F%2F%2Fdata%2Fmy+archive.wacz\
             #url=https%3A%2F%2Fexample.com%2F%3Fa%3Db&ts=20230101000000"
        );
    }

    #[test]
    fn launch_with_source_only_has_no_fragment() {
        let url = launch_url(
            &RouterConfig::default(),
            &LaunchTarget::file("/data/a.warc"),
        );
        assert!(url.ends_with("?source=file%3A%2F%2F%2Fdata%2Fa.warc"));
        assert!(!url.contains('#'));
    }
}

//! Router configuration.

use std::path::PathBuf;

use crate::DEFAULT_ORIGIN_PORT;

/// Sub-path of the local origin under which archived pages are replayed.
pub const REPLAY_PATH: &str = "w/";

/// Scheme the replay UI uses to read local archive files.
pub const FILE_PROTOCOL: &str = "file2";

/// Where `<origin>docs` opens when requested as a new window.
pub const DOCS_URL: &str = "https://replayweb.page/docs/";

/// Router configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Scheme, host and port of the application's own origin, with a
    /// trailing slash.
    pub static_prefix: String,
    /// Directory holding the application's UI bundle.
    pub content_root: PathBuf,
    /// External documentation URL.
    pub docs_url: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            static_prefix: origin_for_port(DEFAULT_ORIGIN_PORT),
            content_root: PathBuf::from("./"),
            docs_url: DOCS_URL.to_string(),
        }
    }
}

impl RouterConfig {
    /// Creates a configuration serving the UI bundle from `content_root`.
    pub fn new(content_root: impl Into<PathBuf>) -> Self {
        Self {
            content_root: content_root.into(),
            ..Self::default()
        }
    }

    /// Sets the local origin port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.static_prefix = origin_for_port(port);
        self
    }

    /// Sets the content root.
    pub fn with_content_root(mut self, content_root: impl Into<PathBuf>) -> Self {
        self.content_root = content_root.into();
        self
    }

    /// Sets the documentation URL.
    pub fn with_docs_url(mut self, docs_url: impl Into<String>) -> Self {
        self.docs_url = docs_url.into();
        self
    }

    /// Prefix of archive-replay URLs.
    pub fn replay_prefix(&self) -> String {
        format!("{}{}", self.static_prefix, REPLAY_PATH)
    }

    /// Returns true if `url` belongs to the local origin.
    pub fn is_local(&self, url: &str) -> bool {
        url.starts_with(&self.static_prefix)
    }

    /// Returns true if `url` is an archive-replay URL.
    pub fn is_replay(&self, url: &str) -> bool {
        url.strip_prefix(&self.static_prefix)
            .is_some_and(|rest| rest.starts_with(REPLAY_PATH))
    }
}

fn origin_for_port(port: u16) -> String {
    format!("http://localhost:{}/", port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_origin() {
        let config = RouterConfig::default();
        assert_eq!(config.static_prefix, "http://localhost:5471/");
        assert_eq!(config.replay_prefix(), "http://localhost:5471/w/");
    }

    #[test]
    fn with_port_moves_origin() {
        let config = RouterConfig::default().with_port(8080);
        assert!(config.is_local("http://localhost:8080/index.html"));
        assert!(!config.is_local("http://localhost:5471/index.html"));
        assert!(config.is_replay("http://localhost:8080/w/coll/20230101000000/x"));
    }

    #[test]
    fn replay_detection() {
        let config = RouterConfig::default();
        assert!(config.is_replay("http://localhost:5471/w/"));
        assert!(!config.is_replay("http://localhost:5471/wat.html"));
        assert!(!config.is_replay("https://example.com/w/"));
    }
}

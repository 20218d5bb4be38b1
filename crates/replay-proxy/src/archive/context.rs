//! The process-wide "current archive".

use std::sync::Arc;

use parking_lot::RwLock;

/// Collection and capture timestamp parsed from a replay URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCoordinates {
    /// Collection name.
    pub collection: String,
    /// Capture timestamp, 14 or more digits.
    pub timestamp: String,
}

impl ArchiveCoordinates {
    /// Creates a coordinate pair.
    pub fn new(collection: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// Most recently observed [`ArchiveCoordinates`].
///
/// Written by the router whenever it sees a replay URL and read by the
/// archive resolver when it dispatches a lookup. Requests are not bound to
/// the coordinates that were current when they were routed: two archives
/// resolved concurrently race, and a lookup carries whatever pair is stored
/// at dispatch time.
#[derive(Debug, Clone, Default)]
pub struct ArchiveContext {
    current: Arc<RwLock<Option<ArchiveCoordinates>>>,
}

impl ArchiveContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current coordinates.
    pub fn set(&self, coordinates: ArchiveCoordinates) {
        *self.current.write() = Some(coordinates);
    }

    /// Returns the current coordinates, if any were observed yet.
    pub fn current(&self) -> Option<ArchiveCoordinates> {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        assert_eq!(ArchiveContext::new().current(), None);
    }

    #[test]
    fn last_write_wins_across_clones() {
        let context = ArchiveContext::new();
        let shared = context.clone();

        context.set(ArchiveCoordinates::new("a", "20200101000000"));
        shared.set(ArchiveCoordinates::new("b", "20210101000000"));

        assert_eq!(
            context.current(),
            Some(ArchiveCoordinates::new("b", "20210101000000"))
        );
    }
}

//! Model placement: the registry-backed assignment map, the in-process
//! freshness cache, the placement decision engine, and the reconciler that
//! repairs drift between them. See spec §3 (Data Model) and §4.4–§4.7.

pub mod cache;
pub mod placer;
pub mod reconciler;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use cache::PlacementCache;
pub use placer::Placer;
pub use reconciler::Reconciler;

/// A `(name, version)` pair identifying a deployable model artifact.
/// Canonical text form is `name:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub name: String,
    pub version: String,
}

impl ModelKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Parses the canonical `name:version` text form. `name` itself must not
    /// contain `:`; the version is everything after the first colon, so a
    /// version string containing `:` round-trips correctly.
    pub fn parse(raw: &str) -> Option<Self> {
        let (name, version) = raw.split_once(':')?;
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self::new(name, version))
    }

    pub fn canonical(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

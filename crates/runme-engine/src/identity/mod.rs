//! # Identity
//!
//! Stable ULID identifiers for documents and cells.
//!
//! The lifecycle decides which of the two get durable identifiers. Ids are
//! produced by an injected [`IdGenerator`], so tests and reproducible runs
//! can swap in [`FixedIdGenerator`] or [`SequentialIdGenerator`] without
//! touching any global state.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::ast::NodeId;
use crate::attributes::Attributes;
use crate::error::ErrorKind;

static ULID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-HJKMNP-TV-Z]{26}$").expect("ULID pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("invalid identifier {0:?}: expected a 26 character ULID")]
    InvalidId(String),
    #[error("unknown identity lifecycle {0:?}")]
    UnknownLifecycle(String),
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Identity
    }
}

/// Returns true if `id` is a canonical upper-case ULID.
pub fn is_valid_id(id: &str) -> bool {
    ULID_PATTERN.is_match(id)
}

pub fn validate_id(id: &str) -> Result<(), IdentityError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(IdentityError::InvalidId(id.to_string()))
    }
}

/// Which entities receive durable identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Unspecified,
    #[default]
    All,
    Document,
    Cell,
}

impl Lifecycle {
    #[must_use]
    pub fn document_identity(self) -> bool {
        matches!(self, Lifecycle::All | Lifecycle::Document)
    }

    #[must_use]
    pub fn cell_identity(self) -> bool {
        matches!(self, Lifecycle::All | Lifecycle::Cell)
    }
}

impl FromStr for Lifecycle {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unspecified" | "" => Ok(Lifecycle::Unspecified),
            "all" => Ok(Lifecycle::All),
            "document" => Ok(Lifecycle::Document),
            "cell" => Ok(Lifecycle::Cell),
            _ => Err(IdentityError::UnknownLifecycle(s.to_string())),
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Unspecified => "unspecified",
            Lifecycle::All => "all",
            Lifecycle::Document => "document",
            Lifecycle::Cell => "cell",
        };
        f.write_str(name)
    }
}

/// Source of fresh identifiers.
pub trait IdGenerator: fmt::Debug + Send + Sync {
    fn generate(&self) -> String;
}

/// Random, time-ordered ULIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UlidGenerator;

impl IdGenerator for UlidGenerator {
    fn generate(&self) -> String {
        Ulid::new().to_string()
    }
}

/// Hands out the same identifier every time.
#[derive(Debug, Clone)]
pub struct FixedIdGenerator(String);

impl FixedIdGenerator {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl IdGenerator for FixedIdGenerator {
    fn generate(&self) -> String {
        self.0.clone()
    }
}

/// Deterministic, distinct ULIDs sharing one timestamp.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    timestamp_ms: u64,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Ulid::from_parts(self.timestamp_ms, u128::from(n)).to_string()
    }
}

pub fn default_generator() -> Arc<dyn IdGenerator> {
    Arc::new(UlidGenerator)
}

/// Per-document cell identity cache.
///
/// The same AST node always resolves to the same identifier, however many
/// times the block tree is traversed.
#[derive(Debug)]
pub struct IdentityResolver {
    lifecycle: Lifecycle,
    generator: Arc<dyn IdGenerator>,
    cache: Mutex<HashMap<NodeId, String>>,
}

impl IdentityResolver {
    pub fn new(lifecycle: Lifecycle, generator: Arc<dyn IdGenerator>) -> Self {
        Self {
            lifecycle,
            generator,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn generator(&self) -> &dyn IdGenerator {
        self.generator.as_ref()
    }

    /// Resolve the identifier for a code block node.
    ///
    /// Returns the id and whether it came from a valid `id` attribute.
    pub fn cell_id(&self, node: NodeId, attributes: &Attributes) -> (String, bool) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = cache.get(&node) {
            let from_attributes = attributes.get("id") == Some(id.as_str());
            return (id.clone(), from_attributes);
        }

        let (id, from_attributes) = match attributes.get("id") {
            Some(id) => match validate_id(id) {
                Ok(()) => (id.to_string(), true),
                Err(err) => {
                    log::debug!("replacing cell id: {err}");
                    (self.generator.generate(), false)
                }
            },
            None => (self.generator.generate(), false),
        };
        cache.insert(node, id.clone());
        (id, from_attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::FIXED_ID;
    use rstest::rstest;

    #[test]
    fn test_ulid_generator_produces_valid_ids() {
        let id = UlidGenerator.generate();
        assert!(is_valid_id(&id), "{id}");
    }

    #[test]
    fn test_sequential_generator_is_distinct_and_valid() {
        let generator = SequentialIdGenerator::new(1_700_000_000_000);
        let first = generator.generate();
        let second = generator.generate();
        assert_ne!(first, second);
        assert!(is_valid_id(&first));
        assert!(is_valid_id(&second));
    }

    #[rstest]
    #[case(FIXED_ID, true)]
    #[case("01hfb6z3n6y8q4b2t7g9kj3m5v", false)]
    #[case("01HFB6Z3N6Y8Q4B2T7G9KJ3M5", false)]
    #[case("01HFB6Z3N6Y8Q4B2T7G9KJ3M5I", false)]
    #[case("", false)]
    fn test_is_valid_id(#[case] id: &str, #[case] expected: bool) {
        assert_eq!(is_valid_id(id), expected);
    }

    #[rstest]
    #[case(Lifecycle::All, true, true)]
    #[case(Lifecycle::Document, true, false)]
    #[case(Lifecycle::Cell, false, true)]
    #[case(Lifecycle::Unspecified, false, false)]
    fn test_lifecycle_flags(#[case] lifecycle: Lifecycle, #[case] doc: bool, #[case] cell: bool) {
        assert_eq!(lifecycle.document_identity(), doc);
        assert_eq!(lifecycle.cell_identity(), cell);
    }

    #[test]
    fn test_lifecycle_from_str() {
        assert_eq!("cell".parse::<Lifecycle>().unwrap(), Lifecycle::Cell);
        assert_eq!("ALL".parse::<Lifecycle>().unwrap(), Lifecycle::All);
        assert!("sometimes".parse::<Lifecycle>().is_err());
    }

    #[test]
    fn test_cell_id_is_memoized_per_node() {
        // Given a resolver backed by a sequential generator
        let resolver = IdentityResolver::new(
            Lifecycle::All,
            Arc::new(SequentialIdGenerator::new(1_700_000_000_000)),
        );
        let attrs = Attributes::default();

        // When the same node is resolved twice
        let (first, first_from_attrs) = resolver.cell_id(NodeId(3), &attrs);
        let (again, _) = resolver.cell_id(NodeId(3), &attrs);
        let (other, _) = resolver.cell_id(NodeId(4), &attrs);

        // Then it keeps its id while other nodes get fresh ones
        assert_eq!(first, again);
        assert_ne!(first, other);
        assert!(!first_from_attrs);
    }

    #[test]
    fn test_cell_id_prefers_valid_attribute() {
        let resolver = IdentityResolver::new(Lifecycle::All, default_generator());
        let mut attrs = Attributes::default();
        attrs.insert("id", FIXED_ID);

        let (id, from_attrs) = resolver.cell_id(NodeId(1), &attrs);

        assert_eq!(id, FIXED_ID);
        assert!(from_attrs);
    }

    #[test]
    fn test_cell_id_replaces_invalid_attribute() {
        let resolver = IdentityResolver::new(Lifecycle::All, Arc::new(FixedIdGenerator::new(FIXED_ID)));
        let mut attrs = Attributes::default();
        attrs.insert("id", "not-a-ulid");

        let (id, from_attrs) = resolver.cell_id(NodeId(1), &attrs);

        assert_eq!(id, FIXED_ID);
        assert!(!from_attrs);
    }
}

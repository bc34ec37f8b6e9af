//! Human-readable code block names.
//!
//! The seed is the `name` attribute when present, otherwise it is derived
//! from the first non-comment line of the block. Seeds are deduplicated per
//! document with a numeric suffix.

use std::collections::HashMap;

use crate::ast::NodeId;

const MAX_SEED_CHARS: usize = 32;
const MAX_FRAGMENTS: usize = 2;
const FALLBACK_NAME: &str = "unnamed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub name: String,
    pub explicit: bool,
}

/// Per-document name assignment, memoized by AST node.
#[derive(Debug, Default)]
pub struct NameResolver {
    counts: HashMap<String, usize>,
    names: HashMap<NodeId, ResolvedName>,
}

impl NameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name for `node`. `explicit` is the block's `name` attribute, `lines`
    /// its normalized body lines.
    pub fn resolve(&mut self, node: NodeId, explicit: Option<&str>, lines: &[String]) -> ResolvedName {
        if let Some(resolved) = self.names.get(&node) {
            return resolved.clone();
        }

        let (seed, explicit) = match explicit.filter(|name| !name.is_empty()) {
            Some(name) => (name.to_string(), true),
            None => (derive_seed(lines), false),
        };
        let resolved = ResolvedName {
            name: self.claim(seed),
            explicit,
        };

        self.names.insert(node, resolved.clone());
        resolved
    }

    fn claim(&mut self, seed: String) -> String {
        let count = self.counts.entry(seed.clone()).or_default();
        *count += 1;
        if *count == 1 {
            seed
        } else {
            format!("{seed}-{count}")
        }
    }
}

fn derive_seed(lines: &[String]) -> String {
    let seed = first_command_line(lines).map(sanitize).unwrap_or_default();
    if seed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        seed
    }
}

fn first_command_line(lines: &[String]) -> Option<&str> {
    let non_empty: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    non_empty
        .iter()
        .find(|line| !is_comment(line))
        .or(non_empty.first())
        .copied()
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with("//")
}

/// Reduce a command line to a lowercase, dash-separated name seed.
pub fn sanitize(line: &str) -> String {
    let line = line.split('=').next().unwrap_or_default();
    let capped: String = line.chars().take(MAX_SEED_CHARS).collect();
    let fragments: Vec<&str> = capped.split_whitespace().take(MAX_FRAGMENTS).collect();
    let kept: String = fragments
        .join(" ")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || *c == ' ')
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("-")
}

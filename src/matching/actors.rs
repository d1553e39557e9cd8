// src/matching/actors.rs

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use strsim::jaro_winkler;

/// Minimum Jaro-Winkler similarity for an unknown actor name to be snapped
/// onto a known canonical name.
const FUZZY_ALIAS_THRESHOLD: f64 = 0.95;

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9\s]").expect("valid regex"));

/// Normalizes an actor name for comparison: lowercase, punctuation stripped,
/// whitespace collapsed.
pub fn normalize_actor(name: &str) -> String {
    let mut normalized = name.to_lowercase();
    normalized = normalized.replace('&', " and ");
    normalized = NON_ALPHANUMERIC.replace_all(&normalized, " ").into_owned();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Alias table mapping reported actor names onto canonical names, e.g.
/// "IDF" onto "israeli defense forces".
///
/// The table is an explicit value injected into the scorer's constructor;
/// it carries no module-level state and its contents are supplied by the
/// external entity-linking collaborator. Names not present in the table fall
/// back to a fuzzy match against the known canonicals, so minor spelling
/// variants of the same faction still resolve together.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    canonical_by_alias: HashMap<String, String>,
    canonicals: Vec<String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(alias, canonical)` pairs. Both sides are
    /// normalized on load.
    pub fn from_pairs<I, A, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: AsRef<str>,
        C: AsRef<str>,
    {
        let mut table = Self::new();
        for (alias, canonical) in pairs {
            table.insert(alias.as_ref(), canonical.as_ref());
        }
        table
    }

    pub fn insert(&mut self, alias: &str, canonical: &str) {
        let canonical_norm = normalize_actor(canonical);
        if !self.canonicals.contains(&canonical_norm) {
            self.canonicals.push(canonical_norm.clone());
        }
        self.canonical_by_alias
            .insert(normalize_actor(alias), canonical_norm);
    }

    pub fn is_empty(&self) -> bool {
        self.canonical_by_alias.is_empty()
    }

    /// Resolves a reported name to its canonical form.
    pub fn resolve(&self, name: &str) -> String {
        let normalized = normalize_actor(name);
        if normalized.is_empty() {
            return normalized;
        }
        if let Some(canonical) = self.canonical_by_alias.get(&normalized) {
            return canonical.clone();
        }
        // Fuzzy pass over known canonicals for near-identical spellings.
        let mut best: Option<(f64, &String)> = None;
        for canonical in &self.canonicals {
            let sim = jaro_winkler(&normalized, canonical);
            if sim >= FUZZY_ALIAS_THRESHOLD && best.map_or(true, |(b, _)| sim > b) {
                best = Some((sim, canonical));
            }
        }
        match best {
            Some((_, canonical)) => canonical.clone(),
            None => normalized,
        }
    }

    /// Resolves a list of reported names into a canonical set.
    pub fn resolve_set(&self, names: &[String]) -> HashSet<String> {
        names
            .iter()
            .map(|n| self.resolve(n))
            .filter(|n| !n.is_empty())
            .collect()
    }
}

/// Jaccard overlap of the alias-resolved actor sets of two events.
///
/// Returns `None` when both sets are empty: absence of actor data on both
/// sides carries no signal and the dimension is excluded from the hybrid
/// average rather than scored as zero.
pub fn actor_overlap(a: &[String], b: &[String], aliases: &AliasTable) -> Option<f64> {
    let set_a = aliases.resolve_set(a);
    let set_b = aliases.resolve_set(b);
    if set_a.is_empty() && set_b.is_empty() {
        return None;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return None;
    }
    Some(intersection as f64 / union as f64)
}

//! Per-category guard sets.
//!
//! A guard set is the vocabulary that defines a term's home category. Sets are
//! loaded from `<dir>/<category>.txt`, one term per line, with blank lines and
//! `#` comments skipped. Loading never fails: a missing or unreadable file
//! yields an empty set for that category.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use keywatch_shared::Category;
use tracing::{debug, info, warn};

use crate::canonical::normalize;

/// Guard sets for all three categories, owned by the pipeline instance.
#[derive(Debug, Clone, Default)]
pub struct GuardSets {
    dir: Option<PathBuf>,
    sets: BTreeMap<Category, HashSet<String>>,
}

impl GuardSets {
    /// Empty guard sets. Nothing is ever detected as a leak.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load guard files from `dir`.
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let mut guards = Self {
            dir: Some(dir.into()),
            sets: BTreeMap::new(),
        };
        guards.refresh();
        guards
    }

    /// Build guard sets from in-memory terms. Terms are canonicalized.
    pub fn from_terms<'a>(terms: impl IntoIterator<Item = (Category, &'a str)>) -> Self {
        let mut sets: BTreeMap<Category, HashSet<String>> = BTreeMap::new();
        for (category, term) in terms {
            let canonical = normalize(term);
            if !canonical.is_empty() {
                sets.entry(category).or_default().insert(canonical);
            }
        }
        Self { dir: None, sets }
    }

    /// Re-read every guard file from disk. A no-op for in-memory sets.
    pub fn refresh(&mut self) {
        let Some(dir) = self.dir.clone() else {
            return;
        };

        for category in Category::ALL {
            let set = load_category(&dir, category);
            self.sets.insert(category, set);
        }

        info!(
            dir = %dir.display(),
            industry = self.len(Category::Industry),
            company = self.len(Category::Company),
            regulatory = self.len(Category::Regulatory),
            "guard sets loaded"
        );
    }

    /// Directory the sets were loaded from, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Whether `category`'s guard set contains an already-canonical term.
    pub fn contains(&self, category: Category, canonical: &str) -> bool {
        self.sets
            .get(&category)
            .is_some_and(|set| set.contains(canonical))
    }

    /// Categories whose guard set contains the term, in lexicographic name order.
    pub fn matching_categories(&self, canonical: &str) -> Vec<Category> {
        let mut matches: Vec<Category> = Category::ALL
            .into_iter()
            .filter(|c| self.contains(*c, canonical))
            .collect();
        matches.sort_by_key(|c| c.as_str());
        matches
    }

    /// Number of terms in one category's set.
    pub fn len(&self, category: Category) -> usize {
        self.sets.get(&category).map_or(0, HashSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(HashSet::is_empty)
    }
}

fn load_category(dir: &Path, category: Category) -> HashSet<String> {
    let path = dir.join(format!("{}.txt", category.as_str()));

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "guard file not found, using empty set");
            return HashSet::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read guard file, using empty set");
            return HashSet::new();
        }
    };

    parse_guard_file(&content)
}

fn parse_guard_file(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize)
        .collect()
}

//! Completeness auditing.
//!
//! Verifies that every input keyword is still accounted for in a category
//! map. The result is a report, never an error: callers decide whether to
//! retry the missing keywords.

use std::collections::HashSet;

use keywatch_shared::CategoryMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::canonical::normalize;

/// Outcome of one completeness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub is_complete: bool,
    /// Missing keywords in their input surface form, input order, once each.
    pub missing_keywords: Vec<String>,
}

impl CompletenessReport {
    fn from_missing(missing_keywords: Vec<String>) -> Self {
        Self {
            is_complete: missing_keywords.is_empty(),
            missing_keywords,
        }
    }
}

/// Check that every input keyword's canonical form appears in `output`.
pub fn check<S: AsRef<str>>(input: &[S], output: &CategoryMap) -> CompletenessReport {
    check_accounting_for::<S, &str>(input, output, &[])
}

/// Like [`check`], but keywords whose canonical form matches an entry in
/// `accounted` (e.g. recorded duplicates) are not reported as missing.
pub fn check_accounting_for<S: AsRef<str>, A: AsRef<str>>(
    input: &[S],
    output: &CategoryMap,
    accounted: &[A],
) -> CompletenessReport {
    let present: HashSet<String> = output
        .keywords()
        .map(|k| normalize(k))
        .chain(accounted.iter().map(|k| normalize(k.as_ref())))
        .collect();

    let mut reported: HashSet<String> = HashSet::new();
    let mut missing = Vec::new();

    for keyword in input {
        let keyword = keyword.as_ref();
        let canonical = normalize(keyword);
        if !present.contains(&canonical) && reported.insert(canonical) {
            missing.push(keyword.to_string());
        }
    }

    let report = CompletenessReport::from_missing(missing);
    if !report.is_complete {
        warn!(
            missing = report.missing_keywords.len(),
            keywords = ?report.missing_keywords,
            "completeness check failed"
        );
    }
    report
}

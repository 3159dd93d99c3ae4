//! Deterministic guardrails over oracle-produced keyword sets.
//!
//! Runs isolation, deduplication and the first completeness checkpoint as
//! synchronous single-pass transforms:
//!
//! ```text
//! CategoryMap → isolate → dedupe → check_accounting_for → GuardrailsOutcome
//! ```

pub mod canonical;
pub mod completeness;
pub mod dedup;
pub mod guards;
pub mod isolation;

pub use canonical::{normalize, plural_fold};
pub use completeness::{CompletenessReport, check, check_accounting_for};
pub use dedup::dedupe;
pub use guards::GuardSets;
pub use isolation::{Isolated, isolate};

use keywatch_shared::{CategoryMap, IsolationMode};
use serde::Serialize;
use tracing::{info, instrument};

/// Keyword tallies for one guardrails pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuardrailCounts {
    pub input_total: usize,
    pub output_accounted: usize,
    pub leaks_blocked: usize,
    pub duplicates_dropped: usize,
}

/// Audit trail returned alongside the processed categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardrailsReport {
    pub leaks_blocked: Vec<String>,
    pub duplicates_dropped: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ambiguities: Vec<String>,
    pub completeness_check: CompletenessReport,
    /// Filled in by the pipeline after flagging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_flag_check: Option<CompletenessReport>,
    pub counts: GuardrailCounts,
}

#[derive(Debug, Clone)]
pub struct GuardrailsOutcome {
    pub categories: CategoryMap,
    pub report: GuardrailsReport,
}

/// Isolation, dedup and checkpoint 1 with one isolation semantics.
#[derive(Debug, Clone, Copy)]
pub struct Guardrails<'a> {
    guards: &'a GuardSets,
    mode: IsolationMode,
}

impl<'a> Guardrails<'a> {
    pub fn new(guards: &'a GuardSets, mode: IsolationMode) -> Self {
        Self { guards, mode }
    }

    /// Apply every guardrail to the oracle's categories. `input_keywords` is
    /// the caller's original flat list used for the completeness check.
    #[instrument(skip_all, fields(input = input_keywords.len(), mode = ?self.mode))]
    pub fn apply<S: AsRef<str>>(
        &self,
        input_keywords: &[S],
        categories: &CategoryMap,
    ) -> GuardrailsOutcome {
        let isolated = isolate(categories, self.guards, self.mode);
        let (deduped, duplicates_dropped) = dedupe(&isolated.categories);
        let completeness_check =
            check_accounting_for(input_keywords, &deduped, &duplicates_dropped);

        let counts = GuardrailCounts {
            input_total: input_keywords.len(),
            output_accounted: deduped.len(),
            leaks_blocked: isolated.leaks_blocked.len(),
            duplicates_dropped: duplicates_dropped.len(),
        };

        info!(
            input_total = counts.input_total,
            output = counts.output_accounted,
            leaks = counts.leaks_blocked,
            duplicates = counts.duplicates_dropped,
            complete = completeness_check.is_complete,
            "guardrails applied"
        );

        GuardrailsOutcome {
            categories: deduped,
            report: GuardrailsReport {
                leaks_blocked: isolated.leaks_blocked,
                duplicates_dropped,
                ambiguities: isolated.ambiguities,
                completeness_check,
                post_flag_check: None,
                counts,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use keywatch_shared::Category;

    use super::*;

    fn guards() -> GuardSets {
        GuardSets::from_terms([
            (Category::Regulatory, "prudential authority"),
            (Category::Regulatory, "fsca"),
            (Category::Company, "santam"),
        ])
    }

    #[test]
    fn relocation_scenario() {
        let guards = guards();
        let categories = CategoryMap {
            industry: vec!["Prudential Authority".into(), "Reinsurance".into()],
            ..CategoryMap::default()
        };
        let input = ["Prudential Authority", "Reinsurance"];

        let outcome = Guardrails::new(&guards, IsolationMode::Relocate).apply(&input, &categories);

        assert!(!outcome
            .categories
            .industry
            .contains(&"Prudential Authority".to_string()));
        assert_eq!(outcome.categories.regulatory, vec!["Prudential Authority"]);
        assert_eq!(outcome.report.leaks_blocked.len(), 1);
        assert!(outcome.report.leaks_blocked[0].contains("moved from industry to regulatory"));
        assert!(outcome.report.completeness_check.is_complete);
    }

    #[test]
    fn duplicate_scenario() {
        let guards = GuardSets::empty();
        let categories = CategoryMap {
            industry: vec!["Car Insurance".into(), "car insurance ".into()],
            ..CategoryMap::default()
        };
        let input = ["Car Insurance", "car insurance "];

        let outcome = Guardrails::new(&guards, IsolationMode::Relocate).apply(&input, &categories);

        assert_eq!(outcome.categories.industry, vec!["Car Insurance"]);
        assert_eq!(outcome.report.duplicates_dropped, vec!["car insurance "]);
        assert!(outcome.report.completeness_check.is_complete);
        assert_eq!(
            outcome.report.counts,
            GuardrailCounts {
                input_total: 2,
                output_accounted: 1,
                leaks_blocked: 0,
                duplicates_dropped: 1,
            }
        );
    }

    #[test]
    fn reject_losses_surface_at_checkpoint_one() {
        let guards = guards();
        let categories = CategoryMap {
            industry: vec!["Santam".into(), "Cyber".into()],
            ..CategoryMap::default()
        };
        let input = ["Santam", "Cyber"];

        let outcome = Guardrails::new(&guards, IsolationMode::Reject).apply(&input, &categories);

        assert!(!outcome.report.completeness_check.is_complete);
        assert_eq!(outcome.report.completeness_check.missing_keywords, vec!["Santam"]);
        assert_eq!(outcome.report.leaks_blocked, vec!["Santam"]);
    }

    #[test]
    fn oracle_omissions_are_reported() {
        let guards = GuardSets::empty();
        let categories = CategoryMap {
            company: vec!["Old Mutual".into()],
            ..CategoryMap::default()
        };
        let outcome = Guardrails::new(&guards, IsolationMode::Relocate)
            .apply(&["Old Mutual", "Hollard"], &categories);
        assert_eq!(outcome.report.completeness_check.missing_keywords, vec!["Hollard"]);
    }

    #[test]
    fn completeness_and_exclusivity_hold_for_mixed_batch() {
        let guards = guards();
        let categories = CategoryMap {
            industry: vec![
                "FSCA".into(),
                "Motor Insurance".into(),
                "Claims".into(),
                "santam".into(),
            ],
            company: vec!["Santam".into(), "Car Insurance".into()],
            regulatory: vec!["claim".into(), "Prudential  Authority".into()],
        };
        let input: Vec<String> = categories.keywords().cloned().collect();

        let outcome = Guardrails::new(&guards, IsolationMode::Relocate).apply(&input, &categories);

        let recorded: HashSet<String> = outcome
            .report
            .duplicates_dropped
            .iter()
            .map(|k| normalize(k))
            .collect();
        let present: HashSet<String> = outcome.categories.keywords().map(|k| normalize(k)).collect();
        for keyword in &input {
            let canonical = normalize(keyword);
            assert!(
                present.contains(&canonical) || recorded.contains(&canonical),
                "{keyword} silently lost"
            );
        }

        let mut seen = HashSet::new();
        for keyword in outcome.categories.keywords() {
            assert!(seen.insert(normalize(keyword)), "{keyword} in two categories");
        }

        assert!(outcome.report.completeness_check.is_complete);
    }

    #[test]
    fn report_serializes_counts() {
        let guards = GuardSets::empty();
        let outcome = Guardrails::new(&guards, IsolationMode::Relocate)
            .apply(&["A"], &CategoryMap {
                industry: vec!["A".into()],
                ..CategoryMap::default()
            });
        let json = serde_json::to_value(&outcome.report).expect("serialize");
        assert_eq!(json["counts"]["input_total"], 1);
        assert!(json.get("ambiguities").is_none());
        assert!(json.get("post_flag_check").is_none());
    }
}

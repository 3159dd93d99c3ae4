//! Cross-category isolation.
//!
//! A keyword whose canonical form sits in another category's guard set has
//! leaked. Depending on [`IsolationMode`] it is moved to its home category or
//! dropped; either way the event is recorded in `leaks_blocked`.

use keywatch_shared::{Category, CategoryMap, IsolationMode};
use tracing::debug;

use crate::canonical::normalize;
use crate::guards::GuardSets;

/// Result of one isolation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Isolated {
    pub categories: CategoryMap,
    /// Move notes (relocate) or dropped keywords (reject).
    pub leaks_blocked: Vec<String>,
    /// Keywords that matched more than one guard set.
    pub ambiguities: Vec<String>,
}

/// Enforce category exclusivity against the guard sets.
///
/// Buckets are processed in fixed category order, keywords in input order.
/// When a keyword matches several guard sets its current category wins if it
/// is among them, otherwise the lexicographically first category name.
pub fn isolate(input: &CategoryMap, guards: &GuardSets, mode: IsolationMode) -> Isolated {
    let mut out = Isolated::default();

    for (category, keywords) in input.iter() {
        for keyword in keywords {
            let canonical = normalize(keyword);
            let matches = guards.matching_categories(&canonical);

            let Some(target) = pick_home(category, &matches) else {
                out.categories.get_mut(category).push(keyword.clone());
                continue;
            };

            if matches.len() > 1 {
                let names: Vec<&str> = matches.iter().map(Category::as_str).collect();
                out.ambiguities.push(format!(
                    "'{keyword}' matches guard sets {}; assigned to {target}",
                    names.join(", ")
                ));
            }

            if target == category {
                out.categories.get_mut(category).push(keyword.clone());
                continue;
            }

            match mode {
                IsolationMode::Relocate => {
                    debug!(%keyword, from = %category, to = %target, "keyword relocated");
                    out.leaks_blocked
                        .push(format!("'{keyword}' moved from {category} to {target}"));
                    out.categories.get_mut(target).push(keyword.clone());
                }
                IsolationMode::Reject => {
                    debug!(%keyword, from = %category, home = %target, "leaked keyword rejected");
                    out.leaks_blocked.push(keyword.clone());
                }
            }
        }
    }

    out
}

fn pick_home(current: Category, matches: &[Category]) -> Option<Category> {
    if matches.contains(&current) {
        Some(current)
    } else {
        matches.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(industry: &[&str], company: &[&str], regulatory: &[&str]) -> CategoryMap {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        CategoryMap {
            industry: owned(industry),
            company: owned(company),
            regulatory: owned(regulatory),
        }
    }

    #[test]
    fn relocates_into_guarded_category() {
        let guards = GuardSets::from_terms([(Category::Regulatory, "prudential authority")]);
        let input = map(&["Prudential Authority", "Reinsurance"], &[], &["FSCA"]);

        let out = isolate(&input, &guards, IsolationMode::Relocate);

        assert_eq!(out.categories.industry, vec!["Reinsurance"]);
        assert_eq!(out.categories.regulatory, vec!["Prudential Authority", "FSCA"]);
        assert_eq!(
            out.leaks_blocked,
            vec!["'Prudential Authority' moved from industry to regulatory"]
        );
        assert!(out.ambiguities.is_empty());
    }

    #[test]
    fn reject_drops_and_records_keyword() {
        let guards = GuardSets::from_terms([(Category::Company, "Santam")]);
        let input = map(&["santam", "Underwriting"], &[], &[]);

        let out = isolate(&input, &guards, IsolationMode::Reject);

        assert_eq!(out.categories.industry, vec!["Underwriting"]);
        assert!(out.categories.company.is_empty());
        assert_eq!(out.leaks_blocked, vec!["santam"]);
    }

    #[test]
    fn current_category_wins_ties() {
        let guards = GuardSets::from_terms([
            (Category::Industry, "solvency"),
            (Category::Regulatory, "solvency"),
        ]);
        let input = map(&[], &[], &["Solvency"]);

        let out = isolate(&input, &guards, IsolationMode::Relocate);

        assert_eq!(out.categories.regulatory, vec!["Solvency"]);
        assert!(out.leaks_blocked.is_empty());
        assert_eq!(out.ambiguities.len(), 1);
        assert!(out.ambiguities[0].contains("assigned to regulatory"));
    }

    #[test]
    fn lexicographic_category_breaks_foreign_ties() {
        let guards = GuardSets::from_terms([
            (Category::Regulatory, "solvency"),
            (Category::Industry, "solvency"),
        ]);
        let input = map(&[], &["Solvency"], &[]);

        let out = isolate(&input, &guards, IsolationMode::Relocate);

        // "industry" < "regulatory"
        assert_eq!(out.categories.industry, vec!["Solvency"]);
        assert!(out.categories.company.is_empty());
        assert_eq!(out.leaks_blocked, vec!["'Solvency' moved from company to industry"]);
    }

    #[test]
    fn unguarded_keywords_stay_put() {
        let guards = GuardSets::empty();
        let input = map(&["A"], &["B"], &["C"]);
        let out = isolate(&input, &guards, IsolationMode::Reject);
        assert_eq!(out.categories, input);
        assert!(out.leaks_blocked.is_empty());
    }
}

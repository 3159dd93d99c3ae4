//! Global keyword deduplication.

use std::collections::HashSet;

use keywatch_shared::CategoryMap;
use tracing::debug;

use crate::canonical::{normalize, plural_fold};

/// Drop keywords whose canonical form or plural fold was already seen in any
/// category. First occurrence wins; later ones are returned by surface form.
pub fn dedupe(input: &CategoryMap) -> (CategoryMap, Vec<String>) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut deduped = CategoryMap::new();
    let mut dropped = Vec::new();

    for (category, keywords) in input.iter() {
        for keyword in keywords {
            let canonical = normalize(keyword);
            let folded = plural_fold(&canonical);

            if seen.contains(&canonical) || seen.contains(&folded) {
                debug!(%keyword, %category, "duplicate dropped");
                dropped.push(keyword.clone());
                continue;
            }

            seen.insert(canonical);
            seen.insert(folded);
            deduped.get_mut(category).push(keyword.clone());
        }
    }

    (deduped, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn industry(keywords: &[&str]) -> CategoryMap {
        CategoryMap {
            industry: keywords.iter().map(|s| s.to_string()).collect(),
            ..CategoryMap::default()
        }
    }

    #[test]
    fn keeps_first_surface_form() {
        let (out, dropped) = dedupe(&industry(&["Car Insurance", "car insurance "]));
        assert_eq!(out.industry, vec!["Car Insurance"]);
        assert_eq!(dropped, vec!["car insurance "]);
    }

    #[test]
    fn synonyms_collapse() {
        let (out, dropped) = dedupe(&industry(&["Motor Insurance", "Car insurance"]));
        assert_eq!(out.industry, vec!["Motor Insurance"]);
        assert_eq!(dropped, vec!["Car insurance"]);
    }

    #[test]
    fn plural_folds_in_both_directions() {
        let (out, dropped) = dedupe(&industry(&["Claims", "Claim"]));
        assert_eq!(out.industry, vec!["Claims"]);
        assert_eq!(dropped, vec!["Claim"]);

        let (out, dropped) = dedupe(&industry(&["Policy", "Policies"]));
        assert_eq!(out.industry, vec!["Policy"]);
        assert_eq!(dropped, vec!["Policies"]);
    }

    #[test]
    fn duplicates_are_global_across_categories() {
        let input = CategoryMap {
            industry: vec!["Reinsurance".into()],
            company: vec!["Santam".into()],
            regulatory: vec!["reinsurance".into(), "FSCA".into()],
        };
        let (out, dropped) = dedupe(&input);
        assert_eq!(out.industry, vec!["Reinsurance"]);
        assert_eq!(out.company, vec!["Santam"]);
        assert_eq!(out.regulatory, vec!["FSCA"]);
        assert_eq!(dropped, vec!["reinsurance"]);
    }

    #[test]
    fn output_has_no_canonical_overlap() {
        let input = CategoryMap {
            industry: vec!["Cyber Risk".into(), "Claims".into()],
            company: vec!["cyber risk".into(), "Old Mutual".into()],
            regulatory: vec!["claim".into(), "Twin Peaks".into()],
        };
        let (out, _) = dedupe(&input);
        let mut seen = HashSet::new();
        for keyword in out.keywords() {
            assert!(seen.insert(normalize(keyword)), "{keyword} appears twice");
        }
    }
}

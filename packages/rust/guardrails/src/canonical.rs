//! Keyword canonicalization.
//!
//! Every equality and membership check in the guardrails runs on the
//! canonical form produced here, never on the surface string.

use unicode_normalization::UnicodeNormalization;

/// Fixed synonym table applied after normalization.
const SYNONYMS: &[(&str, &str)] = &[
    ("auto insurance", "car insurance"),
    ("vehicle insurance", "car insurance"),
    ("motor insurance", "car insurance"),
    ("artificial intelligence", "ai"),
    ("machine learning", "ml"),
];

/// Canonical form of a keyword: NFKD-folded, lowercased, trimmed, internal
/// whitespace collapsed to single spaces, then mapped through the synonym
/// table. Idempotent.
pub fn normalize(keyword: &str) -> String {
    // Lowercasing can produce sequences NFKD would split again, so decompose
    // on both sides.
    let lowered: String = keyword.nfkd().collect::<String>().to_lowercase();
    let folded: String = lowered.nfkd().collect();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    match SYNONYMS.iter().find(|(from, _)| *from == collapsed) {
        Some((_, to)) => (*to).to_string(),
        None => collapsed,
    }
}

/// Naive plural fold used for duplicate detection.
///
/// `ies` → `y`; otherwise a trailing `es` is dropped when the word is longer
/// than three characters, or a trailing `s` when longer than two.
pub fn plural_fold(canonical: &str) -> String {
    let len = canonical.chars().count();
    if let Some(stem) = canonical.strip_suffix("ies") {
        format!("{stem}y")
    } else if len > 3 && canonical.ends_with("es") {
        canonical[..canonical.len() - 2].to_string()
    } else if len > 2 && canonical.ends_with('s') {
        canonical[..canonical.len() - 1].to_string()
    } else {
        canonical.to_string()
    }
}

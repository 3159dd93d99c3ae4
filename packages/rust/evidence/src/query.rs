//! Region-aware search query variants.
//!
//! The variant list is a pure function of its inputs: the evidence cache is
//! keyed on the same inputs, so the ordering must never change between runs.

use keywatch_shared::{RegionMode, RegionScope, cctld_for};

/// Build the ordered search queries for one keyword.
///
/// Always a base query and a recency-biased query; scoped keywords get a
/// third, region-qualified query.
pub fn build_queries(keyword: &str, sector: &str, scope: &RegionScope) -> Vec<String> {
    let base = base_query(keyword, sector);
    let mut queries = vec![base.clone(), format!("{base} latest news")];

    match (scope.mode, scope.country.as_deref()) {
        (RegionMode::IncludeCountry, Some(country)) => {
            queries.push(format!("{base} {country}"));
        }
        (RegionMode::ExcludeCountry, Some(country)) => {
            let query = match cctld_for(country) {
                Some(tld) => format!("{base} -site:.{tld} -\"{country}\""),
                None => format!("{base} -\"{country}\""),
            };
            queries.push(query);
        }
        _ => {}
    }

    queries
}

fn base_query(keyword: &str, sector: &str) -> String {
    let keyword = keyword.split_whitespace().collect::<Vec<_>>().join(" ");
    let sector = sector.trim();
    if sector.is_empty() {
        format!("\"{keyword}\"")
    } else {
        format!("\"{keyword}\" {sector}")
    }
}

/// The quoted search term of a query built by [`build_queries`], or the whole
/// query when it carries no quotes.
pub fn query_term(query: &str) -> &str {
    let mut parts = query.splitn(3, '"');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(term), Some(_)) if !term.is_empty() => term,
        _ => query.trim(),
    }
}

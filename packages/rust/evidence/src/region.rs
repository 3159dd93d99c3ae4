//! Region inference for evidence items.
//!
//! Three tiers, first hit wins:
//! 1. known publisher domains
//! 2. country-code TLD suffixes (generic TLDs never guess)
//! 3. word-boundary term density over title and snippet

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use keywatch_shared::RegionScope;
pub use keywatch_shared::{cctld_for, normalize_region_name};

const SOUTH_AFRICA: &str = "South Africa";
const UNITED_STATES: &str = "United States";
const UNITED_KINGDOM: &str = "United Kingdom";

/// Minimum weighted term score before tier 3 names a region.
const MIN_TERM_WEIGHT: usize = 2;

/// Known publishers. `None` marks global outlets, which never imply a region.
const PUBLISHER_REGIONS: &[(&str, Option<&str>)] = &[
    ("moneyweb.co.za", Some(SOUTH_AFRICA)),
    ("businesslive.co.za", Some(SOUTH_AFRICA)),
    ("news24.com", Some(SOUTH_AFRICA)),
    ("iol.co.za", Some(SOUTH_AFRICA)),
    ("dailymaverick.co.za", Some(SOUTH_AFRICA)),
    ("fin24.com", Some(SOUTH_AFRICA)),
    ("timeslive.co.za", Some(SOUTH_AFRICA)),
    ("businesstech.co.za", Some(SOUTH_AFRICA)),
    ("mg.co.za", Some(SOUTH_AFRICA)),
    ("citizen.co.za", Some(SOUTH_AFRICA)),
    ("insurancechat.co.za", Some(SOUTH_AFRICA)),
    ("cover.co.za", Some(SOUTH_AFRICA)),
    ("reuters.com", None),
    ("bloomberg.com", None),
    ("insurancebusinessmag.com", None),
    ("wsj.com", Some(UNITED_STATES)),
    ("cnn.com", Some(UNITED_STATES)),
    ("forbes.com", Some(UNITED_STATES)),
    ("insurancejournal.com", Some(UNITED_STATES)),
    ("property-casualty360.com", Some(UNITED_STATES)),
    ("ft.com", Some(UNITED_KINGDOM)),
    ("bbc.com", Some(UNITED_KINGDOM)),
];

/// Country-code suffixes. Longer suffixes come first.
const TLD_REGIONS: &[(&str, &str)] = &[
    (".co.za", SOUTH_AFRICA),
    (".org.za", SOUTH_AFRICA),
    (".gov.za", SOUTH_AFRICA),
    (".ac.za", SOUTH_AFRICA),
    (".za", SOUTH_AFRICA),
    (".us", UNITED_STATES),
    (".co.uk", UNITED_KINGDOM),
    (".uk", UNITED_KINGDOM),
    (".ca", "Canada"),
    (".com.au", "Australia"),
    (".au", "Australia"),
    (".de", "Germany"),
    (".fr", "France"),
    (".co.in", "India"),
    (".in", "India"),
    (".com.br", "Brazil"),
    (".br", "Brazil"),
];

const REGION_TERMS: &[(&str, &[&str])] = &[
    (
        SOUTH_AFRICA,
        &[
            "south africa",
            "sa",
            "johannesburg",
            "cape town",
            "durban",
            "pretoria",
            "fsa",
            "fsca",
            "financial sector conduct authority",
            "prudential authority",
            "rand",
            "zar",
            "sarb",
            "reserve bank",
            "sars",
        ],
    ),
    (
        UNITED_STATES,
        &[
            "united states",
            "usa",
            "us",
            "america",
            "new york",
            "california",
            "texas",
            "naic",
            "state insurance",
            "department of insurance",
            "fed",
            "federal reserve",
            "dollar",
            "usd",
            "sec",
            "treasury",
        ],
    ),
    (
        UNITED_KINGDOM,
        &[
            "united kingdom",
            "uk",
            "britain",
            "england",
            "london",
            "scotland",
            "wales",
            "fca",
            "pra",
            "boe",
            "bank of england",
            "pound",
            "gbp",
            "hmrc",
        ],
    ),
];

/// One compiled pattern per region term, with its weight (word count).
static TERM_PATTERNS: LazyLock<Vec<(&'static str, Vec<(Regex, usize)>)>> = LazyLock::new(|| {
    REGION_TERMS
        .iter()
        .map(|(region, terms)| {
            let patterns = terms
                .iter()
                .map(|term| {
                    let re = Regex::new(&format!(r"\b{}\b", regex::escape(term)))
                        .expect("valid regex");
                    (re, term.split_whitespace().count())
                })
                .collect();
            (*region, patterns)
        })
        .collect()
});

/// Lowercased host of a URL, if it parses.
pub fn host_of(url: &str) -> Option<String> {
    let host = Url::parse(url).ok()?.host_str()?.to_lowercase();
    Some(match host.strip_prefix("www.") {
        Some(bare) => bare.to_string(),
        None => host,
    })
}

/// Infer the region an evidence item comes from. `None` means unknown.
pub fn infer(url: &str, title: &str, snippet: &str) -> Option<String> {
    if let Some(host) = host_of(url) {
        if let Some((_, region)) = PUBLISHER_REGIONS.iter().find(|(domain, _)| *domain == host) {
            return region.map(str::to_string);
        }

        if let Some((_, region)) = TLD_REGIONS.iter().find(|(tld, _)| host.ends_with(tld)) {
            return Some((*region).to_string());
        }
    }

    infer_from_text(&format!("{title} {snippet}").to_lowercase())
}

fn infer_from_text(content: &str) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for (region, patterns) in TERM_PATTERNS.iter() {
        let weight: usize = patterns
            .iter()
            .filter(|(re, _)| re.is_match(content))
            .map(|(_, w)| w)
            .sum();
        if weight > best.map_or(0, |(_, w)| w) {
            best = Some((*region, weight));
        }
    }

    best.filter(|(_, w)| *w >= MIN_TERM_WEIGHT)
        .map(|(region, _)| region.to_string())
}

/// Whether evidence from `region` satisfies a free-text scope rule.
///
/// Blank allows everything; `"!X"` allows everything but X; `"X"` allows X
/// and unknown.
pub fn scope_allows(rule: &str, region: Option<&str>) -> bool {
    RegionScope::parse(rule).allows(region)
}

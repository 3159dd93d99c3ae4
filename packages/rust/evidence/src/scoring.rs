//! Evidence scoring and ranking.
//!
//! The model is additive: every component lands in [`ScoreBreakdown`] so a
//! score can always be explained term by term.

use chrono::{DateTime, NaiveDate};
use serde::Serialize;

use keywatch_shared::{EvidenceItem, RegionMode, RegionScope, ScoreBreakdown, cctld_for};

use crate::region::host_of;

/// Sectors where health-insurance vocabulary means the evidence is off-domain.
const PNC_SECTORS: &[&str] = &[
    "short-term p&c",
    "short-term insurance",
    "property casualty",
    "property & casualty",
    "p&c",
];

const HEALTH_TERMS: &[&str] = &[
    "short-term health insurance",
    "stldi",
    "aca",
    "hhs",
    "obamacare",
    "health insurance marketplace",
    "medical insurance",
    "health coverage",
    "short-term medical",
    "temporary health",
    "interim health",
];

const SECTOR_TERMS: &[&str] = &[
    "insurance",
    "underwriting",
    "claims",
    "insurer",
    "reinsurance",
    "coverage",
];

const QUALITY_DOMAINS: &[&str] = &[
    "bloomberg.com",
    "reuters.com",
    "ft.com",
    "wsj.com",
    "moneyweb.co.za",
    "businesslive.co.za",
    "fin24.com",
    "insurancejournal.com",
    "property-casualty360.com",
    "insurancebusinessmag.com",
    "cover.co.za",
];

const FINANCIAL_TERMS: &[&str] = &[
    "financial",
    "investment",
    "fund",
    "portfolio",
    "asset",
    "liability",
    "risk",
    "premium",
    "policy",
    "claim",
    "market",
    "regulatory",
    "compliance",
    "audit",
];

const DOMAIN_PENALTY: f64 = -3.0;
const MIN_SCORE: f64 = 0.1;
const CONTENT_CAP: f64 = 3.0;
const FINANCIAL_CAP: f64 = 0.5;

// ---------------------------------------------------------------------------
// Domain fitness
// ---------------------------------------------------------------------------

/// Whether the sector is sensitive to adjacent-domain vocabulary.
pub fn is_domain_sensitive(sector: &str) -> bool {
    PNC_SECTORS.contains(&sector.trim().to_lowercase().as_str())
}

/// Reason the evidence belongs to a disallowed adjacent business domain, if it does.
pub fn domain_misfit(sector: &str, title: &str, snippet: &str) -> Option<String> {
    if !is_domain_sensitive(sector) {
        return None;
    }

    let content = format!("{title} {snippet}").to_lowercase();
    HEALTH_TERMS
        .iter()
        .find(|term| contains_word(&content, term))
        .map(|term| format!("Evidence discusses health insurance ({term}), not P&C insurance"))
}

/// Word-bounded containment, so short terms like `aca` do not hit `vacation`.
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Parse a provider-reported publication date. Unparseable dates yield `None`.
pub fn parse_published_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    const FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d %B %Y", "%B %d, %Y", "%b %d, %Y"];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    // "2025-07-03T10:00:00" and friends: take the date prefix.
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Inputs shared by every item scored for one keyword.
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext<'a> {
    pub keyword: &'a str,
    pub sector: &'a str,
    pub scope: &'a RegionScope,
    pub today: NaiveDate,
}

/// Score one item, returning the rounded total and its breakdown.
pub fn score(item: &EvidenceItem, ctx: &ScoreContext<'_>) -> (f64, ScoreBreakdown) {
    let host = host_of(&item.url).unwrap_or_default();
    let keyword = ctx.keyword.trim().to_lowercase();
    let title = item.title.to_lowercase();

    let domain_reason = domain_misfit(ctx.sector, &item.title, &item.snippet);
    let breakdown = ScoreBreakdown {
        region: region_weight(ctx.scope, item.region_guess.as_deref(), &host),
        domain: if domain_reason.is_some() {
            DOMAIN_PENALTY
        } else {
            0.0
        },
        domain_reason,
        title_relevance: if !keyword.is_empty() && title.contains(&keyword) {
            2.0
        } else {
            0.0
        },
        sector_relevance: if SECTOR_TERMS.iter().any(|t| title.contains(t)) {
            1.0
        } else {
            0.0
        },
        recency: item
            .published_date
            .as_deref()
            .and_then(parse_published_date)
            .map_or(0.0, |date| recency_bonus((ctx.today - date).num_days())),
        source_quality: if QUALITY_DOMAINS
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
        {
            1.0
        } else {
            0.0
        },
        content_relevance: content_relevance(&keyword, &item.content_lower()),
    };

    let total = breakdown.region
        + breakdown.domain
        + breakdown.title_relevance
        + breakdown.sector_relevance
        + breakdown.recency
        + breakdown.source_quality
        + breakdown.content_relevance;

    (round2(total.max(MIN_SCORE)), breakdown)
}

fn region_weight(scope: &RegionScope, region: Option<&str>, host: &str) -> f64 {
    let mut weight = 1.0;
    let Some(country) = scope.country.as_deref() else {
        return weight;
    };

    let matches_country = region == Some(country);
    match scope.mode {
        RegionMode::IncludeCountry => {
            if matches_country {
                weight += 3.0;
            }
            if cctld_for(country).is_some_and(|tld| host.ends_with(&format!(".{tld}"))) {
                weight += 2.0;
            }
        }
        RegionMode::ExcludeCountry if matches_country => weight -= 4.0,
        _ => {}
    }
    weight
}

fn recency_bonus(days_ago: i64) -> f64 {
    match days_ago {
        d if d <= 30 => 1.5,
        d if d <= 90 => 1.0,
        d if d <= 180 => 0.5,
        _ => 0.0,
    }
}

fn content_relevance(keyword: &str, content: &str) -> f64 {
    if keyword.is_empty() || content.trim().is_empty() {
        return 0.0;
    }

    let mut score = content.matches(keyword).count() as f64 * 0.5;

    let words: Vec<&str> = keyword.split_whitespace().collect();
    if words.len() > 1 {
        let hits = words.iter().filter(|w| content.contains(*w)).count();
        score += hits as f64 / words.len() as f64 * 0.3;
    }

    let related = FINANCIAL_TERMS.iter().filter(|t| content.contains(*t)).count();
    score += (related as f64 * 0.1).min(FINANCIAL_CAP);

    score.min(CONTENT_CAP)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score every item, sort descending (ties keep provider order) and keep the
/// top `max_results`.
pub fn rank(
    items: Vec<EvidenceItem>,
    ctx: &ScoreContext<'_>,
    max_results: usize,
) -> Vec<EvidenceItem> {
    let mut scored: Vec<EvidenceItem> = items
        .into_iter()
        .map(|mut item| {
            let (total, breakdown) = score(&item, ctx);
            item.score = Some(total);
            item.score_breakdown = Some(breakdown);
            item
        })
        .collect();

    scored.sort_by(|a, b| {
        let (a, b) = (a.score.unwrap_or(0.0), b.score.unwrap_or(0.0));
        b.total_cmp(&a)
    });
    scored.truncate(max_results);
    scored
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Aggregate statistics over scored items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub total_items: usize,
    pub avg_score: f64,
    pub min_score: f64,
    pub max_score: f64,
}

pub fn score_summary<'a>(items: impl IntoIterator<Item = &'a EvidenceItem>) -> ScoreSummary {
    let scores: Vec<f64> = items.into_iter().filter_map(|i| i.score).collect();
    if scores.is_empty() {
        return ScoreSummary::default();
    }

    let sum: f64 = scores.iter().sum();
    ScoreSummary {
        total_items: scores.len(),
        avg_score: round2(sum / scores.len() as f64),
        min_score: scores.iter().copied().fold(f64::INFINITY, f64::min),
        max_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

//! Flag generation.
//!
//! Flags annotate a keyword; they never remove it. Each rule below is
//! independent and the results are additive.

use chrono::{Days, NaiveDate};

use keywatch_shared::{EvidenceItem, Flag, RegionScope, Severity, WeakEvidence};

use crate::scoring::{domain_misfit, parse_published_date};

/// Approximate month length used for the recency window.
const DAYS_PER_MONTH: u64 = 30;

/// Per-keyword inputs for flag evaluation.
#[derive(Debug, Clone, Copy)]
pub struct FlagContext<'a> {
    /// Surface form of the keyword.
    pub keyword: &'a str,
    pub sector: &'a str,
    pub scope: &'a RegionScope,
    pub current_date: NaiveDate,
    pub recency_window_months: u32,
    /// Whether the run was allowed to search at all.
    pub search_enabled: bool,
}

/// Evaluate every flag rule against a keyword's ranked evidence.
pub fn generate_flags(ctx: &FlagContext<'_>, evidence: &[EvidenceItem]) -> Vec<Flag> {
    let mut flags = Vec::new();

    if evidence.is_empty() {
        if ctx.search_enabled {
            flags.push(Flag::WeakEvidence(WeakEvidence::NoEvidence));
        }
        return flags;
    }

    flags.extend(stale(ctx, evidence));
    flags.extend(off_topic(ctx, evidence));
    flags.extend(wrong_domain(ctx, evidence));
    flags.extend(wrong_region(ctx, evidence));
    flags.extend(ambiguous_scope(ctx, evidence));

    let problems: Vec<&Flag> = flags
        .iter()
        .filter(|f| f.severity() >= Severity::Warn)
        .collect();
    if !problems.is_empty() && problems.iter().all(|f| f.is_evidence_quality()) {
        flags.push(Flag::WeakEvidence(WeakEvidence::AllEvidenceFlagged));
    }

    flags
}

fn stale(ctx: &FlagContext<'_>, evidence: &[EvidenceItem]) -> Option<Flag> {
    let window = Days::new(u64::from(ctx.recency_window_months) * DAYS_PER_MONTH);
    let cutoff = ctx.current_date.checked_sub_days(window)?;

    let dated: Vec<(usize, NaiveDate)> = evidence
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let date = parse_published_date(item.published_date.as_deref()?)?;
            Some((idx, date))
        })
        .collect();

    let latest = dated.iter().map(|(_, date)| *date).max()?;
    if latest >= cutoff {
        return None;
    }

    Some(Flag::Stale {
        days_out_of_window: (cutoff - latest).num_days(),
        evidence_idx: dated
            .iter()
            .filter(|(_, date)| *date < cutoff)
            .map(|(idx, _)| *idx)
            .collect(),
    })
}

fn off_topic(ctx: &FlagContext<'_>, evidence: &[EvidenceItem]) -> Option<Flag> {
    let needle = ctx.keyword.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let any_relevant = evidence
        .iter()
        .any(|item| item.content_lower().contains(&needle));
    if any_relevant {
        return None;
    }

    Some(Flag::OffTopic {
        evidence_idx: (0..evidence.len()).collect(),
    })
}

fn wrong_domain(ctx: &FlagContext<'_>, evidence: &[EvidenceItem]) -> Option<Flag> {
    let hits: Vec<(usize, String)> = evidence
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            domain_misfit(ctx.sector, &item.title, &item.snippet).map(|reason| (idx, reason))
        })
        .collect();

    let (_, reason) = hits.first()?;
    Some(Flag::WrongDomain {
        reason: reason.clone(),
        evidence_idx: hits.iter().map(|(idx, _)| *idx).collect(),
    })
}

fn wrong_region(ctx: &FlagContext<'_>, evidence: &[EvidenceItem]) -> Option<Flag> {
    if !ctx.scope.is_active() {
        return None;
    }

    let offending: Vec<(usize, &str)> = evidence
        .iter()
        .enumerate()
        .filter(|(_, item)| !ctx.scope.allows(item.region_guess.as_deref()))
        .map(|(idx, item)| (idx, item.region_guess.as_deref().unwrap_or("unknown")))
        .collect();

    let (_, actual) = offending.first()?;
    Some(Flag::WrongRegion {
        expected_region: ctx.scope.rule(),
        actual_region: (*actual).to_string(),
        evidence_idx: offending.iter().map(|(idx, _)| *idx).collect(),
    })
}

fn ambiguous_scope(ctx: &FlagContext<'_>, evidence: &[EvidenceItem]) -> Option<Flag> {
    if !ctx.scope.is_active() {
        return None;
    }

    let mut regions: Vec<String> = Vec::new();
    for region in evidence.iter().filter_map(|i| i.region_guess.as_deref()) {
        if !regions.iter().any(|r| r == region) {
            regions.push(region.to_string());
        }
    }

    (regions.len() >= 2).then_some(Flag::AmbiguousScope { regions })
}

#[cfg(test)]
mod tests {
    use keywatch_shared::FlagKind;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn ctx<'a>(keyword: &'a str, scope: &'a RegionScope) -> FlagContext<'a> {
        FlagContext {
            keyword,
            sector: "short-term P&C",
            scope,
            current_date: date(2025, 10, 1),
            recency_window_months: 6,
            search_enabled: true,
        }
    }

    fn item(title: &str, region: Option<&str>) -> EvidenceItem {
        let mut item = EvidenceItem::new("test", "https://example.com/a", title, "");
        item.region_guess = region.map(str::to_string);
        item
    }

    fn kinds(flags: &[Flag]) -> Vec<FlagKind> {
        flags.iter().map(Flag::kind).collect()
    }

    #[test]
    fn stale_scenario() {
        let scope = RegionScope::global();
        let ctx = ctx("Allianz", &scope);
        let published = ctx.current_date - Days::new(400);
        let evidence = vec![item("Allianz results", None).published(published.to_string())];

        let flags = generate_flags(&ctx, &evidence);

        assert_eq!(
            flags,
            vec![Flag::Stale {
                days_out_of_window: 220,
                evidence_idx: vec![0],
            }]
        );
    }

    #[test]
    fn fresh_evidence_is_not_stale() {
        let scope = RegionScope::global();
        let ctx = ctx("Allianz", &scope);
        let evidence = vec![
            item("Allianz old", None).published("2020-01-01"),
            item("Allianz new", None).published("2025-09-01"),
            item("Allianz undated", None).published("soon"),
        ];
        assert!(generate_flags(&ctx, &evidence).is_empty());
    }

    #[test]
    fn wrong_region_scenario_adds_weak_evidence() {
        let scope = RegionScope::parse("!South Africa");
        let ctx = ctx("X", &scope);
        let evidence = vec![
            item("X launches in Johannesburg", Some("South Africa")),
            item("X expands", Some("South Africa")),
        ];

        let flags = generate_flags(&ctx, &evidence);

        assert_eq!(
            kinds(&flags),
            vec![FlagKind::WrongRegion, FlagKind::WeakEvidence]
        );
        assert_eq!(
            flags[0],
            Flag::WrongRegion {
                expected_region: "!South Africa".into(),
                actual_region: "South Africa".into(),
                evidence_idx: vec![0, 1],
            }
        );
        assert_eq!(flags[1].reason(), "All evidence items are problematic");
    }

    #[test]
    fn off_topic_when_no_item_mentions_keyword() {
        let scope = RegionScope::global();
        let ctx = ctx("Hollard", &scope);
        let evidence = vec![item("Market wrap", None), item("Rates", None)];

        let flags = generate_flags(&ctx, &evidence);

        assert_eq!(kinds(&flags), vec![FlagKind::OffTopic, FlagKind::WeakEvidence]);
        assert_eq!(
            flags[0],
            Flag::OffTopic {
                evidence_idx: vec![0, 1]
            }
        );
    }

    #[test]
    fn wrong_domain_for_health_vocabulary() {
        let scope = RegionScope::global();
        let ctx = ctx("Short-term cover", &scope);
        let evidence = vec![
            item("Short-term cover for homes", None),
            item("Short-term cover and the ACA", None),
        ];

        let flags = generate_flags(&ctx, &evidence);

        assert_eq!(kinds(&flags), vec![FlagKind::WrongDomain, FlagKind::WeakEvidence]);
        match &flags[0] {
            Flag::WrongDomain {
                evidence_idx,
                reason,
            } => {
                assert_eq!(evidence_idx, &vec![1]);
                assert!(reason.contains("aca"));
            }
            other => panic!("unexpected flag {other:?}"),
        }
    }

    #[test]
    fn stale_prevents_weak_evidence_from_quality_flags() {
        let scope = RegionScope::parse("!South Africa");
        let ctx = ctx("X", &scope);
        let evidence = vec![item("X", Some("South Africa")).published("2020-01-01")];

        let flags = generate_flags(&ctx, &evidence);

        assert_eq!(kinds(&flags), vec![FlagKind::Stale, FlagKind::WrongRegion]);
    }

    #[test]
    fn ambiguous_scope_is_info_and_does_not_trigger_weak() {
        let scope = RegionScope::parse("South Africa");
        let ctx = ctx("X", &scope);
        let evidence = vec![
            item("X", Some("South Africa")),
            item("X", Some("United Kingdom")),
            item("X", None),
        ];

        let flags = generate_flags(&ctx, &evidence);

        assert_eq!(
            kinds(&flags),
            vec![
                FlagKind::WrongRegion,
                FlagKind::AmbiguousScope,
                FlagKind::WeakEvidence
            ]
        );
        assert_eq!(flags[1].severity(), Severity::Info);
    }

    #[test]
    fn empty_evidence_depends_on_search_mode() {
        let scope = RegionScope::global();
        let mut ctx = ctx("X", &scope);
        assert_eq!(
            generate_flags(&ctx, &[]),
            vec![Flag::WeakEvidence(WeakEvidence::NoEvidence)]
        );

        ctx.search_enabled = false;
        assert!(generate_flags(&ctx, &[]).is_empty());
    }

    #[test]
    fn global_scope_never_raises_region_flags() {
        let scope = RegionScope::global();
        let ctx = ctx("X", &scope);
        let evidence = vec![item("X", Some("South Africa")), item("X", Some("Brazil"))];
        assert!(generate_flags(&ctx, &evidence).is_empty());
    }
}

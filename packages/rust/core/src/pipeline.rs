//! End-to-end keyword pipeline: guardrails → evidence → ranking → flags → audit.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use keywatch_evidence::{
    EvidenceProvider, FlagContext, ScoreContext, build_provider, generate_flags, rank,
    score_summary,
};
use keywatch_guardrails::{GuardSets, Guardrails, GuardrailsReport, check, normalize};
use keywatch_shared::{
    CategoryMap, EvidenceItem, Flag, KeywatchError, PipelineConfig, RegionScope, Result, RunId,
};

use crate::cache::EvidenceCache;
use crate::gather::{GatherRequest, GatherSettings, Gatherer};

/// One batch handed over by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineInput {
    #[serde(default)]
    pub sector: String,
    /// The caller's original keyword list, used by the completeness audit.
    /// Empty means "whatever the oracle returned".
    #[serde(default)]
    pub keywords: Vec<String>,
    /// The oracle's categorization.
    #[serde(default)]
    pub categories: CategoryMap,
    /// Per-keyword region scope rules (`""`, `"Country"`, `"!Country"`).
    #[serde(default)]
    pub source_locations: HashMap<String, String>,
    /// Reference date for recency; defaults to today.
    #[serde(default)]
    pub current_date: Option<NaiveDate>,
}

/// Annotated keyword set returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub run_id: RunId,
    pub updated: CategoryMap,
    /// Flags per keyword surface form. Keywords without flags map to `[]`.
    pub flags: BTreeMap<String, Vec<Flag>>,
    /// Ranked evidence per keyword.
    pub evidence_refs: BTreeMap<String, Vec<EvidenceItem>>,
    pub guardrails: GuardrailsReport,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, output: &PipelineOutput);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _output: &PipelineOutput) {}
}

/// A configured pipeline. Construct once, run many batches.
pub struct KeywordPipeline {
    config: PipelineConfig,
    guards: GuardSets,
    provider: Option<Arc<dyn EvidenceProvider>>,
    cache: EvidenceCache,
}

impl KeywordPipeline {
    /// Validate `config` and select its provider. The cache starts disabled;
    /// attach one with [`KeywordPipeline::with_cache`].
    pub fn new(config: PipelineConfig, guards: GuardSets) -> Result<Self> {
        validate(&config)?;
        let provider = build_provider(&config)?;
        Ok(Self {
            config,
            guards,
            provider,
            cache: EvidenceCache::disabled(),
        })
    }

    pub fn with_cache(mut self, cache: EvidenceCache) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the configured provider.
    pub fn with_provider(mut self, provider: Arc<dyn EvidenceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn guards(&self) -> &GuardSets {
        &self.guards
    }

    /// Re-read guard files when hot reload is enabled. For owners that keep
    /// one pipeline across many batches.
    pub fn refresh_guards(&mut self) {
        if self.config.hot_reload {
            self.guards.refresh();
        }
    }

    fn search_enabled(&self) -> bool {
        self.config.search_mode.is_enabled() && self.provider.is_some()
    }

    /// Run one batch with no progress reporting.
    pub async fn run(&self, input: PipelineInput, cancel: &CancellationToken) -> Result<PipelineOutput> {
        self.run_with_progress(input, cancel, &SilentProgress).await
    }

    /// Run one batch.
    ///
    /// 1. Guardrails: isolation, dedup, checkpoint 1
    /// 2. Evidence gathering (skipped when search is off)
    /// 3. Ranking and flag generation per keyword
    /// 4. Checkpoint 2
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, sector = %input.sector))]
    pub async fn run_with_progress(
        &self,
        input: PipelineInput,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineOutput> {
        let start = Instant::now();
        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(&run_id));

        let current_date = input.current_date.unwrap_or_else(|| Utc::now().date_naive());
        info!(
            search_mode = self.config.search_mode.as_str(),
            %current_date,
            "starting keyword pipeline"
        );

        // --- Phase 1: Guardrails ---
        progress.phase("Applying guardrails");
        let input_keywords: Vec<String> = if input.keywords.is_empty() {
            input.categories.keywords().cloned().collect()
        } else {
            input.keywords.clone()
        };
        let outcome =
            Guardrails::new(&self.guards, self.config.isolation).apply(&input_keywords, &input.categories);
        let mut report = outcome.report;
        let updated = outcome.categories;
        let guarded_keywords: Vec<String> = updated.keywords().cloned().collect();

        if cancel.is_cancelled() {
            return Err(KeywatchError::Cancelled);
        }

        // --- Phase 2: Evidence ---
        let scopes = ScopeResolver::new(&input.source_locations, &self.config.default_scope);
        let mut gathered: HashMap<String, Vec<EvidenceItem>> = HashMap::new();

        if let (true, Some(provider)) = (self.search_enabled(), self.provider.as_ref()) {
            progress.phase("Gathering evidence");
            let gatherer = Gatherer::new(
                Arc::clone(provider),
                self.cache.clone(),
                GatherSettings {
                    sector: input.sector.clone(),
                    recency_months: self.config.recency_window_months,
                    per_query_results: self.config.search_mode.max_results(),
                    timeout: self.config.timeout,
                    concurrency: self.config.concurrency,
                },
            );
            let requests = guarded_keywords
                .iter()
                .map(|keyword| {
                    let (scope, source_override) = scopes.resolve(keyword);
                    GatherRequest {
                        keyword: keyword.clone(),
                        scope,
                        source_override,
                    }
                })
                .collect();
            gathered = gatherer.gather_all(requests, cancel).await?;
        }

        // --- Phase 3: Rank and flag ---
        progress.phase("Scoring evidence and raising flags");
        let search_enabled = self.search_enabled();
        let mut flags = BTreeMap::new();
        let mut evidence_refs = BTreeMap::new();

        for keyword in &guarded_keywords {
            let (scope, _) = scopes.resolve(keyword);
            let items = gathered.remove(keyword).unwrap_or_default();

            let ranked = rank(
                items,
                &ScoreContext {
                    keyword,
                    sector: &input.sector,
                    scope: &scope,
                    today: current_date,
                },
                self.config.max_results,
            );

            let keyword_flags = generate_flags(
                &FlagContext {
                    keyword,
                    sector: &input.sector,
                    scope: &scope,
                    current_date,
                    recency_window_months: self.config.recency_window_months,
                    search_enabled,
                },
                &ranked,
            );

            flags.insert(keyword.clone(), keyword_flags);
            if search_enabled {
                evidence_refs.insert(keyword.clone(), ranked);
            }
        }

        // --- Phase 4: Checkpoint 2 ---
        let flagged = flagged_categories(&updated, &flags);
        let post_flag_check = check(&guarded_keywords, &flagged);
        if !post_flag_check.is_complete {
            error!(
                missing = ?post_flag_check.missing_keywords,
                "keywords lost after flagging"
            );
        }
        report.post_flag_check = Some(post_flag_check);

        let summary = score_summary(evidence_refs.values().flatten());
        let flag_count: usize = flags.values().map(Vec::len).sum();
        info!(
            keywords = guarded_keywords.len(),
            evidence = summary.total_items,
            avg_score = summary.avg_score,
            min_score = summary.min_score,
            max_score = summary.max_score,
            flags = flag_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "keyword pipeline complete"
        );

        let output = PipelineOutput {
            run_id,
            updated,
            flags,
            evidence_refs,
            guardrails: report,
        };
        progress.done(&output);
        Ok(output)
    }
}

/// The categorized keywords that came out of flagging: `updated` restricted
/// to keywords with a flag entry.
fn flagged_categories(updated: &CategoryMap, flags: &BTreeMap<String, Vec<Flag>>) -> CategoryMap {
    let mut flagged = CategoryMap::new();
    for (category, keywords) in updated.iter() {
        flagged
            .get_mut(category)
            .extend(keywords.iter().filter(|k| flags.contains_key(*k)).cloned());
    }
    flagged
}

/// Reject configurations no run could succeed with.
fn validate(config: &PipelineConfig) -> Result<()> {
    if config.concurrency == 0 {
        return Err(KeywatchError::config("concurrency must be at least 1"));
    }
    if config.recency_window_months == 0 {
        return Err(KeywatchError::config("recency_window_months must be at least 1"));
    }
    if config.timeout.is_zero() {
        return Err(KeywatchError::config("timeout must be non-zero"));
    }
    if config.default_scope.is_active() && config.default_scope.country.is_none() {
        return Err(KeywatchError::config("region scope requires a country"));
    }
    Ok(())
}

/// Per-keyword scope lookup: the keyword's source-location rule, else the
/// configured default. Rules match on canonical keyword form.
struct ScopeResolver<'a> {
    rules: HashMap<String, &'a str>,
    default: &'a RegionScope,
}

impl<'a> ScopeResolver<'a> {
    fn new(source_locations: &'a HashMap<String, String>, default: &'a RegionScope) -> Self {
        let rules = source_locations
            .iter()
            .map(|(keyword, rule)| (normalize(keyword), rule.as_str()))
            .collect();
        Self { rules, default }
    }

    fn resolve(&self, keyword: &str) -> (RegionScope, Option<String>) {
        match self.rules.get(&normalize(keyword)) {
            Some(rule) => (RegionScope::parse(rule), Some((*rule).to_string())),
            None => (self.default.clone(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Days;
    use keywatch_evidence::TestProvider;
    use keywatch_shared::{Category, FlagKind, IsolationMode, SearchMode, WeakEvidence};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn config(search_mode: SearchMode) -> PipelineConfig {
        PipelineConfig {
            search_mode,
            recency_window_months: 6,
            ..PipelineConfig::default()
        }
    }

    fn pipeline(items: Vec<EvidenceItem>) -> KeywordPipeline {
        KeywordPipeline::new(config(SearchMode::Test), GuardSets::empty())
            .expect("valid config")
            .with_provider(Arc::new(TestProvider::with_items(items)))
    }

    fn categories(industry: &[&str], company: &[&str], regulatory: &[&str]) -> CategoryMap {
        let own = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        CategoryMap {
            industry: own(industry),
            company: own(company),
            regulatory: own(regulatory),
        }
    }

    fn kinds(flags: &[Flag]) -> Vec<FlagKind> {
        flags.iter().map(Flag::kind).collect()
    }

    #[tokio::test]
    async fn stale_evidence_is_flagged_end_to_end() {
        let today = date(2025, 10, 1);
        let published = today - Days::new(400);
        let pipeline = pipeline(vec![
            EvidenceItem::new("x", "https://example.com/a", "Allianz results", "").published(published.to_string()),
        ]);

        let output = pipeline
            .run(
                PipelineInput {
                    sector: "technology".into(),
                    categories: categories(&[], &["Allianz"], &[]),
                    current_date: Some(today),
                    ..PipelineInput::default()
                },
                &CancellationToken::new(),
            )
            .await
            .expect("run");

        assert_eq!(
            output.flags["Allianz"],
            vec![Flag::Stale {
                days_out_of_window: 220,
                evidence_idx: vec![0],
            }]
        );
        assert_eq!(output.evidence_refs["Allianz"].len(), 1);
        assert!(output.evidence_refs["Allianz"][0].score.is_some());
    }

    #[tokio::test]
    async fn excluded_region_raises_wrong_region_and_weak_evidence() {
        let today = date(2025, 10, 1);
        let recent = (today - Days::new(10)).to_string();
        let pipeline = pipeline(vec![
            EvidenceItem::new("x", "https://www.moneyweb.co.za/x", "X launches in Johannesburg", "")
                .published(recent.clone()),
            EvidenceItem::new("x", "https://iol.co.za/x", "X expands", "").published(recent),
        ]);

        let output = pipeline
            .run(
                PipelineInput {
                    sector: "technology".into(),
                    categories: categories(&[], &["X"], &[]),
                    source_locations: HashMap::from([("X".to_string(), "!South Africa".to_string())]),
                    current_date: Some(today),
                    ..PipelineInput::default()
                },
                &CancellationToken::new(),
            )
            .await
            .expect("run");

        let flags = &output.flags["X"];
        assert_eq!(kinds(flags), vec![FlagKind::WrongRegion, FlagKind::WeakEvidence]);
        match &flags[0] {
            Flag::WrongRegion {
                expected_region,
                actual_region,
                evidence_idx,
            } => {
                assert_eq!(expected_region, "!South Africa");
                assert_eq!(actual_region, "South Africa");
                assert_eq!(evidence_idx.len(), 2);
            }
            other => panic!("unexpected flag {other:?}"),
        }
        assert!(
            output.evidence_refs["X"]
                .iter()
                .all(|i| i.region_guess.as_deref() == Some("South Africa"))
        );
    }

    #[tokio::test]
    async fn flags_never_change_keyword_cardinality() {
        let guards = GuardSets::from_terms([
            (Category::Regulatory, "prudential authority"),
            (Category::Company, "santam"),
        ]);
        let pipeline = KeywordPipeline::new(config(SearchMode::Test), guards)
            .expect("valid config")
            .with_provider(Arc::new(TestProvider::with_items(vec![EvidenceItem::new(
                "x",
                "https://example.com/a",
                "Unrelated market wrap",
                "",
            )])));

        let input = PipelineInput {
            sector: "insurance".into(),
            keywords: ["Santam", "Prudential Authority", "Claims", "claim"]
                .map(String::from)
                .to_vec(),
            categories: categories(&["Santam", "Claims"], &["claim"], &["Prudential Authority"]),
            current_date: Some(date(2025, 10, 1)),
            ..PipelineInput::default()
        };

        let output = pipeline.run(input, &CancellationToken::new()).await.expect("run");

        assert_eq!(output.updated.get(Category::Company), ["Santam"]);
        assert_eq!(output.updated.get(Category::Industry), ["Claims"]);
        assert_eq!(output.guardrails.duplicates_dropped, vec!["claim"]);
        assert!(output.guardrails.completeness_check.is_complete);

        let post = output.guardrails.post_flag_check.expect("checkpoint 2 ran");
        assert!(post.is_complete);
        assert_eq!(output.flags.len(), output.updated.len());
        assert!(
            output
                .flags
                .values()
                .flatten()
                .any(|f| f.kind() == FlagKind::OffTopic)
        );
    }

    #[tokio::test]
    async fn search_off_gathers_nothing_and_raises_nothing() {
        let pipeline = KeywordPipeline::new(config(SearchMode::Off), GuardSets::empty())
            .expect("valid config");

        let output = pipeline
            .run(
                PipelineInput {
                    categories: categories(&["Claims"], &["Santam"], &[]),
                    ..PipelineInput::default()
                },
                &CancellationToken::new(),
            )
            .await
            .expect("run");

        assert!(output.evidence_refs.is_empty());
        assert!(output.flags.values().all(Vec::is_empty));
        assert_eq!(output.updated.len(), 2);
    }

    #[tokio::test]
    async fn empty_search_results_raise_weak_evidence() {
        let pipeline = pipeline(Vec::new());

        let output = pipeline
            .run(
                PipelineInput {
                    categories: categories(&[], &["Santam"], &[]),
                    ..PipelineInput::default()
                },
                &CancellationToken::new(),
            )
            .await
            .expect("run");

        assert_eq!(
            output.flags["Santam"],
            vec![Flag::WeakEvidence(WeakEvidence::NoEvidence)]
        );
        assert!(output.evidence_refs["Santam"].is_empty());
    }

    #[tokio::test]
    async fn reject_mode_losses_surface_at_checkpoint_one() {
        let guards = GuardSets::from_terms([(Category::Regulatory, "fsca")]);
        let pipeline = KeywordPipeline::new(
            PipelineConfig {
                isolation: IsolationMode::Reject,
                ..config(SearchMode::Off)
            },
            guards,
        )
        .expect("valid config");

        let output = pipeline
            .run(
                PipelineInput {
                    categories: categories(&["FSCA", "Claims"], &[], &[]),
                    ..PipelineInput::default()
                },
                &CancellationToken::new(),
            )
            .await
            .expect("run");

        assert_eq!(output.guardrails.leaks_blocked, vec!["FSCA"]);
        assert!(!output.guardrails.completeness_check.is_complete);
        assert_eq!(output.guardrails.completeness_check.missing_keywords, vec!["FSCA"]);
        assert!(output.guardrails.post_flag_check.expect("ran").is_complete);
    }

    #[tokio::test]
    async fn cancelled_run_returns_cancelled() {
        let pipeline = pipeline(Vec::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = pipeline
            .run(
                PipelineInput {
                    categories: categories(&[], &["Santam"], &[]),
                    ..PipelineInput::default()
                },
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(KeywatchError::Cancelled)));
    }

    #[test]
    fn checkpoint_two_reports_keywords_missing_from_flags() {
        let updated = categories(&["Claims"], &["Santam", "Hollard"], &[]);
        let guarded: Vec<String> = updated.keywords().cloned().collect();
        let flags = BTreeMap::from([
            ("Claims".to_string(), Vec::new()),
            ("Santam".to_string(), vec![Flag::WeakEvidence(WeakEvidence::NoEvidence)]),
        ]);

        let flagged = flagged_categories(&updated, &flags);
        assert_eq!(flagged.get(Category::Company), ["Santam"]);

        let report = check(&guarded, &flagged);
        assert!(!report.is_complete);
        assert_eq!(report.missing_keywords, vec!["Hollard"]);

        let flags_all: BTreeMap<String, Vec<Flag>> =
            guarded.iter().map(|k| (k.clone(), Vec::new())).collect();
        assert!(check(&guarded, &flagged_categories(&updated, &flags_all)).is_complete);
    }

    #[test]
    fn refresh_guards_only_reloads_with_hot_reload() {
        let dir = std::env::temp_dir().join(format!("kw_guards_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("company.txt"), "Allianz\n").expect("write");

        let build = |hot_reload: bool| {
            KeywordPipeline::new(
                PipelineConfig {
                    hot_reload,
                    ..config(SearchMode::Off)
                },
                GuardSets::load(&dir),
            )
            .expect("valid config")
        };
        let mut hot = build(true);
        let mut cold = build(false);

        std::fs::write(dir.join("company.txt"), "Allianz\nSantam\n").expect("write");
        hot.refresh_guards();
        cold.refresh_guards();

        assert!(hot.guards().contains(Category::Company, "santam"));
        assert!(!cold.guards().contains(Category::Company, "santam"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_config_fails_construction() {
        let err = KeywordPipeline::new(
            PipelineConfig {
                concurrency: 0,
                ..PipelineConfig::default()
            },
            GuardSets::empty(),
        );
        assert!(matches!(err, Err(KeywatchError::Config { .. })));
    }

    #[test]
    fn source_location_rules_match_canonical_keywords() {
        let rules = HashMap::from([("  santam ".to_string(), "ZA".to_string())]);
        let default = RegionScope::global();
        let resolver = ScopeResolver::new(&rules, &default);

        let (scope, source) = resolver.resolve("Santam");
        assert_eq!(scope, RegionScope::include("South Africa"));
        assert_eq!(source.as_deref(), Some("ZA"));

        let (scope, source) = resolver.resolve("Hollard");
        assert_eq!(scope, RegionScope::global());
        assert!(source.is_none());
    }

    #[test]
    fn input_deserializes_from_batch_json() {
        let input: PipelineInput = serde_json::from_str(
            r#"{
                "sector": "short-term insurance",
                "keywords": ["Santam"],
                "categories": {"company": ["Santam"]},
                "source_locations": {"Santam": "South Africa"},
                "current_date": "2025-10-01"
            }"#,
        )
        .expect("parse batch");

        assert_eq!(input.categories.industry.len(), 0);
        assert_eq!(input.current_date, Some(date(2025, 10, 1)));
        assert_eq!(input.source_locations["Santam"], "South Africa");
    }
}

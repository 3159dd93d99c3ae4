//! Core domain types for Keywatch keyword sets, evidence and flags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// The three keyword categories produced by the oracle.
///
/// Declaration order is the fixed processing order used by every guardrail
/// pass. Tie-breaks between categories use [`Category::as_str`] ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Industry,
    Company,
    Regulatory,
}

impl Category {
    /// All categories in processing order.
    pub const ALL: [Category; 3] = [Category::Industry, Category::Company, Category::Regulatory];

    /// Wire and file name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Industry => "industry",
            Self::Company => "company",
            Self::Regulatory => "regulatory",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "industry" => Ok(Self::Industry),
            "company" => Ok(Self::Company),
            "regulatory" => Ok(Self::Regulatory),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// CategoryMap
// ---------------------------------------------------------------------------

/// A `{industry, company, regulatory}` keyword mapping.
///
/// Missing keys deserialize to empty lists and unknown keys are ignored, which
/// is how gaps in the oracle's output are repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryMap {
    pub industry: Vec<String>,
    pub company: Vec<String>,
    pub regulatory: Vec<String>,
}

impl CategoryMap {
    /// An empty mapping with all three categories present.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keywords in one category.
    pub fn get(&self, category: Category) -> &[String] {
        match category {
            Category::Industry => &self.industry,
            Category::Company => &self.company,
            Category::Regulatory => &self.regulatory,
        }
    }

    /// Mutable access to one category bucket.
    pub fn get_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::Industry => &mut self.industry,
            Category::Company => &mut self.company,
            Category::Regulatory => &mut self.regulatory,
        }
    }

    /// Iterate buckets in processing order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &[String])> {
        Category::ALL.into_iter().map(|c| (c, self.get(c)))
    }

    /// Every keyword, flattened in processing order.
    pub fn keywords(&self) -> impl Iterator<Item = &String> {
        self.industry
            .iter()
            .chain(self.company.iter())
            .chain(self.regulatory.iter())
    }

    /// Total number of keywords across all categories.
    pub fn len(&self) -> usize {
        self.industry.len() + self.company.len() + self.regulatory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// Additive score components for one evidence item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub region: f64,
    pub domain: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_reason: Option<String>,
    pub title_relevance: f64,
    pub sector_relevance: f64,
    pub recency: f64,
    pub source_quality: f64,
    pub content_relevance: f64,
}

/// One external reference gathered for a keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Provider tag (`perplexity`, `google`, `test`).
    pub provider: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    /// Publication date as reported by the provider (not necessarily parseable).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    /// Inferred region; `None` means unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_guess: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<ScoreBreakdown>,
}

impl EvidenceItem {
    /// Create an unscored item with no date or region.
    pub fn new(
        provider: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            published_date: None,
            region_guess: None,
            score: None,
            score_breakdown: None,
        }
    }

    /// Builder-style publication date.
    pub fn published(mut self, date: impl Into<String>) -> Self {
        self.published_date = Some(date.into());
        self
    }

    /// Title and snippet joined, lowercased, for vocabulary checks.
    pub fn content_lower(&self) -> String {
        format!("{} {}", self.title, self.snippet).to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Flag severity, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Block,
}

/// Discriminant of a [`Flag`], as emitted in the wire `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Stale,
    OffTopic,
    WrongDomain,
    WrongRegion,
    AmbiguousScope,
    WeakEvidence,
}

impl FlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::OffTopic => "off_topic",
            Self::WrongDomain => "wrong_domain",
            Self::WrongRegion => "wrong_region",
            Self::AmbiguousScope => "ambiguous_scope",
            Self::WeakEvidence => "weak_evidence",
        }
    }
}

/// Which condition raised a `weak_evidence` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeakEvidence {
    /// Search was enabled but nothing came back.
    NoEvidence,
    /// Every warn/block flag on the keyword is an evidence-quality flag.
    AllEvidenceFlagged,
}

/// A non-destructive quality annotation on a keyword.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "FlagRecord")]
pub enum Flag {
    Stale {
        days_out_of_window: i64,
        evidence_idx: Vec<usize>,
    },
    OffTopic {
        evidence_idx: Vec<usize>,
    },
    WrongDomain {
        reason: String,
        evidence_idx: Vec<usize>,
    },
    WrongRegion {
        expected_region: String,
        actual_region: String,
        evidence_idx: Vec<usize>,
    },
    AmbiguousScope {
        regions: Vec<String>,
    },
    WeakEvidence(WeakEvidence),
}

impl Flag {
    pub fn kind(&self) -> FlagKind {
        match self {
            Self::Stale { .. } => FlagKind::Stale,
            Self::OffTopic { .. } => FlagKind::OffTopic,
            Self::WrongDomain { .. } => FlagKind::WrongDomain,
            Self::WrongRegion { .. } => FlagKind::WrongRegion,
            Self::AmbiguousScope { .. } => FlagKind::AmbiguousScope,
            Self::WeakEvidence(_) => FlagKind::WeakEvidence,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::OffTopic { .. } | Self::WrongDomain { .. } => Severity::Block,
            Self::Stale { .. } | Self::WrongRegion { .. } | Self::WeakEvidence(_) => {
                Severity::Warn
            }
            Self::AmbiguousScope { .. } => Severity::Info,
        }
    }

    /// Concise human explanation.
    pub fn reason(&self) -> String {
        match self {
            Self::Stale {
                days_out_of_window, ..
            } => format!("Evidence is {days_out_of_window} days outside the recency window"),
            Self::OffTopic { evidence_idx } => format!(
                "None of the {} evidence items mention the keyword",
                evidence_idx.len()
            ),
            Self::WrongDomain { reason, .. } => reason.clone(),
            Self::WrongRegion {
                expected_region,
                actual_region,
                ..
            } => format!("Evidence from {actual_region}, expected {expected_region}"),
            Self::AmbiguousScope { regions } => {
                format!("Evidence spans multiple regions: {}", regions.join(", "))
            }
            Self::WeakEvidence(WeakEvidence::NoEvidence) => {
                "No evidence found while search was enabled".into()
            }
            Self::WeakEvidence(WeakEvidence::AllEvidenceFlagged) => {
                "All evidence items are problematic".into()
            }
        }
    }

    /// Whether the flag describes the quality of the gathered evidence itself.
    pub fn is_evidence_quality(&self) -> bool {
        matches!(
            self,
            Self::OffTopic { .. } | Self::WrongRegion { .. } | Self::WrongDomain { .. }
        )
    }
}

/// Wire shape of a flag. Unset optional fields are omitted, never `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRecord {
    #[serde(rename = "type")]
    pub kind: FlagKind,
    pub severity: Severity,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_idx: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_out_of_window: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_region: Option<String>,
}

impl From<Flag> for FlagRecord {
    fn from(flag: Flag) -> Self {
        let mut record = FlagRecord {
            kind: flag.kind(),
            severity: flag.severity(),
            reason: flag.reason(),
            evidence_idx: None,
            days_out_of_window: None,
            expected_region: None,
            actual_region: None,
        };
        match flag {
            Flag::Stale {
                days_out_of_window,
                evidence_idx,
            } => {
                record.days_out_of_window = Some(days_out_of_window);
                record.evidence_idx = Some(evidence_idx);
            }
            Flag::OffTopic { evidence_idx } | Flag::WrongDomain { evidence_idx, .. } => {
                record.evidence_idx = Some(evidence_idx);
            }
            Flag::WrongRegion {
                expected_region,
                actual_region,
                evidence_idx,
            } => {
                record.expected_region = Some(expected_region);
                record.actual_region = Some(actual_region);
                record.evidence_idx = Some(evidence_idx);
            }
            Flag::AmbiguousScope { regions } => {
                record.actual_region = Some(regions.join(", "));
            }
            Flag::WeakEvidence(_) => {}
        }
        record
    }
}

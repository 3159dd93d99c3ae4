//! Geographic scope rules.
//!
//! A scope rule is the free-text "source location" attached to a keyword:
//! blank means global, `"X"` restricts evidence to country X and `"!X"`
//! excludes country X.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Country aliases folded to one display name.
const REGION_ALIASES: &[(&str, &str)] = &[
    ("za", "South Africa"),
    ("sa", "South Africa"),
    ("rsa", "South Africa"),
    ("us", "United States"),
    ("usa", "United States"),
    ("america", "United States"),
    ("uk", "United Kingdom"),
    ("britain", "United Kingdom"),
    ("england", "United Kingdom"),
];

/// Country-code top-level domain for each country the region tables know.
const COUNTRY_CCTLDS: &[(&str, &str)] = &[
    ("South Africa", "za"),
    ("United States", "us"),
    ("United Kingdom", "uk"),
    ("Canada", "ca"),
    ("Australia", "au"),
    ("Germany", "de"),
    ("France", "fr"),
    ("India", "in"),
    ("Brazil", "br"),
];

/// Rule values that mean "no rule".
const GLOBAL_MARKERS: &[&str] = &["", "na", "n/a", "null", "none"];

/// Normalize a region name for comparison (`"za"` → `"South Africa"`,
/// `"germany"` → `"Germany"`).
pub fn normalize_region_name(region: &str) -> String {
    let trimmed = region.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lower = trimmed.to_lowercase();
    if let Some((_, name)) = REGION_ALIASES.iter().find(|(alias, _)| *alias == lower) {
        return (*name).to_string();
    }

    title_case(trimmed)
}

/// ccTLD label (without the dot) for a known country.
pub fn cctld_for(country: &str) -> Option<&'static str> {
    let normalized = normalize_region_name(country);
    COUNTRY_CCTLDS
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, tld)| *tld)
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// RegionMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionMode {
    #[default]
    Global,
    IncludeCountry,
    ExcludeCountry,
}

impl RegionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::IncludeCountry => "include_country",
            Self::ExcludeCountry => "exclude_country",
        }
    }
}

impl fmt::Display for RegionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "include_country" | "include" | "country" => Ok(Self::IncludeCountry),
            "exclude_country" | "exclude" => Ok(Self::ExcludeCountry),
            other => Err(format!(
                "invalid region_mode '{other}' (expected global, include_country or exclude_country)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// RegionScope
// ---------------------------------------------------------------------------

/// A parsed scope rule. `country` is set for every non-global mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RegionScope {
    pub mode: RegionMode,
    pub country: Option<String>,
}

impl RegionScope {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn include(country: impl AsRef<str>) -> Self {
        Self::with_country(RegionMode::IncludeCountry, country.as_ref())
    }

    pub fn exclude(country: impl AsRef<str>) -> Self {
        Self::with_country(RegionMode::ExcludeCountry, country.as_ref())
    }

    /// Build a scope from a configured mode and country. A non-global mode
    /// without a country is an error.
    pub fn from_parts(mode: RegionMode, country: &str) -> Result<Self, String> {
        match mode {
            RegionMode::Global => Ok(Self::global()),
            _ if country.trim().is_empty() => Err(format!(
                "region_mode '{mode}' requires a non-empty region_country"
            )),
            _ => Ok(Self::with_country(mode, country)),
        }
    }

    fn with_country(mode: RegionMode, country: &str) -> Self {
        let country = normalize_region_name(country);
        if country.is_empty() {
            return Self::global();
        }
        Self {
            mode,
            country: Some(country),
        }
    }

    /// Parse a free-text source-location rule.
    ///
    /// Blank, `NA`, `null` and `none` mean global; `!X` excludes X; anything
    /// else includes only X.
    pub fn parse(rule: &str) -> Self {
        let rule = rule.trim();
        if GLOBAL_MARKERS.contains(&rule.to_lowercase().as_str()) {
            return Self::global();
        }

        match rule.strip_prefix('!') {
            Some(rest) => Self::exclude(rest),
            None => Self::include(rule),
        }
    }

    /// Whether a rule is in force.
    pub fn is_active(&self) -> bool {
        self.mode != RegionMode::Global
    }

    /// Canonical rule text (`""`, `"X"`, `"!X"`).
    pub fn rule(&self) -> String {
        match (&self.mode, &self.country) {
            (RegionMode::IncludeCountry, Some(c)) => c.clone(),
            (RegionMode::ExcludeCountry, Some(c)) => format!("!{c}"),
            _ => String::new(),
        }
    }

    /// Human-readable scope for reports.
    pub fn describe(&self) -> String {
        match (&self.mode, &self.country) {
            (RegionMode::IncludeCountry, Some(c)) => format!("{c} only"),
            (RegionMode::ExcludeCountry, Some(c)) => format!("Global ({c} excluded)"),
            _ => "Global".into(),
        }
    }

    /// Whether evidence from `region` satisfies this scope. Unknown regions
    /// (`None`) are never penalized by an include rule.
    pub fn allows(&self, region: Option<&str>) -> bool {
        let Some(country) = self.country.as_deref() else {
            return true;
        };
        let region = region.map(normalize_region_name);
        match self.mode {
            RegionMode::Global => true,
            RegionMode::IncludeCountry => region.is_none_or(|r| r == country),
            RegionMode::ExcludeCountry => region.as_deref() != Some(country),
        }
    }
}

impl fmt::Display for RegionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

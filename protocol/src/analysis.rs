//! Wire types for the analysis endpoint.
//!
//! Field names follow the service's JSON contract. `AnalysisResult` is
//! persisted verbatim (its serde form is the wire form), so renaming a
//! field here is a storage-format change.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Parameters for one analysis request (`POST /analyze`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Industry category, e.g. "Fashion".
    pub category: String,
    pub brand_name: String,
    /// Market to probe, e.g. "Global".
    pub location: String,
    /// Optional keyword hints; the service accepts an empty list.
    pub keywords: Vec<String>,
    /// Site under analysis. Normalized to carry a scheme before dispatch.
    pub website: String,
}

/// One sampled sentence with its source and sentiment score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentEntry {
    pub sentence: String,
    /// Source name, e.g. the publication or model that produced the text.
    pub name: String,
    pub score: f64,
}

/// Mention share for one tracked AI platform. Unique by `model`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVisibility {
    pub model: String,
    pub mentions: f64,
}

/// One brand in the industry ranking. The sequence is ordered descending
/// by `mentions`; rank is positional and not part of the wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryRanking {
    pub name: String,
    pub mentions: f64,
}

/// The ten optimization categories scored by the service.
///
/// `as_str` values are the exact wire keys used in
/// [`VisibilityBreakdown`]; `weight` is each category's share of the
/// overall optimization score (weights sum to 100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptimizationCategory {
    ContentQuality,
    TrustedSources,
    IntentKeywords,
    Freshness,
    InternalLinking,
    BacklinkDiversity,
    PageAccessibility,
    SchemaData,
    SocialMentions,
    UxDesign,
}

impl OptimizationCategory {
    pub const ALL: [Self; 10] = [
        Self::ContentQuality,
        Self::TrustedSources,
        Self::IntentKeywords,
        Self::Freshness,
        Self::InternalLinking,
        Self::BacklinkDiversity,
        Self::PageAccessibility,
        Self::SchemaData,
        Self::SocialMentions,
        Self::UxDesign,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentQuality => "Content Quality & Structure",
            Self::TrustedSources => "Trusted External Sources",
            Self::IntentKeywords => "Intent-Mapped Keywords & Pages",
            Self::Freshness => "Freshness & Update Frequency",
            Self::InternalLinking => "Internal Linking & Structure",
            Self::BacklinkDiversity => "Backlink Diversity",
            Self::PageAccessibility => "Page Accessibility (speed, mobile, crawlability)",
            Self::SchemaData => "Schema & Structured Data",
            Self::SocialMentions => "Social Mentions",
            Self::UxDesign => "UX/UI Visual Design",
        }
    }

    /// Percentage weight of this category in the overall score.
    pub fn weight(self) -> u32 {
        match self {
            Self::ContentQuality => 20,
            Self::TrustedSources => 15,
            Self::IntentKeywords => 15,
            Self::Freshness => 10,
            Self::InternalLinking => 10,
            Self::BacklinkDiversity => 10,
            Self::PageAccessibility => 8,
            Self::SchemaData => 5,
            Self::SocialMentions => 4,
            Self::UxDesign => 3,
        }
    }

    /// Reverse of [`Self::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl std::fmt::Display for OptimizationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw category-name → 0–10 sub-score map as returned by the service.
///
/// Stores exactly what the server sent. Missing categories default to 0
/// only in derived views, never here; unknown keys are kept so a newer
/// server does not break older clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisibilityBreakdown(BTreeMap<String, f64>);

impl VisibilityBreakdown {
    pub fn score_for(&self, category: OptimizationCategory) -> Option<f64> {
        self.0.get(category.as_str()).copied()
    }

    pub fn insert(&mut self, category: OptimizationCategory, score: f64) {
        self.0.insert(category.as_str().to_string(), score);
    }

    pub fn entries(&self) -> &BTreeMap<String, f64> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(OptimizationCategory, f64)> for VisibilityBreakdown {
    fn from_iter<I: IntoIterator<Item = (OptimizationCategory, f64)>>(iter: I) -> Self {
        let mut breakdown = Self::default();
        for (category, score) in iter {
            breakdown.insert(category, score);
        }
        breakdown
    }
}

/// Full analysis payload for one brand/site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Total LLM citations observed.
    pub llm_citations: u32,
    /// Average answer position, 0–100.
    pub avg_position: f64,
    /// Average summarizability, 0–100.
    pub avg_summarizability: f64,
    /// Headline AI visibility score, 0–100.
    pub ai_visibility: f64,
    pub sentiment: Vec<SentimentEntry>,
    pub brand_visibility: Vec<ModelVisibility>,
    pub industry_rankings: Vec<IndustryRanking>,
    pub visibility: VisibilityBreakdown,
}

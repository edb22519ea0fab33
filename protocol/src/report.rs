//! Derived, display-oriented views over an [`AnalysisResult`].
//!
//! Pure transforms: nothing here is persisted or sent over the wire.
//! Missing optimization categories default to 0 at this layer only.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::analysis::AnalysisResult;
use crate::analysis::OptimizationCategory;

/// Citation totals grouped per AI platform, keyed by lowercased model
/// name with mentions rounded to whole citations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationsReport {
    pub total: u32,
    pub breakdown: BTreeMap<String, u32>,
}

pub fn citations_report(result: &AnalysisResult) -> CitationsReport {
    let breakdown = result
        .brand_visibility
        .iter()
        .map(|entry| {
            let mentions = entry.mentions.max(0.0).round() as u32;
            (entry.model.to_lowercase(), mentions)
        })
        .collect();

    CitationsReport {
        total: result.llm_citations,
        breakdown,
    }
}

/// One row of the industry ranking table. `visibility` is the brand's
/// mention count relative to the leader, as a rounded percentage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndustryRow {
    pub rank: usize,
    pub brand: String,
    pub mentions: f64,
    pub visibility: u32,
}

pub fn industry_table(result: &AnalysisResult) -> Vec<IndustryRow> {
    let max_mentions = result
        .industry_rankings
        .iter()
        .map(|r| r.mentions)
        .fold(0.0_f64, f64::max);

    result
        .industry_rankings
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let visibility = if max_mentions > 0.0 {
                (entry.mentions / max_mentions * 100.0).round() as u32
            } else {
                0
            };
            IndustryRow {
                rank: index + 1,
                brand: entry.name.clone(),
                mentions: entry.mentions,
                visibility,
            }
        })
        .collect()
}

/// Qualitative band for a category percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Strong,
    Moderate,
    Weak,
}

impl Band {
    pub fn from_percentage(percentage: u32) -> Self {
        if percentage >= 80 {
            Self::Strong
        } else if percentage >= 60 {
            Self::Moderate
        } else {
            Self::Weak
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Moderate => "moderate",
            Self::Weak => "weak",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scorecard row: raw 0–10 score, percentage, and band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRow {
    pub category: String,
    pub score: f64,
    pub percentage: u32,
    pub band: Band,
}

/// The ten-category optimization scorecard plus the weighted overall
/// score (0–100).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scorecard {
    pub rows: Vec<ScoreRow>,
    pub overall: u32,
}

pub fn scorecard(result: &AnalysisResult) -> Scorecard {
    let mut rows = Vec::with_capacity(OptimizationCategory::ALL.len());
    let mut weighted_sum = 0.0_f64;

    for category in OptimizationCategory::ALL {
        let score = result.visibility.score_for(category).unwrap_or(0.0);
        let raw_percentage = score / 10.0 * 100.0;
        weighted_sum += raw_percentage * f64::from(category.weight()) / 100.0;
        rows.push(ScoreRow {
            category: category.as_str().to_string(),
            score,
            percentage: raw_percentage.round() as u32,
            band: Band::from_percentage(raw_percentage.round() as u32),
        });
    }

    Scorecard {
        rows,
        overall: weighted_sum.round() as u32,
    }
}

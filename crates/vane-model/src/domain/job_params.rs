use serde::{Deserialize, Serialize};

use crate::JobFamily;

/// Submission arguments, stored verbatim on the job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum JobParams {
    Analysis(AnalysisParams),
    ConceptCollection(CollectionParams),
    ExtendedAnalysis(ExtendedParams),
}

impl JobParams {
    pub fn family(&self) -> JobFamily {
        match self {
            JobParams::Analysis(_) => JobFamily::Analysis,
            JobParams::ConceptCollection(_) => JobFamily::ConceptCollection,
            JobParams::ExtendedAnalysis(_) => JobFamily::ExtendedAnalysis,
        }
    }
}

/// Full market analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    /// Candidate count when selecting from stored history.
    pub top_n: usize,
    /// Factor subset; `None` computes every factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_factors: Option<Vec<String>>,
    /// Refresh quotes and history from the source instead of using stored data.
    pub collect_latest_data: bool,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            top_n: 100,
            selected_factors: None,
            collect_latest_data: true,
        }
    }
}

/// Concept board collection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionParams {
    /// Wipe stored concept tables before collecting.
    pub clear_existing: bool,
}

/// Sector ranking with analyst commentary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendedParams {
    /// Number of top-ranked sectors kept.
    pub sector_limit: usize,
    /// Ask the analyst for a per-sector summary.
    pub summarize: bool,
}

impl Default for ExtendedParams {
    fn default() -> Self {
        Self {
            sector_limit: 10,
            summarize: true,
        }
    }
}

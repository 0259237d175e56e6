use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of job sharing one stage sequence and one registry namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFamily {
    /// Full market analysis: quotes, history refresh, factor ranking.
    Analysis,
    /// Concept/sector board membership collection.
    ConceptCollection,
    /// Sector ranking plus per-sector analyst commentary.
    ExtendedAnalysis,
}

#[derive(Debug, Error)]
#[error("unknown job family: {0} (expected: analysis|concept_collection|extended_analysis)")]
pub struct ParseFamilyError(pub String);

impl JobFamily {
    pub const ALL: [JobFamily; 3] = [
        JobFamily::Analysis,
        JobFamily::ConceptCollection,
        JobFamily::ExtendedAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobFamily::Analysis => "analysis",
            JobFamily::ConceptCollection => "concept_collection",
            JobFamily::ExtendedAnalysis => "extended_analysis",
        }
    }

    /// Returns `true` if at most one job of this family may be active at a time.
    pub fn is_singleton(&self) -> bool {
        matches!(self, JobFamily::ExtendedAnalysis)
    }

    /// Families whose derived caches go stale when a job of `self` completes.
    pub fn dependents(&self) -> &'static [JobFamily] {
        match self {
            JobFamily::Analysis => &[JobFamily::ExtendedAnalysis],
            JobFamily::ConceptCollection => &[JobFamily::ExtendedAnalysis],
            JobFamily::ExtendedAnalysis => &[JobFamily::Analysis],
        }
    }
}

impl fmt::Display for JobFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobFamily {
    type Err = ParseFamilyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        match norm.as_str() {
            "analysis" => Ok(JobFamily::Analysis),
            "concept_collection" | "concepts" => Ok(JobFamily::ConceptCollection),
            "extended_analysis" | "extended" => Ok(JobFamily::ExtendedAnalysis),
            _ => Err(ParseFamilyError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_extended_analysis_is_singleton() {
        assert!(JobFamily::ExtendedAnalysis.is_singleton());
        assert!(!JobFamily::Analysis.is_singleton());
        assert!(!JobFamily::ConceptCollection.is_singleton());
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!("analysis".parse::<JobFamily>().unwrap(), JobFamily::Analysis);
        assert_eq!(
            "Extended-Analysis".parse::<JobFamily>().unwrap(),
            JobFamily::ExtendedAnalysis
        );
        assert_eq!(
            "concepts".parse::<JobFamily>().unwrap(),
            JobFamily::ConceptCollection
        );
        assert!("bogus".parse::<JobFamily>().is_err());
    }

    #[test]
    fn no_family_depends_on_itself() {
        for family in JobFamily::ALL {
            assert!(!family.dependents().contains(&family));
        }
    }
}

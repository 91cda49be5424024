use serde::Serialize;
use std::fmt;

use crate::audit::Status;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Loaded,
    Skipped,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &str {
        match self {
            Outcome::Loaded => "loaded",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
        }
    }
}

/// One survey's line in a year summary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SurveyReport {
    pub survey: String,
    pub status: Outcome,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SurveyReport {
    pub fn loaded(survey: &str, source: &str, rows: usize) -> Self {
        Self {
            survey: survey.to_string(),
            status: Outcome::Loaded,
            rows,
            source: Some(source.to_string()),
            error: None,
        }
    }

    pub fn skipped(survey: &str) -> Self {
        Self {
            survey: survey.to_string(),
            status: Outcome::Skipped,
            rows: 0,
            source: None,
            error: None,
        }
    }

    pub fn failed(survey: &str, source: Option<&str>, error: impl fmt::Display) -> Self {
        Self {
            survey: survey.to_string(),
            status: Outcome::Failed,
            rows: 0,
            source: source.map(str::to_string),
            error: Some(error.to_string()),
        }
    }
}

/// Per-year result of a transform or staging run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct YearSummary {
    pub year: i32,
    pub operation: String,
    pub run_id: i64,
    pub run_status: Status,
    pub surveys: Vec<SurveyReport>,
}

impl YearSummary {
    pub fn survey(&self, name: &str) -> Option<&SurveyReport> {
        self.surveys.iter().find(|s| s.survey == name)
    }

    pub fn total_rows(&self) -> usize {
        self.surveys.iter().map(|s| s.rows).sum()
    }

    pub fn failed(&self) -> Vec<&str> {
        self.surveys
            .iter()
            .filter(|s| s.status == Outcome::Failed)
            .map(|s| s.survey.as_str())
            .collect()
    }
}

impl fmt::Display for YearSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} (run {}): {}",
            self.operation,
            self.year,
            self.run_id,
            self.run_status.as_str()
        )?;
        for s in &self.surveys {
            write!(f, "  {:<24} {:<8} {:>10}", s.survey, s.status.as_str(), s.rows)?;
            if let Some(e) = &s.error {
                write!(f, "  {e}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

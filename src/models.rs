use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a single progress log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// One timestamped line of run progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
        }
    }
}

/// A job link harvested from a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListing {
    pub url: String,
    pub page: u32,
}

/// Attributes scraped from a job detail page. Fields the page does not
/// expose stay empty rather than failing the job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDetail {
    pub title: String,
    pub company: String,
    pub experience_required: String,
    pub salary: String,
    pub location: String,
    pub posted: String,
    pub openings: String,
    pub applicants: String,
    pub key_skills: Vec<String>,
    pub role_info: Vec<String>,
}

/// The four boolean compatibility signals a detail page may advertise.
/// A page without the widget reads as all-false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSignals {
    pub early_applicant: bool,
    pub skills: bool,
    pub location: bool,
    pub experience: bool,
}

impl MatchSignals {
    pub const COUNT: u8 = 4;

    pub fn all() -> Self {
        Self {
            early_applicant: true,
            skills: true,
            location: true,
            experience: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    GoodMatch,
    PoorMatch,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::GoodMatch => "good_match",
            MatchStatus::PoorMatch => "poor_match",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "good_match" => MatchStatus::GoodMatch,
            _ => MatchStatus::PoorMatch,
        }
    }
}

/// Outcome of scoring one job's compatibility signals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchResult {
    pub signals: MatchSignals,
    pub score: u8,
    pub status: MatchStatus,
}

impl MatchResult {
    pub fn can_apply(&self) -> bool {
        matches!(self.status, MatchStatus::GoodMatch)
    }
}

/// How the apply action is wired on a detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyType {
    Direct,
    External,
    NoButton,
}

impl ApplyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyType::Direct => "direct",
            ApplyType::External => "external",
            ApplyType::NoButton => "no_button",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "direct" => ApplyType::Direct,
            "external" => ApplyType::External,
            _ => ApplyType::NoButton,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Applied,
    Skipped,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "applied" => ApplicationStatus::Applied,
            _ => ApplicationStatus::Skipped,
        }
    }
}

/// Everything recorded about one processed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub url: String,
    pub page: u32,
    pub ordinal: u32, // position within its listing page, 1-based
    pub detail: JobDetail,
    pub match_result: MatchResult,
    pub apply_type: ApplyType,
    pub status: ApplicationStatus,
    pub skip_reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// A persisted result row, as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub id: i64,
    pub user: String,
    pub result: JobResult,
}

/// Final report handed back to the caller when a run ends, whether it
/// finished, was cancelled, or died on a fatal error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub success: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_visited: u32,
    pub jobs_seen: u32,
    pub jobs_applied: u32,
    pub jobs_skipped: u32,
    pub skip_reasons: BTreeMap<String, u32>,
    pub results: Vec<JobResult>,
    pub logs: Vec<LogEntry>,
}

//! Rule-based issue scoring
//!
//! Every issue gets a deterministic 0-100 score from three constant tables:
//! severity base, type impact and an effort multiplier. AI enrichment may later
//! blend into this score, but this module never looks at it.

use crate::issue::{Effort, Issue, IssueType, Severity};
use serde::{Deserialize, Serialize};

const SEVERITY_WEIGHT: f64 = 0.4;
const TYPE_WEIGHT: f64 = 0.6;
const QUICK_WIN_THRESHOLD: u8 = 50;
/// Score assumed for issue kinds without an entry in the impact table.
const DEFAULT_TYPE_IMPACT: u32 = 30;

/// Final priority bucket of a ranked issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Priority::Critical,
            55..=79 => Priority::High,
            30..=54 => Priority::Medium,
            _ => Priority::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Priority::Critical => "!!",
            Priority::High => "! ",
            Priority::Medium => "- ",
            Priority::Low => "· ",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An issue plus its rule-based score and default planning labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredIssue {
    #[serde(flatten)]
    pub issue: Issue,
    /// Position of the issue in the unfiltered input list
    pub rank_id: usize,
    pub score: u8,
    pub quick_win: bool,
    pub blocks_other_work: bool,
    pub business_justification: String,
    pub recommended_sprint: u8,
}

pub fn severity_base(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 100,
        Severity::High => 70,
        Severity::Medium => 40,
        Severity::Low => 15,
        Severity::Unknown => 10,
    }
}

pub fn type_impact(issue_type: &IssueType) -> u32 {
    match issue_type {
        IssueType::HardcodedPassword | IssueType::HardcodedApiKey => 95,
        IssueType::HardcodedToken | IssueType::SyntaxError => 90,
        IssueType::NoTests => 75,
        IssueType::MissingRequirements => 70,
        IssueType::GodClass => 65,
        IssueType::GodFile => 60,
        IssueType::LongMethod => 50,
        IssueType::BareExcept => 45,
        IssueType::UnpinnedDependencies => 40,
        IssueType::NoCicd | IssueType::TooManyParameters => 35,
        IssueType::MissingReadme => 30,
        IssueType::MissingDocstring => 20,
        IssueType::Other(_) => DEFAULT_TYPE_IMPACT,
    }
}

pub fn effort_multiplier(effort: Effort) -> f64 {
    match effort {
        Effort::Minutes => 1.5,
        Effort::Hours => 1.0,
        Effort::Days => 0.7,
    }
}

/// Sprint suggestion derived from a score: urgent work lands in sprint 1.
pub fn sprint_for_score(score: u8) -> u8 {
    if score > 70 {
        1
    } else if score > 40 {
        2
    } else {
        3
    }
}

/// Round half to even, clamped into the 0-100 score range.
pub(crate) fn to_score(raw: f64) -> u8 {
    raw.round_ties_even().clamp(0.0, 100.0) as u8
}

/// Score a single issue. `index` becomes its stable `rank_id`.
pub fn score_issue(issue: &Issue, index: usize) -> ScoredIssue {
    let base = severity_base(issue.severity) as f64;
    let impact = type_impact(&issue.issue_type) as f64;
    let raw = (base * SEVERITY_WEIGHT + impact * TYPE_WEIGHT) * effort_multiplier(issue.effort_to_fix);
    let score = to_score(raw);

    ScoredIssue {
        issue: issue.clone(),
        rank_id: index,
        score,
        quick_win: issue.effort_to_fix == Effort::Minutes && score > QUICK_WIN_THRESHOLD,
        blocks_other_work: false,
        business_justification: String::new(),
        recommended_sprint: sprint_for_score(score),
    }
}

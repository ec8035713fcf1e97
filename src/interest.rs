//! Debt interest: what an issue costs to fix now versus a quarter from now
//!
//! Fix cost grows with the age of the file and how often it is touched, both
//! read from commit history. Only `.py` files among the top ranked issues are
//! priced, one commits request per distinct file.

use crate::issue::{Effort, Issue, IssueType, Severity};
use crate::rank::RankedIssue;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub const HOURLY_RATE_USD: f64 = 50.0;
/// Issues priced per report.
pub const INTEREST_TOP_N: usize = 20;

/// Fix cost growth over one quarter.
const QUARTERLY_GROWTH: f64 = 1.23;
/// Age assumed when history is empty or undated.
const DEFAULT_AGE_DAYS: i64 = 30;
const MAX_MULTIPLIER: f64 = 4.0;

/// One commit touching a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitInfo {
    pub author_email: Option<String>,
    pub authored_at: Option<DateTime<Utc>>,
}

/// Source of per-file commit history.
#[allow(async_fn_in_trait)]
pub trait CommitHistory {
    /// Newest first.
    async fn file_commits(&self, path: &str, branch: &str) -> Result<Vec<CommitInfo>>;
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// `$1,234` style, whole dollars.
pub fn format_usd(amount: f64) -> String {
    let whole = amount.round_ties_even() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if whole < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHistory {
    pub age_days: i64,
    pub touches: usize,
    pub unique_authors: usize,
}

impl FileHistory {
    /// Age runs from the oldest listed commit, at least one day.
    pub fn from_commits(commits: &[CommitInfo], now: DateTime<Utc>) -> Self {
        let age_days = commits
            .last()
            .and_then(|oldest| oldest.authored_at)
            .map(|at| now.signed_duration_since(at).num_days().max(1))
            .unwrap_or(DEFAULT_AGE_DAYS);
        let unique_authors = commits
            .iter()
            .filter_map(|c| c.author_email.as_deref())
            .collect::<BTreeSet<_>>()
            .len();
        Self {
            age_days,
            touches: commits.len(),
            unique_authors,
        }
    }

    /// Touches per 30 days; files younger than a month count as one month.
    pub fn monthly_touch_rate(&self) -> f64 {
        let months = (self.age_days as f64 / 30.0).max(1.0);
        round_to(self.touches as f64 / months, 1)
    }
}

pub fn base_fix_hours(effort: Effort) -> f64 {
    match effort {
        Effort::Minutes => 0.5,
        Effort::Hours => 2.0,
        Effort::Days => 8.0,
    }
}

/// 50% harder per year of age, 30% per 20 touches, capped at 4x.
pub fn complexity_multiplier(age_days: i64, touches: usize) -> f64 {
    let age_factor = 1.0 + (age_days as f64 / 365.0) * 0.5;
    let touch_factor = 1.0 + (touches as f64 / 20.0) * 0.3;
    round_to((age_factor * touch_factor).min(MAX_MULTIPLIER), 2)
}

/// Cost breakdown for one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtInterest {
    pub file_path: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub age_days: i64,
    pub total_touches: usize,
    pub unique_authors: usize,
    pub monthly_touch_rate: f64,
    pub base_fix_hours: f64,
    pub complexity_multiplier: f64,
    pub current_fix_hours: f64,
    pub future_fix_hours: f64,
    pub current_cost_usd: f64,
    pub future_cost_usd: f64,
    pub interest_rate_pct: f64,
    pub summary: String,
}

impl DebtInterest {
    pub fn compute(issue: &Issue, history: FileHistory) -> Self {
        let base = base_fix_hours(issue.effort_to_fix);
        let multiplier = complexity_multiplier(history.age_days, history.touches);
        let current_hours = round_to(base * multiplier, 1);
        let future_hours = round_to(current_hours * QUARTERLY_GROWTH, 1);
        let current_usd = round_to(current_hours * HOURLY_RATE_USD, 0);
        let future_usd = round_to(future_hours * HOURLY_RATE_USD, 0);
        let interest_rate = round_to((multiplier - 1.0) * 100.0, 1);

        let summary = format!(
            "This {} is {} days old, touched {} times by {} authors. \
             Fix costs ~{:.1}h ({}) today. Wait one quarter and it costs {} \
             ({:.1}% interest on your technical debt).",
            issue.issue_type.as_str().replace('_', " "),
            history.age_days,
            history.touches,
            history.unique_authors,
            current_hours,
            format_usd(current_usd),
            format_usd(future_usd),
            interest_rate
        );

        Self {
            file_path: issue.location.file_path.clone(),
            issue_type: issue.issue_type.clone(),
            severity: issue.severity,
            age_days: history.age_days,
            total_touches: history.touches,
            unique_authors: history.unique_authors,
            monthly_touch_rate: history.monthly_touch_rate(),
            base_fix_hours: base,
            complexity_multiplier: multiplier,
            current_fix_hours: current_hours,
            future_fix_hours: future_hours,
            current_cost_usd: current_usd,
            future_cost_usd: future_usd,
            interest_rate_pct: interest_rate,
            summary,
        }
    }
}

/// Repository-wide cost of waiting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterestTotals {
    pub total_issues_analyzed: usize,
    pub total_current_cost_usd: f64,
    pub total_future_cost_usd: f64,
    pub potential_savings_usd: f64,
    pub roi_message: String,
    pub issues: Vec<DebtInterest>,
}

impl InterestTotals {
    pub fn from_items(issues: Vec<DebtInterest>) -> Self {
        let current: f64 = issues.iter().map(|i| i.current_cost_usd).sum();
        let future: f64 = issues.iter().map(|i| i.future_cost_usd).sum();
        let savings = round_to(future - current, 0);
        Self {
            total_issues_analyzed: issues.len(),
            total_current_cost_usd: round_to(current, 0),
            total_future_cost_usd: round_to(future, 0),
            potential_savings_usd: savings,
            roi_message: format!("Fix now and save {}", format_usd(savings)),
            issues,
        }
    }
}

pub struct InterestCalculator<'h, H> {
    host: &'h H,
    now: DateTime<Utc>,
}

impl<'h, H: CommitHistory> InterestCalculator<'h, H> {
    pub fn new(host: &'h H) -> Self {
        Self::with_now(host, Utc::now())
    }

    pub fn with_now(host: &'h H, now: DateTime<Utc>) -> Self {
        Self { host, now }
    }

    /// Price the top ranked `.py` issues. Files whose history cannot be read
    /// are left out of the totals.
    pub async fn repo_total(&self, ranked: &[RankedIssue], branch: &str) -> InterestTotals {
        let mut histories: HashMap<&str, Option<FileHistory>> = HashMap::new();
        let mut items = Vec::new();

        for issue in ranked.iter().take(INTEREST_TOP_N).map(RankedIssue::issue) {
            let path = issue.location.file_path.as_str();
            if !path.ends_with(".py") {
                continue;
            }
            let history = match histories.get(path).copied() {
                Some(known) => known,
                None => {
                    let fetched = match self.host.file_commits(path, branch).await {
                        Ok(commits) => Some(FileHistory::from_commits(&commits, self.now)),
                        Err(err) => {
                            tracing::warn!(path, error = %err, "could not read commit history");
                            None
                        }
                    };
                    histories.insert(path, fetched);
                    fetched
                }
            };
            if let Some(history) = history {
                items.push(DebtInterest::compute(issue, history));
            }
        }

        let totals = InterestTotals::from_items(items);
        tracing::info!(
            analyzed = totals.total_issues_analyzed,
            savings_usd = totals.potential_savings_usd,
            "priced debt interest"
        );
        totals
    }
}

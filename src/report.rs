//! Analysis reports and their terminal renderings.

use crate::autofix::SkippedFix;
use crate::fix::FixProposal;
use crate::github::RepoMetadata;
use crate::interest::{format_usd, InterestTotals};
use crate::issue::DetectionStats;
use crate::rank::{quick_wins, sprint_plan, RankedIssue};
use crate::score::Priority;
use crate::util::truncate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use uuid::Uuid;

/// Ranked issues kept in a report.
pub const REPORT_TOP_ISSUES: usize = 20;
/// Issues shown in the rich rendering.
const RICH_TOP_ISSUES: usize = 10;
const RICH_FIX_PREVIEW: usize = 5;
const RICH_QUICK_WINS: usize = 5;

/// Share of remediation time automation is expected to save.
const TIME_SAVING_FACTOR: f64 = 0.6;

pub const TOOL_VERSION: &str = concat!("debt-guardian ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Rich,
    Simple,
    Json,
}

/// A pull request opened (or planned, in dry-run mode) for one fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    /// 0 for dry-run plans
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
    pub branch: String,
    pub draft: bool,
    pub file_path: String,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_issues: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub quick_wins: usize,
    pub fixes_proposed: usize,
    pub prs_created: usize,
    pub files_scanned: usize,
    pub estimated_hours_saved: f64,
}

fn hours_for(priority: Priority) -> f64 {
    match priority {
        Priority::Critical => 8.0,
        Priority::High => 4.0,
        Priority::Medium | Priority::Low => 0.0,
    }
}

impl AnalysisSummary {
    pub fn compute(
        total_issues: usize,
        files_scanned: usize,
        ranked: &[RankedIssue],
        fixes_proposed: usize,
    ) -> Self {
        let count = |p: Priority| ranked.iter().filter(|r| r.priority == p).count();
        let (critical, high, medium, low) = (
            count(Priority::Critical),
            count(Priority::High),
            count(Priority::Medium),
            count(Priority::Low),
        );

        let hours: f64 = ranked
            .iter()
            .map(|r| hours_for(r.priority) * TIME_SAVING_FACTOR)
            .sum();

        Self {
            total_issues: total_issues.max(critical + high + medium + low),
            critical,
            high,
            medium,
            low,
            quick_wins: ranked.iter().filter(|r| r.quick_win()).count(),
            fixes_proposed,
            prs_created: 0,
            files_scanned,
            estimated_hours_saved: (hours * 10.0).round_ties_even() / 10.0,
        }
    }
}

/// Repository context a report is generated for.
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    pub repo_url: String,
    pub branch: String,
    pub repo_metadata: RepoMetadata,
    pub files_scanned: usize,
    pub stats: DetectionStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub repo_url: String,
    pub branch: String,
    pub generated_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub tool_version: String,
    pub repo_metadata: RepoMetadata,
    pub summary: AnalysisSummary,
    pub top_issues: Vec<RankedIssue>,
    pub fix_proposals: Vec<FixProposal>,
    #[serde(default)]
    pub pull_requests: Vec<PullRequestInfo>,
    #[serde(default)]
    pub skipped_fixes: Vec<SkippedFix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt_interest: Option<InterestTotals>,
    pub stats: DetectionStats,
}

impl AnalysisReport {
    pub fn generate(
        context: ReportContext,
        ranked: &[RankedIssue],
        proposals: &[FixProposal],
        elapsed: Duration,
    ) -> Self {
        let summary = AnalysisSummary::compute(
            context.stats.total,
            context.files_scanned,
            ranked,
            proposals.len(),
        );
        Self {
            id: Uuid::new_v4(),
            repo_url: context.repo_url,
            branch: context.branch,
            generated_at: Utc::now(),
            duration_seconds: (elapsed.as_secs_f64() * 100.0).round() / 100.0,
            tool_version: TOOL_VERSION.to_string(),
            repo_metadata: context.repo_metadata,
            summary,
            top_issues: ranked.iter().take(REPORT_TOP_ISSUES).cloned().collect(),
            fix_proposals: proposals.to_vec(),
            pull_requests: Vec::new(),
            skipped_fixes: Vec::new(),
            debt_interest: None,
            stats: context.stats,
        }
    }

    /// Attach auto-fix results. Dry-run plans do not count as created PRs.
    pub fn attach_auto_fix(&mut self, pull_requests: Vec<PullRequestInfo>, skipped: Vec<SkippedFix>) {
        self.summary.prs_created = pull_requests.iter().filter(|pr| !pr.dry_run).count();
        self.pull_requests = pull_requests;
        self.skipped_fixes = skipped;
    }

    pub fn attach_interest(&mut self, totals: InterestTotals) {
        self.debt_interest = Some(totals);
    }

    pub fn render(&self, format: OutputFormat) -> serde_json::Result<String> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(self),
            OutputFormat::Simple => Ok(render_simple(self)),
            OutputFormat::Rich => Ok(render_rich(self)),
        }
    }
}

fn render_simple(report: &AnalysisReport) -> String {
    let s = &report.summary;
    let mut out = String::new();
    let _ = writeln!(out, "Debt Guardian Report");
    let _ = writeln!(out, "Repo: {}", report.repo_url);
    let _ = writeln!(out, "Total Issues: {}", s.total_issues);
    let _ = writeln!(
        out,
        "Critical: {} | High: {} | Medium: {} | Low: {}",
        s.critical, s.high, s.medium, s.low
    );
    let _ = writeln!(out, "Quick Wins: {}", s.quick_wins);
    let _ = writeln!(out, "Fix Proposals: {}", s.fixes_proposed);
    if s.prs_created > 0 {
        let _ = writeln!(out, "Pull Requests: {}", s.prs_created);
    }
    let _ = writeln!(out, "Estimated Hours Saved: {:.1}", s.estimated_hours_saved);
    if let Some(interest) = &report.debt_interest {
        let _ = writeln!(
            out,
            "Debt Cost Now: {} | Next Quarter: {}",
            format_usd(interest.total_current_cost_usd),
            format_usd(interest.total_future_cost_usd)
        );
    }
    out
}

const BOX_WIDTH: usize = 56;

fn box_line(out: &mut String, text: &str) {
    let text = truncate(text, BOX_WIDTH - 2);
    let pad = BOX_WIDTH - 2 - text.chars().count();
    let _ = writeln!(out, "│ {}{} │", text, " ".repeat(pad));
}

fn render_rich(report: &AnalysisReport) -> String {
    let s = &report.summary;
    let mut out = String::new();

    let _ = writeln!(out, "\nANALYSIS COMPLETE");
    let _ = writeln!(out, "Repository: {} | Branch: {}", report.repo_url, report.branch);
    let _ = writeln!(
        out,
        "Generated: {} ({:.1}s)\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S"),
        report.duration_seconds
    );

    let title = "─ DEBT SUMMARY ";
    let _ = writeln!(out, "┌{}{}┐", title, "─".repeat(BOX_WIDTH - title.chars().count()));
    box_line(&mut out, &format!("Total Issues Found:   {:>4}", s.total_issues));
    box_line(&mut out, &format!("Files Scanned:        {:>4}", s.files_scanned));
    box_line(&mut out, "");
    box_line(&mut out, &format!("CRITICAL: {:>3}    HIGH: {:>3}", s.critical, s.high));
    box_line(&mut out, &format!("MEDIUM:   {:>3}    LOW:  {:>3}", s.medium, s.low));
    box_line(&mut out, "");
    box_line(&mut out, &format!("Quick Wins:           {:>4}", s.quick_wins));
    box_line(&mut out, &format!("Fix Proposals:        {:>4}", s.fixes_proposed));
    if s.prs_created > 0 {
        box_line(&mut out, &format!("Pull Requests:        {:>4}", s.prs_created));
    }
    box_line(&mut out, &format!("Est. Hours Saved:     {:>6.1}", s.estimated_hours_saved));
    let _ = writeln!(out, "└{}┘", "─".repeat(BOX_WIDTH));

    if !report.top_issues.is_empty() {
        let _ = writeln!(out, "\nTOP PRIORITY ISSUES");
        let _ = writeln!(out, "{}", "─".repeat(60));
        for issue in report.top_issues.iter().take(RICH_TOP_ISSUES) {
            let quick = if issue.quick_win() { " [quick win]" } else { "" };
            let _ = writeln!(
                out,
                " {:>2}. {} [{:<8}] score {:>3}{}",
                issue.rank,
                issue.priority.icon(),
                issue.priority.as_str(),
                issue.score(),
                quick
            );
            let _ = writeln!(out, "     {}", truncate(&issue.issue().location.to_string(), 50));
            let _ = writeln!(out, "     {}\n", truncate(&issue.issue().description, 70));
        }
    }

    let wins = quick_wins(&report.top_issues);
    if !wins.is_empty() {
        let _ = writeln!(out, "QUICK WINS");
        let _ = writeln!(out, "{}", "─".repeat(60));
        for win in wins.iter().take(RICH_QUICK_WINS) {
            let _ = writeln!(
                out,
                "  + {} ({})",
                truncate(&win.issue().location.to_string(), 50),
                win.issue().issue_type
            );
        }
        let _ = writeln!(out);
    }

    if !report.top_issues.is_empty() {
        let plan = sprint_plan(&report.top_issues);
        let _ = writeln!(
            out,
            "SPRINT PLAN  sprint 1: {}  sprint 2: {}  later: {}\n",
            plan.sprint_1.len(),
            plan.sprint_2.len(),
            plan.sprint_3.len()
        );
    }

    if !report.fix_proposals.is_empty() {
        let _ = writeln!(out, "FIX PROPOSALS");
        let _ = writeln!(out, "{}", "─".repeat(60));
        for fix in report.fix_proposals.iter().take(RICH_FIX_PREVIEW) {
            let _ = writeln!(
                out,
                "  + {} ({}) {}",
                fix.issue_type,
                fix.source.as_str(),
                truncate(&fix.fix_summary, 60)
            );
        }
        if report.fix_proposals.len() > RICH_FIX_PREVIEW {
            let _ = writeln!(
                out,
                "  ... and {} more. Use --save to export the full report.",
                report.fix_proposals.len() - RICH_FIX_PREVIEW
            );
        }
    }

    if !report.pull_requests.is_empty() {
        let _ = writeln!(out, "\nPULL REQUESTS");
        let _ = writeln!(out, "{}", "─".repeat(60));
        for pr in &report.pull_requests {
            if pr.dry_run {
                let _ = writeln!(out, "  (dry run) {} -> {}", pr.branch, pr.title);
            } else {
                let _ = writeln!(out, "  #{} {}", pr.number, pr.html_url);
            }
        }
    }
    for skip in &report.skipped_fixes {
        let _ = writeln!(out, "  skipped {}: {}", skip.file_path, skip.reason);
    }

    if let Some(interest) = &report.debt_interest {
        let _ = writeln!(out, "\nDEBT INTEREST");
        let _ = writeln!(out, "{}", "─".repeat(60));
        let _ = writeln!(
            out,
            "  Cost to fix now:       {:>10}",
            format_usd(interest.total_current_cost_usd)
        );
        let _ = writeln!(
            out,
            "  Cost next quarter:     {:>10}",
            format_usd(interest.total_future_cost_usd)
        );
        let _ = writeln!(out, "  {} ({} issues priced)", interest.roi_message, interest.total_issues_analyzed);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::{Effort, Issue, IssueType, Location, Severity};
    use crate::score::score_issue;
    use pretty_assertions::assert_eq;

    fn ranked(priorities: &[Priority]) -> Vec<RankedIssue> {
        priorities
            .iter()
            .enumerate()
            .map(|(idx, &priority)| {
                let issue = Issue::new(
                    IssueType::LongMethod,
                    Severity::Medium,
                    "too long",
                    Location::new(format!("m{idx}.py"), Some(3)),
                    Effort::Hours,
                );
                RankedIssue {
                    scored: score_issue(&issue, idx),
                    priority,
                    rank: idx + 1,
                }
            })
            .collect()
    }

    #[test]
    fn test_summary_counts_and_hours() {
        let issues = ranked(&[
            Priority::Critical,
            Priority::High,
            Priority::High,
            Priority::Medium,
            Priority::Low,
        ]);
        let summary = AnalysisSummary::compute(5, 12, &issues, 3);
        assert_eq!(
            (summary.critical, summary.high, summary.medium, summary.low),
            (1, 2, 1, 1)
        );
        // (8 + 4 + 4) * 0.6
        assert_eq!(summary.estimated_hours_saved, 9.6);
        assert_eq!(summary.fixes_proposed, 3);
        assert_eq!(summary.files_scanned, 12);
    }

    #[test]
    fn test_total_is_raised_to_priority_sum() {
        let issues = ranked(&[Priority::Low, Priority::Low]);
        assert_eq!(AnalysisSummary::compute(0, 0, &issues, 0).total_issues, 2);
        assert_eq!(AnalysisSummary::compute(7, 0, &issues, 0).total_issues, 7);
    }

    #[test]
    fn test_report_keeps_top_twenty() {
        let issues = ranked(&[Priority::Medium; 25]);
        let report = AnalysisReport::generate(ReportContext::default(), &issues, &[], Duration::ZERO);
        assert_eq!(report.top_issues.len(), REPORT_TOP_ISSUES);
        assert_eq!(report.summary.total_issues, 25);
        assert!(report.tool_version.starts_with("debt-guardian "));
    }

    fn sample_pr(dry_run: bool) -> PullRequestInfo {
        PullRequestInfo {
            number: if dry_run { 0 } else { 7 },
            title: "fix(Bare Except): narrow handler".into(),
            html_url: String::new(),
            state: "open".into(),
            branch: "codedebt/bare_except-app-py-1".into(),
            draft: true,
            file_path: "app.py".into(),
            dry_run,
        }
    }

    #[test]
    fn test_dry_run_prs_are_not_counted() {
        let mut report =
            AnalysisReport::generate(ReportContext::default(), &[], &[], Duration::ZERO);
        report.attach_auto_fix(vec![sample_pr(true), sample_pr(false)], Vec::new());
        assert_eq!(report.summary.prs_created, 1);
        assert_eq!(report.pull_requests.len(), 2);
    }

    #[test]
    fn test_renderings() {
        let issues = ranked(&[Priority::Critical, Priority::Low]);
        let context = ReportContext {
            repo_url: "https://github.com/o/r".into(),
            branch: "main".into(),
            ..Default::default()
        };
        let report = AnalysisReport::generate(context, &issues, &[], Duration::from_millis(1500));

        let simple = report.render(OutputFormat::Simple).unwrap();
        assert!(simple.contains("Repo: https://github.com/o/r"));
        assert!(simple.contains("Critical: 1 | High: 0 | Medium: 0 | Low: 1"));
        assert!(simple.contains("Estimated Hours Saved: 4.8"));

        let rich = report.render(OutputFormat::Rich).unwrap();
        assert!(rich.contains("DEBT SUMMARY"));
        assert!(rich.contains("[CRITICAL]"));
        assert!(rich.contains("m0.py:3"));

        let json = report.render(OutputFormat::Json).unwrap();
        let back: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary, report.summary);
        assert_eq!(back.top_issues.len(), 2);
    }

    #[test]
    fn test_rich_lists_quick_wins_and_sprint_plan() {
        let mut issues = ranked(&[Priority::Critical, Priority::High, Priority::Low]);
        issues[1].scored.quick_win = true;
        issues[0].scored.recommended_sprint = 1;
        issues[1].scored.recommended_sprint = 1;
        issues[2].scored.recommended_sprint = 3;
        let report = AnalysisReport::generate(ReportContext::default(), &issues, &[], Duration::ZERO);

        let rich = report.render(OutputFormat::Rich).unwrap();
        assert!(rich.contains("QUICK WINS\n"));
        assert!(rich.contains("  + m1.py:3 (long_method)"));
        assert!(!rich.contains("  + m0.py:3"));
        assert!(rich.contains("SPRINT PLAN  sprint 1: 2  sprint 2: 0  later: 1"));
    }

    #[test]
    fn test_interest_totals_are_reported() {
        let mut report = AnalysisReport::generate(ReportContext::default(), &[], &[], Duration::ZERO);
        let plain = report.render(OutputFormat::Json).unwrap();
        assert!(!plain.contains("debt_interest"));

        report.attach_interest(InterestTotals {
            total_issues_analyzed: 2,
            total_current_cost_usd: 1560.0,
            total_future_cost_usd: 1920.0,
            potential_savings_usd: 360.0,
            roi_message: "Fix now and save $360".into(),
            issues: Vec::new(),
        });
        let simple = report.render(OutputFormat::Simple).unwrap();
        assert!(simple.contains("Debt Cost Now: $1,560 | Next Quarter: $1,920"));
        let rich = report.render(OutputFormat::Rich).unwrap();
        assert!(rich.contains("Fix now and save $360 (2 issues priced)"));

        let back: AnalysisReport = serde_json::from_str(&report.render(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(back.debt_interest.unwrap().potential_savings_usd, 360.0);
    }

    #[test]
    fn test_box_lines_are_aligned() {
        let mut out = String::new();
        box_line(&mut out, "short");
        box_line(&mut out, &"x".repeat(200));
        let widths: Vec<usize> = out.lines().map(|l| l.chars().count()).collect();
        assert_eq!(widths, vec![BOX_WIDTH + 2, BOX_WIDTH + 2]);
    }
}

//! Auto-fix: turn top fix proposals into pull requests
//!
//! Proposals for CRITICAL/HIGH or quick-win issues are applied to the real
//! file, gated by the [`SafetyValidator`], and handed to a [`RepoHost`] that
//! creates branch, commit and PR. PRs are never merged automatically. A
//! [`DailyQuota`] caps how many PRs one process opens per UTC day.

use crate::fix::{cache_key, FixProposal};
use crate::issue::{Issue, IssueType, Location};
use crate::rank::RankedIssue;
use crate::report::PullRequestInfo;
use crate::safe_apply::{validate_structure, SafetyStats, SafetyValidator};
use crate::util::{slugify, truncate, truncate_str};
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_max_prs_per_day() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_allowed_fix_types() -> Vec<String> {
    ["bare_except", "missing_docstring", "missing_requirements", "no_tests"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFixSettings {
    #[serde(default = "default_max_prs_per_day")]
    pub max_prs_per_day: u32,
    #[serde(default = "default_true")]
    pub draft_prs_only: bool,
    /// Issue types eligible for automated PRs
    #[serde(default = "default_allowed_fix_types")]
    pub allowed_fix_types: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for AutoFixSettings {
    fn default() -> Self {
        Self {
            max_prs_per_day: default_max_prs_per_day(),
            draft_prs_only: true,
            allowed_fix_types: default_allowed_fix_types(),
            dry_run: false,
        }
    }
}

impl AutoFixSettings {
    pub fn allows(&self, issue_type: &IssueType) -> bool {
        self.allowed_fix_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(issue_type.as_str()))
    }
}

/// File contents as fetched from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    /// Blob sha, required by the host to update the file
    pub sha: String,
}

/// Everything the host needs to open one fix PR.
#[derive(Debug, Clone)]
pub struct PrRequest<'a> {
    pub base_branch: &'a str,
    pub branch: &'a str,
    pub path: &'a str,
    pub content: &'a str,
    pub file_sha: Option<&'a str>,
    pub commit_message: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub draft: bool,
}

/// Where patched files come from and where PRs go.
#[allow(async_fn_in_trait)]
pub trait RepoHost {
    async fn get_file(&self, path: &str, branch: &str) -> Result<Option<RemoteFile>>;

    async fn create_fix_pr(&self, request: &PrRequest<'_>) -> Result<PullRequestInfo>;
}

/// A proposal that did not become a PR, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFix {
    pub issue_id: usize,
    pub issue_type: IssueType,
    pub file_path: String,
    pub reason: String,
}

/// Per-day PR counter. Resets when the UTC date changes; not persisted.
#[derive(Debug, Clone)]
pub struct DailyQuota {
    limit: u32,
    used: u32,
    day: NaiveDate,
}

impl DailyQuota {
    pub fn new(limit: u32, today: NaiveDate) -> Self {
        Self {
            limit,
            used: 0,
            day: today,
        }
    }

    fn roll(&mut self, today: NaiveDate) {
        if today != self.day {
            self.day = today;
            self.used = 0;
        }
    }

    pub fn remaining(&mut self, today: NaiveDate) -> u32 {
        self.roll(today);
        self.limit.saturating_sub(self.used)
    }

    pub fn record(&mut self, today: NaiveDate) {
        self.roll(today);
        self.used += 1;
    }
}

/// Ranked issues keyed by the same identity the fix cache uses.
fn index_by_identity(ranked: &[RankedIssue]) -> HashMap<String, &RankedIssue> {
    ranked
        .iter()
        .map(|r| (cache_key(&r.issue().issue_type, &r.issue().location), r))
        .collect()
}

fn identity_of(proposal: &FixProposal) -> String {
    cache_key(
        &proposal.original_issue.issue_type,
        &proposal.original_issue.location,
    )
}

/// Proposals worth a PR: CRITICAL/HIGH or quick-win issues, in proposal order.
pub fn select_for_pr<'p>(
    ranked: &[RankedIssue],
    proposals: &'p [FixProposal],
    max: usize,
) -> Vec<&'p FixProposal> {
    let index = index_by_identity(ranked);
    proposals
        .iter()
        .filter(|p| index.get(&identity_of(p)).is_some_and(|r| r.is_actionable()))
        .take(max)
        .collect()
}

/// Apply `proposal` to `content`. Returns `content` unchanged when nothing applies.
pub fn apply_fix(content: &str, proposal: &FixProposal, issue: &Issue) -> String {
    let before = proposal.before_code.trim();
    let after = proposal.after_code.trim();
    if before.is_empty() || after.is_empty() {
        return content.to_string();
    }

    if content.contains(before) {
        return content.replacen(before, after, 1);
    }

    match &issue.issue_type {
        IssueType::BareExcept => fix_bare_except(content, issue.location.line),
        t if t.is_credential() => fix_hardcoded_credential(content, issue.location.line),
        _ => content.to_string(),
    }
}

fn line_index(line: Option<u32>) -> Option<usize> {
    line.and_then(|l| (l as usize).checked_sub(1))
}

/// `except:` -> `except Exception:` on the issue line, or everywhere when
/// the line does not hold a bare except.
fn fix_bare_except(content: &str, line: Option<u32>) -> String {
    let Ok(bare) = Regex::new(r"^(\s*)except\s*:") else {
        return content.to_string();
    };

    let mut lines: Vec<String> = content.split('\n').map(String::from).collect();
    if let Some(target) = line_index(line).and_then(|idx| lines.get_mut(idx)) {
        if bare.is_match(target.as_str()) {
            let fixed = bare.replace(target.as_str(), "${1}except Exception:").into_owned();
            *target = fixed;
            return lines.join("\n");
        }
    }

    let Ok(all) = Regex::new(r"(?m)^(\s*)except\s*:") else {
        return content.to_string();
    };
    all.replace_all(content, "${1}except Exception:").into_owned()
}

/// `NAME = "literal"` on the issue line -> environment lookup.
fn fix_hardcoded_credential(content: &str, line: Option<u32>) -> String {
    let Some(idx) = line_index(line) else {
        return content.to_string();
    };
    let Ok(assign) = Regex::new(r#"^(\s*)(\w+)\s*=\s*["'][^"']+["']\s*$"#) else {
        return content.to_string();
    };

    let mut lines: Vec<String> = content.split('\n').map(String::from).collect();
    let replacement = {
        let Some(caps) = lines.get(idx).and_then(|l| assign.captures(l)) else {
            return content.to_string();
        };
        format!(
            "{}{} = os.environ.get(\"{}\")",
            &caps[1],
            &caps[2],
            caps[2].to_uppercase()
        )
    };
    lines[idx] = replacement;

    let has_import = lines
        .iter()
        .any(|l| l.trim() == "import os" || l.trim_start().starts_with("import os,"));
    if !has_import {
        let at = usize::from(lines.first().is_some_and(|l| l.starts_with("#!")));
        lines.insert(at, "import os".to_string());
    }
    lines.join("\n")
}

/// One branch per issue: same-type findings in one file differ by line.
pub fn branch_name(issue_type: &IssueType, location: &Location, timestamp: i64) -> String {
    let safe_path = slugify(&location.file_path);
    format!(
        "codedebt/{}-{}-l{}-{}",
        slugify(issue_type.as_str()),
        truncate_str(&safe_path, 20),
        location.line.unwrap_or(0),
        timestamp.rem_euclid(10_000)
    )
}

fn pr_title(proposal: &FixProposal) -> String {
    format!(
        "fix({}): {}",
        proposal.issue_type.title(),
        truncate_str(&proposal.fix_summary, 50)
    )
}

fn commit_message(proposal: &FixProposal, file_path: &str) -> String {
    format!(
        "fix: resolve {} in {}\n\n{}",
        proposal.issue_type.as_str().replace('_', "-"),
        file_path,
        proposal.fix_summary
    )
}

fn pr_body(proposal: &FixProposal, issue: &RankedIssue) -> String {
    let steps = if proposal.steps.is_empty() {
        "- [ ] Review the changes\n- [ ] Run tests".to_string()
    } else {
        proposal
            .steps
            .iter()
            .map(|s| format!("- [ ] {s}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let references = if proposal.references.is_empty() {
        "- No references provided".to_string()
    } else {
        proposal
            .references
            .iter()
            .map(|r| format!("- {r}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "## Automated debt fix\n\n\
         | Field | Value |\n|-------|-------|\n\
         | **Type** | `{}` |\n\
         | **Severity** | **{}** |\n\
         | **Location** | `{}` |\n\
         | **Priority Score** | {}/100 |\n\
         | **Estimated Fix Time** | {} |\n\n\
         ### Problem\n{}\n\n\
         ### Fix applied\n{}\n\n\
         ### Review checklist\n{}\n\n\
         ### Testing\n{}\n\n\
         ### References\n{}\n\n\
         This PR passed syntax and safety checks. Review before merging.\n",
        issue.issue().issue_type,
        issue.issue().severity,
        issue.issue().location,
        issue.score(),
        proposal.estimated_time,
        proposal.problem_summary,
        proposal.fix_summary,
        steps,
        proposal.testing_tip,
        references,
    )
}

/// Result of one auto-fix run.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoFixOutcome {
    pub pull_requests: Vec<PullRequestInfo>,
    pub skipped: Vec<SkippedFix>,
    pub safety: SafetyStats,
}

pub type Today = Box<dyn Fn() -> NaiveDate + Send + Sync>;

pub struct AutoFixer<'h, H> {
    host: &'h H,
    settings: AutoFixSettings,
    quota: DailyQuota,
    validator: SafetyValidator,
    today: Today,
}

impl<'h, H: RepoHost> AutoFixer<'h, H> {
    pub fn new(host: &'h H, settings: AutoFixSettings) -> Self {
        Self::with_today(host, settings, Box::new(|| Utc::now().date_naive()))
    }

    pub fn with_today(host: &'h H, settings: AutoFixSettings, today: Today) -> Self {
        let quota = DailyQuota::new(settings.max_prs_per_day, today());
        Self {
            host,
            settings,
            quota,
            validator: SafetyValidator::new(),
            today,
        }
    }

    pub fn safety_stats(&self) -> SafetyStats {
        self.validator.stats()
    }

    /// Open up to `max_prs` PRs for the selected proposals, sequentially.
    pub async fn run(
        &mut self,
        ranked: &[RankedIssue],
        proposals: &[FixProposal],
        base_branch: &str,
        max_prs: usize,
    ) -> AutoFixOutcome {
        let index = index_by_identity(ranked);
        let mut pull_requests = Vec::new();
        let mut skipped = Vec::new();

        for proposal in select_for_pr(ranked, proposals, max_prs) {
            let Some(issue) = index.get(&identity_of(proposal)).copied() else {
                continue;
            };
            match self.fix_one(issue, proposal, base_branch).await {
                Ok(pr) => pull_requests.push(pr),
                Err(reason) => {
                    tracing::info!(
                        issue_type = %proposal.issue_type,
                        file = %issue.issue().location.file_path,
                        reason = %reason,
                        "skipped auto-fix"
                    );
                    skipped.push(SkippedFix {
                        issue_id: issue.rank_id(),
                        issue_type: proposal.issue_type.clone(),
                        file_path: issue.issue().location.file_path.clone(),
                        reason,
                    });
                }
            }
        }

        AutoFixOutcome {
            pull_requests,
            skipped,
            safety: self.validator.stats(),
        }
    }

    async fn fix_one(
        &mut self,
        issue: &RankedIssue,
        proposal: &FixProposal,
        base_branch: &str,
    ) -> std::result::Result<PullRequestInfo, String> {
        let today = (self.today)();
        if self.quota.remaining(today) == 0 {
            return Err(format!(
                "Daily PR limit reached ({} per day)",
                self.settings.max_prs_per_day
            ));
        }
        if !self.settings.allows(&proposal.issue_type) {
            return Err(format!("Fix type '{}' is not enabled for auto-fix", proposal.issue_type));
        }

        let path = issue.issue().location.file_path.as_str();
        if !path.ends_with(".py") {
            return Err(format!("Only Python files can be patched ({path})"));
        }

        let file = match self.host.get_file(path, base_branch).await {
            Ok(Some(file)) => file,
            Ok(None) => return Err("File not found or too large to patch".to_string()),
            Err(err) => {
                tracing::warn!(path, error = %err, "failed to fetch file");
                return Err(format!("Failed to fetch file: {}", truncate(&err.to_string(), 120)));
            }
        };

        let patched = apply_fix(&file.content, proposal, issue.issue());
        if patched == file.content {
            return Err("Fix could not be applied to the file".to_string());
        }

        let verdict = self.validator.validate(&file.content, &patched);
        if !verdict.passed() {
            return Err(verdict.reason);
        }
        let structure = validate_structure(&file.content, &patched);
        if !structure.passed() {
            tracing::warn!(path, reason = %structure.reason, "patch changes module structure");
        }

        let branch = branch_name(&proposal.issue_type, &issue.issue().location, Utc::now().timestamp());
        let title = pr_title(proposal);
        let commit = commit_message(proposal, path);
        let body = pr_body(proposal, issue);
        let draft = self.settings.draft_prs_only;

        if self.settings.dry_run {
            tracing::info!(branch = %branch, path, "dry run: pull request planned");
            return Ok(PullRequestInfo {
                number: 0,
                title,
                html_url: String::new(),
                state: "planned".to_string(),
                branch,
                draft,
                file_path: path.to_string(),
                dry_run: true,
            });
        }

        let request = PrRequest {
            base_branch,
            branch: &branch,
            path,
            content: &patched,
            file_sha: Some(&file.sha),
            commit_message: &commit,
            title: &title,
            body: &body,
            draft,
        };
        match self.host.create_fix_pr(&request).await {
            Ok(pr) => {
                self.quota.record(today);
                Ok(pr)
            }
            Err(err) => {
                tracing::warn!(path, error = %err, "failed to create pull request");
                Err(format!("PR creation failed: {}", truncate(&err.to_string(), 120)))
            }
        }
    }
}

//! Analysis pipeline
//!
//! [`Guardian`] runs the stages in order: rank, propose fixes for the top
//! slice, build the report, record history. Each stage finishes before the
//! next starts. AI problems degrade to rule-based results inside the engines,
//! so `analyze` itself cannot fail.

use crate::autofix::{AutoFixer, RepoHost};
use crate::cache::{CacheStats, CacheStore, HistoryEntry, HistoryRecord};
use crate::errors::StoreError;
use crate::fix::{FixEngine, FixProposal};
use crate::github::RepoMetadata;
use crate::interest::{CommitHistory, InterestCalculator};
use crate::issue::{deduplicate, issues_from_raw, DetectionStats, Issue, RawIssue};
use crate::llm::{Conversation, LlmCapability};
use crate::rank::{RankedIssue, RankingEngine};
use crate::report::{AnalysisReport, ReportContext};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Instant;

#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionFile {
    Issues(Vec<RawIssue>),
    Full {
        #[serde(default)]
        repo_metadata: Option<RepoMetadata>,
        #[serde(default)]
        files_scanned: Option<usize>,
        issues: Vec<RawIssue>,
    },
}

/// Parsed detector output: a bare issue array, or an object with metadata.
#[derive(Debug, Clone, Default)]
pub struct DetectionInput {
    pub repo_metadata: Option<RepoMetadata>,
    pub files_scanned: usize,
    pub issues: Vec<Issue>,
}

impl DetectionInput {
    /// Invalid records are skipped and duplicates dropped. Without an explicit
    /// `files_scanned`, distinct issue files are counted.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let (repo_metadata, files_scanned, raws) = match serde_json::from_str(json)? {
            DetectionFile::Issues(raws) => (None, None, raws),
            DetectionFile::Full {
                repo_metadata,
                files_scanned,
                issues,
            } => (repo_metadata, files_scanned, issues),
        };
        let issues = deduplicate(issues_from_raw(raws));
        let files_scanned = files_scanned.unwrap_or_else(|| {
            issues
                .iter()
                .map(|i| i.location.file_path.as_str())
                .filter(|path| *path != "unknown")
                .collect::<BTreeSet<_>>()
                .len()
        });
        Ok(Self {
            repo_metadata,
            files_scanned,
            issues,
        })
    }
}

/// Detection output for one repository.
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub repo_url: String,
    pub branch: String,
    pub repo_metadata: RepoMetadata,
    pub files_scanned: usize,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub report: AnalysisReport,
    pub ranked: Vec<RankedIssue>,
    pub proposals: Vec<FixProposal>,
}

pub struct Guardian<L> {
    store: Box<dyn CacheStore>,
    llm: L,
    conversation: Conversation,
    fix_limit: usize,
}

impl<L: LlmCapability> Guardian<L> {
    pub fn new(store: Box<dyn CacheStore>, llm: L, fix_limit: usize) -> Self {
        Self {
            store,
            llm,
            conversation: Conversation::default(),
            fix_limit,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[tracing::instrument(level = "info", skip_all, fields(repo = %input.repo_url))]
    pub async fn analyze(&mut self, input: AnalysisInput) -> AnalysisOutcome {
        let started = Instant::now();
        let stats = DetectionStats::from_issues(&input.issues);
        tracing::info!(
            repo = %input.repo_url,
            issues = input.issues.len(),
            ai = self.llm.is_available(),
            "starting analysis"
        );

        let ranked = RankingEngine::new(&self.llm)
            .rank(&mut self.conversation, &input.issues, &input.repo_metadata)
            .await;

        let top = &ranked[..ranked.len().min(self.fix_limit)];
        let proposals = FixEngine::new(&self.llm)
            .propose_all(self.store.as_mut(), &mut self.conversation, top)
            .await;

        let context = ReportContext {
            repo_url: input.repo_url,
            branch: input.branch,
            repo_metadata: input.repo_metadata,
            files_scanned: input.files_scanned,
            stats,
        };
        let report = AnalysisReport::generate(context, &ranked, &proposals, started.elapsed());
        self.record_history(&report);

        AnalysisOutcome {
            report,
            ranked,
            proposals,
        }
    }

    /// Open fix PRs for the outcome's proposals and attach the results to its report.
    #[tracing::instrument(level = "info", skip_all, fields(max_prs = max_prs))]
    pub async fn auto_fix<H: RepoHost>(
        &mut self,
        fixer: &mut AutoFixer<'_, H>,
        outcome: &mut AnalysisOutcome,
        max_prs: usize,
    ) {
        let branch = outcome.report.branch.clone();
        let result = fixer
            .run(&outcome.ranked, &outcome.proposals, &branch, max_prs)
            .await;
        tracing::info!(
            created = result.pull_requests.len(),
            skipped = result.skipped.len(),
            pass_rate = result.safety.pass_rate,
            "auto-fix finished"
        );
        outcome
            .report
            .attach_auto_fix(result.pull_requests, result.skipped);
    }

    /// Price the debt interest of the outcome's top issues and attach the totals.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn price_interest<H: CommitHistory>(
        &self,
        calculator: &InterestCalculator<'_, H>,
        outcome: &mut AnalysisOutcome,
    ) {
        let totals = calculator
            .repo_total(&outcome.ranked, &outcome.report.branch)
            .await;
        outcome.report.attach_interest(totals);
    }

    fn record_history(&mut self, report: &AnalysisReport) {
        let Some(history) = self.store.history() else {
            return;
        };
        let summary = match serde_json::to_value(&report.summary) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize summary for history");
                return;
            }
        };
        let record = HistoryRecord {
            repo_url: report.repo_url.clone(),
            branch: report.branch.clone(),
            total_issues: report.summary.total_issues,
            critical: report.summary.critical,
            high: report.summary.high,
            summary,
        };
        match history.record(&record) {
            Ok(id) => tracing::debug!(id, "recorded analysis history"),
            Err(err) => tracing::warn!(error = %err, "failed to record analysis history"),
        }
    }

    /// Past analyses of `repo_url`, newest first. Empty for stores without history.
    pub fn history(&mut self, repo_url: &str, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        match self.store.history() {
            Some(history) => history.recent(repo_url, limit),
            None => Ok(Vec::new()),
        }
    }

    pub fn cache_stats(&self) -> Result<CacheStats, StoreError> {
        self.store.stats()
    }
}

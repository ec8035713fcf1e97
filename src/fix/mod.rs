//! Fix proposal engine
//!
//! For each issue: cached proposal, else built-in template, else AI
//! generation, else a generic manual-review fallback. Whatever is produced is
//! cached for a day under `fix_{type}_{location}`.

pub mod templates;

pub use templates::{FixTemplate, TemplateRecord};

use crate::cache::CacheStore;
use crate::errors::LlmError;
use crate::issue::{IssueType, Location, Severity};
use crate::llm::parse::parse_json_object;
use crate::llm::prompts::{FIX_SYSTEM, FIX_TEMPERATURE};
use crate::llm::{Conversation, LlmCapability, LlmRequest};
use crate::rank::RankedIssue;
use crate::score::Priority;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const FIX_CACHE_TTL_HOURS: i64 = 24;
const FALLBACK_REFERENCE: &str = "https://peps.python.org/pep-0008/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalSource {
    Template,
    Ai,
    Fallback,
}

impl ProposalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalSource::Template => "template",
            ProposalSource::Ai => "ai",
            ProposalSource::Fallback => "fallback",
        }
    }
}

/// The issue a proposal was made for, as it looked at the time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub location: Location,
    pub score: u8,
    pub priority: Priority,
}

impl IssueSnapshot {
    fn of(ranked: &RankedIssue) -> Self {
        Self {
            issue_type: ranked.issue().issue_type.clone(),
            severity: ranked.issue().severity,
            location: ranked.issue().location.clone(),
            score: ranked.score(),
            priority: ranked.priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixProposal {
    /// `rank_id` of the issue this proposal fixes
    pub issue_id: usize,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub problem_summary: String,
    pub fix_summary: String,
    #[serde(default)]
    pub before_code: String,
    #[serde(default)]
    pub after_code: String,
    pub steps: Vec<String>,
    pub testing_tip: String,
    pub estimated_time: String,
    pub references: Vec<String>,
    pub source: ProposalSource,
    pub original_issue: IssueSnapshot,
}

pub fn cache_key(issue_type: &IssueType, location: &Location) -> String {
    format!("fix_{}_{}", issue_type, location)
}

fn non_blank(items: impl IntoIterator<Item = String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn from_template(ranked: &RankedIssue, template: FixTemplate) -> FixProposal {
    let record = template.record();
    FixProposal {
        issue_id: ranked.rank_id(),
        issue_type: template.issue_type(),
        severity: record.severity,
        problem_summary: record.problem_summary.to_string(),
        fix_summary: record.fix_summary.to_string(),
        before_code: record.before_code.to_string(),
        after_code: record.after_code.to_string(),
        steps: non_blank(record.steps.iter().map(|s| s.to_string())),
        testing_tip: record.testing_tip.to_string(),
        estimated_time: record.estimated_time.to_string(),
        references: record.references.iter().map(|s| s.to_string()).collect(),
        source: ProposalSource::Template,
        original_issue: IssueSnapshot::of(ranked),
    }
}

/// Manual-review proposal used whenever nothing better is available.
pub fn fallback_proposal(ranked: &RankedIssue) -> FixProposal {
    let issue = ranked.issue();
    FixProposal {
        issue_id: ranked.rank_id(),
        issue_type: issue.issue_type.clone(),
        severity: issue.severity,
        problem_summary: issue.description.clone(),
        fix_summary: "Manual review and refactoring required".to_string(),
        before_code: "# See issue location for problematic code".to_string(),
        after_code: "# Refactor following the steps below".to_string(),
        steps: vec![
            format!("Navigate to {}", issue.location),
            "Review the code in context".to_string(),
            "Apply the fix based on the issue type".to_string(),
            "Run tests to verify the fix".to_string(),
        ],
        testing_tip: "Run your test suite and verify no regressions".to_string(),
        estimated_time: issue.effort_to_fix.as_str().to_string(),
        references: vec![FALLBACK_REFERENCE.to_string()],
        source: ProposalSource::Fallback,
        original_issue: IssueSnapshot::of(ranked),
    }
}

pub(crate) fn build_fix_prompt(ranked: &RankedIssue) -> String {
    let issue = ranked.issue();
    let justification = if ranked.scored.business_justification.is_empty() {
        "N/A"
    } else {
        ranked.scored.business_justification.as_str()
    };
    let impact = if issue.impact.is_empty() {
        "N/A"
    } else {
        issue.impact.as_str()
    };
    format!(
        "Generate a fix for this technical debt issue:\n\n\
         Type: {}\n\
         Severity: {}\n\
         Description: {}\n\
         Location: {}\n\
         Impact: {}\n\
         Effort to Fix: {}\n\
         Business Justification: {}\n\n\
         Provide a complete, production-ready fix.",
        issue.issue_type,
        issue.severity,
        issue.description,
        issue.location,
        impact,
        issue.effort_to_fix,
        justification,
    )
}

fn text_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Code keeps its indentation; whitespace-only counts as empty.
fn code_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key).and_then(Value::as_str) {
        Some(code) if !code.trim().is_empty() => code.trim_end().to_string(),
        _ => String::new(),
    }
}

/// Accepts a list of strings or a single string.
fn list_field(map: &Map<String, Value>, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => non_blank(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string)),
        ),
        Some(Value::String(s)) => non_blank(std::iter::once(s.clone())),
        _ => Vec::new(),
    }
}

/// Turn a model response into a proposal. Requires a non-empty `fix_summary`.
fn parse_ai_proposal(response: &str, ranked: &RankedIssue) -> Result<FixProposal, LlmError> {
    let map = parse_json_object(response)?;
    let issue = ranked.issue();

    let fix_summary = text_field(&map, "fix_summary");
    if fix_summary.is_empty() {
        return Err(LlmError::InvalidResponse("fix proposal has no fix_summary".to_string()));
    }

    let problem_summary = Some(text_field(&map, "problem_summary"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| issue.description.clone());
    let severity = map
        .get("severity")
        .and_then(Value::as_str)
        .and_then(Severity::parse)
        .unwrap_or(issue.severity);
    let estimated_time = Some(text_field(&map, "estimated_time"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| issue.effort_to_fix.as_str().to_string());

    Ok(FixProposal {
        issue_id: ranked.rank_id(),
        issue_type: issue.issue_type.clone(),
        severity,
        problem_summary,
        fix_summary,
        before_code: code_field(&map, "before_code"),
        after_code: code_field(&map, "after_code"),
        steps: list_field(&map, "steps"),
        testing_tip: text_field(&map, "testing_tip"),
        estimated_time,
        references: list_field(&map, "references"),
        source: ProposalSource::Ai,
        original_issue: IssueSnapshot::of(ranked),
    })
}

pub struct FixEngine<'a, L> {
    llm: &'a L,
}

impl<'a, L: LlmCapability> FixEngine<'a, L> {
    pub fn new(llm: &'a L) -> Self {
        Self { llm }
    }

    /// Produce a proposal for one issue. Never fails; cache errors are logged.
    pub async fn propose(
        &self,
        store: &mut dyn CacheStore,
        conversation: &mut Conversation,
        ranked: &RankedIssue,
    ) -> FixProposal {
        let issue = ranked.issue();
        let key = cache_key(&issue.issue_type, &issue.location);

        match store.get(&key) {
            Ok(Some(value)) => match serde_json::from_value::<FixProposal>(value) {
                Ok(mut cached) => {
                    tracing::debug!(key = %key, "fix proposal cache hit");
                    // rank ids are per run; the cache key is the stable identity
                    cached.issue_id = ranked.rank_id();
                    cached.original_issue = IssueSnapshot::of(ranked);
                    return cached;
                }
                Err(err) => tracing::warn!(key = %key, error = %err, "discarding unreadable cached proposal"),
            },
            Ok(None) => {}
            Err(err) => tracing::warn!(key = %key, error = %err, "cache lookup failed"),
        }

        let proposal = match FixTemplate::for_issue_type(&issue.issue_type) {
            Some(template) => from_template(ranked, template),
            None => self.generate(conversation, ranked).await,
        };

        match serde_json::to_value(&proposal) {
            Ok(value) => {
                if let Err(err) = store.set(&key, value, Some(Duration::hours(FIX_CACHE_TTL_HOURS))) {
                    tracing::warn!(key = %key, error = %err, "failed to cache fix proposal");
                }
            }
            Err(err) => tracing::warn!(key = %key, error = %err, "failed to serialize fix proposal"),
        }

        proposal
    }

    /// Propose fixes for each issue in order.
    pub async fn propose_all(
        &self,
        store: &mut dyn CacheStore,
        conversation: &mut Conversation,
        ranked: &[RankedIssue],
    ) -> Vec<FixProposal> {
        let mut proposals = Vec::with_capacity(ranked.len());
        for issue in ranked {
            proposals.push(self.propose(store, conversation, issue).await);
        }
        tracing::info!(proposals = proposals.len(), "generated fix proposals");
        proposals
    }

    async fn generate(&self, conversation: &mut Conversation, ranked: &RankedIssue) -> FixProposal {
        if !self.llm.is_available() {
            return fallback_proposal(ranked);
        }

        let prompt = build_fix_prompt(ranked);
        let request = LlmRequest {
            system: FIX_SYSTEM,
            history: conversation.turns(),
            user: prompt.clone(),
            temperature: FIX_TEMPERATURE,
            json_object: true,
        };

        let result = match self.llm.complete(&request).await {
            Ok(response) => parse_ai_proposal(&response, ranked).map(|p| (p, response)),
            Err(err) => Err(err),
        };

        match result {
            Ok((proposal, response)) => {
                conversation.record(prompt, response);
                proposal
            }
            Err(err) => {
                tracing::warn!(
                    issue_type = %ranked.issue().issue_type,
                    error = %err,
                    "AI fix generation failed, using fallback"
                );
                fallback_proposal(ranked)
            }
        }
    }
}

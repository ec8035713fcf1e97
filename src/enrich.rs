//! AI business-impact enrichment
//!
//! Sends the highest-scored issues to the LLM capability and reads back one
//! [`Enrichment`] record per issue. Any failure (no capability, provider
//! error, unparseable or non-array output) yields an empty list: ranking
//! carries on with rule-based scores alone. One attempt per batch.

use crate::github::RepoMetadata;
use crate::llm::parse::parse_json_array;
use crate::llm::prompts::{RANKING_SYSTEM, RANKING_TEMPERATURE};
use crate::llm::{Conversation, LlmCapability, LlmRequest};
use crate::score::ScoredIssue;
use crate::util::truncate_str;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How many top-scored issues are sent for enrichment.
pub const ENRICH_TOP_N: usize = 20;
const DESCRIPTION_LIMIT: usize = 200;
const DEFAULT_IMPACT: u8 = 50;
const DEFAULT_SPRINT: u8 = 2;

/// Model verdict for one issue, keyed by `rank_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub id: usize,
    pub business_impact_score: u8,
    pub blocks_other_work: bool,
    pub quick_win: bool,
    pub business_justification: String,
    pub recommended_sprint: u8,
}

impl Enrichment {
    /// Read one array element. Items without a usable integer `id` are dropped;
    /// other fields fall back to defaults and are clamped into range.
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = match obj.get("id")? {
            Value::Number(n) => n.as_u64()?,
            Value::String(s) => s.trim().parse::<u64>().ok()?,
            _ => return None,
        };

        let business_impact_score = obj
            .get("business_impact_score")
            .and_then(Value::as_f64)
            .map(|score| score.clamp(0.0, 100.0).round_ties_even() as u8)
            .unwrap_or(DEFAULT_IMPACT);
        let recommended_sprint = obj
            .get("recommended_sprint")
            .and_then(Value::as_f64)
            .map(|sprint| sprint.round().clamp(1.0, 3.0) as u8)
            .unwrap_or(DEFAULT_SPRINT);

        Some(Self {
            id: usize::try_from(id).ok()?,
            business_impact_score,
            blocks_other_work: obj
                .get("blocks_other_work")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            quick_win: obj.get("quick_win").and_then(Value::as_bool).unwrap_or(false),
            business_justification: obj
                .get("business_justification")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            recommended_sprint,
        })
    }
}

#[derive(Serialize)]
struct CompactIssue<'a> {
    id: usize,
    #[serde(rename = "type")]
    issue_type: &'a str,
    severity: &'a str,
    description: String,
    location: String,
    effort_to_fix: &'a str,
}

pub(crate) fn build_enrichment_prompt(issues: &[ScoredIssue], repo: &RepoMetadata) -> String {
    let compact: Vec<CompactIssue<'_>> = issues
        .iter()
        .map(|scored| CompactIssue {
            id: scored.rank_id,
            issue_type: scored.issue.issue_type.as_str(),
            severity: scored.issue.severity.as_str(),
            description: truncate_str(&scored.issue.description, DESCRIPTION_LIMIT).to_string(),
            location: scored.issue.location.to_string(),
            effort_to_fix: scored.issue.effort_to_fix.as_str(),
        })
        .collect();
    let items = serde_json::to_string_pretty(&compact).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Repository context:\n\
         - Name: {}\n\
         - Stars: {}\n\
         - Open Issues: {}\n\
         - Language: {}\n\n\
         Technical debt items to prioritize:\n{}\n\n\
         Assess the business impact and sprint placement of each item.",
        repo.display_name(),
        repo.stars,
        repo.open_issues,
        repo.language.as_deref().unwrap_or("Python"),
        items
    )
}

/// Ask the capability to enrich `issues`. Never fails.
pub async fn enrich<L: LlmCapability>(
    llm: &L,
    conversation: &mut Conversation,
    issues: &[ScoredIssue],
    repo: &RepoMetadata,
) -> Vec<Enrichment> {
    if issues.is_empty() {
        return Vec::new();
    }
    if !llm.is_available() {
        tracing::debug!("AI unavailable, skipping enrichment");
        return Vec::new();
    }

    let prompt = build_enrichment_prompt(issues, repo);
    let request = LlmRequest {
        system: RANKING_SYSTEM,
        history: conversation.turns(),
        user: prompt.clone(),
        temperature: RANKING_TEMPERATURE,
        json_object: false,
    };

    let response = match llm.complete(&request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "AI enrichment failed");
            return Vec::new();
        }
    };

    let items = match parse_json_array(&response) {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!(error = %err, "AI enrichment returned unusable output");
            return Vec::new();
        }
    };

    conversation.record(prompt, response);

    let records: Vec<Enrichment> = items.iter().filter_map(Enrichment::from_value).collect();
    tracing::debug!(requested = issues.len(), received = records.len(), "enrichment parsed");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LlmError;
    use crate::issue::{Effort, Issue, IssueType, Location, Severity};
    use crate::llm::testing::ScriptedLlm;
    use crate::llm::Unavailable;
    use crate::score::score_issue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scored(description: &str) -> Vec<ScoredIssue> {
        let issue = Issue::new(
            IssueType::BareExcept,
            Severity::Medium,
            description,
            Location::new("app.py", Some(3)),
            Effort::Minutes,
        );
        vec![score_issue(&issue, 0)]
    }

    #[test]
    fn test_from_value_applies_defaults_and_clamps() {
        let record = Enrichment::from_value(&json!({"id": 4, "business_impact_score": 140})).unwrap();
        assert_eq!(
            record,
            Enrichment {
                id: 4,
                business_impact_score: 100,
                blocks_other_work: false,
                quick_win: false,
                business_justification: String::new(),
                recommended_sprint: 2,
            }
        );

        let record = Enrichment::from_value(&json!({"id": "7", "recommended_sprint": 9})).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.business_impact_score, 50);
        assert_eq!(record.recommended_sprint, 3);
    }

    #[test]
    fn test_from_value_requires_id() {
        assert!(Enrichment::from_value(&json!({"business_impact_score": 10})).is_none());
        assert!(Enrichment::from_value(&json!({"id": -1})).is_none());
        assert!(Enrichment::from_value(&json!("nope")).is_none());
    }

    #[test]
    fn test_prompt_truncates_description_and_includes_repo() {
        let issues = scored(&"x".repeat(500));
        let repo = RepoMetadata {
            name: "widgets".to_string(),
            stars: 42,
            ..Default::default()
        };
        let prompt = build_enrichment_prompt(&issues, &repo);
        assert!(prompt.contains("- Name: widgets"));
        assert!(prompt.contains("- Stars: 42"));
        assert!(prompt.contains("- Language: Python"));
        assert!(prompt.contains(&"x".repeat(200)));
        assert!(!prompt.contains(&"x".repeat(201)));
        assert!(prompt.contains("\"location\": \"app.py:3\""));
    }

    #[tokio::test]
    async fn test_enrich_parses_fenced_array_and_records_turn() {
        let llm = ScriptedLlm::new().respond(
            "```json\n[{\"id\": 0, \"business_impact_score\": 90, \"quick_win\": true, \"recommended_sprint\": 1}]\n```",
        );
        let mut convo = Conversation::default();
        let records = enrich(&llm, &mut convo, &scored("bad"), &RepoMetadata::default()).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].business_impact_score, 90);
        assert!(records[0].quick_win);
        assert_eq!(convo.len(), 2);
    }

    #[tokio::test]
    async fn test_enrich_degrades_to_empty() {
        let mut convo = Conversation::default();
        let issues = scored("bad");
        let repo = RepoMetadata::default();

        let failing = ScriptedLlm::new().fail(LlmError::Network("down".to_string()));
        assert!(enrich(&failing, &mut convo, &issues, &repo).await.is_empty());
        assert_eq!(failing.calls(), 1);

        let object = ScriptedLlm::new().respond("{\"id\": 0}");
        assert!(enrich(&object, &mut convo, &issues, &repo).await.is_empty());

        let garbage = ScriptedLlm::new().respond("I cannot help with that");
        assert!(enrich(&garbage, &mut convo, &issues, &repo).await.is_empty());

        assert!(enrich(&Unavailable, &mut convo, &issues, &repo).await.is_empty());
        assert!(convo.is_empty());
    }

    #[tokio::test]
    async fn test_enrich_skips_call_for_empty_input() {
        let llm = ScriptedLlm::new();
        let mut convo = Conversation::default();
        assert!(enrich(&llm, &mut convo, &[], &RepoMetadata::default()).await.is_empty());
        assert_eq!(llm.calls(), 0);
    }
}

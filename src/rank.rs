//! Ranking engine
//!
//! Scores every issue, asks for AI enrichment on the top slice, blends the
//! two, then sorts and labels. Sorting is stable: equal scores keep input order.

use crate::enrich::{enrich, Enrichment, ENRICH_TOP_N};
use crate::github::RepoMetadata;
use crate::issue::Issue;
use crate::llm::{Conversation, LlmCapability};
use crate::score::{score_issue, to_score, Priority, ScoredIssue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const RULE_WEIGHT: f64 = 0.6;
const AI_WEIGHT: f64 = 0.4;

/// A scored issue with its final priority and 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedIssue {
    #[serde(flatten)]
    pub scored: ScoredIssue,
    pub priority: Priority,
    pub rank: usize,
}

impl RankedIssue {
    pub fn issue(&self) -> &Issue {
        &self.scored.issue
    }

    pub fn rank_id(&self) -> usize {
        self.scored.rank_id
    }

    pub fn score(&self) -> u8 {
        self.scored.score
    }

    pub fn quick_win(&self) -> bool {
        self.scored.quick_win
    }

    /// CRITICAL/HIGH priority or a quick win.
    pub fn is_actionable(&self) -> bool {
        matches!(self.priority, Priority::Critical | Priority::High) || self.quick_win()
    }
}

pub struct RankingEngine<'a, L> {
    llm: &'a L,
    top_n: usize,
}

impl<'a, L: LlmCapability> RankingEngine<'a, L> {
    pub fn new(llm: &'a L) -> Self {
        Self {
            llm,
            top_n: ENRICH_TOP_N,
        }
    }

    /// Rank `issues`. An empty input returns immediately without enrichment.
    pub async fn rank(
        &self,
        conversation: &mut Conversation,
        issues: &[Issue],
        repo: &RepoMetadata,
    ) -> Vec<RankedIssue> {
        if issues.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<ScoredIssue> = issues
            .iter()
            .enumerate()
            .map(|(idx, issue)| score_issue(issue, idx))
            .collect();

        let mut top = scored.clone();
        top.sort_by(|a, b| b.score.cmp(&a.score));
        top.truncate(self.top_n);

        let enrichments = enrich(self.llm, conversation, &top, repo).await;
        let merged = merge_enrichment(&mut scored, enrichments);

        let ranked = finalize(scored);
        tracing::info!(
            ranked = ranked.len(),
            enriched = merged,
            "ranked issues"
        );
        ranked
    }
}

/// Blend enrichment into matching issues. Returns how many were updated.
fn merge_enrichment(scored: &mut [ScoredIssue], enrichments: Vec<Enrichment>) -> usize {
    if enrichments.is_empty() {
        return 0;
    }
    let by_id: HashMap<usize, Enrichment> = enrichments.into_iter().map(|e| (e.id, e)).collect();

    let mut merged = 0;
    for issue in scored.iter_mut() {
        let Some(record) = by_id.get(&issue.rank_id) else {
            continue;
        };
        issue.score = to_score(
            issue.score as f64 * RULE_WEIGHT + record.business_impact_score as f64 * AI_WEIGHT,
        );
        issue.quick_win = record.quick_win;
        issue.blocks_other_work = record.blocks_other_work;
        issue.business_justification = record.business_justification.clone();
        issue.recommended_sprint = record.recommended_sprint;
        merged += 1;
    }
    merged
}

/// Stable sort by score (desc), then assign priority and rank.
fn finalize(mut scored: Vec<ScoredIssue>) -> Vec<RankedIssue> {
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
        .into_iter()
        .enumerate()
        .map(|(idx, scored)| RankedIssue {
            priority: Priority::from_score(scored.score),
            rank: idx + 1,
            scored,
        })
        .collect()
}

pub fn quick_wins(ranked: &[RankedIssue]) -> Vec<&RankedIssue> {
    ranked.iter().filter(|r| r.quick_win()).collect()
}

/// Issues grouped by recommended sprint, in rank order.
#[derive(Debug, Default)]
pub struct SprintPlan<'a> {
    pub sprint_1: Vec<&'a RankedIssue>,
    pub sprint_2: Vec<&'a RankedIssue>,
    pub sprint_3: Vec<&'a RankedIssue>,
}

pub fn sprint_plan(ranked: &[RankedIssue]) -> SprintPlan<'_> {
    let mut plan = SprintPlan::default();
    for issue in ranked {
        match issue.scored.recommended_sprint {
            1 => plan.sprint_1.push(issue),
            2 => plan.sprint_2.push(issue),
            _ => plan.sprint_3.push(issue),
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LlmError;
    use crate::issue::{Effort, IssueType, Location, Severity};
    use crate::llm::testing::ScriptedLlm;
    use crate::llm::Unavailable;
    use pretty_assertions::assert_eq;

    fn issue(issue_type: IssueType, severity: Severity, effort: Effort, file: &str) -> Issue {
        Issue::new(
            issue_type,
            severity,
            "detected",
            Location::new(file, Some(1)),
            effort,
        )
    }

    fn sample() -> Vec<Issue> {
        vec![
            issue(IssueType::MissingDocstring, Severity::Low, Effort::Minutes, "a.py"),
            issue(IssueType::HardcodedPassword, Severity::Critical, Effort::Minutes, "b.py"),
            issue(IssueType::LongMethod, Severity::High, Effort::Hours, "c.py"),
        ]
    }

    #[tokio::test]
    async fn test_empty_input_skips_enrichment() {
        let llm = ScriptedLlm::new().respond("[]");
        let engine = RankingEngine::new(&llm);
        let ranked = engine
            .rank(&mut Conversation::default(), &[], &RepoMetadata::default())
            .await;
        assert!(ranked.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_rule_based_ranking_without_ai() {
        let engine = RankingEngine::new(&Unavailable);
        let ranked = engine
            .rank(&mut Conversation::default(), &sample(), &RepoMetadata::default())
            .await;

        assert_eq!(ranked.len(), 3);
        let summary: Vec<(IssueType, u8, Priority, usize)> = ranked
            .iter()
            .map(|r| (r.issue().issue_type.clone(), r.score(), r.priority, r.rank))
            .collect();
        assert_eq!(
            summary,
            vec![
                (IssueType::HardcodedPassword, 100, Priority::Critical, 1),
                (IssueType::LongMethod, 58, Priority::High, 2),
                (IssueType::MissingDocstring, 27, Priority::Low, 3),
            ]
        );
        assert_eq!(ranked[0].rank_id(), 1);
    }

    #[tokio::test]
    async fn test_enrichment_blends_and_overrides_labels() {
        // docstring: 27*0.6 + 95*0.4 = 54.2 -> 54
        let llm = ScriptedLlm::new().respond(
            r#"[{"id": 0, "business_impact_score": 95, "quick_win": true,
                 "blocks_other_work": true, "business_justification": "Onboarding pain",
                 "recommended_sprint": 1}]"#,
        );
        let engine = RankingEngine::new(&llm);
        let ranked = engine
            .rank(&mut Conversation::default(), &sample(), &RepoMetadata::default())
            .await;

        let doc = ranked.iter().find(|r| r.rank_id() == 0).unwrap();
        assert_eq!(doc.score(), 54);
        assert_eq!(doc.priority, Priority::Medium);
        assert!(doc.quick_win());
        assert!(doc.scored.blocks_other_work);
        assert_eq!(doc.scored.business_justification, "Onboarding pain");
        assert_eq!(doc.scored.recommended_sprint, 1);

        // Untouched issues keep rule-based values
        let long = ranked.iter().find(|r| r.rank_id() == 2).unwrap();
        assert_eq!(long.score(), 58);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_enrichment_failure_falls_back_to_rules() {
        let llm = ScriptedLlm::new().fail(LlmError::EmptyResponse);
        let ranked = RankingEngine::new(&llm)
            .rank(&mut Conversation::default(), &sample(), &RepoMetadata::default())
            .await;
        assert_eq!(ranked[0].score(), 100);
        assert_eq!(ranked.len(), 3);
    }

    #[tokio::test]
    async fn test_only_top_twenty_are_sent() {
        let issues: Vec<Issue> = (0..25)
            .map(|i| issue(IssueType::BareExcept, Severity::Medium, Effort::Hours, &format!("f{i}.py")))
            .collect();
        let llm = ScriptedLlm::new().respond("[]");
        let ranked = RankingEngine::new(&llm)
            .rank(&mut Conversation::default(), &issues, &RepoMetadata::default())
            .await;

        assert_eq!(ranked.len(), 25);
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("\"id\": 19"));
        assert!(!prompt.contains("\"id\": 20"));
        // equal scores keep input order
        let ids: Vec<usize> = ranked.iter().map(|r| r.rank_id()).collect();
        assert_eq!(ids, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_quick_wins_and_sprint_plan() {
        let scored: Vec<ScoredIssue> = sample()
            .iter()
            .enumerate()
            .map(|(i, issue)| score_issue(issue, i))
            .collect();
        let ranked = finalize(scored);

        let wins = quick_wins(&ranked);
        assert_eq!(wins.len(), 1);
        assert_eq!(wins[0].issue().issue_type, IssueType::HardcodedPassword);

        let plan = sprint_plan(&ranked);
        assert_eq!(plan.sprint_1.len(), 1);
        assert_eq!(plan.sprint_2.len(), 1);
        assert_eq!(plan.sprint_3.len(), 1);
    }
}

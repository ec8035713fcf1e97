//! Typed technical-debt issues
//!
//! Detector output arrives as loosely shaped JSON ([`RawIssue`]). Intake turns
//! it into [`Issue`] values, skipping malformed records instead of failing
//! the batch.

use crate::errors::IssueError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

const DEFAULT_CONFIDENCE: f64 = 0.85;
const DEFAULT_DESCRIPTION: &str = "Technical debt detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Unknown => "UNKNOWN",
        }
    }

    /// Case-insensitive parse. Returns `None` for anything outside the vocabulary.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Severity::Critical),
            "HIGH" => Some(Severity::High),
            "MEDIUM" => Some(Severity::Medium),
            "LOW" => Some(Severity::Low),
            "UNKNOWN" => Some(Severity::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated effort to resolve an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effort {
    Minutes,
    Hours,
    Days,
}

impl Effort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effort::Minutes => "MINUTES",
            Effort::Hours => "HOURS",
            Effort::Days => "DAYS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MINUTES" => Some(Effort::Minutes),
            "HOURS" => Some(Effort::Hours),
            "DAYS" => Some(Effort::Days),
            _ => None,
        }
    }
}

impl fmt::Display for Effort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of debt reported by a detector.
///
/// Unknown kinds are carried through as `Other` so nothing is lost at intake.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IssueType {
    HardcodedPassword,
    HardcodedApiKey,
    HardcodedToken,
    SyntaxError,
    NoTests,
    GodClass,
    GodFile,
    LongMethod,
    BareExcept,
    MissingRequirements,
    UnpinnedDependencies,
    NoCicd,
    MissingReadme,
    MissingDocstring,
    TooManyParameters,
    Other(String),
}

impl IssueType {
    pub fn as_str(&self) -> &str {
        match self {
            IssueType::HardcodedPassword => "hardcoded_password",
            IssueType::HardcodedApiKey => "hardcoded_api_key",
            IssueType::HardcodedToken => "hardcoded_token",
            IssueType::SyntaxError => "syntax_error",
            IssueType::NoTests => "no_tests",
            IssueType::GodClass => "god_class",
            IssueType::GodFile => "god_file",
            IssueType::LongMethod => "long_method",
            IssueType::BareExcept => "bare_except",
            IssueType::MissingRequirements => "missing_requirements",
            IssueType::UnpinnedDependencies => "unpinned_dependencies",
            IssueType::NoCicd => "no_cicd",
            IssueType::MissingReadme => "missing_readme",
            IssueType::MissingDocstring => "missing_docstring",
            IssueType::TooManyParameters => "too_many_parameters",
            IssueType::Other(name) => name,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "hardcoded_password" => IssueType::HardcodedPassword,
            "hardcoded_api_key" => IssueType::HardcodedApiKey,
            "hardcoded_token" => IssueType::HardcodedToken,
            "syntax_error" => IssueType::SyntaxError,
            "no_tests" => IssueType::NoTests,
            "god_class" => IssueType::GodClass,
            "god_file" => IssueType::GodFile,
            "long_method" => IssueType::LongMethod,
            "bare_except" => IssueType::BareExcept,
            "missing_requirements" => IssueType::MissingRequirements,
            "unpinned_dependencies" => IssueType::UnpinnedDependencies,
            "no_cicd" => IssueType::NoCicd,
            "missing_readme" => IssueType::MissingReadme,
            "missing_docstring" => IssueType::MissingDocstring,
            "too_many_parameters" => IssueType::TooManyParameters,
            other => IssueType::Other(other.to_string()),
        }
    }

    /// Hardcoded secrets of any flavour.
    pub fn is_credential(&self) -> bool {
        matches!(
            self,
            IssueType::HardcodedPassword | IssueType::HardcodedApiKey | IssueType::HardcodedToken
        )
    }

    pub fn category(&self) -> Category {
        match self {
            IssueType::HardcodedPassword | IssueType::HardcodedApiKey | IssueType::HardcodedToken => {
                Category::Security
            }
            IssueType::NoTests => Category::Testing,
            IssueType::MissingReadme | IssueType::MissingDocstring => Category::Documentation,
            IssueType::MissingRequirements | IssueType::UnpinnedDependencies => {
                Category::Dependencies
            }
            IssueType::GodClass | IssueType::LongMethod | IssueType::TooManyParameters => {
                Category::Complexity
            }
            _ => Category::Maintainability,
        }
    }

    /// Human title, e.g. `long_method` -> `Long Method`.
    pub fn title(&self) -> String {
        self.as_str()
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for IssueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IssueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(IssueType::parse(&raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Security,
    Performance,
    Maintainability,
    Complexity,
    Documentation,
    Testing,
    Dependencies,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Maintainability => "maintainability",
            Category::Complexity => "complexity",
            Category::Documentation => "documentation",
            Category::Testing => "testing",
            Category::Dependencies => "dependencies",
        }
    }
}

/// Which detector produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DetectionSource {
    #[default]
    #[serde(rename = "static_analysis")]
    StaticAnalysis,
    #[serde(rename = "ai")]
    Ai,
    #[serde(rename = "dependency_analysis")]
    DependencyCheck,
    #[serde(rename = "documentation_analysis")]
    Documentation,
}

impl DetectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::StaticAnalysis => "static_analysis",
            DetectionSource::Ai => "ai",
            DetectionSource::DependencyCheck => "dependency_analysis",
            DetectionSource::Documentation => "documentation_analysis",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "static_analysis" => Some(DetectionSource::StaticAnalysis),
            "ai" | "gemini_ai" | "llm" => Some(DetectionSource::Ai),
            "dependency_analysis" => Some(DetectionSource::DependencyCheck),
            "documentation_analysis" => Some(DetectionSource::Documentation),
            _ => None,
        }
    }
}

/// File path plus optional 1-based line. Serialized as `path:line`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Location {
    pub file_path: String,
    pub line: Option<u32>,
}

impl Location {
    pub fn new(file_path: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            file_path: file_path.into(),
            line,
        }
    }

    /// Parse `path:line`. A missing, non-numeric or zero line keeps the whole
    /// string as the path.
    pub fn parse(value: &str) -> Self {
        if let Some((path, line)) = value.rsplit_once(':') {
            if let Ok(line) = line.trim().parse::<u32>() {
                if line >= 1 {
                    return Self::new(path, Some(line));
                }
            }
        }
        Self::new(value, None)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file_path, line),
            None => f.write_str(&self.file_path),
        }
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.to_string()
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        Location::parse(&value)
    }
}

/// A validated technical-debt finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub location: Location,
    #[serde(default)]
    pub impact: String,
    pub effort_to_fix: Effort,
    pub category: Category,
    #[serde(default)]
    pub source: DetectionSource,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
}

impl Issue {
    pub fn new(
        issue_type: IssueType,
        severity: Severity,
        description: impl Into<String>,
        location: Location,
        effort_to_fix: Effort,
    ) -> Self {
        let title = issue_type.title();
        let category = issue_type.category();
        Self {
            issue_type,
            severity,
            title,
            description: description.into(),
            location,
            impact: String::new(),
            effort_to_fix,
            category,
            source: DetectionSource::default(),
            confidence: DEFAULT_CONFIDENCE,
            code_snippet: None,
        }
    }

    pub fn with_impact(mut self, impact: impl Into<String>) -> Self {
        self.impact = impact.into();
        self
    }

    pub fn with_source(mut self, source: DetectionSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.code_snippet = Some(snippet.into());
        self
    }

    /// Identity used for deduplication and fix caching.
    pub fn dedupe_key(&self) -> (String, String) {
        (self.issue_type.as_str().to_string(), self.location.to_string())
    }
}

/// Detector record as it appears on the wire. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawIssue {
    #[serde(default, rename = "type", alias = "issue_type")]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub effort_to_fix: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub code_snippet: Option<String>,
}

impl TryFrom<RawIssue> for Issue {
    type Error = IssueError;

    fn try_from(raw: RawIssue) -> Result<Self, Self::Error> {
        let issue_type = match raw.issue_type.as_deref() {
            None => IssueType::Other("unknown".to_string()),
            Some(value) if value.trim().is_empty() => return Err(IssueError::MissingType),
            Some(value) => IssueType::parse(value),
        };

        let description = raw
            .description
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string())
            .trim()
            .to_string();
        if description.is_empty() {
            return Err(IssueError::EmptyDescription);
        }

        let location = raw.location.unwrap_or_else(|| "unknown".to_string());
        if location.trim().is_empty() {
            return Err(IssueError::EmptyLocation);
        }

        let confidence = raw.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(IssueError::ConfidenceOutOfRange(confidence.to_string()));
        }

        let severity = raw
            .severity
            .as_deref()
            .and_then(Severity::parse)
            .unwrap_or(Severity::Medium);
        let effort = raw
            .effort_to_fix
            .as_deref()
            .and_then(Effort::parse)
            .unwrap_or(Effort::Hours);
        let source = raw
            .source
            .as_deref()
            .and_then(DetectionSource::parse)
            .unwrap_or_default();

        let mut issue = Issue::new(
            issue_type,
            severity,
            description,
            Location::parse(location.trim()),
            effort,
        )
        .with_source(source);
        issue.confidence = confidence;

        if let Some(title) = raw.title.filter(|t| !t.trim().is_empty()) {
            issue.title = title;
        }
        if let Some(impact) = raw.impact {
            issue.impact = impact;
        }
        issue.code_snippet = raw.code_snippet;

        Ok(issue)
    }
}

/// Convert a detector batch, skipping (and logging) records that fail validation.
pub fn issues_from_raw(raws: Vec<RawIssue>) -> Vec<Issue> {
    let mut issues = Vec::with_capacity(raws.len());
    for raw in raws {
        let label = raw.issue_type.clone().unwrap_or_else(|| "unknown".to_string());
        match Issue::try_from(raw) {
            Ok(issue) => issues.push(issue),
            Err(err) => tracing::warn!(issue_type = %label, error = %err, "skipping invalid issue"),
        }
    }
    issues
}

/// Drop later issues that repeat an earlier `(type, location)` pair.
pub fn deduplicate(issues: Vec<Issue>) -> Vec<Issue> {
    let mut seen = HashSet::new();
    issues
        .into_iter()
        .filter(|issue| seen.insert(issue.dedupe_key()))
        .collect()
}

/// Counts over a detection batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}

impl DetectionStats {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut stats = DetectionStats {
            total: issues.len(),
            ..Default::default()
        };
        for issue in issues {
            *stats
                .by_severity
                .entry(issue.severity.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_type
                .entry(issue.issue_type.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_source
                .entry(issue.source.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_category
                .entry(issue.category.as_str().to_string())
                .or_default() += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw(issue_type: &str, location: &str) -> RawIssue {
        RawIssue {
            issue_type: Some(issue_type.to_string()),
            severity: Some("high".to_string()),
            description: Some("something is off".to_string()),
            location: Some(location.to_string()),
            effort_to_fix: Some("minutes".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_location_parse_with_line() {
        let loc = Location::parse("src/app.py:42");
        assert_eq!(loc.file_path, "src/app.py");
        assert_eq!(loc.line, Some(42));
        assert_eq!(loc.to_string(), "src/app.py:42");
    }

    #[test]
    fn test_location_parse_without_numeric_line() {
        assert_eq!(Location::parse("src/app.py"), Location::new("src/app.py", None));
        assert_eq!(
            Location::parse("C:weird:name"),
            Location::new("C:weird:name", None)
        );
        assert_eq!(Location::parse("a.py:0"), Location::new("a.py:0", None));
    }

    #[test]
    fn test_issue_type_round_trips_unknown_kinds() {
        let kind = IssueType::parse("magic_numbers");
        assert_eq!(kind, IssueType::Other("magic_numbers".to_string()));
        assert_eq!(kind.as_str(), "magic_numbers");
        assert_eq!(IssueType::parse("bare_except"), IssueType::BareExcept);
    }

    #[test]
    fn test_issue_type_title() {
        assert_eq!(IssueType::LongMethod.title(), "Long Method");
        assert_eq!(IssueType::HardcodedApiKey.title(), "Hardcoded Api Key");
    }

    #[test]
    fn test_try_from_normalizes_fields() {
        let issue = Issue::try_from(raw("bare_except", "app.py:7")).unwrap();
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.effort_to_fix, Effort::Minutes);
        assert_eq!(issue.title, "Bare Except");
        assert_eq!(issue.location.line, Some(7));
        assert_eq!(issue.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_try_from_defaults_unknown_severity_and_effort() {
        let mut r = raw("god_file", "big.py");
        r.severity = Some("catastrophic".to_string());
        r.effort_to_fix = Some("weeks".to_string());
        let issue = Issue::try_from(r).unwrap();
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.effort_to_fix, Effort::Hours);
    }

    #[test]
    fn test_try_from_rejects_blank_description() {
        let mut r = raw("god_file", "big.py");
        r.description = Some("   ".to_string());
        assert_eq!(Issue::try_from(r), Err(IssueError::EmptyDescription));
    }

    #[test]
    fn test_try_from_rejects_confidence_out_of_range() {
        let mut r = raw("god_file", "big.py");
        r.confidence = Some(1.5);
        assert!(matches!(
            Issue::try_from(r),
            Err(IssueError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn test_issues_from_raw_skips_invalid_items() {
        let mut bad = raw("long_method", "x.py:1");
        bad.description = Some(String::new());
        let issues = issues_from_raw(vec![raw("bare_except", "a.py:1"), bad, raw("no_tests", ".")]);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[1].issue_type, IssueType::NoTests);
    }

    #[test]
    fn test_deduplicate_keeps_first_occurrence() {
        let mut first = raw("bare_except", "a.py:1");
        first.description = Some("first".to_string());
        let mut second = raw("bare_except", "a.py:1");
        second.description = Some("second".to_string());
        let issues = issues_from_raw(vec![first, second, raw("bare_except", "a.py:2")]);

        let unique = deduplicate(issues);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].description, "first");
    }

    #[test]
    fn test_detection_stats_counts() {
        let issues = issues_from_raw(vec![
            raw("bare_except", "a.py:1"),
            raw("bare_except", "a.py:2"),
            raw("hardcoded_password", "cfg.py:3"),
        ]);
        let stats = DetectionStats::from_issues(&issues);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_type.get("bare_except"), Some(&2));
        assert_eq!(stats.by_severity.get("HIGH"), Some(&3));
        assert_eq!(stats.by_category.get("security"), Some(&1));
    }

    #[test]
    fn test_issue_serializes_type_and_location_as_strings() {
        let issue = Issue::new(
            IssueType::LongMethod,
            Severity::High,
            "too long",
            Location::new("svc.py", Some(10)),
            Effort::Hours,
        );
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["type"], "long_method");
        assert_eq!(value["location"], "svc.py:10");
        assert_eq!(value["severity"], "HIGH");

        let back: Issue = serde_json::from_value(value).unwrap();
        assert_eq!(back, issue);
    }
}

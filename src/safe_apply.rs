//! Safety gate for automated patches
//!
//! Every before/after pair must pass [`SafetyValidator::validate`] before it
//! can reach a commit. Checks run in order and stop at the first failure:
//! syntax, size, then newly introduced dangerous calls. A rejected patch is
//! discarded by the caller.

use crate::syntax::{check_python, top_level_names};
use serde::{Deserialize, Serialize};

/// Patched file may not shrink below this fraction of the original.
const MIN_SIZE_RATIO: f64 = 0.5;

/// Substring -> label for calls a patch must not introduce.
const DANGEROUS_PATTERNS: &[(&str, &str)] = &[
    ("os.system(", "shell execution"),
    ("os.popen(", "shell execution"),
    ("eval(", "eval"),
    ("exec(", "exec"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Pass,
    Fail,
}

/// Outcome of one validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: CheckStatus,
    pub reason: String,
}

impl Verdict {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            reason: reason.into(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            reason: reason.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Pass
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyStats {
    pub passed: u64,
    pub rejected: u64,
    /// Percentage with one decimal, 0.0 before any validation
    pub pass_rate: f64,
}

#[derive(Debug, Default)]
pub struct SafetyValidator {
    passed: u64,
    rejected: u64,
}

impl SafetyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&mut self, original: &str, patched: &str) -> Verdict {
        let verdict = run_checks(original, patched);
        if verdict.passed() {
            self.passed += 1;
        } else {
            self.rejected += 1;
            tracing::warn!(reason = %verdict.reason, "patch rejected by safety gate");
        }
        verdict
    }

    pub fn stats(&self) -> SafetyStats {
        let total = self.passed + self.rejected;
        let pass_rate = if total == 0 {
            0.0
        } else {
            (self.passed as f64 / total as f64 * 1000.0).round_ties_even() / 10.0
        };
        SafetyStats {
            passed: self.passed,
            rejected: self.rejected,
            pass_rate,
        }
    }
}

fn run_checks(original: &str, patched: &str) -> Verdict {
    if let Err(err) = check_python(patched) {
        return Verdict::fail(format!("Syntax error at line {}: {}", err.line, err.message));
    }

    if patched.trim().is_empty() {
        return Verdict::fail("Patched file is empty");
    }
    let original_len = original.chars().count() as f64;
    let patched_len = patched.chars().count() as f64;
    if patched_len < original_len * MIN_SIZE_RATIO {
        return Verdict::fail(format!(
            "File suspiciously small after patch ({} -> {} chars)",
            original_len as usize, patched_len as usize
        ));
    }

    for (pattern, label) in DANGEROUS_PATTERNS {
        if patched.contains(pattern) && !original.contains(pattern) {
            return Verdict::fail(format!("Introduced dangerous pattern: {}", label));
        }
    }

    Verdict::pass("All checks passed")
}

/// Non-gating check: report module-level functions/classes the patch removed.
pub fn validate_structure(original: &str, patched: &str) -> Verdict {
    let after = top_level_names(patched);
    let removed: Vec<String> = top_level_names(original)
        .into_iter()
        .filter(|name| !after.contains(name))
        .collect();

    if removed.is_empty() {
        Verdict::pass("Structure preserved")
    } else {
        Verdict::fail(format!("Fix removed: {}", removed.join(", ")))
    }
}

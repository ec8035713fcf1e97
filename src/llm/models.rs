use serde::{Deserialize, Serialize};

/// Models available through OpenRouter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Fast, cheap model for ranking and short fixes (gemini-2.0-flash)
    #[default]
    Speed,
    /// Better reasoning for custom fixes (claude-sonnet-4.5)
    Balanced,
}

/// Completion budget shared by both tiers
const MODEL_MAX_TOKENS: u32 = 4096;

impl Model {
    pub fn id(&self) -> &'static str {
        match self {
            Model::Speed => "google/gemini-2.0-flash-001",
            Model::Balanced => "anthropic/claude-sonnet-4.5",
        }
    }

    pub fn max_tokens(&self) -> u32 {
        MODEL_MAX_TOKENS
    }
}

/// API usage information from OpenRouter
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    #[serde(default, alias = "total_cost")]
    pub cost: Option<f64>,
}

impl Usage {
    pub fn cost(&self) -> f64 {
        self.cost.unwrap_or(0.0)
    }
}

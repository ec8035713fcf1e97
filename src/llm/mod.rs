//! LLM capability
//!
//! The rest of the crate only sees [`LlmCapability`]: hand it a request, get a
//! string back or an [`LlmError`]. Conversation history is an explicit value
//! threaded through calls instead of living inside a client.

pub mod client;
pub mod models;
pub mod parse;
pub mod prompts;

pub use client::OpenRouterClient;
pub use models::{Model, Usage};

use crate::errors::LlmError;
use serde::{Deserialize, Serialize};

/// Turns kept in a [`Conversation`] window.
pub const DEFAULT_WINDOW: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Rolling window of recent exchanges.
#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
    capacity: usize,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl Conversation {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Record one prompt/response exchange, dropping the oldest turns past capacity.
    pub fn record(&mut self, prompt: impl Into<String>, response: impl Into<String>) {
        self.push(Turn {
            role: Role::User,
            content: prompt.into(),
        });
        self.push(Turn {
            role: Role::Assistant,
            content: response.into(),
        });
    }

    fn push(&mut self, turn: Turn) {
        if self.capacity == 0 {
            return;
        }
        if self.turns.len() == self.capacity {
            self.turns.remove(0);
        }
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest<'a> {
    pub system: &'a str,
    pub history: &'a [Turn],
    pub user: String,
    pub temperature: f32,
    /// Ask the provider for a JSON object response
    pub json_object: bool,
}

/// "Given a prompt, return a string, or fail."
#[allow(async_fn_in_trait)]
pub trait LlmCapability {
    async fn complete(&self, request: &LlmRequest<'_>) -> Result<String, LlmError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Capability used when AI is disabled or unconfigured. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl LlmCapability for Unavailable {
    async fn complete(&self, _request: &LlmRequest<'_>) -> Result<String, LlmError> {
        Err(LlmError::Unavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Backend chosen at startup.
pub enum Backend {
    OpenRouter(OpenRouterClient),
    Disabled(Unavailable),
}

impl LlmCapability for Backend {
    async fn complete(&self, request: &LlmRequest<'_>) -> Result<String, LlmError> {
        match self {
            Backend::OpenRouter(client) => client.complete(request).await,
            Backend::Disabled(off) => off.complete(request).await,
        }
    }

    fn is_available(&self) -> bool {
        match self {
            Backend::OpenRouter(client) => client.is_available(),
            Backend::Disabled(off) => off.is_available(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Canned capabilities for engine tests.

    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Returns queued responses in order and counts calls.
    #[derive(Default)]
    pub struct ScriptedLlm {
        responses: RefCell<VecDeque<Result<String, LlmError>>>,
        calls: Cell<usize>,
        prompts: RefCell<Vec<String>>,
    }

    impl ScriptedLlm {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, body: impl Into<String>) -> Self {
            self.responses.borrow_mut().push_back(Ok(body.into()));
            self
        }

        pub fn fail(self, err: LlmError) -> Self {
            self.responses.borrow_mut().push_back(Err(err));
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.get()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.borrow().clone()
        }
    }

    impl LlmCapability for ScriptedLlm {
        async fn complete(&self, request: &LlmRequest<'_>) -> Result<String, LlmError> {
            self.calls.set(self.calls.get() + 1);
            self.prompts.borrow_mut().push(request.user.clone());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }
}

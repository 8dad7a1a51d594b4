//! Conversation orchestrator configuration.

#[cfg(feature = "config")]
use clap::Args;
use conduit_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default number of model-to-tool round trips per turn.
pub const DEFAULT_TURN_BUDGET: u32 = 5;

/// Default number of prior messages sent to the model.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// System prompt used when tools are offered.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to tools. \
Use them when they help answer the user: search uploaded documents before answering questions \
about them, search the web for current information, and generate images when asked. \
Answer directly when no tool is needed.";

/// System prompt used when no tool is available.
pub const TOOL_FREE_SYSTEM_PROMPT: &str = "You are a helpful assistant. \
No tools are currently available, so answer from your own knowledge \
and say so when you cannot be sure.";

/// Appended to the answer when the turn budget runs out.
pub const TRUNCATION_NOTICE: &str =
    "\n\n[Stopped: the tool-call limit for this turn was reached before a final answer.]";

/// Turn budget, history window and prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct OrchestratorConfig {
    /// Maximum model-to-tool round trips in one turn.
    #[cfg_attr(
        feature = "config",
        arg(long = "turn-budget", env = "TURN_BUDGET", default_value_t = DEFAULT_TURN_BUDGET)
    )]
    pub turn_budget: u32,

    /// Prior messages of the session included in each model request.
    #[cfg_attr(
        feature = "config",
        arg(long = "history-window", env = "HISTORY_WINDOW", default_value_t = DEFAULT_HISTORY_WINDOW)
    )]
    pub history_window: usize,

    /// System prompt used when tools are offered.
    #[cfg_attr(
        feature = "config",
        arg(long = "system-prompt", env = "SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)
    )]
    pub system_prompt: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            turn_budget: DEFAULT_TURN_BUDGET,
            history_window: DEFAULT_HISTORY_WINDOW,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_turn_budget(mut self, turn_budget: u32) -> Self {
        self.turn_budget = turn_budget;
        self
    }

    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    /// Validates the turn budget.
    pub fn validate(&self) -> Result<()> {
        if self.turn_budget == 0 {
            return Err(Error::configuration().with_message("turn budget must be at least 1"));
        }

        Ok(())
    }
}

//! Per-turn conversation state.

use conduit_core::Message;
use serde::Serialize;

/// State of one conversational turn, owned by the task driving it.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub session_id: String,
    /// Prior session messages sent ahead of this turn, oldest first.
    pub context: Vec<Message>,
    /// Items exchanged during this turn, starting with the user message.
    pub items: Vec<Message>,
    /// Tool round trips still allowed.
    pub turn_budget_remaining: u32,
}

impl ConversationTurn {
    /// Starts a turn for `user_message` after `context`.
    pub fn new(
        session_id: impl Into<String>,
        context: Vec<Message>,
        user_message: impl Into<String>,
        turn_budget: u32,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            context,
            items: vec![Message::user(user_message)],
            turn_budget_remaining: turn_budget,
        }
    }

    pub fn push(&mut self, item: Message) {
        self.items.push(item);
    }

    /// Returns the model input: `system`, the context, then this turn's items.
    pub fn messages(&self, system: Message) -> Vec<Message> {
        std::iter::once(system)
            .chain(self.context.iter().cloned())
            .chain(self.items.iter().cloned())
            .collect()
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    /// Every token streamed to the client, in order.
    pub answer: String,
    /// The turn budget ran out before a final answer.
    pub truncated: bool,
    pub model_calls: u32,
    pub tool_calls: u32,
}

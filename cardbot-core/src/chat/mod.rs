//! Conversation handling for the business card assistant.
//!
//! Every turn runs a one-node graph:
//!
//! ```text
//! START → agent → END
//!           │
//!           ├─ retrieve top-k documents for the latest message
//!           ├─ render the prompt (context, chat history, question)
//!           └─ ask the model, append its reply
//! ```
//!
//! The resulting message list is checkpointed under the thread id, so the
//! next turn on the same thread sees the whole conversation.

mod agent;
mod assistant;

pub use agent::{compile_graph, AgentError, AgentNode, AGENT_NODE, TEMPLATE_VARIABLES};
pub use assistant::{run_agent, Assistant};

use crate::provider::Message;

/// Renders messages as `User: ...` / `AI: ...` lines separated by a blank line.
///
/// Anything not authored by the user is labelled `AI`.
pub fn format_messages(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", if m.is_user() { "User" } else { "AI" }, m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

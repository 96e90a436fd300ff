//! The retrieval-augmented agent node.

use super::format_messages;
use crate::checkpoint::CheckpointSaver;
use crate::config::LlmConfig;
use crate::graph::{CompiledGraph, GraphError, MessagesState, Node, StateGraph, END, START};
use crate::prompt::{PromptError, PromptTemplate};
use crate::provider::{ChatRequest, Message, Provider, ProviderError};
use crate::rag::{format_documents, RagError, Retriever};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub const AGENT_NODE: &str = "agent";

/// Variables the agent supplies to its prompt template.
pub const TEMPLATE_VARIABLES: [&str; 3] = ["context", "chat_history", "user_prompt"];

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Conversation has no messages")]
    EmptyConversation,

    #[error("Prompt template uses unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Retrieval failed: {0}")]
    Rag(#[from] RagError),

    #[error("Model request failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Answers the latest message from retrieved context and the chat history.
pub struct AgentNode {
    provider: Arc<dyn Provider>,
    retriever: Retriever,
    template: PromptTemplate,
    model: String,
    temperature: f64,
}

impl AgentNode {
    pub fn new(
        provider: Arc<dyn Provider>,
        retriever: Retriever,
        template: &str,
        llm: &LlmConfig,
    ) -> Result<Self, AgentError> {
        let template = PromptTemplate::from_template(template)?;
        if let Some(unknown) = template
            .input_variables()
            .into_iter()
            .find(|v| !TEMPLATE_VARIABLES.contains(v))
        {
            return Err(AgentError::UnknownVariable(unknown.to_string()));
        }

        Ok(Self {
            provider,
            retriever,
            template,
            model: llm.model.clone(),
            temperature: llm.temperature,
        })
    }

    /// Produces the assistant's reply to `messages`.
    pub async fn respond(&self, messages: &[Message]) -> Result<Message, AgentError> {
        let user_prompt = messages
            .last()
            .map(|m| m.content.clone())
            .ok_or(AgentError::EmptyConversation)?;
        let chat_history = format_messages(messages);

        let documents = self.retriever.retrieve(&user_prompt).await?;
        let context = format_documents(&documents);

        let variables: HashMap<&str, String> = [
            ("context", context),
            ("chat_history", chat_history),
            ("user_prompt", user_prompt),
        ]
        .into_iter()
        .collect();
        let prompt = self.template.format(&variables)?;
        debug!(documents = documents.len(), prompt_len = prompt.len(), "Rendered prompt");

        let request = ChatRequest::new(&self.model, vec![Message::user(prompt)])
            .with_temperature(self.temperature);
        let reply = self.provider.complete(request).await?;
        info!(model = %self.model, reply_len = reply.len(), "Model replied");

        Ok(Message::assistant(reply))
    }
}

#[async_trait]
impl Node for AgentNode {
    async fn run(&self, state: &MessagesState) -> anyhow::Result<MessagesState> {
        let reply = self.respond(&state.messages).await?;
        Ok(MessagesState::new(vec![reply]))
    }
}

/// Wires `START -> agent -> END` with the given checkpointer.
pub fn compile_graph(
    agent: AgentNode,
    checkpointer: Arc<dyn CheckpointSaver>,
) -> Result<CompiledGraph, GraphError> {
    let mut graph = StateGraph::new();
    graph.add_node(AGENT_NODE, Arc::new(agent))?;
    graph.add_edge(START, AGENT_NODE).add_edge(AGENT_NODE, END);
    graph.compile(Some(checkpointer))
}

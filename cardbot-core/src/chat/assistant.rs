use super::agent::{compile_graph, AgentNode};
use crate::checkpoint::{open_saver, CheckpointSaver};
use crate::config::Config;
use crate::graph::{CompiledGraph, MessagesState, RunConfig};
use crate::provider::{Message, OllamaProvider, Provider};
use crate::rag::{create_vector_store, Embedder, KnowledgeBase, VectorStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// The business card assistant.
///
/// Owns the compiled conversation graph and the knowledge base it retrieves
/// from. Conversations are keyed by thread id and persisted by the
/// configured checkpoint saver, so any number of threads can share one
/// `Assistant`.
///
/// # Examples
///
/// ```no_run
/// use cardbot_core::{Assistant, Config, Message};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load_or_default().apply_env_overrides();
/// let assistant = Assistant::from_config(config).await?;
///
/// let reply = assistant.run("visitor-42", vec![Message::user("What do you do?")]).await?;
/// println!("AI: {}", reply);
/// # Ok(())
/// # }
/// ```
pub struct Assistant {
    config: Config,
    knowledge_base: KnowledgeBase,
    graph: CompiledGraph,
}

impl Assistant {
    /// Builds the assistant against Ollama and the configured stores.
    pub async fn from_config(config: Config) -> Result<Self> {
        let provider: Arc<dyn Provider> = Arc::new(OllamaProvider::new(&config.llm));
        Self::with_provider(config, provider).await
    }

    /// Builds the assistant with a custom model provider.
    pub async fn with_provider(config: Config, provider: Arc<dyn Provider>) -> Result<Self> {
        let store = create_vector_store(&config.storage, config.rag.embedding_dim)
            .await
            .context("Failed to open vector store")?;
        let checkpointer = open_saver(&config.checkpoint)
            .await
            .context("Failed to open checkpoint saver")?;

        Self::with_parts(config, provider, store, checkpointer)
    }

    /// Builds the assistant from already opened parts.
    pub fn with_parts(
        config: Config,
        provider: Arc<dyn Provider>,
        store: Arc<dyn VectorStore>,
        checkpointer: Arc<dyn CheckpointSaver>,
    ) -> Result<Self> {
        let embedder = Embedder::new(Arc::clone(&provider), config.rag.embedding_model.clone());
        let knowledge_base = KnowledgeBase::new(embedder, store, &config.rag);

        let agent = AgentNode::new(
            provider,
            knowledge_base.retriever(config.rag.top_k),
            &config.system_prompt,
            &config.llm,
        )
        .context("Invalid system prompt")?;
        let graph = compile_graph(agent, checkpointer).context("Failed to compile graph")?;

        Ok(Self {
            config,
            knowledge_base,
            graph,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    /// Adds `messages` to the thread, runs one turn and returns the reply.
    ///
    /// The reply is the content of the last message in the resulting state.
    pub async fn run(&self, thread_id: &str, messages: Vec<Message>) -> Result<String> {
        anyhow::ensure!(!thread_id.trim().is_empty(), "Thread id must not be empty");

        let config = RunConfig::for_thread(thread_id);
        let state = self
            .graph
            .invoke(MessagesState::new(messages), &config)
            .await
            .with_context(|| format!("Failed to run thread {}", thread_id))?;

        info!(thread_id, messages = state.messages.len(), "Turn completed");
        state
            .last()
            .map(|m| m.content.clone())
            .context("Conversation produced no messages")
    }

    /// Messages stored for the thread, oldest first. Empty when unknown or expired.
    pub async fn history(&self, thread_id: &str) -> Result<Vec<Message>> {
        let state = self
            .graph
            .get_state(&RunConfig::for_thread(thread_id))
            .await
            .context("Failed to load thread")?;
        Ok(state.map(|s| s.messages).unwrap_or_default())
    }

    /// Deletes the thread's stored conversation.
    pub async fn forget(&self, thread_id: &str) -> Result<()> {
        self.graph
            .delete_thread(&RunConfig::for_thread(thread_id))
            .await
            .context("Failed to delete thread")
    }
}

/// One-shot turn: opens everything from `config`, runs the thread, and
/// drops the connections again.
pub async fn run_agent(config: &Config, thread_id: &str, messages: Vec<Message>) -> Result<String> {
    let assistant = Assistant::from_config(config.clone()).await?;
    assistant.run(thread_id, messages).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{MemorySaver, TtlConfig};
    use crate::provider::testing::ScriptedProvider;
    use crate::provider::Role;
    use crate::rag::MemoryStore;
    use std::time::Duration;

    fn assistant(provider: Arc<ScriptedProvider>) -> Assistant {
        let config = Config {
            system_prompt: "{context}|{chat_history}|{user_prompt}".to_string(),
            ..Config::default()
        };
        Assistant::with_parts(
            config,
            provider,
            Arc::new(MemoryStore::new()),
            Arc::new(MemorySaver::new(TtlConfig::new(Duration::from_secs(60)))),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_persists_thread() {
        let provider = Arc::new(ScriptedProvider::new(["Hello, I'm Ada.", "You said hi."]));
        let assistant = assistant(Arc::clone(&provider));
        assistant
            .knowledge_base()
            .add_text("Ada has ten years of Rust experience", "about")
            .await
            .unwrap();

        let first = assistant.run("t1", vec![Message::user("hi")]).await.unwrap();
        assert_eq!(first, "Hello, I'm Ada.");

        let second = assistant
            .run("t1", vec![Message::user("what did I say?")])
            .await
            .unwrap();
        assert_eq!(second, "You said hi.");

        let history = assistant.history("t1").await.unwrap();
        let roles: Vec<_> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);

        let requests = provider.requests.lock().unwrap();
        assert_eq!(
            requests[1].messages[0].content,
            "Ada has ten years of Rust experience|\
             User: hi\n\nAI: Hello, I'm Ada.\n\nUser: what did I say?|\
             what did I say?"
        );
    }

    #[tokio::test]
    async fn test_threads_are_isolated_and_forgettable() {
        let provider = Arc::new(ScriptedProvider::new(["a", "b"]));
        let assistant = assistant(provider);

        assistant.run("t1", vec![Message::user("one")]).await.unwrap();
        assistant.run("t2", vec![Message::user("two")]).await.unwrap();
        assert_eq!(assistant.history("t1").await.unwrap().len(), 2);
        assert_eq!(assistant.history("t2").await.unwrap().len(), 2);

        assistant.forget("t1").await.unwrap();
        assert!(assistant.history("t1").await.unwrap().is_empty());
        assert_eq!(assistant.history("t2").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_rejects_empty_thread_id() {
        let provider = Arc::new(ScriptedProvider::new(["unused"]));
        let assistant = assistant(provider);
        assert!(assistant.run(" ", vec![Message::user("hi")]).await.is_err());
    }

    #[tokio::test]
    async fn test_model_failure_keeps_user_message() {
        // No scripted replies: the model call fails
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let assistant = assistant(provider);

        let err = assistant.run("t1", vec![Message::user("hi")]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("no scripted reply left"));

        let history = assistant.history("t1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hi");
    }
}

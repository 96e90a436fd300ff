//! LLM provider abstraction layer.
//!
//! This module defines a common interface for LLM backends to provide chat
//! completions and embeddings.

mod types;
pub mod ollama;

// Re-export common types
pub use types::{
    Provider,
    ProviderError,
    Result,
    Role,
    ChatRequest,
    ChatResponse,
    Message,
    EmbedRequest,
    EmbedResponse,
};

pub use ollama::OllamaProvider;

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider shared by the crate's tests.

    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies with queued answers (streamed in two chunks) and embeds text
    /// as a bag of keyword hits, so similarity follows shared keywords.
    pub struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
        pub requests: Mutex<Vec<ChatRequest>>,
        pub embed_calls: Mutex<usize>,
    }

    pub const KEYWORDS: &[&str] = &["rust", "email", "phone", "experience", "hobby"];

    impl ScriptedProvider {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
                requests: Mutex::new(Vec::new()),
                embed_calls: Mutex::new(0),
            }
        }

        pub fn keyword_embedding(text: &str) -> Vec<f32> {
            let text = text.to_lowercase();
            let mut embedding: Vec<f32> = KEYWORDS
                .iter()
                .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
                .collect();
            // Constant component so no vector is all zeros
            embedding.push(0.1);
            embedding
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat<'a>(
            &'a self,
            request: ChatRequest,
            mut callback: Box<dyn FnMut(ChatResponse) + Send + 'a>,
        ) -> Result<()> {
            let model = request.model.clone();
            self.requests.lock().unwrap().push(request);

            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::Other("no scripted reply left".to_string()))?;

            let split = reply.char_indices().nth(reply.chars().count() / 2).map_or(reply.len(), |(i, _)| i);
            let (head, tail) = reply.split_at(split);
            for (content, done) in [(head, false), (tail, false), ("", true)] {
                callback(ChatResponse {
                    model: model.clone(),
                    content: content.to_string(),
                    done,
                });
            }
            Ok(())
        }

        async fn embed(&self, text: &str, _model: &str) -> Result<Vec<f32>> {
            *self.embed_calls.lock().unwrap() += 1;
            Ok(Self::keyword_embedding(text))
        }
    }

    #[tokio::test]
    async fn test_complete_accumulates_chunks() {
        let provider = ScriptedProvider::new(["Hello there"]);
        let reply = provider
            .complete(ChatRequest::new("test", vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(reply, "Hello there");
    }
}

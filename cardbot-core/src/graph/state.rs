use crate::provider::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conversation state flowing through the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesState {
    pub messages: Vec<Message>,
}

impl MessagesState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl From<Vec<Message>> for MessagesState {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

/// Merges `update` into `current`.
///
/// Messages without an id get a fresh one. A message whose id is already
/// present replaces the existing message in place; the rest are appended in
/// order.
pub fn add_messages(current: &mut Vec<Message>, update: Vec<Message>) {
    for mut message in update {
        let id = message
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        match current.iter_mut().find(|m| m.id.as_deref() == Some(id.as_str())) {
            Some(existing) => *existing = message,
            None => current.push(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_messages_assigns_ids_and_appends() {
        let mut messages = vec![];
        add_messages(&mut messages, vec![Message::user("hi"), Message::assistant("hello")]);

        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.id.is_some()));
        assert_ne!(messages[0].id, messages[1].id);
        assert_eq!(messages[1].content, "hello");
    }

    #[test]
    fn test_add_messages_replaces_by_id() {
        let mut messages = vec![
            Message::user("hi").with_id("1"),
            Message::assistant("hello").with_id("2"),
        ];
        add_messages(
            &mut messages,
            vec![Message::assistant("hello again").with_id("2"), Message::user("bye").with_id("3")],
        );

        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello again", "bye"]);
    }
}

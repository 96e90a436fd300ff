//! Prompt templates with `{name}` placeholders.
//!
//! `{{` and `}}` render as literal braces.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("Malformed template at byte {position}: {reason}")]
    Malformed { position: usize, reason: &'static str },

    #[error("Missing value for template variable `{0}`")]
    MissingVariable(String),
}

pub type Result<T> = std::result::Result<T, PromptError>;

/// Default business card template.
pub const SYSTEM_PROMPT: &str = "\
You are a digital business card: a friendly assistant answering questions about \
the card's owner on their behalf. Answer using only the facts in the context below. \
If the context does not contain the answer, say that you don't know and suggest \
getting in touch directly. Keep answers short and in the language of the question.

Context:
{context}

Conversation so far:
{chat_history}

Question: {user_prompt}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parses `template`.
    ///
    /// Variable names are identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
    pub fn from_template(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(PromptError::Malformed { position: pos, reason: "unmatched '}'" });
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(PromptError::Malformed { position: pos, reason: "unclosed '{'" });
                    }
                    if !is_identifier(&name) {
                        return Err(PromptError::Malformed { position: pos, reason: "invalid variable name" });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable(name));
                }
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Distinct variable names in order of first appearance.
    pub fn input_variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name.as_str());
                }
            }
        }
        names
    }

    /// Renders the template. Extra variables are ignored.
    pub fn format(&self, variables: &HashMap<&str, String>) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    let value = variables
                        .get(name.as_str())
                        .ok_or_else(|| PromptError::MissingVariable(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_default_template_variables() {
        let template = PromptTemplate::from_template(SYSTEM_PROMPT).unwrap();
        assert_eq!(template.input_variables(), vec!["context", "chat_history", "user_prompt"]);
    }

    #[test]
    fn test_format_substitutes_and_escapes() {
        let template = PromptTemplate::from_template("{{json}} {greeting}, {name}! {greeting}").unwrap();
        let rendered = template
            .format(&vars(&[("greeting", "Hi"), ("name", "Ada"), ("unused", "x")]))
            .unwrap();
        assert_eq!(rendered, "{json} Hi, Ada! Hi");
    }

    #[test]
    fn test_values_are_not_reinterpreted() {
        let template = PromptTemplate::from_template("Q: {user_prompt}").unwrap();
        let rendered = template.format(&vars(&[("user_prompt", "what is {context}?")])).unwrap();
        assert_eq!(rendered, "Q: what is {context}?");
    }

    #[test]
    fn test_missing_variable() {
        let template = PromptTemplate::from_template("{context}\n{user_prompt}").unwrap();
        let err = template.format(&vars(&[("context", "")])).unwrap_err();
        assert_eq!(err, PromptError::MissingVariable("user_prompt".to_string()));
    }

    #[test]
    fn test_malformed_templates() {
        assert!(matches!(
            PromptTemplate::from_template("hello {name"),
            Err(PromptError::Malformed { position: 6, .. })
        ));
        assert!(matches!(
            PromptTemplate::from_template("oops }"),
            Err(PromptError::Malformed { position: 5, .. })
        ));
        assert!(matches!(
            PromptTemplate::from_template("{}"),
            Err(PromptError::Malformed { .. })
        ));
        assert!(matches!(
            PromptTemplate::from_template("{two words}"),
            Err(PromptError::Malformed { .. })
        ));
    }
}

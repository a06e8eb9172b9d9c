use crate::config::OpenAiConfig;
use crate::models::FusedNode;
use crate::traits::AnswerSynthesizer;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const EMPTY_RESPONSE: &str = "Empty Response";

/// What a synthesizer produced. Backends pick the variant; callers never
/// have to inspect the payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Answer {
    Text(String),
    Structured(Value),
    Empty,
}

impl Answer {
    /// JSON objects and arrays become `Structured`, blank content `Empty`.
    pub fn from_content(content: &str) -> Self {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }

        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                return Self::Structured(value);
            }
        }

        Self::Text(trimmed.to_string())
    }

    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => format!("{value:#}"),
            Self::Empty => EMPTY_RESPONSE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub answer: Answer,
    pub cited: Vec<String>,
}

fn cited_texts(nodes: &[FusedNode]) -> Vec<String> {
    nodes.iter().map(|node| node.node.text.clone()).collect()
}

/// Answers with the retrieved text itself, in fused order.
#[derive(Debug, Clone, Copy)]
pub struct ExtractiveSynthesizer {
    max_chars: usize,
}

impl ExtractiveSynthesizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait]
impl AnswerSynthesizer for ExtractiveSynthesizer {
    async fn synthesize(&self, _query: &str, nodes: &[FusedNode]) -> Result<Synthesis, SearchError> {
        if nodes.is_empty() {
            return Ok(Synthesis {
                answer: Answer::Empty,
                cited: Vec::new(),
            });
        }

        let cited = cited_texts(nodes);
        let joined = cited.join("\n\n");
        let text = joined.chars().take(self.max_chars).collect::<String>();

        Ok(Synthesis {
            answer: Answer::from_content(&text),
            cited,
        })
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionSynthesizer {
    client: Client,
    config: OpenAiConfig,
    model: String,
}

impl ChatCompletionSynthesizer {
    pub fn new(config: OpenAiConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            config,
            model: model.into(),
        }
    }
}

fn build_messages(query: &str, nodes: &[FusedNode]) -> Value {
    let context = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| format!("[{}] {}", index + 1, node.node.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    json!([
        {
            "role": "system",
            "content": format!(
                "Answer the question using only the context below.\n\nContext:\n{context}"
            ),
        },
        {
            "role": "user",
            "content": query,
        }
    ])
}

fn parse_completion(parsed: &Value) -> Result<Answer, SearchError> {
    parsed
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(Answer::from_content)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "chat-completions".to_string(),
            details: "response has no message content".to_string(),
        })
}

#[async_trait]
impl AnswerSynthesizer for ChatCompletionSynthesizer {
    async fn synthesize(&self, query: &str, nodes: &[FusedNode]) -> Result<Synthesis, SearchError> {
        if nodes.is_empty() {
            return Ok(Synthesis {
                answer: Answer::Empty,
                cited: Vec::new(),
            });
        }

        let mut request = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.api_base.trim_end_matches('/')
            ))
            .json(&json!({
                "model": self.model,
                "temperature": 0,
                "messages": build_messages(query, nodes),
            }));

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "chat-completions".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(Synthesis {
            answer: parse_completion(&parsed)?,
            cited: cited_texts(nodes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentRef, Node};
    use std::sync::Arc;

    fn fused(id: &str, text: &str) -> FusedNode {
        FusedNode {
            node: Arc::new(Node {
                node_id: id.to_string(),
                text: text.to_string(),
                document: DocumentRef {
                    document_id: "doc".to_string(),
                    relative_path: "doc.txt".to_string(),
                    source_url: None,
                },
                chunk_index: 0,
            }),
            vector_score: Some(0.5),
            keyword_score: None,
        }
    }

    #[test]
    fn content_variants_are_explicit() {
        assert_eq!(Answer::from_content("  "), Answer::Empty);
        assert_eq!(
            Answer::from_content("Take tram 28."),
            Answer::Text("Take tram 28.".to_string())
        );
        assert_eq!(
            Answer::from_content(r#"{"hotel": "Bairro Alto"}"#),
            Answer::Structured(json!({"hotel": "Bairro Alto"}))
        );
        assert_eq!(
            Answer::from_content("[not json"),
            Answer::Text("[not json".to_string())
        );
    }

    #[test]
    fn empty_answer_renders_placeholder() {
        assert_eq!(Answer::Empty.render(), EMPTY_RESPONSE);
    }

    #[tokio::test]
    async fn extractive_synthesizer_cites_every_node() {
        let synthesizer = ExtractiveSynthesizer::new(12);
        let nodes = vec![fused("n1", "Castle opens at 9."), fused("n2", "Tickets cost 10 EUR.")];

        let synthesis = synthesizer
            .synthesize("castle hours", &nodes)
            .await
            .expect("synthesis should succeed");

        assert_eq!(synthesis.answer, Answer::Text("Castle opens".to_string()));
        assert_eq!(synthesis.cited, vec!["Castle opens at 9.", "Tickets cost 10 EUR."]);
    }

    #[tokio::test]
    async fn no_nodes_yields_empty_answer() {
        let synthesis = ExtractiveSynthesizer::new(100)
            .synthesize("anything", &[])
            .await
            .expect("synthesis should succeed");
        assert_eq!(synthesis.answer, Answer::Empty);
        assert!(synthesis.cited.is_empty());
    }

    #[test]
    fn completion_content_is_parsed() {
        let parsed = json!({"choices": [{"message": {"content": "Visit Belem early."}}]});
        assert_eq!(
            parse_completion(&parsed).expect("content should parse"),
            Answer::Text("Visit Belem early.".to_string())
        );
        assert!(parse_completion(&json!({"choices": []})).is_err());
    }

    #[test]
    fn messages_number_the_context() {
        let messages = build_messages("q", &[fused("n1", "first"), fused("n2", "second")]);
        let system = messages
            .pointer("/0/content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        assert!(system.contains("[1] first"));
        assert!(system.contains("[2] second"));
    }
}

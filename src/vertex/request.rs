//! Building the outbound `generateContent` request.
//!
//! [`RagRequest`] is the transport-neutral description of one call. The typed
//! transport serializes it through [`GenerateContentRequest`]; the REST transport
//! renders it with [`to_json`]. Both produce the same JSON body.

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::{RetrievalConfig, RetrievalSource};
use crate::conversation::Message;

/// Sampling temperature for every request.
pub const TEMPERATURE: f64 = 0.2;

/// One grounded generation call.
#[derive(Clone, Debug, PartialEq)]
pub struct RagRequest {
    /// Prompt text, including replayed history.
    pub prompt: String,
    /// Retrieval tool to attach.
    pub source: RetrievalSource,
    /// Sampling temperature.
    pub temperature: f64,
}

impl RagRequest {
    /// Build a request for `question`, replaying up to `window` prior messages.
    #[must_use]
    pub fn build(
        config: &RetrievalConfig,
        question: &str,
        history: &[Message],
        window: usize,
    ) -> Self {
        Self {
            prompt: compose_prompt(question, history, window),
            source: config.source.clone(),
            temperature: TEMPERATURE,
        }
    }
}

/// Prefix `question` with a transcript of the last `window` messages.
///
/// Without history the question is returned unchanged.
#[must_use]
pub fn compose_prompt(question: &str, history: &[Message], window: usize) -> String {
    let start = history.len().saturating_sub(window);
    let recent = &history[start..];
    if recent.is_empty() {
        return question.to_string();
    }

    let transcript = recent
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!("Previous conversation:\n{transcript}\n\nCurrent question: {question}")
}

/// Typed `generateContent` request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Conversation turns; always a single user turn here.
    pub contents: Vec<Content>,
    /// Attached tools; always exactly one retrieval tool here.
    pub tools: Vec<Tool>,
    /// Sampling settings.
    pub generation_config: GenerationConfig,
}

/// One turn of content.
#[derive(Debug, Serialize)]
pub struct Content {
    /// `user` or `model`.
    pub role: String,
    /// Text parts.
    pub parts: Vec<Part>,
}

/// A text part.
#[derive(Debug, Serialize)]
pub struct Part {
    /// Text payload.
    pub text: String,
}

/// Tool descriptor.
#[derive(Debug, Serialize)]
pub struct Tool {
    /// Retrieval configuration.
    pub retrieval: Retrieval,
}

/// Retrieval backend. Serialized as an externally tagged object so only one key
/// can ever be present.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Retrieval {
    /// RAG Engine corpus.
    VertexRagStore(VertexRagStore),
    /// Vertex AI Search data store.
    VertexAiSearch(VertexAiSearch),
}

/// RAG Engine retrieval settings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexRagStore {
    /// Corpora to search.
    pub rag_resources: Vec<RagResource>,
    /// Retrieval tuning.
    pub rag_retrieval_config: RagRetrievalConfig,
}

/// A corpus reference.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagResource {
    /// Full corpus resource name.
    pub rag_corpus: String,
}

/// RAG Engine retrieval tuning.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRetrievalConfig {
    /// Number of contexts to retrieve.
    pub top_k: u32,
}

/// Vertex AI Search retrieval settings.
#[derive(Debug, Serialize)]
pub struct VertexAiSearch {
    /// Full data store resource path.
    pub datastore: String,
}

/// Sampling settings.
#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f64,
}

impl From<&RetrievalSource> for Retrieval {
    fn from(source: &RetrievalSource) -> Self {
        match source {
            RetrievalSource::RagCorpus { corpus, top_k } => Self::VertexRagStore(VertexRagStore {
                rag_resources: vec![RagResource {
                    rag_corpus: corpus.clone(),
                }],
                rag_retrieval_config: RagRetrievalConfig { top_k: *top_k },
            }),
            RetrievalSource::DataStore { datastore } => Self::VertexAiSearch(VertexAiSearch {
                datastore: datastore.clone(),
            }),
        }
    }
}

impl From<&RagRequest> for GenerateContentRequest {
    fn from(request: &RagRequest) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            tools: vec![Tool {
                retrieval: Retrieval::from(&request.source),
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        }
    }
}

/// Render the request body as untyped JSON.
#[must_use]
pub fn to_json(request: &RagRequest) -> Value {
    let retrieval = match &request.source {
        RetrievalSource::RagCorpus { corpus, top_k } => json!({
            "vertexRagStore": {
                "ragResources": [{ "ragCorpus": corpus }],
                "ragRetrievalConfig": { "topK": top_k }
            }
        }),
        RetrievalSource::DataStore { datastore } => json!({
            "vertexAiSearch": { "datastore": datastore }
        }),
    };

    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.prompt }]
        }],
        "tools": [{ "retrieval": retrieval }],
        "generationConfig": { "temperature": request.temperature }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;

    fn config(source: RetrievalSource) -> RetrievalConfig {
        RetrievalConfig {
            project: "acme".to_string(),
            location: "us-central1".to_string(),
            model: "gemini-1.5-flash".to_string(),
            source,
            api_endpoint: None,
        }
    }

    fn corpus() -> RetrievalSource {
        RetrievalSource::RagCorpus {
            corpus: "projects/acme/locations/us-central1/ragCorpora/1".to_string(),
            top_k: 5,
        }
    }

    fn data_store() -> RetrievalSource {
        RetrievalSource::DataStore {
            datastore:
                "projects/acme/locations/us-central1/collections/default_collection/dataStores/docs"
                    .to_string(),
        }
    }

    #[test]
    fn test_prompt_without_history() {
        assert_eq!(compose_prompt("What is RAG?", &[], 10), "What is RAG?");
    }

    #[test]
    fn test_prompt_with_history_window() {
        let history = vec![
            Message::new(Role::User, "first", None),
            Message::new(Role::Assistant, "one", None),
            Message::new(Role::User, "second", None),
            Message::new(Role::Assistant, "two", None),
        ];

        let prompt = compose_prompt("third?", &history, 2);
        assert_eq!(
            prompt,
            "Previous conversation:\nUser: second\nAssistant: two\n\nCurrent question: third?"
        );

        assert_eq!(compose_prompt("third?", &history, 0), "third?");
    }

    #[test]
    fn test_typed_and_json_bodies_match() {
        for source in [corpus(), data_store()] {
            let request = RagRequest::build(&config(source), "q", &[], 10);
            let typed = serde_json::to_value(GenerateContentRequest::from(&request))
                .unwrap_or_default();
            assert_eq!(typed, to_json(&request));
        }
    }

    #[test]
    fn test_exactly_one_retrieval_tool() {
        let request = RagRequest::build(&config(data_store()), "q", &[], 10);
        let body = to_json(&request);
        let tools = body["tools"].as_array().cloned().unwrap_or_default();
        assert_eq!(tools.len(), 1);

        let retrieval = tools[0]["retrieval"].as_object().cloned().unwrap_or_default();
        assert_eq!(retrieval.len(), 1);
        assert!(retrieval.contains_key("vertexAiSearch"));
        assert_eq!(body["generationConfig"]["temperature"], 0.2);
    }

    #[test]
    fn test_corpus_tool_carries_top_k() {
        let request = RagRequest::build(&config(corpus()), "q", &[], 10);
        let body = to_json(&request);
        let store = &body["tools"][0]["retrieval"]["vertexRagStore"];
        assert_eq!(store["ragRetrievalConfig"]["topK"], 5);
        assert_eq!(
            store["ragResources"][0]["ragCorpus"],
            "projects/acme/locations/us-central1/ragCorpora/1"
        );
    }
}

//! Normalizing a model reply into an answer and its citations.
//!
//! Both the typed and the raw JSON shape go through the same rules. Nothing in here
//! fails: a missing field at any depth just contributes nothing.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use super::response::{GenerateContentResponse, GroundingChunk, GroundingMetadata};

/// Answer text plus deduplicated citation URIs in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GroundedAnswer {
    /// Answer text; empty when the reply carried none.
    pub answer: String,
    /// Source URIs.
    pub citations: Vec<String>,
}

/// Order-preserving set of URIs.
#[derive(Default)]
struct Citations {
    seen: HashSet<String>,
    uris: Vec<String>,
}

impl Citations {
    fn push(&mut self, uri: Option<&str>) {
        let Some(uri) = uri.map(str::trim).filter(|u| !u.is_empty()) else {
            return;
        };
        if self.seen.insert(uri.to_string()) {
            self.uris.push(uri.to_string());
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.uris
    }
}

fn compose_answer<'a>(top_level: Option<&str>, parts: impl Iterator<Item = &'a str>) -> String {
    if let Some(text) = top_level.map(str::trim).filter(|t| !t.is_empty()) {
        return text.to_string();
    }
    parts.collect::<Vec<_>>().join("\n").trim().to_string()
}

/// Extract from a typed response.
#[must_use]
pub fn from_typed(response: &GenerateContentResponse) -> GroundedAnswer {
    let parts = response
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .filter_map(|part| part.text.as_deref());

    let citations = response
        .candidates
        .first()
        .and_then(|c| c.grounding_metadata.as_ref())
        .map(typed_citations)
        .unwrap_or_default();

    GroundedAnswer {
        answer: compose_answer(response.text.as_deref(), parts),
        citations,
    }
}

fn typed_citations(metadata: &GroundingMetadata) -> Vec<String> {
    let mut citations = Citations::default();
    if metadata.grounding_supports.is_empty() {
        for chunk in &metadata.grounding_chunks {
            citations.push(chunk.source_uri());
        }
    } else {
        for support in &metadata.grounding_supports {
            for &index in &support.grounding_chunk_indices {
                let chunk = metadata.grounding_chunks.get(index);
                citations.push(chunk.and_then(GroundingChunk::source_uri));
            }
        }
    }
    citations.into_vec()
}

/// Extract from an untyped JSON reply.
#[must_use]
pub fn from_json(value: &Value) -> GroundedAnswer {
    let candidates = array(value.get("candidates"));

    let parts = candidates
        .iter()
        .flat_map(|c| array(c.pointer("/content/parts")).iter())
        .filter_map(|part| part.get("text").and_then(Value::as_str));

    let citations = candidates
        .first()
        .and_then(|c| c.get("groundingMetadata"))
        .map(json_citations)
        .unwrap_or_default();

    GroundedAnswer {
        answer: compose_answer(value.get("text").and_then(Value::as_str), parts),
        citations,
    }
}

fn json_citations(metadata: &Value) -> Vec<String> {
    let chunks = array(metadata.get("groundingChunks"));
    let supports = array(metadata.get("groundingSupports"));

    let mut citations = Citations::default();
    if supports.is_empty() {
        for chunk in chunks {
            citations.push(json_chunk_uri(chunk));
        }
    } else {
        for support in supports {
            let indices = array(support.get("groundingChunkIndices"))
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|i| usize::try_from(i).ok());
            for index in indices {
                citations.push(chunks.get(index).and_then(json_chunk_uri));
            }
        }
    }
    citations.into_vec()
}

fn json_chunk_uri(chunk: &Value) -> Option<&str> {
    ["/web/uri", "/file/filePath", "/retrievedContext/uri"]
        .iter()
        .filter_map(|path| chunk.pointer(path).and_then(Value::as_str))
        .find(|uri| !uri.trim().is_empty())
}

fn array(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

//! Typed `generateContent` response.
//!
//! Every field is optional or defaulted: a reply missing any of them still decodes.

use serde::Deserialize;

/// Response body.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Convenience text, set by some client shapes.
    #[serde(default)]
    pub text: Option<String>,
    /// Generated candidates.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// One generated candidate.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content.
    #[serde(default)]
    pub content: Option<CandidateContent>,
    /// Citation evidence.
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

/// Content of a candidate.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CandidateContent {
    /// Parts; non-text parts carry no `text`.
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

/// A generated part.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CandidatePart {
    /// Text, if this is a text part.
    #[serde(default)]
    pub text: Option<String>,
}

/// Grounding evidence for a candidate.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    /// Retrieved sources.
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
    /// Spans of the answer backed by chunks.
    #[serde(default)]
    pub grounding_supports: Vec<GroundingSupport>,
}

/// A span backed by one or more chunks.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingSupport {
    /// Indices into [`GroundingMetadata::grounding_chunks`].
    #[serde(default)]
    pub grounding_chunk_indices: Vec<usize>,
}

/// A retrieved source.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingChunk {
    /// Web source.
    #[serde(default)]
    pub web: Option<WebSource>,
    /// File source.
    #[serde(default)]
    pub file: Option<FileSource>,
    /// RAG Engine or Vertex AI Search context.
    #[serde(default)]
    pub retrieved_context: Option<RetrievedContext>,
}

/// Web source.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebSource {
    /// Page URI.
    #[serde(default)]
    pub uri: Option<String>,
}

/// File source.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSource {
    /// File path or URI.
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Retrieved context.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RetrievedContext {
    /// Document URI.
    #[serde(default)]
    pub uri: Option<String>,
}

impl GroundingChunk {
    /// The citation URI: `web.uri`, else `file.filePath`, else `retrievedContext.uri`.
    #[must_use]
    pub fn source_uri(&self) -> Option<&str> {
        let web = self.web.as_ref().and_then(|w| w.uri.as_deref());
        let file = || self.file.as_ref().and_then(|f| f.file_path.as_deref());
        let context = || self.retrieved_context.as_ref().and_then(|c| c.uri.as_deref());

        web.filter(|u| !u.trim().is_empty())
            .or_else(|| file().filter(|u| !u.trim().is_empty()))
            .or_else(|| context().filter(|u| !u.trim().is_empty()))
    }
}

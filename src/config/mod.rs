//! Configuration for the relay.
//!
//! Everything is read once at startup. Server settings fall back to defaults when a
//! variable is missing or malformed; the retrieval settings are kept as a `Result`
//! so that a misconfigured deployment still answers health checks and only fails
//! when a question is asked.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;
use url::Url;

use crate::conversation::store::ConversationStoreConfig;

/// Default Vertex AI region.
pub const DEFAULT_LOCATION: &str = "us-central1";
/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
/// Default number of retrieved documents handed to the model.
pub const DEFAULT_TOP_K: u32 = 5;
/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default upstream timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
/// Default number of prior messages replayed into the prompt.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;
/// Default directory for the static front-end.
pub const DEFAULT_STATIC_DIR: &str = "public";

/// Configuration errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `PROJECT_ID` is unset or blank.
    #[error("PROJECT_ID is not configured")]
    MissingProject,
    /// Neither `RAG_CORPUS` nor `DATA_STORE_ID` is set.
    #[error("no retrieval source configured: set RAG_CORPUS or DATA_STORE_ID")]
    MissingRetrievalSource,
    /// A variable is present but cannot be used.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Raw value as read.
        value: String,
    },
}

/// The retrieval backend a request is grounded on. Exactly one is ever selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetrievalSource {
    /// Vertex AI RAG Engine corpus, addressed by full resource name.
    RagCorpus {
        /// `projects/{p}/locations/{l}/ragCorpora/{id}`.
        corpus: String,
        /// Number of contexts to retrieve.
        top_k: u32,
    },
    /// Vertex AI Search data store, addressed by full resource path.
    DataStore {
        /// `projects/{p}/locations/{l}/collections/default_collection/dataStores/{id}`.
        datastore: String,
    },
}

impl RetrievalSource {
    /// Stable name for logs and health output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RagCorpus { .. } => "rag_corpus",
            Self::DataStore { .. } => "data_store",
        }
    }
}

/// Resolved retrieval settings. Immutable for the process lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Google Cloud project id.
    pub project: String,
    /// Vertex AI region.
    pub location: String,
    /// Model id, e.g. `gemini-1.5-flash`.
    pub model: String,
    /// Selected retrieval backend.
    pub source: RetrievalSource,
    /// Base URL override for the Vertex AI API.
    pub api_endpoint: Option<String>,
}

impl RetrievalConfig {
    /// Resolve the retrieval settings from a variable lookup.
    ///
    /// A corpus is preferred over a data store when both are present.
    ///
    /// # Errors
    /// Returns an error if the project or retrieval source is missing, or if a
    /// value cannot be parsed.
    pub fn resolve<L>(lookup: &L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let project = non_blank(lookup, "PROJECT_ID").ok_or(ConfigError::MissingProject)?;
        let location =
            non_blank(lookup, "LOCATION").unwrap_or_else(|| DEFAULT_LOCATION.to_string());
        let model = non_blank(lookup, "MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let source = if let Some(corpus) = non_blank(lookup, "RAG_CORPUS") {
            let top_k = match non_blank(lookup, "RAG_TOP_K") {
                None => DEFAULT_TOP_K,
                Some(raw) => match raw.parse::<u32>() {
                    Ok(k) if k > 0 => k,
                    _ => {
                        return Err(ConfigError::InvalidValue {
                            name: "RAG_TOP_K",
                            value: raw,
                        });
                    }
                },
            };
            RetrievalSource::RagCorpus {
                corpus: corpus_resource(&project, &location, &corpus),
                top_k,
            }
        } else if let Some(id) = non_blank(lookup, "DATA_STORE_ID") {
            RetrievalSource::DataStore {
                datastore: format!(
                    "projects/{project}/locations/{location}/collections/default_collection/dataStores/{id}"
                ),
            }
        } else {
            return Err(ConfigError::MissingRetrievalSource);
        };

        let api_endpoint = match non_blank(lookup, "VERTEX_API_ENDPOINT") {
            None => None,
            Some(raw) => {
                if Url::parse(&raw).is_err() {
                    return Err(ConfigError::InvalidValue {
                        name: "VERTEX_API_ENDPOINT",
                        value: raw,
                    });
                }
                Some(raw.trim_end_matches('/').to_string())
            }
        };

        Ok(Self {
            project,
            location,
            model,
            source,
            api_endpoint,
        })
    }

    /// Full URL of the `generateContent` method for the configured model.
    #[must_use]
    pub fn generate_content_url(&self) -> String {
        let base = self
            .api_endpoint
            .clone()
            .unwrap_or_else(|| default_endpoint(&self.location));
        format!(
            "{base}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.project, self.location, self.model
        )
    }
}

/// Which outbound transport talks to Vertex AI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportKind {
    /// Typed request and response structures.
    #[default]
    Typed,
    /// Hand-built JSON body, response walked as untyped JSON.
    Rest,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "typed" => Ok(Self::Typed),
            "rest" | "raw" | "json" => Ok(Self::Rest),
            other => Err(other.to_string()),
        }
    }
}

/// Top-level relay configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Project id as configured, echoed by the health check.
    pub project_id: Option<String>,
    /// Retrieval settings, or the reason they are unusable.
    pub retrieval: Result<RetrievalConfig, ConfigError>,
    /// Outbound transport selection.
    pub transport: TransportKind,
    /// Upstream request timeout.
    pub request_timeout: Duration,
    /// Number of prior messages replayed into each prompt.
    pub history_window: usize,
    /// Conversation store limits.
    pub store: ConversationStoreConfig,
    /// Directory served at `/`.
    pub static_dir: PathBuf,
    /// Fixed bearer token; ambient credentials are used when absent.
    pub access_token: Option<String>,
}

impl RelayConfig {
    /// Read the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(&|name: &str| std::env::var(name).ok())
    }

    /// Read the configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<L>(lookup: &L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = ConversationStoreConfig::default();
        let max_conversations =
            parse_or(lookup, "MAX_CONVERSATIONS", defaults.max_conversations).max(1);
        let conversation_timeout = non_blank(lookup, "CONVERSATION_TIMEOUT_SECS")
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(defaults.conversation_timeout);

        let transport = match non_blank(lookup, "INFERENCE_TRANSPORT") {
            None => TransportKind::default(),
            Some(raw) => raw.parse().unwrap_or_else(|unknown| {
                tracing::warn!("Unknown INFERENCE_TRANSPORT {unknown:?}, using typed");
                TransportKind::default()
            }),
        };

        Self {
            port: parse_or(lookup, "PORT", DEFAULT_PORT),
            project_id: non_blank(lookup, "PROJECT_ID"),
            retrieval: RetrievalConfig::resolve(lookup),
            transport,
            request_timeout: Duration::from_secs(parse_or(
                lookup,
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            history_window: parse_or(lookup, "HISTORY_WINDOW", DEFAULT_HISTORY_WINDOW),
            store: ConversationStoreConfig {
                max_conversations,
                conversation_timeout,
            },
            static_dir: non_blank(lookup, "STATIC_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR), PathBuf::from),
            access_token: non_blank(lookup, "GOOGLE_ACCESS_TOKEN"),
        }
    }
}

fn non_blank<L>(lookup: &L, name: &str) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or<L, T>(lookup: &L, name: &str, default: T) -> T
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_blank(lookup, name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {name}={raw:?}");
            default
        }),
    }
}

fn corpus_resource(project: &str, location: &str, corpus: &str) -> String {
    if corpus.starts_with("projects/") {
        corpus.to_string()
    } else {
        format!("projects/{project}/locations/{location}/ragCorpora/{corpus}")
    }
}

fn default_endpoint(location: &str) -> String {
    if location == "global" {
        "https://aiplatform.googleapis.com".to_string()
    } else {
        format!("https://{location}-aiplatform.googleapis.com")
    }
}

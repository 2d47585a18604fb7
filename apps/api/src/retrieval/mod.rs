//! Retrieval: similarity search over the interview question bank.
//!
//! The vector database itself lives outside this service. Handlers only see
//! the `Retriever` trait, carried in `AppState` as `Arc<dyn Retriever>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on characters of one document quoted into a prompt.
const MAX_DOCUMENT_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("Search failed: {0}")]
    Search(String),
}

/// One search hit. Higher `score` means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub content: String,
    pub source: String,
    pub page: u32,
    pub score: f32,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Whether searches can be served right now.
    fn is_available(&self) -> bool;

    async fn search(&self, query: &str, top_k: usize)
        -> Result<Vec<ScoredDocument>, RetrievalError>;
}

/// Used when no vector database is configured.
pub struct DisabledRetriever;

#[async_trait]
impl Retriever for DisabledRetriever {
    fn is_available(&self) -> bool {
        false
    }

    async fn search(
        &self,
        _query: &str,
        _top_k: usize,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        Err(RetrievalError::Unavailable(
            "no vector database configured".to_string(),
        ))
    }
}

/// Renders hits as numbered lines for the technical question prompt.
/// Empty input renders as an empty string.
pub fn build_retrieval_context(documents: &[ScoredDocument]) -> String {
    documents
        .iter()
        .filter(|d| !d.content.trim().is_empty())
        .enumerate()
        .map(|(i, doc)| {
            let content = doc.content.trim();
            let excerpt: String = content.chars().take(MAX_DOCUMENT_CHARS).collect();
            let ellipsis = if content.chars().count() > MAX_DOCUMENT_CHARS {
                "…"
            } else {
                ""
            };
            let source = if doc.source.is_empty() {
                "未知来源"
            } else {
                doc.source.as_str()
            };
            format!(
                "[{}] {excerpt}{ellipsis}（来源：{source}，第{}页，相关度：{:.2}）",
                i + 1,
                doc.page,
                doc.score
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

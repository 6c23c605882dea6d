// Retrieval backend seam
//
// The vector search itself is an opaque collaborator. Whatever it returns is
// re-ranked by the hybrid scorer.

use super::{HybridScorer, ScoredResult, ScoringCandidate, ScoringContext};
use crate::error::{Result, StrataError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub limit: usize,
    pub include_archived: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            include_archived: false,
        }
    }
}

/// Embedding search returning candidates ranked by raw similarity
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn search(&self, embedding: &[f32], options: &SearchOptions) -> Result<Vec<ScoringCandidate>>;
}

impl HybridScorer {
    /// Search the backend, then score what it returned
    pub async fn search_and_score(
        &self,
        backend: &dyn RetrievalBackend,
        embedding: &[f32],
        query: &str,
        options: &SearchOptions,
        context: &ScoringContext,
    ) -> Result<Vec<ScoredResult>> {
        let candidates = backend
            .search(embedding, options)
            .await
            .map_err(|e| match e {
                StrataError::Collaborator(_) => e,
                other => StrataError::Collaborator(format!("retrieval backend: {}", other)),
            })?;
        debug!("Backend returned {} candidates", candidates.len());

        let context = ScoringContext {
            include_archived: context.include_archived || options.include_archived,
            ..context.clone()
        };
        self.score(candidates, query, &context).await
    }
}

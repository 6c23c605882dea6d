// Tiered retrieval: category summaries first, items on demand
//
// Stage 1 asks the category selector for relevant summaries. Stage 2 decides
// whether those summaries answer the query on their own. Stage 3 scores the
// itemized candidates when they do not.

use super::{HybridScorer, ScoredResult, ScoringCandidate, ScoringContext};
use crate::error::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Summary long enough to answer an overview question by itself
const SUBSTANTIAL_SUMMARY_CHARS: usize = 100;
/// Aggregate summary length that is sufficient for any query
const SUFFICIENT_AGGREGATE_CHARS: usize = 500;

static OVERVIEW_QUERY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(what is|overview|summary|explain|describe|general|about)\b")
        .expect("Valid overview query regex")
});

static SPECIFIC_QUERY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(how to|specific|exact|error|fix|bug|code for|example|where is)\b")
        .expect("Valid specific query regex")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySelection {
    pub max_categories: usize,
}

/// A category judged relevant to a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub name: String,
    pub relevance: f64,
    pub summary: Option<String>,
    pub item_count: usize,
}

impl CategoryMatch {
    fn summary_len(&self) -> usize {
        self.summary.as_deref().map_or(0, |s| s.chars().count())
    }
}

/// Picks the categories whose summaries are worth showing for a query
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CategorySelector: Send + Sync {
    async fn select_relevant_categories(
        &self,
        query: &str,
        selection: &CategorySelection,
    ) -> Result<Vec<CategoryMatch>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieredOptions {
    pub max_summaries: usize,
    pub max_items: usize,
    /// Always drill down to items
    pub require_specific_items: bool,
}

impl Default for TieredOptions {
    fn default() -> Self {
        Self {
            max_summaries: 3,
            max_items: 10,
            require_specific_items: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Summary,
    Item,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieredResult {
    pub tier: Tier,
    pub summaries: Vec<CategoryMatch>,
    pub items: Vec<ScoredResult>,
    /// Whether the summaries were judged to answer the query
    pub sufficient: bool,
}

/// Whether the summaries answer `query` without itemized results
fn summaries_sufficient(query: &str, summaries: &[CategoryMatch], require_specific: bool) -> bool {
    if require_specific || SPECIFIC_QUERY.is_match(query) {
        return false;
    }
    let overview_answered = OVERVIEW_QUERY.is_match(query)
        && summaries
            .iter()
            .any(|s| s.summary_len() > SUBSTANTIAL_SUMMARY_CHARS);
    let aggregate: usize = summaries.iter().map(CategoryMatch::summary_len).sum();
    overview_answered || aggregate > SUFFICIENT_AGGREGATE_CHARS
}

impl HybridScorer {
    pub async fn tiered_retrieval(
        &self,
        query: &str,
        candidates: Vec<ScoringCandidate>,
        options: &TieredOptions,
        context: &ScoringContext,
    ) -> Result<TieredResult> {
        let mut summaries = match &self.category_selector {
            Some(selector) => {
                let selection = CategorySelection {
                    max_categories: options.max_summaries,
                };
                selector.select_relevant_categories(query, &selection).await?
            }
            None => Vec::new(),
        };
        summaries.truncate(options.max_summaries);

        let sufficient =
            !summaries.is_empty() && summaries_sufficient(query, &summaries, options.require_specific_items);
        if sufficient {
            debug!("Answering '{}' from {} category summaries", query, summaries.len());
            return Ok(TieredResult {
                tier: Tier::Summary,
                summaries,
                items: Vec::new(),
                sufficient,
            });
        }

        let mut items = self.score(candidates, query, context).await?;
        items.truncate(options.max_items);
        let tier = if summaries.is_empty() { Tier::Item } else { Tier::Both };
        debug!(
            "Tiered retrieval for '{}': {:?} ({} summaries, {} items)",
            query,
            tier,
            summaries.len(),
            items.len()
        );

        Ok(TieredResult {
            tier,
            summaries,
            items,
            sufficient,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::scorer_with_store;
    use super::super::MockCategorySelector;
    use super::*;
    use std::sync::Arc;

    fn category(name: &str, summary_len: usize) -> CategoryMatch {
        CategoryMatch {
            name: name.to_string(),
            relevance: 0.8,
            summary: Some("x".repeat(summary_len)),
            item_count: 4,
        }
    }

    fn candidates() -> Vec<ScoringCandidate> {
        (0..5)
            .map(|i| ScoringCandidate::new(format!("c{}", i), "", 0.1 * i as f64))
            .collect()
    }

    fn selector_returning(matches: Vec<CategoryMatch>) -> Arc<MockCategorySelector> {
        let mut selector = MockCategorySelector::new();
        selector
            .expect_select_relevant_categories()
            .returning(move |_, _| Ok(matches.clone()));
        Arc::new(selector)
    }

    #[test]
    fn test_sufficiency_rules() {
        let long = vec![category("deploy", 300), category("infra", 300)];
        let short = vec![category("deploy", 150)];
        let tiny = vec![category("deploy", 50)];

        assert!(summaries_sufficient("what is our deployment setup", &long, false));
        assert!(summaries_sufficient("deployment setup", &long, false));
        assert!(summaries_sufficient("give me an overview of deployment", &short, false));
        assert!(!summaries_sufficient("deployment setup", &short, false));
        assert!(!summaries_sufficient("what is our deployment setup", &tiny, false));

        assert!(!summaries_sufficient("what is the exact error on deploy", &long, false));
        assert!(!summaries_sufficient("How to deploy", &long, false));
        assert!(!summaries_sufficient("what is our deployment setup", &long, true));
    }

    #[tokio::test]
    async fn test_overview_query_answered_by_summaries() {
        let (scorer, _store, _graph) = scorer_with_store();
        let scorer = scorer.with_category_selector(selector_returning(vec![category("deploy", 600)]));

        let result = scorer
            .tiered_retrieval(
                "what is the deployment overview",
                candidates(),
                &TieredOptions::default(),
                &ScoringContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(result.tier, Tier::Summary);
        assert!(result.sufficient);
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_specific_query_drills_down() {
        let (scorer, _store, _graph) = scorer_with_store();
        let scorer = scorer.with_category_selector(selector_returning(vec![category("deploy", 600)]));

        let options = TieredOptions {
            max_items: 3,
            ..Default::default()
        };
        let result = scorer
            .tiered_retrieval(
                "what is the deployment overview exact error",
                candidates(),
                &options,
                &ScoringContext::default(),
            )
            .await
            .unwrap();

        assert_ne!(result.tier, Tier::Summary);
        assert_eq!(result.tier, Tier::Both);
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.items[0].id, "c4");
    }

    #[tokio::test]
    async fn test_without_selector_returns_items() {
        let (scorer, _store, _graph) = scorer_with_store();
        let result = scorer
            .tiered_retrieval("overview", candidates(), &TieredOptions::default(), &ScoringContext::default())
            .await
            .unwrap();

        assert_eq!(result.tier, Tier::Item);
        assert_eq!(result.items.len(), 5);
    }

    #[tokio::test]
    async fn test_selector_respects_max_summaries() {
        let (scorer, _store, _graph) = scorer_with_store();
        let mut selector = MockCategorySelector::new();
        selector
            .expect_select_relevant_categories()
            .withf(|_, selection| selection.max_categories == 1)
            .times(1)
            .returning(|_, _| Ok(vec![category("a", 10), category("b", 10)]));
        let scorer = scorer.with_category_selector(Arc::new(selector));

        let options = TieredOptions {
            max_summaries: 1,
            ..Default::default()
        };
        let result = scorer
            .tiered_retrieval("anything", candidates(), &options, &ScoringContext::default())
            .await
            .unwrap();

        assert_eq!(result.summaries.len(), 1);
        assert_eq!(result.tier, Tier::Both);
    }
}

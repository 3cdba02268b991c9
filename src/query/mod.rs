//! The query side of the service: natural-language prompts in, collection
//! results out.

pub mod router;
pub mod translate;

use serde::{Deserialize, Serialize};

use crate::domain::Collection;
use crate::error::Result;
use crate::storage::Document;

pub use router::{QueryExecutionResult, QueryRouter};
pub use translate::QueryTranslator;

/// A validated query against exactly one collection.
///
/// `filter` uses the Mongo-style operator subset understood by storage.
/// The `query` alias accepts older assist responses that used that key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub collection: Collection,
    #[serde(alias = "query")]
    pub filter: Document,
}

/// The full envelope returned for one prompt: what was asked, what it was
/// translated to, and what came back.
#[derive(Debug, Clone, Serialize)]
pub struct PromptAnswer {
    pub original_prompt: String,
    pub structured_query: StructuredQuery,
    pub execution: QueryExecutionResult,
}

/// Translate a prompt and run the resulting query, end to end.
pub async fn answer_prompt(
    translator: &QueryTranslator,
    router: &QueryRouter,
    prompt: &str,
) -> Result<PromptAnswer> {
    let structured_query = translator.translate(prompt).await?;
    let execution = router.execute(&structured_query).await?;
    Ok(PromptAnswer {
        original_prompt: prompt.to_string(),
        structured_query,
        execution,
    })
}

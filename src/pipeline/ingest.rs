//! Ingestion Pipeline: batch orchestration of normalize -> parse -> persist.
//!
//! Failures are isolated per item: one bad record yields one FAILURE result
//! and the batch continues. The pipeline itself never errors for item-level
//! problems.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::{CanonicalEntity, EntityType, ProcessingResult};
use crate::error::{CmdbError, Result};
use crate::observability::metrics;
use crate::pipeline::normalize::FieldNormalizer;
use crate::pipeline::parse::EntityParser;
use crate::storage::Storage;

pub struct IngestPipeline {
    normalizer: FieldNormalizer,
    parser: EntityParser,
    storage: Arc<dyn Storage>,
}

impl IngestPipeline {
    pub fn new(normalizer: FieldNormalizer, parser: EntityParser, storage: Arc<dyn Storage>) -> Self {
        Self {
            normalizer,
            parser,
            storage,
        }
    }

    /// Process a batch of raw records. Returns one result per input item, in
    /// input order, all stamped with a single batch timestamp.
    ///
    /// An optional entity-type hint pins every item in the batch to one
    /// collection, skipping detection.
    pub async fn process(
        &self,
        items: &[Value],
        hint: Option<EntityType>,
    ) -> Vec<ProcessingResult> {
        let batch_timestamp = Utc::now();
        let mut results = Vec::with_capacity(items.len());

        info!(items = items.len(), "processing batch");
        metrics::ingest::batch_size(items.len());

        for (index, item) in items.iter().enumerate() {
            match self.process_single(item, hint).await {
                Ok(entity) => {
                    info!(
                        item = index + 1,
                        total = items.len(),
                        ci_id = entity.ci_id(),
                        "item processed"
                    );
                    metrics::ingest::record_processed("success");
                    results.push(ProcessingResult::success(&entity, batch_timestamp));
                }
                Err(e) => {
                    error!(item = index + 1, total = items.len(), error = %e, "item failed");
                    metrics::ingest::record_processed("failure");
                    results.push(ProcessingResult::failure(
                        format!("failed to process item {}: {}", index + 1, e),
                        batch_timestamp,
                    ));
                }
            }
        }

        results
    }

    /// Normalize, parse and persist one raw record.
    pub async fn process_single(
        &self,
        item: &Value,
        hint: Option<EntityType>,
    ) -> Result<CanonicalEntity> {
        let raw = item.as_object().ok_or_else(|| {
            CmdbError::Validation(vec!["record must be a JSON object".to_string()])
        })?;

        let mapping = self.normalizer.normalize(raw, hint).await?;
        let entity = self
            .parser
            .parse(mapping.entity_type, &mapping.normalized_data)?;
        self.storage.create(&entity).await?;
        Ok(entity)
    }
}

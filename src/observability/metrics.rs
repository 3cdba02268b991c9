//! Metrics for the CMDB service, recorded through the `metrics` facade using
//! Prometheus naming conventions. Installing a recorder is the embedding
//! application's choice; without one these calls are no-ops.

use std::fmt;

/// All metric names used by the service, to avoid magic strings at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Ingest metrics
    IngestRecordsProcessed,
    IngestBatchSize,

    // Normalize metrics
    NormalizeMappings,
    NormalizeUnmappedFields,
    NormalizeFallbacks,
    NormalizeConfidence,

    // Query metrics
    QueryTranslations,
    QueryTranslationErrors,
    QueryResultCount,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::IngestRecordsProcessed => "cmdb_ingest_records_processed_total",
            MetricName::IngestBatchSize => "cmdb_ingest_batch_size",
            MetricName::NormalizeMappings => "cmdb_normalize_mappings_total",
            MetricName::NormalizeUnmappedFields => "cmdb_normalize_unmapped_fields_total",
            MetricName::NormalizeFallbacks => "cmdb_normalize_fallbacks_total",
            MetricName::NormalizeConfidence => "cmdb_normalize_confidence",
            MetricName::QueryTranslations => "cmdb_query_translations_total",
            MetricName::QueryTranslationErrors => "cmdb_query_translation_errors_total",
            MetricName::QueryResultCount => "cmdb_query_result_count",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Ingest Metrics
// ============================================================================

pub mod ingest {
    use super::MetricName;

    /// Record one processed record with its outcome ("success" or "failure").
    pub fn record_processed(status: &str) {
        ::metrics::counter!(
            MetricName::IngestRecordsProcessed.as_str(),
            "status" => status.to_string()
        )
        .increment(1);
    }

    /// Record the size of an incoming batch.
    pub fn batch_size(size: usize) {
        ::metrics::histogram!(MetricName::IngestBatchSize.as_str()).record(size as f64);
    }
}

// ============================================================================
// Normalize Metrics
// ============================================================================

pub mod normalize {
    use super::MetricName;

    /// Record one accepted field mapping with its source ("ai" or "heuristic").
    pub fn mapping_recorded(source: &str) {
        ::metrics::counter!(
            MetricName::NormalizeMappings.as_str(),
            "source" => source.to_string()
        )
        .increment(1);
    }

    /// Record a field that could not be mapped to the canonical schema.
    pub fn unmapped_field() {
        ::metrics::counter!(MetricName::NormalizeUnmappedFields.as_str()).increment(1);
    }

    /// Record a fall back from AI assist to the heuristic path.
    pub fn fallback_used() {
        ::metrics::counter!(MetricName::NormalizeFallbacks.as_str()).increment(1);
    }

    /// Record the overall confidence of one normalization.
    pub fn confidence_recorded(confidence: f64) {
        ::metrics::histogram!(MetricName::NormalizeConfidence.as_str()).record(confidence);
    }
}

// ============================================================================
// Query Metrics
// ============================================================================

pub mod query {
    use super::MetricName;

    /// Record a successful prompt translation.
    pub fn translated(collection: &str) {
        ::metrics::counter!(
            MetricName::QueryTranslations.as_str(),
            "collection" => collection.to_string()
        )
        .increment(1);
    }

    /// Record a failed translation ("assist", "timeout" or "invalid").
    pub fn translation_failed(reason: &str) {
        ::metrics::counter!(
            MetricName::QueryTranslationErrors.as_str(),
            "reason" => reason.to_string()
        )
        .increment(1);
    }

    /// Record the result count of an executed query.
    pub fn executed(collection: &str, count: usize) {
        ::metrics::histogram!(
            MetricName::QueryResultCount.as_str(),
            "collection" => collection.to_string()
        )
        .record(count as f64);
    }
}

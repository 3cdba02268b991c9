//! The ingestion side of the service: raw records in, canonical entities out.

pub mod ingest;
pub mod normalize;
pub mod parse;

pub use ingest::IngestPipeline;
pub use normalize::{FieldMapping, FieldNormalizer, MappingResult, MappingSource};
pub use parse::EntityParser;

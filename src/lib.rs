//! CMDB ingestion and query service.
//!
//! Raw records from arbitrary upstream systems are normalized onto a
//! canonical schema, validated into immutable entities and persisted through
//! an abstract storage port. Natural-language prompts are translated into
//! single-collection structured queries and executed against the same store.

pub mod ai;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod storage;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CmdbError {
    #[error("ambiguous entity type: {0}")]
    AmbiguousEntityType(String),

    #[error("schema registry unavailable: {0}")]
    SchemaUnavailable(String),

    #[error("unsupported entity type: {0}")]
    UnsupportedEntityType(String),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("query cannot be translated: {0}")]
    UntranslatableQuery(String),

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("query execution failed: {0}")]
    QueryExecution(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("AI assist failed: {0}")]
    Assist(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CmdbError>;

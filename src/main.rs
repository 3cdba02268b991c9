use clap::{Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use cmdb_service::ai::openai::OpenAiAssist;
use cmdb_service::config::Settings;
use cmdb_service::domain::{EntityType, ProcessingStatus};
use cmdb_service::error::CmdbError;
use cmdb_service::logging;
use cmdb_service::pipeline::{EntityParser, FieldNormalizer, IngestPipeline};
use cmdb_service::query::{answer_prompt, QueryRouter, QueryTranslator};
use cmdb_service::schema::SchemaRegistry;
use cmdb_service::storage::{InMemoryStorage, Storage};

#[derive(Parser)]
#[command(name = "cmdb-service")]
#[command(about = "CMDB ingestion pipeline and natural-language query service")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a JSON file of raw records into the CMDB
    Ingest {
        /// Path to a JSON file containing an array of raw records
        #[arg(long)]
        file: String,
        /// Pin every record to one entity type (user, application, device)
        #[arg(long)]
        entity_type: Option<String>,
    },
    /// Translate a natural-language prompt into a query and run it
    Ask {
        /// The question, e.g. "show all users without MFA"
        #[arg(long)]
        prompt: String,
        /// Optional JSON file of raw records to ingest before querying
        #[arg(long)]
        seed: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init_logging();
    let settings = Settings::load()?;

    let registry = match &settings.schema_path {
        Some(path) => Arc::new(SchemaRegistry::from_file(path)?),
        None => Arc::new(SchemaRegistry::builtin().clone()),
    };
    let assist = OpenAiAssist::from_settings(&settings, registry.clone());

    if settings.database_type != "memory" {
        return Err(CmdbError::Config(format!(
            "unsupported database_type '{}'",
            settings.database_type
        ))
        .into());
    }
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    info!(database_type = %settings.database_type, "storage initialized");

    let pipeline = IngestPipeline::new(
        FieldNormalizer::new(registry.clone(), assist.clone(), &settings),
        EntityParser::new(registry.clone()),
        storage.clone(),
    );

    match cli.command {
        Commands::Ingest { file, entity_type } => {
            let hint = entity_type
                .as_deref()
                .map(str::parse::<EntityType>)
                .transpose()?;

            println!("📥 Ingesting records from: {}", file);
            let results = ingest_file(&pipeline, &file, hint).await?;

            let succeeded = results
                .iter()
                .filter(|r| r.status == ProcessingStatus::Success)
                .count();
            println!(
                "✅ Ingestion completed: {} succeeded, {} failed",
                succeeded,
                results.len() - succeeded
            );
            for result in results.iter().filter(|r| r.status == ProcessingStatus::Failure) {
                println!("   ⚠️  {}", result.message);
            }
        }
        Commands::Ask { prompt, seed } => {
            let Some(assist) = assist else {
                return Err(CmdbError::Config(
                    "AI assist is required for prompts; set enable_ai_field_mapping = true \
                     and OPENAI_API_KEY"
                        .to_string(),
                )
                .into());
            };

            if let Some(seed_file) = seed {
                println!("📥 Seeding records from: {}", seed_file);
                let results = ingest_file(&pipeline, &seed_file, None).await?;
                let succeeded = results
                    .iter()
                    .filter(|r| r.status == ProcessingStatus::Success)
                    .count();
                println!("   {} of {} records loaded", succeeded, results.len());
            }

            println!("🔎 Asking: {}", prompt);
            let translator = QueryTranslator::new(assist, registry, &settings);
            let router = QueryRouter::new(storage);
            let answer = answer_prompt(&translator, &router, &prompt).await?;

            println!(
                "✅ {} result(s) from '{}'",
                answer.execution.count, answer.execution.collection
            );
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
    }

    Ok(())
}

async fn ingest_file(
    pipeline: &IngestPipeline,
    path: &str,
    hint: Option<EntityType>,
) -> anyhow::Result<Vec<cmdb_service::domain::ProcessingResult>> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    Ok(pipeline.process(&items, hint).await)
}

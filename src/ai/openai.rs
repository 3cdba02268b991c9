//! OpenAI-backed implementation of the [`AiAssist`] capability.
//!
//! Talks to the chat-completions API with low temperature; responses are
//! treated as untrusted text and bracket-scanned for JSON before parsing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{extract_json_array, extract_json_object, AiAssist, EntityGuess, ProposedMapping};
use crate::config::Settings;
use crate::domain::EntityType;
use crate::schema::SchemaRegistry;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiAssist {
    client: reqwest::Client,
    api_key: String,
    model: String,
    registry: Arc<SchemaRegistry>,
}

impl OpenAiAssist {
    pub fn new(api_key: String, model: String, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            registry,
        }
    }

    /// Build the shared assist from settings, or `None` when AI mapping is
    /// disabled or no API key is configured. Constructed once at startup and
    /// passed by reference to consumers.
    pub fn from_settings(
        settings: &Settings,
        registry: Arc<SchemaRegistry>,
    ) -> Option<Arc<dyn AiAssist>> {
        if !settings.enable_ai_field_mapping {
            return None;
        }
        match settings.openai_api_key() {
            Some(key) => Some(Arc::new(OpenAiAssist::new(
                key,
                settings.openai_model.clone(),
                registry,
            ))),
            None => {
                warn!("AI field mapping enabled but no API key configured, assist disabled");
                None
            }
        }
    }

    async fn chat(&self, system_prompt: String, user_prompt: String) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.1,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("chat response contained no choices"))?;

        debug!(model = %self.model, "chat completion received");
        Ok(content)
    }

    fn canonical_fields_context(&self, entity_type: EntityType) -> Value {
        let fields: Vec<Value> = self
            .registry
            .fields(entity_type)
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "description": spec.description,
                    "type": spec.field_type.type_name(),
                    "variations": spec.variations,
                })
            })
            .collect();
        Value::Array(fields)
    }
}

#[async_trait]
impl AiAssist for OpenAiAssist {
    async fn classify_entity(
        &self,
        field_names: &[String],
        sample: &Value,
    ) -> anyhow::Result<EntityGuess> {
        let system_prompt = "You are an expert at analyzing data structures for a Configuration \
             Management Database (CMDB).\n\n\
             Determine what type of entity the given data fields represent.\n\n\
             Entity type descriptions:\n\
             - users: people/employees with fields like name, team, mfa_enabled, last_login\n\
             - applications: software systems with fields like name, owner, type, usage_count, integrations\n\
             - devices: physical hardware with fields like hostname, ip_address, os, assigned_user, location\n\n\
             Return ONLY a JSON object: {\"entity_type\": \"users|applications|devices\", \"confidence\": 0.0-1.0}"
            .to_string();

        let user_prompt = format!(
            "Analyze these data fields and determine the entity type:\n\n\
             Fields: {}\n\
             Sample values: {}\n\n\
             Return only the JSON object.",
            json!(field_names),
            sample
        );

        let response = self.chat(system_prompt, user_prompt).await?;
        let payload = extract_json_object(&response)
            .ok_or_else(|| anyhow::anyhow!("no JSON object in classification response"))?;
        let guess: RawGuess = serde_json::from_str(payload)?;
        let entity_type: EntityType = guess
            .entity_type
            .parse()
            .map_err(|_| anyhow::anyhow!("unsupported entity type label '{}'", guess.entity_type))?;
        Ok(EntityGuess {
            entity_type,
            confidence: guess.confidence.clamp(0.0, 1.0),
        })
    }

    async fn map_fields(
        &self,
        entity_type: EntityType,
        field_names: &[String],
    ) -> anyhow::Result<Vec<ProposedMapping>> {
        let system_prompt = format!(
            "You are an expert field mapper for database systems. Map input field names to \
             canonical field names.\n\n\
             Entity type: {entity_type}\n\n\
             Available canonical fields:\n{fields}\n\n\
             Rules:\n\
             1. Map each input field to the most appropriate canonical field, considering the \
             type of the field. An array should map to an array.\n\
             2. If no good match exists, set canonical_field to null.\n\
             3. Provide a confidence score (0-1) for each mapping.\n\
             4. Consider semantic meaning, not just string similarity.\n\n\
             Return a JSON array:\n\
             [{{\"original_field\": \"input_field_name\", \"canonical_field\": \
             \"canonical_name_or_null\", \"confidence\": 0.95}}]",
            entity_type = entity_type,
            fields = serde_json::to_string_pretty(&self.canonical_fields_context(entity_type))?,
        );

        let user_prompt = format!(
            "Map these input fields to canonical fields:\n\nInput fields: {}\n\n\
             Return the mapping as a JSON array.",
            json!(field_names)
        );

        let response = self.chat(system_prompt, user_prompt).await?;
        let payload = extract_json_array(&response)
            .ok_or_else(|| anyhow::anyhow!("no JSON array in field-mapping response"))?;
        let mappings: Vec<ProposedMapping> = serde_json::from_str(payload)?;
        Ok(mappings)
    }

    async fn translate_query(
        &self,
        prompt: &str,
        schema_context: &Value,
    ) -> anyhow::Result<Value> {
        let system_prompt = format!(
            "You are a document-store query expert. Convert natural language to structured \
             queries over a CMDB.\n\n\
             IMPORTANT RULES:\n\
             1. Return ONLY valid JSON of the form {{\"collection\": \"name\", \"filter\": {{...}}}}.\n\
             2. The collection must be exactly one of: users, applications, devices.\n\
             3. Allowed filter operators: $eq, $ne, $gt, $gte, $lt, $lte, $in, $nin, $exists, \
             $regex (with $options: \"i\" for case-insensitive text search), $and, $or.\n\
             4. ONLY use fields defined in the collection schemas below.\n\
             5. Joins are not supported. If the request needs data from more than one \
             collection, return {{\"error\": \"<reason>\"}} instead of a query.\n\n\
             Collections schema, context and examples:\n{schema}",
            schema = serde_json::to_string_pretty(schema_context)?,
        );

        let user_prompt = format!("Convert to a structured query: {}", prompt);

        let response = self.chat(system_prompt, user_prompt).await?;
        let payload = extract_json_object(&response)
            .ok_or_else(|| anyhow::anyhow!("no JSON object in translation response"))?;
        Ok(serde_json::from_str(payload)?)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct RawGuess {
    entity_type: String,
    #[serde(default)]
    confidence: f64,
}

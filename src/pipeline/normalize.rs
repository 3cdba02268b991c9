//! Field Normalizer: entity-type detection and raw-to-canonical field mapping.
//!
//! Mapping runs as a confidence-scored strategy chain: the AI assist proposes
//! first (when available), and deterministic variation matching against the
//! schema registry is the fallback. AI unavailability or low confidence never
//! surfaces as an error; it only degrades mapping completeness.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::ai::{AiAssist, ProposedMapping};
use crate::config::Settings;
use crate::domain::EntityType;
use crate::error::{CmdbError, Result};
use crate::observability::metrics;
use crate::pipeline::parse::parse_datetime;
use crate::schema::{FieldType, SchemaRegistry};

/// Minimum fraction of raw fields that must match a type's vocabulary for
/// heuristic detection to pick it.
const MIN_TYPE_MATCH: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    Ai,
    Heuristic,
}

impl MappingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingSource::Ai => "ai",
            MappingSource::Heuristic => "heuristic",
        }
    }
}

/// One accepted raw-to-canonical mapping.
#[derive(Debug, Clone, Serialize)]
pub struct FieldMapping {
    pub raw_field: String,
    pub canonical_field: String,
    pub confidence: f64,
    pub source: MappingSource,
}

/// Outcome of normalizing one raw record.
///
/// Every key of `normalized_data` is a canonical field of `entity_type`;
/// `unmapped_fields` never overlaps the mapped raw names.
#[derive(Debug, Clone, Serialize)]
pub struct MappingResult {
    pub entity_type: EntityType,
    pub mappings: Vec<FieldMapping>,
    pub normalized_data: Map<String, Value>,
    pub unmapped_fields: Vec<String>,
    /// Mean confidence across accepted mappings, 0.0 when nothing mapped.
    pub confidence: f64,
}

pub struct FieldNormalizer {
    registry: Arc<SchemaRegistry>,
    assist: Option<Arc<dyn AiAssist>>,
    mapping_confidence_floor: f64,
    classify_confidence_floor: f64,
    assist_timeout: Duration,
}

impl FieldNormalizer {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        assist: Option<Arc<dyn AiAssist>>,
        settings: &Settings,
    ) -> Self {
        Self {
            registry,
            assist,
            mapping_confidence_floor: settings.mapping_confidence_floor,
            classify_confidence_floor: settings.classify_confidence_floor,
            assist_timeout: settings.assist_timeout(),
        }
    }

    /// A normalizer with no AI assist; mapping relies entirely on the
    /// deterministic variation matching.
    pub fn heuristic_only(registry: Arc<SchemaRegistry>) -> Self {
        Self::new(registry, None, &Settings::default())
    }

    /// Detect the entity type of `raw` (unless hinted) and map its fields to
    /// canonical names. The input is never mutated.
    pub async fn normalize(
        &self,
        raw: &Map<String, Value>,
        hint: Option<EntityType>,
    ) -> Result<MappingResult> {
        let field_names: Vec<String> = raw.keys().cloned().collect();

        let entity_type = match hint {
            Some(entity_type) => entity_type,
            None => self.detect_entity_type(raw, &field_names).await?,
        };
        debug!(%entity_type, fields = field_names.len(), "normalizing record");

        let proposals = self.ai_proposals(entity_type, &field_names).await;

        let mut mappings = Vec::new();
        let mut normalized_data = Map::new();
        let mut unmapped_fields = Vec::new();

        for (raw_field, value) in raw {
            let candidate = self
                .ai_candidate(entity_type, raw_field, &proposals)
                .or_else(|| self.heuristic_candidate(entity_type, raw_field, value));

            let Some((canonical_field, confidence, source)) = candidate else {
                warn!(raw_field, "could not map field");
                unmapped_fields.push(raw_field.clone());
                continue;
            };

            if normalized_data.contains_key(&canonical_field) {
                // Two raw fields resolved to the same canonical field; the
                // first mapping stands.
                warn!(raw_field, canonical_field, "duplicate mapping target");
                unmapped_fields.push(raw_field.clone());
                continue;
            }

            // The field spec exists for any accepted candidate
            let Some(spec) = self.registry.field(entity_type, &canonical_field) else {
                unmapped_fields.push(raw_field.clone());
                continue;
            };
            let Some(coerced) = coerce_value(value, spec.field_type) else {
                warn!(
                    raw_field,
                    canonical_field,
                    expected = spec.field_type.type_name(),
                    "value not coercible, dropping field"
                );
                unmapped_fields.push(raw_field.clone());
                continue;
            };

            metrics::normalize::mapping_recorded(source.as_str());
            normalized_data.insert(canonical_field.clone(), coerced);
            mappings.push(FieldMapping {
                raw_field: raw_field.clone(),
                canonical_field,
                confidence,
                source,
            });
        }

        for _ in &unmapped_fields {
            metrics::normalize::unmapped_field();
        }

        let confidence = if mappings.is_empty() {
            0.0
        } else {
            mappings.iter().map(|m| m.confidence).sum::<f64>() / mappings.len() as f64
        };
        metrics::normalize::confidence_recorded(confidence);

        info!(
            %entity_type,
            mapped = mappings.len(),
            unmapped = unmapped_fields.len(),
            confidence,
            "field mapping completed"
        );

        Ok(MappingResult {
            entity_type,
            mappings,
            normalized_data,
            unmapped_fields,
            confidence,
        })
    }

    async fn detect_entity_type(
        &self,
        raw: &Map<String, Value>,
        field_names: &[String],
    ) -> Result<EntityType> {
        if let Some(assist) = &self.assist {
            let sample = value_sample(raw);
            match timeout(
                self.assist_timeout,
                assist.classify_entity(field_names, &sample),
            )
            .await
            {
                Ok(Ok(guess)) if guess.confidence >= self.classify_confidence_floor => {
                    info!(entity_type = %guess.entity_type, confidence = guess.confidence, "AI classified entity type");
                    return Ok(guess.entity_type);
                }
                Ok(Ok(guess)) => {
                    warn!(
                        entity_type = %guess.entity_type,
                        confidence = guess.confidence,
                        floor = self.classify_confidence_floor,
                        "AI classification below confidence floor, falling back to heuristics"
                    );
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "AI classification failed, falling back to heuristics");
                }
                Err(_) => {
                    warn!("AI classification timed out, falling back to heuristics");
                }
            }
            metrics::normalize::fallback_used();
        }

        self.heuristic_entity_type(field_names)
    }

    /// Score each candidate type by the fraction of raw field names in its
    /// vocabulary; the max-scoring type wins if it clears the floor, ties
    /// broken by the fixed priority order user > application > device.
    fn heuristic_entity_type(&self, field_names: &[String]) -> Result<EntityType> {
        let mut best: Option<(EntityType, f64)> = None;
        for entity_type in EntityType::ALL {
            let score = self.registry.type_score(entity_type, field_names);
            debug!(%entity_type, score, "heuristic type score");
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((entity_type, score));
            }
        }

        match best {
            Some((entity_type, score)) if score >= MIN_TYPE_MATCH => {
                info!(%entity_type, score, "heuristic entity detection");
                Ok(entity_type)
            }
            _ => Err(CmdbError::AmbiguousEntityType(format!(
                "no entity type matched fields [{}] with sufficient confidence",
                field_names.join(", ")
            ))),
        }
    }

    async fn ai_proposals(
        &self,
        entity_type: EntityType,
        field_names: &[String],
    ) -> HashMap<String, ProposedMapping> {
        let Some(assist) = &self.assist else {
            return HashMap::new();
        };
        match timeout(
            self.assist_timeout,
            assist.map_fields(entity_type, field_names),
        )
        .await
        {
            Ok(Ok(proposals)) => proposals
                .into_iter()
                .map(|p| (p.raw_field.clone(), p))
                .collect(),
            Ok(Err(e)) => {
                warn!(error = %e, "AI field mapping failed, falling back to exact matching");
                metrics::normalize::fallback_used();
                HashMap::new()
            }
            Err(_) => {
                warn!("AI field mapping timed out, falling back to exact matching");
                metrics::normalize::fallback_used();
                HashMap::new()
            }
        }
    }

    fn ai_candidate(
        &self,
        entity_type: EntityType,
        raw_field: &str,
        proposals: &HashMap<String, ProposedMapping>,
    ) -> Option<(String, f64, MappingSource)> {
        let proposal = proposals.get(raw_field)?;
        let canonical = proposal.canonical_field.as_deref()?;
        if proposal.confidence < self.mapping_confidence_floor {
            debug!(
                raw_field,
                canonical,
                confidence = proposal.confidence,
                "AI mapping below confidence floor"
            );
            return None;
        }
        // Only accept canonical names the registry actually defines
        self.registry.field(entity_type, canonical)?;
        Some((canonical.to_string(), proposal.confidence, MappingSource::Ai))
    }

    /// First field spec, in declared order, whose variation set accepts the
    /// raw name and whose type can represent the value. A raw name like
    /// "group" is a synonym of both `team` and `permission_group`; the value
    /// shape disambiguates.
    fn heuristic_candidate(
        &self,
        entity_type: EntityType,
        raw_field: &str,
        value: &Value,
    ) -> Option<(String, f64, MappingSource)> {
        self.registry
            .fields(entity_type)
            .iter()
            .filter(|spec| spec.accepts(raw_field))
            .find(|spec| coerce_value(value, spec.field_type).is_some())
            .map(|spec| (spec.name.clone(), 1.0, MappingSource::Heuristic))
    }
}

/// First few values, truncated, for the classification prompt.
fn value_sample(raw: &Map<String, Value>) -> Value {
    let mut sample = Map::new();
    for (key, value) in raw.iter().take(5) {
        let rendered = value.to_string();
        let truncated: String = rendered.chars().take(50).collect();
        sample.insert(key.clone(), json!(truncated));
    }
    Value::Object(sample)
}

/// Light value coercion for a successfully mapped field. Returns `None` when
/// the value cannot be represented as the canonical type.
fn coerce_value(value: &Value, field_type: FieldType) -> Option<Value> {
    match field_type {
        FieldType::String => match value {
            Value::String(s) => Some(json!(s)),
            Value::Number(n) => Some(json!(n.to_string())),
            _ => None,
        },
        FieldType::Boolean => match value {
            Value::Bool(b) => Some(json!(b)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" | "enabled" => Some(json!(true)),
                "false" | "no" | "0" | "disabled" => Some(json!(false)),
                _ => None,
            },
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(json!(false)),
                Some(1) => Some(json!(true)),
                _ => None,
            },
            _ => None,
        },
        FieldType::Number => match value {
            Value::Number(n) => Some(Value::Number(n.clone())),
            Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Some(json!(i))
                } else {
                    trimmed.parse::<f64>().ok().map(|f| json!(f))
                }
            }
            _ => None,
        },
        FieldType::DateTime => match value {
            Value::String(s) => parse_datetime(s).map(|_| json!(s)),
            _ => None,
        },
        FieldType::StringArray => match value {
            Value::Array(items) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect();
                strings.map(|s| json!(s))
            }
            // Multi-valued field supplied as a scalar
            Value::String(s) => Some(json!([s])),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::EntityGuess;
    use async_trait::async_trait;

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::builtin().clone())
    }

    fn heuristic_normalizer() -> FieldNormalizer {
        FieldNormalizer::heuristic_only(registry())
    }

    #[tokio::test]
    async fn heuristic_fallback_maps_known_variations() {
        let normalizer = heuristic_normalizer();
        let record = raw(json!({
            "full_name": "Jane Doe",
            "group": ["Engineering"],
            "mfa_status": true,
        }));

        let result = normalizer.normalize(&record, None).await.unwrap();
        assert_eq!(result.entity_type, EntityType::User);
        assert_eq!(result.normalized_data.get("name"), Some(&json!("Jane Doe")));
        assert_eq!(result.normalized_data.get("mfa_enabled"), Some(&json!(true)));
        // "group" is a synonym of both team and permission_group; the array
        // value rules out the string-typed team field.
        assert_eq!(
            result.normalized_data.get("permission_group"),
            Some(&json!(["Engineering"]))
        );
        assert!(result.unmapped_fields.is_empty());
        assert!(result
            .mappings
            .iter()
            .all(|m| m.source == MappingSource::Heuristic));
    }

    #[tokio::test]
    async fn scalar_group_resolves_to_team() {
        let normalizer = heuristic_normalizer();
        let record = raw(json!({
            "full_name": "Jane Doe",
            "group": "Engineering",
        }));

        let result = normalizer.normalize(&record, None).await.unwrap();
        assert_eq!(
            result.normalized_data.get("team"),
            Some(&json!("Engineering"))
        );
        assert!(result.normalized_data.get("permission_group").is_none());
    }

    #[tokio::test]
    async fn unmapped_fields_are_disjoint_from_mapped_names() {
        let normalizer = heuristic_normalizer();
        let record = raw(json!({
            "full_name": "Jane Doe",
            "favorite_color": "green",
            "mfa_status": "yes",
        }));

        let result = normalizer.normalize(&record, None).await.unwrap();
        assert_eq!(result.unmapped_fields, vec!["favorite_color".to_string()]);
        for mapping in &result.mappings {
            assert!(!result.unmapped_fields.contains(&mapping.raw_field));
        }
        assert_eq!(result.normalized_data.get("mfa_enabled"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn unknown_field_set_is_ambiguous() {
        let normalizer = heuristic_normalizer();
        let record = raw(json!({"foo": 1, "bar": 2, "baz": 3}));

        let err = normalizer.normalize(&record, None).await.unwrap_err();
        assert!(matches!(err, CmdbError::AmbiguousEntityType(_)));
    }

    #[tokio::test]
    async fn hint_overrides_detection() {
        let normalizer = heuristic_normalizer();
        let record = raw(json!({"foo": 1, "name": "Payroll"}));

        let result = normalizer
            .normalize(&record, Some(EntityType::Application))
            .await
            .unwrap();
        assert_eq!(result.entity_type, EntityType::Application);
        assert_eq!(result.normalized_data.get("name"), Some(&json!("Payroll")));
    }

    #[tokio::test]
    async fn device_vocabulary_wins_for_device_records() {
        let normalizer = heuristic_normalizer();
        let record = raw(json!({
            "computer_name": "wks-042",
            "ip": "10.0.0.7",
            "operating_system": "ubuntu",
        }));

        let result = normalizer.normalize(&record, None).await.unwrap();
        assert_eq!(result.entity_type, EntityType::Device);
        assert_eq!(result.normalized_data.get("hostname"), Some(&json!("wks-042")));
        assert_eq!(result.normalized_data.get("os"), Some(&json!("ubuntu")));
    }

    #[test]
    fn coercion_rules() {
        assert_eq!(
            coerce_value(&json!("admin"), FieldType::StringArray),
            Some(json!(["admin"]))
        );
        assert_eq!(coerce_value(&json!("42"), FieldType::Number), Some(json!(42)));
        assert_eq!(coerce_value(&json!(1), FieldType::Boolean), Some(json!(true)));
        assert_eq!(
            coerce_value(&json!("2024-01-15T10:30:00Z"), FieldType::DateTime),
            Some(json!("2024-01-15T10:30:00Z"))
        );
        assert_eq!(coerce_value(&json!("not a date"), FieldType::DateTime), None);
        assert_eq!(coerce_value(&json!({"nested": 1}), FieldType::String), None);
    }

    struct ScriptedAssist {
        guess: EntityGuess,
        proposals: Vec<ProposedMapping>,
    }

    #[async_trait]
    impl AiAssist for ScriptedAssist {
        async fn classify_entity(
            &self,
            _field_names: &[String],
            _sample: &Value,
        ) -> anyhow::Result<EntityGuess> {
            Ok(self.guess)
        }

        async fn map_fields(
            &self,
            _entity_type: EntityType,
            _field_names: &[String],
        ) -> anyhow::Result<Vec<ProposedMapping>> {
            Ok(self.proposals.clone())
        }

        async fn translate_query(
            &self,
            _prompt: &str,
            _schema_context: &Value,
        ) -> anyhow::Result<Value> {
            anyhow::bail!("not used")
        }
    }

    #[tokio::test]
    async fn confident_ai_proposals_take_precedence() {
        let assist = Arc::new(ScriptedAssist {
            guess: EntityGuess {
                entity_type: EntityType::User,
                confidence: 0.95,
            },
            proposals: vec![ProposedMapping {
                raw_field: "worker".to_string(),
                canonical_field: Some("name".to_string()),
                confidence: 0.91,
            }],
        });
        let normalizer = FieldNormalizer::new(
            registry(),
            Some(assist),
            &Settings::default(),
        );

        // "worker" is not in any variation set; only the AI can map it.
        let record = raw(json!({"worker": "Jane Doe"}));
        let result = normalizer.normalize(&record, None).await.unwrap();
        assert_eq!(result.entity_type, EntityType::User);
        assert_eq!(result.normalized_data.get("name"), Some(&json!("Jane Doe")));
        assert_eq!(result.mappings[0].source, MappingSource::Ai);
    }

    #[tokio::test]
    async fn low_confidence_ai_proposal_falls_back_to_heuristics() {
        let assist = Arc::new(ScriptedAssist {
            guess: EntityGuess {
                entity_type: EntityType::Device,
                // Below the classification floor: heuristics decide the type.
                confidence: 0.2,
            },
            proposals: vec![ProposedMapping {
                raw_field: "full_name".to_string(),
                canonical_field: Some("team".to_string()),
                confidence: 0.1,
            }],
        });
        let normalizer = FieldNormalizer::new(
            registry(),
            Some(assist),
            &Settings::default(),
        );

        let record = raw(json!({"full_name": "Jane Doe", "mfa_status": false}));
        let result = normalizer.normalize(&record, None).await.unwrap();
        assert_eq!(result.entity_type, EntityType::User);
        // The low-confidence AI mapping is ignored; exact matching wins.
        assert_eq!(result.normalized_data.get("name"), Some(&json!("Jane Doe")));
    }
}

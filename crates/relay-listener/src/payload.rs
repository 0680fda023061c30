use relay_broker_uri::ResourceKey;
use serde::Deserialize;

fn value_to_key_part(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One entry of `AFFECTED_ENTITIES`. `ENTITY_ID` is accepted as either a
/// JSON string or number since the wire examples use both.
#[derive(Debug, Clone, Deserialize)]
pub struct AffectedEntity {
    #[serde(rename = "ENTITY_ID")]
    entity_id: serde_json::Value,
}

impl AffectedEntity {
    pub fn entity_id(&self) -> String {
        value_to_key_part(&self.entity_id)
    }
}

/// The Senzing-style INFO message shape: `DATA_SOURCE`, `RECORD_ID`,
/// `AFFECTED_ENTITIES[{ENTITY_ID,...}]`.
#[derive(Debug, Clone, Deserialize)]
pub struct InfoPayload {
    #[serde(rename = "DATA_SOURCE")]
    data_source: Option<String>,
    #[serde(rename = "RECORD_ID")]
    record_id: Option<serde_json::Value>,
    #[serde(rename = "AFFECTED_ENTITIES", default)]
    affected_entities: Vec<AffectedEntity>,
}

impl InfoPayload {
    /// Recognizes the shape. Valid JSON that carries neither a record id
    /// nor any affected entities isn't an INFO message worth scheduling
    /// anything for, so this returns `None` for it too.
    pub fn parse(value: &serde_json::Value) -> Option<Self> {
        let payload: Self = serde_json::from_value(value.clone()).ok()?;
        if payload.record_id.is_none() && payload.affected_entities.is_empty() {
            return None;
        }
        Some(payload)
    }

    pub fn data_source(&self) -> Option<&str> {
        self.data_source.as_deref()
    }

    pub fn record_id(&self) -> Option<String> {
        self.record_id.as_ref().map(value_to_key_part)
    }

    pub fn affected_entities(&self) -> &[AffectedEntity] {
        &self.affected_entities
    }

    /// The resource-key set this payload touches: the record key (data
    /// source plus record id, so the same `RECORD_ID` from two different
    /// data sources locks separately) plus one key per affected entity.
    pub fn derive_resource_keys(&self) -> Vec<ResourceKey> {
        let mut keys = Vec::with_capacity(1 + self.affected_entities.len());
        if let Some(id) = self.record_id() {
            let data_source = self.data_source().unwrap_or("").to_string();
            keys.push(ResourceKey::new("RECORD", vec![data_source, id]));
        }
        for entity in &self.affected_entities {
            keys.push(ResourceKey::single("ENTITY", entity.entity_id()));
        }
        keys
    }
}

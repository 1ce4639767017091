//! Records exchanged with the inference backend.
//!
//! Field doc comments double as the schema descriptions the model sees, so they are
//! written for the model rather than for Rust readers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a conversation. Order within a history is chronological.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

/// Input of the diagnosis flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DiagnoseInput {
    /// A photo of a plant, as a data URI that must include a MIME type and use Base64 encoding. Expected format: 'data:<mimetype>;base64,<encoded_data>'.
    pub photo_data_uri: String,
}

/// Outcome of a photo diagnosis.
///
/// `disease` is `"None"` for a healthy plant by convention only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DiagnosisResult {
    /// Whether or not the plant is healthy.
    pub is_healthy: bool,
    /// The common name of the disease if the plant is not healthy, otherwise 'None'.
    pub disease: String,
    /// A suggested remedy if the plant is not healthy.
    pub remedy: String,
}

/// Input of the growing-conditions flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConditionsInput {
    /// The name of the plant to generate growing conditions for.
    pub plant_name: String,
}

/// Sensor thresholds and care notes for one plant.
///
/// Values are not range-checked; the model decides them and the user may edit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GrowingConditions {
    /// Soil moisture percentage below which the soil is considered too dry and the plant needs watering.
    pub soil_dry_threshold: f64,
    /// Maximum acceptable reading of an MQ2 gas sensor near the plant, in ppm.
    pub mq2_threshold: f64,
    /// Ideal air temperature for the plant, in degrees Celsius.
    pub temp_threshold: f64,
    /// Minimum light level the plant needs, in lux.
    pub light_threshold: f64,
    /// Practical care advice covering sunlight, watering, soil type, temperature and humidity.
    pub enrichment: String,
}

/// The numeric thresholds of [`GrowingConditions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Threshold {
    SoilDry,
    Mq2,
    Temperature,
    Light,
}

impl Threshold {
    pub const ALL: [Threshold; 4] = [
        Threshold::SoilDry,
        Threshold::Mq2,
        Threshold::Temperature,
        Threshold::Light,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::SoilDry => "Soil Moisture",
            Self::Mq2 => "Gas (MQ2)",
            Self::Temperature => "Temperature",
            Self::Light => "Light Level",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::SoilDry => "%",
            Self::Mq2 => "ppm",
            Self::Temperature => "°C",
            Self::Light => "lux",
        }
    }

    /// Wire name of the matching field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::SoilDry => "soilDryThreshold",
            Self::Mq2 => "mq2Threshold",
            Self::Temperature => "tempThreshold",
            Self::Light => "lightThreshold",
        }
    }
}

impl GrowingConditions {
    pub fn threshold(&self, which: Threshold) -> f64 {
        match which {
            Threshold::SoilDry => self.soil_dry_threshold,
            Threshold::Mq2 => self.mq2_threshold,
            Threshold::Temperature => self.temp_threshold,
            Threshold::Light => self.light_threshold,
        }
    }

    /// Copy-on-edit: the receiver is left untouched.
    pub fn with_threshold(&self, which: Threshold, value: f64) -> Self {
        let mut edited = self.clone();
        match which {
            Threshold::SoilDry => edited.soil_dry_threshold = value,
            Threshold::Mq2 => edited.mq2_threshold = value,
            Threshold::Temperature => edited.temp_threshold = value,
            Threshold::Light => edited.light_threshold = value,
        }
        edited
    }
}

/// Input of one chat turn.
///
/// `history` holds the prior turns only; the message being sent goes in `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatTurnRequest {
    /// The language for the conversation.
    pub language: String,
    /// The conversation history.
    pub history: Vec<Message>,
    /// The latest user message.
    pub message: String,
    /// The current plant diagnosis, if available.
    #[serde(default)]
    pub diagnosis: Option<DiagnosisResult>,
}

/// Output of one chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatTurnResponse {
    /// The AI model's response.
    pub response: String,
}

/// Structured generation result with response metadata.
#[derive(Debug, Clone)]
pub struct GenerationOutcome<T> {
    pub value: T,
    pub model_version: Option<String>,
    pub response_id: Option<String>,
}

impl<T> GenerationOutcome<T> {
    pub fn new(value: T, model_version: Option<String>, response_id: Option<String>) -> Self {
        Self {
            value,
            model_version,
            response_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_request_uses_camel_case_and_lowercase_roles() {
        let request = ChatTurnRequest {
            language: "English".into(),
            history: vec![Message::user("hi"), Message::model("hello")],
            message: "why are my leaves yellow?".into(),
            diagnosis: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["history"][1]["role"], json!("model"));
        assert_eq!(value["diagnosis"], json!(null));
    }

    #[test]
    fn missing_diagnosis_deserializes_as_none() {
        let request: ChatTurnRequest = serde_json::from_value(json!({
            "language": "French",
            "history": [],
            "message": "Bonjour"
        }))
        .unwrap();
        assert!(request.diagnosis.is_none());
    }

    #[test]
    fn editing_a_threshold_copies() {
        let original = GrowingConditions {
            soil_dry_threshold: 40.0,
            mq2_threshold: 100.0,
            temp_threshold: 25.0,
            light_threshold: 5000.0,
            enrichment: "Bright indirect light.".into(),
        };
        let edited = original.with_threshold(Threshold::Temperature, 22.5);

        assert_eq!(original.threshold(Threshold::Temperature), 25.0);
        assert_eq!(edited.threshold(Threshold::Temperature), 22.5);
        assert_eq!(edited.enrichment, original.enrichment);
        assert_eq!(Threshold::Temperature.unit(), "°C");
    }
}

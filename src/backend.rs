//! The generative backend as an opaque capability.
//!
//! [`InferenceBackend`] is the only seam between the flows and the model provider. The
//! production implementation talks to Gemini; [`MockBackend`] lets tests and demos run
//! offline.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use gemini_rust::{Blob, Content, Gemini, GenerationConfig, Message, Model, Part, Role};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::{FlowError, Result},
    prompt::{PromptPart, RenderedPrompt},
};

/// Everything the backend needs for one structured call.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Name of the flow issuing the call.
    pub flow: &'static str,
    pub prompt: RenderedPrompt,
    /// Output schema, already reduced to what the backend accepts.
    pub output_schema: Value,
    pub temperature: f32,
}

/// Unparsed backend answer plus response metadata.
#[derive(Debug, Clone, Default)]
pub struct RawCompletion {
    pub text: String,
    pub model_version: Option<String>,
    pub response_id: Option<String>,
}

impl RawCompletion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// "Given a schema and a rendered prompt, return text that should conform to the schema,
/// or fail."
///
/// Implementations report transport and service failures as
/// [`FlowError::InferenceUnavailable`]. They do not parse or validate the text.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn evaluate(&self, request: &InferenceRequest) -> Result<RawCompletion>;
}

/// Gemini implementation of [`InferenceBackend`].
///
/// Media parts travel inline as base64 blobs, in the position they hold in the prompt.
/// Nothing is stored on the Gemini side between calls.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Arc<Gemini>,
}

impl GeminiBackend {
    pub fn new(api_key: &str, model: Model) -> Result<Self> {
        let client = Gemini::with_model(api_key, model)
            .map_err(|e| FlowError::Config(format!("failed to create Gemini client: {e}")))?;
        Ok(Self {
            client: Arc::new(client),
        })
    }
}

/// Map prompt parts one-to-one onto Gemini parts.
fn content_parts(prompt: &RenderedPrompt) -> Vec<Part> {
    prompt
        .parts()
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => Part::Text {
                text: text.clone(),
                thought: None,
                thought_signature: None,
            },
            PromptPart::Media(uri) => Part::InlineData {
                inline_data: Blob::new(uri.mime_type(), uri.base64_data()),
                media_resolution: None,
            },
        })
        .collect()
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    async fn evaluate(&self, request: &InferenceRequest) -> Result<RawCompletion> {
        let parts = content_parts(&request.prompt);
        debug!(
            flow = request.flow,
            inline_media = request.prompt.media().count(),
            "Calling Gemini generate_content"
        );
        let message = Message {
            role: Role::User,
            content: Content {
                parts: Some(parts),
                role: Some(Role::User),
            },
        };

        let mut config = GenerationConfig::default();
        config.response_schema = Some(request.output_schema.clone());
        config.response_mime_type = Some("application/json".to_string());
        config.temperature = Some(request.temperature);

        let response = self
            .client
            .generate_content()
            .with_message(message)
            .with_generation_config(config)
            .execute()
            .await
            .map_err(unavailable_from_client)?;

        Ok(RawCompletion {
            text: response.text(),
            model_version: response.model_version.clone(),
            response_id: response.response_id.clone(),
        })
    }
}

fn unavailable_from_client(err: gemini_rust::ClientError) -> FlowError {
    match &err {
        gemini_rust::ClientError::BadResponse { code, description } => {
            FlowError::InferenceUnavailable {
                message: description.clone().unwrap_or_else(|| err.to_string()),
                status: u16::try_from(*code).ok(),
            }
        }
        _ => FlowError::unavailable(err.to_string()),
    }
}

/// Handler used to answer requests without a network.
///
/// Returns the raw text the "model" produced; it goes through the same parsing and
/// validation as a real response.
pub type MockHandler = Arc<dyn Fn(&InferenceRequest) -> Result<String> + Send + Sync>;

/// Offline backend driven by a [`MockHandler`]. Counts every call it receives.
#[derive(Clone)]
pub struct MockBackend {
    handler: MockHandler,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(
        handler: impl Fn(&InferenceRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answer with the same raw text.
    pub fn returning(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self::new(move |_| Ok(raw.clone()))
    }

    /// Always fail as if the service were down.
    pub fn unavailable(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |_| Err(FlowError::unavailable(message.clone())))
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    async fn evaluate(&self, request: &InferenceRequest) -> Result<RawCompletion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = (self.handler)(request)?;
        Ok(RawCompletion::text(text))
    }
}

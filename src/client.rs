use std::{sync::Arc, time::Duration};

use gemini_rust::Model;
use serde_json::Value;
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    backend::{GeminiBackend, InferenceBackend, InferenceRequest, MockBackend},
    error::{Boundary, FlowError, Result},
    models::GenerationOutcome,
    prompt::RenderedPrompt,
    schema::{validate_value, FlowSchema},
};

/// Environment variable holding the Gemini API key.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Optional environment variable overriding the model id.
pub const MODEL_VAR: &str = "GEMINI_MODEL";

/// Global configuration options for the client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Model used for every flow (default: Gemini 2.5 Flash)
    pub model: Model,
    /// Generation temperature (default: 0.1)
    pub temperature: f32,
    /// Upper bound on one backend call (default: 60s)
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            model: Model::Gemini25Flash,
            temperature: 0.1,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Builder for [`StructuredClient`].
pub struct StructuredClientBuilder {
    api_key: String,
    config: ClientConfig,
    backend: Option<Arc<dyn InferenceBackend>>,
}

impl StructuredClientBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            config: ClientConfig::default(),
            backend: None,
        }
    }

    /// Read `GEMINI_API_KEY` and, if set, `GEMINI_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_VAR)
            .map_err(|_| FlowError::Config(format!("{API_KEY_VAR} must be set")))?;
        let mut builder = Self::new(api_key);
        if let Ok(model) = std::env::var(MODEL_VAR) {
            builder = builder.with_model(parse_model(&model)?);
        }
        Ok(builder)
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.config.model = model;
        self
    }

    /// Set the default generation temperature.
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Fail a backend call that has not answered within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Apply a complete client configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom backend instead of Gemini. The API key is then ignored.
    pub fn with_backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Provide a mock handler to intercept all requests.
    ///
    /// This is primarily intended for unit tests where network calls should be avoided.
    pub fn with_mock(
        self,
        handler: impl Fn(&InferenceRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.with_backend(Arc::new(MockBackend::new(handler)))
    }

    /// Build the client.
    pub fn build(self) -> Result<StructuredClient> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => {
                if self.api_key.trim().is_empty() {
                    return Err(FlowError::Config("Gemini API key is empty".to_string()));
                }
                info!(model = %self.config.model, "Creating Gemini backend");
                Arc::new(GeminiBackend::new(&self.api_key, self.config.model.clone())?)
                    as Arc<dyn InferenceBackend>
            }
        };

        Ok(StructuredClient {
            backend,
            config: self.config,
        })
    }
}

/// Accept a bare model id (`gemini-2.5-pro`) or a full resource name (`models/gemini-2.5-pro`).
pub fn parse_model(raw: &str) -> Result<Model> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FlowError::Config(format!("{MODEL_VAR} is empty")));
    }
    let name = if raw.starts_with("models/") {
        raw.to_string()
    } else {
        format!("models/{raw}")
    };
    Ok(Model::Custom(name))
}

/// Process-wide handle to the inference capability.
///
/// Build it once at startup and pass it to every flow. Cloning is cheap. The client keeps
/// no state between calls: nothing is cached and nothing is retried.
#[derive(Clone)]
pub struct StructuredClient {
    backend: Arc<dyn InferenceBackend>,
    config: ClientConfig,
}

impl StructuredClient {
    /// Get the current client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a rendered prompt and accept the answer only if it conforms to `O`'s schema.
    ///
    /// Backend failures propagate unchanged; a call exceeding the configured timeout is
    /// [`FlowError::InferenceUnavailable`]. Answers that are not JSON, break the schema or
    /// fail to deserialize become [`FlowError::SchemaViolation`].
    #[instrument(skip_all, fields(flow = flow, target = std::any::type_name::<O>()))]
    pub async fn evaluate<O: FlowSchema>(
        &self,
        flow: &'static str,
        prompt: RenderedPrompt,
    ) -> Result<GenerationOutcome<O>> {
        let request = InferenceRequest {
            flow,
            prompt,
            output_schema: O::gemini_schema(),
            temperature: self.config.temperature,
        };
        debug!(
            prompt_chars = request.prompt.text().len(),
            media_parts = request.prompt.media().count(),
            "Dispatching structured request"
        );

        let timeout = self.config.timeout;
        let completion = tokio::time::timeout(timeout, self.backend.evaluate(&request))
            .await
            .map_err(|_| {
                warn!(?timeout, "Backend call timed out");
                FlowError::unavailable(format!("{flow} timed out after {timeout:?}"))
            })??;
        trace!(raw_response = %completion.text, "Raw model text");

        let value = parse_output::<O>(&completion.text)?;
        debug!("Response accepted by output schema");
        Ok(GenerationOutcome::new(
            value,
            completion.model_version,
            completion.response_id,
        ))
    }
}

/// Turn raw model text into a validated record of type `O`.
///
/// The text is parsed as-is first. Only when that fails is a JSON body dug out of Markdown
/// fences or surrounding chatter.
pub fn parse_output<O: FlowSchema>(text: &str) -> Result<O> {
    let trimmed = text.trim();
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(direct) => {
            let Some(extracted) = extract_json(trimmed) else {
                warn!(error = %direct, raw_response = %text, "Model text is not JSON");
                return Err(FlowError::parse_error(direct, text));
            };
            trace!(extracted = %extracted, "Parsing JSON extracted from model text");
            serde_json::from_str(extracted).map_err(|err| {
                warn!(error = %err, raw_response = %text, "Model text is not JSON");
                FlowError::parse_error(err, text)
            })?
        }
    };

    validate_value::<O>(Boundary::Output, &value, text).inspect_err(|err| {
        warn!(error = %err, "Response rejected by output schema");
    })
}

/// Locate a JSON body inside text that is not JSON on its own.
pub(crate) fn extract_json(text: &str) -> Option<&str> {
    fenced_body(text).or_else(|| {
        let start = text.find(['{', '['])?;
        let end = text.rfind(['}', ']'])?;
        (start < end).then(|| &text[start..=end])
    })
}

/// Body of the outermost Markdown code fence, without its language tag line.
fn fenced_body(text: &str) -> Option<&str> {
    let (_, after_open) = text.split_once("```")?;
    let (_tag, body) = after_open.split_once('\n')?;
    let (inner, _) = body.rsplit_once("```")?;
    Some(inner.trim())
}

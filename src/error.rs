use thiserror::Error;

/// Which side of a flow a validation step guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Caller-supplied request, checked before anything is sent.
    Input,
    /// Backend-produced response, checked before it is accepted.
    Output,
}

impl std::fmt::Display for Boundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Failures surfaced by the flows.
///
/// The three flow-level failures are [`FlowError::Validation`],
/// [`FlowError::InferenceUnavailable`] and [`FlowError::SchemaViolation`]. They call for
/// different remediation: fix the request, retry later, or fix the prompt/backend.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Validation failed ({boundary}): {message}")]
    Validation { boundary: Boundary, message: String },

    #[error("Inference unavailable: {message}")]
    InferenceUnavailable {
        message: String,
        /// HTTP status reported by the backend, when there was one.
        status: Option<u16>,
    },

    #[error("Schema violation: {message}\n\nRaw response:\n{raw_text}\n\nSuggestion: {suggestion}")]
    SchemaViolation {
        message: String,
        raw_text: String,
        suggestion: String,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Context error: {0}")]
    Context(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// Reject a caller-supplied request.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::Validation {
            boundary: Boundary::Input,
            message: message.into(),
        }
    }

    /// The backend could not be reached or answered with an error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::InferenceUnavailable {
            message: message.into(),
            status: None,
        }
    }

    /// Backend text that is not valid JSON or does not deserialize into the output record.
    pub fn parse_error(err: serde_json::Error, raw_text: &str) -> Self {
        let suggestion = Self::suggest_parse_fix(&err.to_string(), raw_text);
        Self::SchemaViolation {
            message: err.to_string(),
            raw_text: Self::truncate_for_display(raw_text, 500),
            suggestion,
        }
    }

    /// Backend JSON that parsed but broke the output schema.
    pub fn schema_violation(issues: impl Into<String>, raw_text: &str) -> Self {
        let message = issues.into();
        let suggestion = Self::suggest_parse_fix(&message, raw_text);
        Self::SchemaViolation {
            message,
            raw_text: Self::truncate_for_display(raw_text, 500),
            suggestion,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::InferenceUnavailable { .. })
    }

    pub fn is_schema_violation(&self) -> bool {
        matches!(self, Self::SchemaViolation { .. })
    }

    /// Check if the caller may reasonably retry. This layer never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InferenceUnavailable {
                status: Some(429 | 503),
                ..
            }
        )
    }

    /// Get suggested retry delay in seconds, if applicable.
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            Self::InferenceUnavailable {
                status: Some(429),
                message,
            } => parse_retry_delay_from_error(message),
            Self::InferenceUnavailable {
                status: Some(503), ..
            } => Some(5),
            _ => None,
        }
    }

    fn suggest_parse_fix(err_msg: &str, raw_text: &str) -> String {
        let err_msg = err_msg.to_lowercase();

        if err_msg.contains("expected value at line 1 column 1") {
            if raw_text.trim().is_empty() {
                return "The model returned an empty response. Check that the prompt asks for \
                        an answer and that the media part was attached."
                    .to_string();
            }
            if !raw_text.trim().starts_with(['{', '[']) {
                return "The model returned non-JSON text. Make sure the response schema is \
                        sent with a JSON mime type."
                    .to_string();
            }
        }

        if err_msg.contains("missing field") || err_msg.contains("is a required property") {
            return "The model omitted a required field. Mention the field explicitly in the \
                    flow template."
                .to_string();
        }

        if err_msg.contains("additional properties") || err_msg.contains("unknown field") {
            return "The model added fields that the output schema does not declare.".to_string();
        }

        if err_msg.contains("invalid type") || err_msg.contains("is not of type") {
            return "Type mismatch in response. The field descriptions in the output schema \
                    should state the expected type (boolean, number, text)."
                .to_string();
        }

        "Check that the flow template matches the output schema of the flow.".to_string()
    }

    fn truncate_for_display(text: &str, max_len: usize) -> String {
        if text.len() <= max_len {
            return text.to_string();
        }
        let mut cut = max_len;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!(
            "{}... [truncated, {} total chars]",
            &text[..cut],
            text.len()
        )
    }
}

/// Seconds to wait before retrying, read from a Gemini error body.
///
/// The structured `RetryInfo.retryDelay` detail wins; otherwise a "retry in 57s" or
/// "retry in 488.04ms" phrase is used.
fn parse_retry_delay_from_error(body: &str) -> Option<u64> {
    let from_details = body
        .find('{')
        .and_then(|start| serde_json::from_str::<serde_json::Value>(&body[start..]).ok())
        .and_then(|json| {
            json.pointer("/error/details")?
                .as_array()?
                .iter()
                .filter(|detail| detail["@type"] == "type.googleapis.com/google.rpc.RetryInfo")
                .find_map(|detail| detail["retryDelay"].as_str().map(str::to_string))
        });

    let delay = match from_details {
        Some(delay) => delay,
        None => {
            let lower = body.to_lowercase();
            let (_, rest) = lower.split_once("retry in ")?;
            rest.split(|c: char| c.is_whitespace() || c == ',')
                .next()?
                .trim_end_matches('.')
                .to_string()
        }
    };
    parse_duration_string(&delay)
}

/// "44s", "44.5s" or "500ms" as whole seconds, rounded up.
fn parse_duration_string(text: &str) -> Option<u64> {
    let text = text.trim();
    let (number, per_second) = match text.strip_suffix("ms") {
        Some(millis) => (millis, 1000.0),
        None => (text.strip_suffix('s')?, 1.0),
    };
    let secs = number.parse::<f64>().ok()? / per_second;
    (secs >= 0.0).then(|| secs.ceil() as u64)
}

pub type Result<T> = std::result::Result<T, FlowError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn with_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<FlowError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_err = e.into();
            FlowError::Context(format!("{}: {}", context.into(), base_err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_from_retry_info_details() {
        let body = r#"{"error":{"code":429,"details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"44s"}]}}"#;
        let err = FlowError::InferenceUnavailable {
            message: body.to_string(),
            status: Some(429),
        };
        assert!(err.is_retryable());
        assert_eq!(err.retry_delay(), Some(44));
    }

    #[test]
    fn retry_delay_from_free_text() {
        let err = FlowError::InferenceUnavailable {
            message: "Quota exceeded. Please retry in 488.04ms.".to_string(),
            status: Some(429),
        };
        assert_eq!(err.retry_delay(), Some(1));
    }

    #[test]
    fn retry_delay_parses_seconds_and_millis() {
        assert_eq!(parse_duration_string("44.5s"), Some(45));
        assert_eq!(parse_duration_string("500ms"), Some(1));
        assert_eq!(parse_duration_string("0s"), Some(0));
        assert_eq!(parse_duration_string("soon"), None);
    }

    #[test]
    fn timeout_is_unavailable_but_not_retryable() {
        let err = FlowError::unavailable("agriChat timed out after 30s");
        assert!(err.is_unavailable());
        assert!(!err.is_retryable());
    }

    #[test]
    fn schema_violation_is_not_retryable() {
        let err =
            FlowError::schema_violation("/isHealthy: \"yes\" is not of type \"boolean\"", "{}");
        assert!(err.is_schema_violation());
        assert!(!err.is_retryable());
        assert_eq!(err.retry_delay(), None);
        match err {
            FlowError::SchemaViolation { suggestion, .. } => {
                assert!(suggestion.starts_with("Type mismatch"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn long_raw_text_is_truncated() {
        let raw = "x".repeat(2_000);
        let err = FlowError::schema_violation("bad", &raw);
        match err {
            FlowError::SchemaViolation { raw_text, .. } => {
                assert!(raw_text.ends_with("[truncated, 2000 total chars]"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn with_context_wraps_message() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "leaf.jpg",
        ));
        let err = res.with_context("reading photo").unwrap_err();
        assert!(err.to_string().contains("reading photo"));
    }
}

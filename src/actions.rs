//! Request entry points called by the UI layer.
//!
//! These do the little glue the flows leave to the caller: encoding an uploaded photo into
//! a data URI, trimming the searched plant name, and rejecting empty submissions before
//! anything reaches the backend.

use std::path::Path;

use tracing::{info, instrument};

use crate::{
    client::StructuredClient,
    data_uri::DataUri,
    error::{FlowError, Result, ResultExt},
    flows,
    models::{
        ChatTurnRequest, ChatTurnResponse, ConditionsInput, DiagnoseInput, DiagnosisResult,
        GrowingConditions,
    },
};

/// A photo as received from an upload form.
#[derive(Debug, Clone, Default)]
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    /// MIME type declared by the uploader, if any.
    pub content_type: Option<String>,
}

impl PhotoUpload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            ..Default::default()
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Encode as a data URI. The declared type wins over a guess from the file name.
    pub fn to_data_uri(&self) -> Result<DataUri> {
        if self.bytes.is_empty() {
            return Err(FlowError::invalid_input("No photo selected"));
        }
        let declared = self
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        Ok(match (declared, &self.file_name) {
            (Some(mime), _) => DataUri::from_bytes(&self.bytes, mime),
            (None, Some(name)) => DataUri::from_bytes_guessed(&self.bytes, name),
            (None, None) => DataUri::from_bytes(&self.bytes, "application/octet-stream"),
        })
    }
}

/// Diagnose an uploaded photo.
#[instrument(skip_all, fields(file_name = ?photo.file_name, bytes = photo.bytes.len()))]
pub async fn diagnose_plant(
    client: &StructuredClient,
    photo: &PhotoUpload,
) -> Result<DiagnosisResult> {
    let uri = photo.to_data_uri()?;
    let input = DiagnoseInput {
        photo_data_uri: uri.to_string(),
    };
    let result = flows::diagnose(client, &input).await?;
    info!(is_healthy = result.is_healthy, disease = %result.disease, "Diagnosis ready");
    Ok(result)
}

/// Read a photo from disk and diagnose it. The MIME type is guessed from the extension.
pub async fn diagnose_plant_file(
    client: &StructuredClient,
    path: impl AsRef<Path>,
) -> Result<DiagnosisResult> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(format!("reading photo {}", path.display()))?;
    let mut photo = PhotoUpload::new(bytes);
    photo.file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    diagnose_plant(client, &photo).await
}

/// Trim a searched plant name; blank names are rejected.
pub fn normalize_plant_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(FlowError::invalid_input("Please enter a plant name"));
    }
    Ok(name.to_string())
}

/// Look up growing conditions for a plant by name.
#[instrument(skip(client))]
pub async fn search_plant(
    client: &StructuredClient,
    plant_name: &str,
) -> Result<GrowingConditions> {
    let input = ConditionsInput {
        plant_name: normalize_plant_name(plant_name)?,
    };
    flows::generate_conditions(client, &input).await
}

/// Forward one chat turn. Blank messages are rejected here; see
/// [`ChatSession::send`](crate::session::ChatSession::send) for the stateful variant.
pub async fn send_chat(
    client: &StructuredClient,
    request: &ChatTurnRequest,
) -> Result<ChatTurnResponse> {
    if request.message.trim().is_empty() {
        return Err(FlowError::invalid_input("message must not be empty"));
    }
    flows::chat(client, request).await
}

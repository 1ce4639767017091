//! Schema-validated AI flows for plant care, built on top of `gemini-rust`.
//!
//! Three flows sit behind one structured-inference call: photo diagnosis, growing conditions
//! for a named plant, and a multilingual agricultural chat. Every request and response is
//! checked against a JSON Schema generated from the Rust record types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use plant_care_ai::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let client = StructuredClientBuilder::from_env()?.build()?;
//!
//!     let conditions = search_plant(&client, "Monstera deliciosa").await?;
//!     for threshold in Threshold::ALL {
//!         println!(
//!             "{}: {} {}",
//!             threshold.label(),
//!             conditions.threshold(threshold),
//!             threshold.unit()
//!         );
//!     }
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod backend;
pub mod client;
pub mod data_uri;
pub mod error;
pub mod flows;
pub mod models;
pub mod prompt;
pub mod schema;
pub mod session;

pub use actions::{diagnose_plant, diagnose_plant_file, search_plant, send_chat, PhotoUpload};
pub use backend::{GeminiBackend, InferenceBackend, InferenceRequest, MockBackend, RawCompletion};
pub use client::{ClientConfig, StructuredClient, StructuredClientBuilder};
pub use data_uri::DataUri;
pub use error::{Boundary, FlowError, Result, ResultExt};
pub use flows::{Chat, Diagnose, Flow, GenerateConditions};
pub use models::{
    ChatTurnRequest, ChatTurnResponse, ConditionsInput, DiagnoseInput, DiagnosisResult,
    GenerationOutcome, GrowingConditions, Message, Role, Threshold,
};
pub use prompt::{PromptPart, RenderedPrompt, Template};
pub use schema::{FlowDescriptor, FlowSchema};
pub use session::{ChatSession, EntryKind, SessionEntry};

/// Prelude module for convenient imports.
///
/// ```rust
/// use plant_care_ai::prelude::*;
/// ```
pub mod prelude {
    pub use crate::actions::{
        diagnose_plant, diagnose_plant_file, search_plant, send_chat, PhotoUpload,
    };
    pub use crate::backend::{InferenceBackend, InferenceRequest, MockBackend};
    pub use crate::client::{ClientConfig, StructuredClient, StructuredClientBuilder};
    pub use crate::error::{FlowError, Result, ResultExt};
    pub use crate::flows::{self, Flow};
    pub use crate::models::{
        ChatTurnRequest, ChatTurnResponse, ConditionsInput, DiagnoseInput, DiagnosisResult,
        GrowingConditions, Message, Role, Threshold,
    };
    pub use crate::session::ChatSession;

    // Re-export commonly used external types
    pub use gemini_rust::Model;
}

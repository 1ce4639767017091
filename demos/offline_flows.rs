//! Example: run all three flows against a mock backend.
//!
//! No API key or network needed. The mock answers by flow name, and every answer still goes
//! through output-schema validation.
//!
//! Run with: `RUST_LOG=plant_care_ai=debug cargo run --example offline_flows`

use plant_care_ai::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,plant_care_ai=debug"));
    fmt().with_env_filter(filter).init();

    let client = StructuredClientBuilder::new("mock-key")
        .with_mock(|req: &InferenceRequest| match req.flow {
            "diagnosePlant" => Ok(r#"{
                    "isHealthy": false,
                    "disease": "Powdery mildew",
                    "remedy": "Remove affected leaves and apply a sulfur-based fungicide."
                }"#
            .to_string()),
            "generatePlantConditions" => Ok(r#"```json
                {
                    "soilDryThreshold": 30,
                    "mq2Threshold": 200,
                    "tempThreshold": 24,
                    "lightThreshold": 12000,
                    "enrichment": "Full sun, water when the top inch of soil is dry."
                }
                ```"#
                .to_string()),
            "agriChat" => Ok(
                r#"{"response": "Apply neem oil weekly and improve air circulation."}"#.to_string(),
            ),
            other => Err(FlowError::Context(format!("Unexpected mock flow: {other}"))),
        })
        .build()?;

    let photo = PhotoUpload::new(b"\xff\xd8\xff\xe0 not really a jpeg".to_vec())
        .with_file_name("tomato-leaf.jpg");
    let diagnosis = diagnose_plant(&client, &photo).await?;
    println!("Diagnosis: {diagnosis:#?}");

    let conditions = search_plant(&client, "  Tomato ").await?;
    for threshold in Threshold::ALL {
        println!(
            "{:<14} {:>8} {}",
            threshold.label(),
            conditions.threshold(threshold),
            threshold.unit()
        );
    }
    println!("Care notes: {}", conditions.enrichment);

    let mut session = ChatSession::new();
    session.select_language("English")?;
    session.set_diagnosis(Some(diagnosis));
    if let Some(reply) = session.send(&client, "How do I stop it spreading?").await? {
        println!("Assistant: {reply}");
    }
    println!("History has {} entries", session.history().len());

    Ok(())
}

//! Example: the plant assistant against the real Gemini API.
//!
//! Diagnoses an optional photo, looks up growing conditions, then answers one chat question
//! with the diagnosis as context.
//!
//! Run with:
//! `GEMINI_API_KEY=... cargo run --example plant_assistant -- "Basil" path/to/leaf.jpg`

use std::env;

use plant_care_ai::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,plant_care_ai=debug"));
    fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let plant = args.next().unwrap_or_else(|| "Basil".to_string());
    let photo = args.next();

    let client = StructuredClientBuilder::from_env()?.build()?;
    println!("Using model {}", client.config().model);

    let diagnosis = match photo {
        Some(path) => {
            let diagnosis = diagnose_plant_file(&client, &path).await?;
            if diagnosis.is_healthy {
                println!("{path}: healthy");
            } else {
                println!("{path}: {} -> {}", diagnosis.disease, diagnosis.remedy);
            }
            Some(diagnosis)
        }
        None => None,
    };

    match search_plant(&client, &plant).await {
        Ok(conditions) => {
            println!("\nGrowing conditions for {plant}:");
            for threshold in Threshold::ALL {
                println!(
                    "  {:<14} {:>8} {}",
                    threshold.label(),
                    conditions.threshold(threshold),
                    threshold.unit()
                );
            }
            println!("  {}", conditions.enrichment);
        }
        Err(err) if err.is_retryable() => {
            println!("Rate limited; try again in {:?}s", err.retry_delay());
            return Ok(());
        }
        Err(err) => return Err(err),
    }

    let mut session = ChatSession::new();
    session.select_language("English")?;
    session.set_diagnosis(diagnosis);
    let question = format!("What are the most common pests on {plant}?");
    if let Some(reply) = session.send(&client, &question).await? {
        println!("\nYou: {question}\nAssistant: {reply}");
    }

    Ok(())
}

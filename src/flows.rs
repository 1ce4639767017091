//! The three plant-care flows.
//!
//! Each flow pairs an input record, an output record and one fixed template. Running a flow
//! validates the input, renders the template and hands the prompt to the structured call.
//! Flows hold no state between calls.

use tracing::{debug, instrument};

use crate::{
    client::StructuredClient,
    data_uri::DataUri,
    error::Result,
    models::{
        ChatTurnRequest, ChatTurnResponse, ConditionsInput, DiagnoseInput, DiagnosisResult,
        GrowingConditions,
    },
    prompt::{RenderedPrompt, Template},
    schema::{validate_input, FlowSchema},
};

/// A named, schema-validated request/response operation.
pub trait Flow {
    const NAME: &'static str;
    const TEMPLATE: &'static str;
    type Input: FlowSchema + Send + Sync;
    type Output: FlowSchema + Send;

    /// Checks the schema cannot express. Runs after schema validation.
    fn check(_input: &Self::Input) -> Result<()> {
        Ok(())
    }
}

/// Photo in, [`DiagnosisResult`] out.
pub struct Diagnose;

impl Flow for Diagnose {
    const NAME: &'static str = "diagnosePlant";
    const TEMPLATE: &'static str = r#"You are an expert botanist specializing in diagnosing plant illnesses from photos.

You will be given a photo of a plant. Your task is to identify if the plant has any diseases.

- If the plant is healthy, set 'isHealthy' to true and 'disease' to 'None'.
- If the plant is diseased, set 'isHealthy' to false, identify the common name of the disease, and suggest a remedy.

Photo: {{media url=photoDataUri}}"#;
    type Input = DiagnoseInput;
    type Output = DiagnosisResult;

    fn check(input: &DiagnoseInput) -> Result<()> {
        DataUri::parse(&input.photo_data_uri).map(|_| ())
    }
}

/// Plant name in, [`GrowingConditions`] out. The name is used verbatim.
pub struct GenerateConditions;

impl Flow for GenerateConditions {
    const NAME: &'static str = "generatePlantConditions";
    const TEMPLATE: &'static str = r#"You are an expert botanist. A user has requested information about the best growing conditions for the plant: {{plantName}}.

Provide the sensor thresholds used to monitor this plant:
- 'soilDryThreshold': the soil moisture percentage below which the plant needs watering.
- 'mq2Threshold': the maximum acceptable MQ2 gas sensor reading near the plant, in ppm.
- 'tempThreshold': the ideal air temperature, in degrees Celsius.
- 'lightThreshold': the minimum light level the plant needs, in lux.

In 'enrichment', provide specific and practical advice regarding sunlight, watering, soil type, temperature, and humidity. Only include conditions that are pertinent and likely to affect plant health."#;
    type Input = ConditionsInput;
    type Output = GrowingConditions;
}

/// One turn of the agricultural assistant.
pub struct Chat;

impl Flow for Chat {
    const NAME: &'static str = "agriChat";
    const TEMPLATE: &'static str = r#"You are an expert agricultural assistant. Your goal is to provide helpful, accurate, and concise information about farming, plants, soil, pests, and all other agriculture-related topics.

The user has selected their preferred language for this conversation: {{language}}.
All your responses must be in this language.
{{#if diagnosis}}

The user's plant was recently diagnosed from a photo:
- Healthy: {{diagnosis.isHealthy}}
- Disease: {{diagnosis.disease}}
- Suggested remedy: {{diagnosis.remedy}}
Take this diagnosis into account whenever it is relevant to the user's question.
{{/if}}

Here is the conversation history so far:
{{#each history}}
- {{role}}: {{content}}
{{/each}}

Here is the user's latest message:
{{message}}

Your task is to provide a helpful response to the user's message in the selected language ({{language}})."#;
    type Input = ChatTurnRequest;
    type Output = ChatTurnResponse;
}

/// Validate `input` and render the flow's template. Nothing is sent anywhere.
pub fn render<F: Flow>(input: &F::Input) -> Result<RenderedPrompt> {
    let value = validate_input(input)?;
    F::check(input)?;
    Template::parse(F::NAME, F::TEMPLATE)?.render(&value)
}

/// Run any flow against the given client.
#[instrument(skip_all, fields(flow = F::NAME))]
pub async fn run<F: Flow>(client: &StructuredClient, input: &F::Input) -> Result<F::Output> {
    let prompt = render::<F>(input)?;
    let outcome = client.evaluate::<F::Output>(F::NAME, prompt).await?;
    debug!(
        model_version = outcome.model_version.as_deref().unwrap_or("unknown"),
        "Flow completed"
    );
    Ok(outcome.value)
}

pub async fn diagnose(client: &StructuredClient, input: &DiagnoseInput) -> Result<DiagnosisResult> {
    run::<Diagnose>(client, input).await
}

pub async fn generate_conditions(
    client: &StructuredClient,
    input: &ConditionsInput,
) -> Result<GrowingConditions> {
    run::<GenerateConditions>(client, input).await
}

/// The caller appends the reply to its own history before the next turn.
pub async fn chat(
    client: &StructuredClient,
    request: &ChatTurnRequest,
) -> Result<ChatTurnResponse> {
    run::<Chat>(client, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    #[test]
    fn every_template_parses_and_only_reads_declared_fields() {
        fn assert_fields<F: Flow>() {
            let template = Template::parse(F::NAME, F::TEMPLATE).unwrap();
            let declared: Vec<String> = crate::schema::fields::<F::Input>()
                .into_iter()
                .map(|f| f.name)
                .collect();
            for field in template.referenced_fields() {
                assert!(declared.contains(&field), "{}: '{field}' undeclared", F::NAME);
            }
        }
        assert_fields::<Diagnose>();
        assert_fields::<GenerateConditions>();
        assert_fields::<Chat>();
    }

    #[test]
    fn diagnose_rejects_a_plain_url() {
        let input = DiagnoseInput {
            photo_data_uri: "https://example.com/leaf.jpg".into(),
        };
        let err = render::<Diagnose>(&input).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn chat_prompt_ends_with_language_instruction() {
        let request = ChatTurnRequest {
            language: "Hindi".into(),
            history: vec![Message::model("Namaste!")],
            message: "Which fertiliser for wheat?".into(),
            diagnosis: None,
        };
        let text = render::<Chat>(&request).unwrap().text();
        assert!(text.ends_with("in the selected language (Hindi)."));
        assert!(text.contains("- model: Namaste!\n"));
    }
}

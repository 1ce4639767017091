use plant_care_ai::{
    flows::{self, Chat, Diagnose, GenerateConditions},
    ChatTurnRequest, ConditionsInput, DiagnoseInput, DiagnosisResult, FlowError, Message,
    PromptPart, Template,
};
use serde_json::json;

fn chat_request(history: Vec<Message>, diagnosis: Option<DiagnosisResult>) -> ChatTurnRequest {
    ChatTurnRequest {
        language: "English".into(),
        history,
        message: "Should I prune now?".into(),
        diagnosis,
    }
}

#[test]
fn rendering_is_deterministic() {
    let request = chat_request(vec![Message::user("Hi")], None);
    let first = flows::render::<Chat>(&request).unwrap();
    let second = flows::render::<Chat>(&request).unwrap();
    assert_eq!(first, second);
}

#[test]
fn history_renders_in_order() {
    let request = chat_request(
        vec![Message::user("A"), Message::model("B"), Message::user("C")],
        None,
    );
    let text = flows::render::<Chat>(&request).unwrap().text();

    let a = text.find("- user: A").unwrap();
    let b = text.find("- model: B").unwrap();
    let c = text.find("- user: C").unwrap();
    assert!(a < b && b < c);
}

#[test]
fn empty_history_leaves_no_history_lines() {
    let text = flows::render::<Chat>(&chat_request(Vec::new(), None))
        .unwrap()
        .text();
    assert!(!text.contains("- user:"));
    assert!(!text.contains("- model:"));
    assert!(!text.contains("{{"));
    assert!(text.contains(
        "Here is the conversation history so far:\n\nHere is the user's latest message:"
    ));
}

#[test]
fn diagnosis_section_only_when_present() {
    let without = flows::render::<Chat>(&chat_request(Vec::new(), None))
        .unwrap()
        .text();
    assert!(!without.to_lowercase().contains("diagnos"));

    let diagnosis = DiagnosisResult {
        is_healthy: false,
        disease: "Leaf rust".into(),
        remedy: "Remove infected leaves".into(),
    };
    let with = flows::render::<Chat>(&chat_request(Vec::new(), Some(diagnosis)))
        .unwrap()
        .text();
    assert!(with.contains("- Healthy: false"));
    assert!(with.contains("- Disease: Leaf rust"));
    assert!(with.contains("- Suggested remedy: Remove infected leaves"));
}

#[test]
fn plant_name_is_inserted_verbatim() {
    let input = ConditionsInput {
        plant_name: "  ficus   LYRATA ".into(),
    };
    let text = flows::render::<GenerateConditions>(&input).unwrap().text();
    assert!(text.contains("for the plant:   ficus   LYRATA ."));
}

#[test]
fn diagnose_prompt_is_text_then_photo() {
    let input = DiagnoseInput {
        photo_data_uri: "data:image/png;base64,iVBORw0KGgo=".into(),
    };
    let prompt = flows::render::<Diagnose>(&input).unwrap();

    assert_eq!(prompt.parts().len(), 2);
    assert!(matches!(&prompt.parts()[0], PromptPart::Text(t) if t.ends_with("Photo: ")));
    assert_eq!(prompt.media().count(), 1);
    assert!(!prompt.text().contains("base64"));
}

#[test]
fn unknown_field_is_a_template_error() {
    let template = Template::parse("broken", "Hello {{plantNmae}}").unwrap();
    let err = template.render(&json!({"plantName": "Fern"})).unwrap_err();
    assert!(matches!(err, FlowError::Template(ref m) if m.contains("plantNmae")), "{err}");
}

#[test]
fn unbalanced_blocks_fail_to_parse() {
    for source in [
        "{{#if a}}never closed",
        "{{/each}}",
        "{{#each a}}x{{/if}}",
        "{{unclosed",
    ] {
        let err = Template::parse("broken", source).unwrap_err();
        assert!(matches!(err, FlowError::Template(_)), "{source}: {err}");
    }
}

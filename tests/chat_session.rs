use std::sync::{Arc, Mutex};

use plant_care_ai::{
    session::ERROR_REPLY, ChatSession, DiagnosisResult, EntryKind, InferenceBackend, MockBackend,
    Role, StructuredClient, StructuredClientBuilder,
};

fn client_with(backend: &MockBackend) -> StructuredClient {
    StructuredClientBuilder::new("mock-key")
        .with_backend(Arc::new(backend.clone()) as Arc<dyn InferenceBackend>)
        .build()
        .unwrap()
}

#[tokio::test]
async fn a_turn_records_both_sides() {
    let backend = MockBackend::returning(r#"{"response": "Rotate crops every season."}"#);
    let client = client_with(&backend);
    let mut session = ChatSession::new();
    session.select_language("English").unwrap();

    let reply = session
        .send(&client, "How do I keep soil fertile?")
        .await
        .unwrap();

    assert_eq!(reply.as_deref(), Some("Rotate crops every season."));
    let history = session.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].message.role, Role::User);
    assert_eq!(history[1].message.content, "How do I keep soil fertile?");
    assert_eq!(history[2].message.role, Role::Model);
    assert_eq!(history[2].kind, EntryKind::Conversation);
}

#[tokio::test]
async fn history_sent_to_the_flow_excludes_the_new_message() {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let captured = prompts.clone();
    let backend = MockBackend::new(move |req| {
        captured.lock().unwrap().push(req.prompt.text());
        Ok(r#"{"response": "ok"}"#.to_string())
    });
    let client = client_with(&backend);
    let mut session = ChatSession::new();
    session.select_language("German").unwrap();

    session.send(&client, "first question").await.unwrap();
    session.send(&client, "second question").await.unwrap();

    let prompts = prompts.lock().unwrap();
    assert!(!prompts[0].contains("- user: first question"));
    assert!(prompts[1].contains("- user: first question"));
    assert!(prompts[1].contains("- model: ok"));
    assert!(!prompts[1].contains("- user: second question"));
    assert!(prompts[1].contains("in the selected language (German)"));
}

#[tokio::test]
async fn blank_messages_are_ignored() {
    let backend = MockBackend::returning(r#"{"response": "unused"}"#);
    let client = client_with(&backend);
    let mut session = ChatSession::new();
    session.select_language("English").unwrap();

    assert_eq!(session.send(&client, "   \n").await.unwrap(), None);
    assert_eq!(session.history().len(), 1);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn failed_turn_appends_an_apology_and_returns_the_error() {
    let backend = MockBackend::unavailable("backend down");
    let client = client_with(&backend);
    let mut session = ChatSession::new();
    session.select_language("Arabic").unwrap();

    let err = session.send(&client, "Is it going to rain?").await.unwrap_err();

    assert!(err.is_unavailable());
    let last = session.history().last().unwrap();
    assert_eq!(last.kind, EntryKind::ErrorReply);
    assert_eq!(last.message.content, ERROR_REPLY);
    assert_eq!(session.history().len(), 3);
}

#[tokio::test]
async fn diagnosis_is_carried_into_each_turn() {
    let backend = MockBackend::new(|req| {
        assert!(req.prompt.text().contains("- Disease: Early blight"));
        Ok(r#"{"response": "Remove lower leaves."}"#.to_string())
    });
    let client = client_with(&backend);
    let mut session = ChatSession::new();
    session.select_language("English").unwrap();
    session.set_diagnosis(Some(DiagnosisResult {
        is_healthy: false,
        disease: "Early blight".into(),
        remedy: "Copper fungicide".into(),
    }));

    let request = session.turn_request("What now?").unwrap();
    assert_eq!(request.diagnosis, session.diagnosis().cloned());

    session.send(&client, "What now?").await.unwrap();
    session.send(&client, "And after that?").await.unwrap();
    assert_eq!(backend.calls(), 2);
}

#[test]
fn switching_language_resets_history() {
    let mut session = ChatSession::new();
    session.select_language("English").unwrap();
    session.select_language("Japanese").unwrap();
    assert_eq!(session.history().len(), 1);
    assert!(session.history()[0].message.content.contains("Japanese"));

    session.reset_language();
    assert!(session.language().is_none());
    assert!(session.history().is_empty());
}

#[test]
fn entries_have_unique_ids() {
    let mut session = ChatSession::new();
    session.select_language("English").unwrap();
    let first = session.history()[0].id.clone();
    session.select_language("English").unwrap();
    assert_ne!(session.history()[0].id, first);
}

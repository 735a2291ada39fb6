//! Turn engine behavior against scripted engines

mod common;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use avatar_gateway::config::{DEFAULT_GREETING, DialogueConfig, QUICK_REPLIES};
use avatar_gateway::dialogue::TurnEvent;
use avatar_gateway::engines::{ChatRole, RecordStore, ToolChoice};
use avatar_gateway::{Session, TriggerPolicy, TurnEngine};
use common::{CapturingSynth, MapStore, Script, ScriptedCompletion};

async fn session_with_speaker() -> (Arc<Session>, Arc<CapturingSynth>) {
    let session = Arc::new(Session::new(Uuid::new_v4()));
    let synth = CapturingSynth::new();
    session
        .speaker
        .bind(synth.clone(), "test-voice".to_string(), None)
        .await;
    (session, synth)
}

fn engine(
    completion: Arc<ScriptedCompletion>,
    store: Option<Arc<dyn RecordStore>>,
    dialogue: DialogueConfig,
) -> Arc<TurnEngine> {
    let policy = TriggerPolicy::new(&[], vec!["Jane Doe".to_string()])
        .expect("built-in patterns compile");
    Arc::new(TurnEngine::new(completion, store, policy, dialogue, 150))
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn streamed_reply_chunks_into_sentences() {
    let completion = ScriptedCompletion::new(vec![Script::Stream(vec![
        "Hello", " there", ".", " All", " good", ".",
    ])]);
    let (session, synth) = session_with_speaker().await;
    let engine = engine(completion, None, DialogueConfig::default());

    let events = drain(engine.handle_turn(Arc::clone(&session), "hi".to_string())).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let spoken = synth.spoken.lock().await;
    assert_eq!(spoken.len(), 2);
    assert!(spoken[0].contains("Hello there."));
    assert!(spoken[1].contains("All good."));

    assert!(events.iter().any(|e| matches!(e, TurnEvent::Latency { marker: "first_token", .. })));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, TurnEvent::Latency { marker: "first_sentence", .. }))
    );

    let history = session.state.lock().await.history.clone();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].role, ChatRole::System);
    assert_eq!(history[1].role, ChatRole::User);
    assert_eq!(history[2].role, ChatRole::Assistant);
    assert_eq!(history[2].content, "Hello there. All good.");
}

#[tokio::test]
async fn long_replies_are_word_capped() {
    let completion = ScriptedCompletion::new(vec![Script::Stream(vec![
        "one ", "two ", "three ", "four ", "five", ".",
    ])]);
    let (session, _synth) = session_with_speaker().await;
    let dialogue = DialogueConfig { reply_word_cap: 3, ..DialogueConfig::default() };
    let engine = engine(completion, None, dialogue);

    drain(engine.handle_turn(Arc::clone(&session), "count".to_string())).await;

    let history = session.state.lock().await.history.clone();
    assert_eq!(history.last().map(|m| m.content.as_str()), Some("one two three..."));
}

#[tokio::test]
async fn named_patient_forces_lookup_tool() {
    let completion = ScriptedCompletion::new(vec![Script::Full {
        content: None,
        tool_calls: vec![("get_patient_data", r#"{"patient_name":"Jane Doe"}"#)],
    }]);
    let store = MapStore::with_jane();
    let (session, synth) = session_with_speaker().await;
    let engine = engine(
        Arc::clone(&completion),
        Some(store.clone()),
        DialogueConfig::default(),
    );

    let events =
        drain(engine.handle_turn(Arc::clone(&session), "pull up jane doe".to_string())).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Forced non-streaming request
    let requests = completion.requests.lock().await;
    assert!(!requests[0].stream);
    assert_eq!(
        requests[0].tool_choice,
        ToolChoice::Forced("get_patient_data".to_string())
    );
    drop(requests);

    // Acknowledgement both displayed and spoken
    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::Token(text) if text.contains("2 medical records for Jane Doe")
    )));
    let spoken = synth.spoken.lock().await;
    assert!(spoken.iter().any(|s| s.contains("2 medical records")));
    drop(spoken);

    // Record context loaded for the rest of the conversation
    assert!(session.state.lock().await.record_context.is_some());
}

#[tokio::test]
async fn quick_reply_speaks_while_the_lookup_runs() {
    let completion = ScriptedCompletion::new(vec![Script::Full {
        content: None,
        tool_calls: vec![("get_patient_data", r#"{"patient_name":"Jane Doe"}"#)],
    }]);
    let store = MapStore::with_jane();
    let dialogue = DialogueConfig { quick_replies: true, ..DialogueConfig::default() };
    let (session, synth) = session_with_speaker().await;
    let engine = engine(completion, Some(store), dialogue);

    drain(engine.handle_turn(Arc::clone(&session), "pull up jane doe".to_string())).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A canned filler goes out first, with a pause, then the lookup result
    let spoken = synth.spoken.lock().await;
    assert!(QUICK_REPLIES.iter().any(|q| spoken[0].contains(q)));
    assert!(spoken[0].contains("<break time='2000ms'/>"));
    assert!(spoken.last().expect("acknowledgement spoken").contains("2 medical records"));
}

#[tokio::test]
async fn greeting_opens_history_after_the_system_prompt() {
    let completion = ScriptedCompletion::new(vec![Script::Stream(vec!["Sure", "."])]);
    let (session, synth) = session_with_speaker().await;
    let engine = engine(completion, None, DialogueConfig::default());

    engine.greet(&session).await;
    engine.greet(&session).await;
    drain(engine.handle_turn(Arc::clone(&session), "hello".to_string())).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let history = session.state.lock().await.history.clone();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].role, ChatRole::System);
    assert_eq!(history[1].role, ChatRole::Assistant);
    assert_eq!(history[1].content, DEFAULT_GREETING);
    assert_eq!(history[2].role, ChatRole::User);
    assert_eq!(history[3].content, "Sure.");

    // Spoken once even though greet was called twice
    let spoken = synth.spoken.lock().await;
    assert_eq!(spoken.iter().filter(|s| s.contains(DEFAULT_GREETING)).count(), 1);
}

#[tokio::test]
async fn fallback_lookup_runs_when_model_skips_the_tool() {
    let completion =
        ScriptedCompletion::new(vec![Script::Full { content: Some("Certainly."), tool_calls: vec![] }]);
    let store = MapStore::with_jane();
    let dialogue = DialogueConfig { reply_word_cap: 100, ..DialogueConfig::default() };
    let (session, _synth) = session_with_speaker().await;
    let engine = engine(completion, Some(store.clone()), dialogue);

    drain(engine.handle_turn(Arc::clone(&session), "tell me about jane doe".to_string())).await;

    assert_eq!(store.lookups.lock().await.as_slice(), ["Jane Doe"]);
    assert!(session.state.lock().await.record_context.is_some());

    let history = session.state.lock().await.history.clone();
    let reply = &history.last().expect("assistant entry").content;
    assert!(reply.contains("Patient information found for Jane Doe"));
}

#[tokio::test]
async fn unknown_patient_asks_for_verification() {
    let completion = ScriptedCompletion::new(vec![Script::Full {
        content: None,
        tool_calls: vec![("get_patient_data", r#"{"patient_name":"Nobody Here"}"#)],
    }]);
    let store = MapStore::empty();
    let (session, _synth) = session_with_speaker().await;
    let engine = engine(completion, Some(store), DialogueConfig::default());

    let events = drain(
        engine.handle_turn(Arc::clone(&session), "the patient is Nobody Here".to_string()),
    )
    .await;

    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::Token(text) if text.contains("No records found")
    )));
    assert!(session.state.lock().await.record_context.is_none());
}

#[tokio::test]
async fn mid_stream_failure_keeps_partial_reply() {
    let completion =
        ScriptedCompletion::new(vec![Script::StreamThenFail(vec!["Partial", " reply"])]);
    let (session, _synth) = session_with_speaker().await;
    let engine = engine(completion, None, DialogueConfig::default());

    let events = drain(engine.handle_turn(Arc::clone(&session), "hi".to_string())).await;

    assert!(events.iter().any(|e| matches!(e, TurnEvent::Error(_))));
    let history = session.state.lock().await.history.clone();
    let assistants: Vec<_> =
        history.iter().filter(|m| m.role == ChatRole::Assistant).collect();
    assert_eq!(assistants.len(), 1);
    assert_eq!(assistants[0].content, "Partial reply");
}

#[tokio::test]
async fn request_failure_still_appends_one_assistant_entry() {
    let completion = ScriptedCompletion::new(vec![Script::Fail]);
    let (session, _synth) = session_with_speaker().await;
    let engine = engine(completion, None, DialogueConfig::default());

    let events = drain(engine.handle_turn(Arc::clone(&session), "hi".to_string())).await;

    assert!(events.iter().any(|e| matches!(e, TurnEvent::Error(_))));
    let history = session.state.lock().await.history.clone();
    let assistants: Vec<_> =
        history.iter().filter(|m| m.role == ChatRole::Assistant).collect();
    assert_eq!(assistants.len(), 1);
    assert!(assistants[0].content.is_empty());
}

#[tokio::test]
async fn turns_run_in_arrival_order() {
    let completion = ScriptedCompletion::new(vec![
        Script::Stream(vec!["First reply", "."]),
        Script::Stream(vec!["Second reply", "."]),
    ]);
    let (session, _synth) = session_with_speaker().await;
    let engine = engine(completion, None, DialogueConfig::default());

    let rx1 = engine.handle_turn(Arc::clone(&session), "first question".to_string());
    let rx2 = engine.handle_turn(Arc::clone(&session), "second question".to_string());
    drain(rx1).await;
    drain(rx2).await;

    let history = session.state.lock().await.history.clone();
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    let first_q = contents.iter().position(|c| *c == "first question").unwrap();
    let second_q = contents.iter().position(|c| *c == "second question").unwrap();
    assert!(first_q < second_q);
    assert_eq!(contents[first_q + 1], "First reply.");
    assert_eq!(contents[second_q + 1], "Second reply.");
}

#[tokio::test]
async fn interaction_alert_precedes_the_user_message() {
    let completion = ScriptedCompletion::new(vec![Script::Stream(vec!["Understood", "."])]);
    let (session, _synth) = session_with_speaker().await;
    session.state.lock().await.record_context = Some(common::jane());
    let engine = engine(Arc::clone(&completion), Some(MapStore::with_jane()), DialogueConfig::default());

    drain(engine.handle_turn(Arc::clone(&session), "let's start Diazepam".to_string())).await;

    let history = session.state.lock().await.history.clone();
    // system prompt, interaction alert, user, assistant
    assert_eq!(history.len(), 4);
    assert_eq!(history[1].role, ChatRole::System);
    assert!(history[1].content.contains("MEDICATION INTERACTION ALERT"));
    assert_eq!(history[2].role, ChatRole::User);
}

#[tokio::test]
async fn medication_question_reuses_loaded_context() {
    let completion = ScriptedCompletion::new(vec![Script::Full {
        content: None,
        tool_calls: vec![(
            "get_medication_info",
            r#"{"patient_name":"Jane Doe","medication_query_type":"last_visit"}"#,
        )],
    }]);
    let store = MapStore::with_jane();
    let (session, _synth) = session_with_speaker().await;
    session.state.lock().await.record_context = Some(common::jane());
    let engine = engine(
        Arc::clone(&completion),
        Some(store.clone()),
        DialogueConfig::default(),
    );

    let events = drain(
        engine.handle_turn(Arc::clone(&session), "what medications is she taking?".to_string()),
    )
    .await;

    assert_eq!(
        completion.requests.lock().await[0].tool_choice,
        ToolChoice::Forced("get_medication_info".to_string())
    );
    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::Token(text) if text.contains("Meclizine and Ondansetron")
    )));
    // Context was reused, no store round-trip
    assert!(store.lookups.lock().await.is_empty());
}

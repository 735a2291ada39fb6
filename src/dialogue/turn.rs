//! Turn execution
//!
//! One turn: append the user utterance, run the completion (streamed, or
//! one-shot when a lookup tool is forced), chunk the reply into the speech
//! queue as sentences close, and append exactly one assistant history
//! entry, even when the completion fails partway.
//!
//! Turns are serialized per session through `Session::turn_gate`; tokio
//! mutexes queue waiters fairly, so utterances recognized back-to-back
//! produce replies in recognition order.

use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use tokio::sync::mpsc;

use crate::config::{DialogueConfig, QUICK_REPLIES};
use crate::dialogue::sentence::{SentenceSplitter, cap_words, scrub_doc_refs};
use crate::dialogue::tools;
use crate::dialogue::trigger::TriggerPolicy;
use crate::engines::{
    ChatMessage, CompletionOutcome, CompletionRequest, CompletionResponse, CompletionService,
    RecordStore, ToolChoice,
};
use crate::records::interactions;
use crate::session::Session;

/// Event emitted while a turn runs
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Display text, streamed as produced
    Token(String),
    /// Latency measurement, e.g. `first_token` or `first_sentence`
    Latency { marker: &'static str, ms: i64 },
    /// The turn failed; any text already emitted stands
    Error(String),
}

pub struct TurnEngine {
    completion: Arc<dyn CompletionService>,
    records: Option<Arc<dyn RecordStore>>,
    policy: TriggerPolicy,
    dialogue: DialogueConfig,
    max_tokens: u32,
}

impl TurnEngine {
    #[must_use]
    pub fn new(
        completion: Arc<dyn CompletionService>,
        records: Option<Arc<dyn RecordStore>>,
        policy: TriggerPolicy,
        dialogue: DialogueConfig,
        max_tokens: u32,
    ) -> Self {
        Self { completion, records, policy, dialogue, max_tokens }
    }

    /// Speak and record the connect greeting, at most once per session.
    ///
    /// The system prompt is seeded first so history always opens with it.
    /// Called at avatar connect; clients that skip the avatar leg get the
    /// greeting at their first chat turn instead.
    pub async fn greet(&self, session: &Session) {
        let greeting = {
            let mut state = session.state.lock().await;
            if state.greeting_sent {
                return;
            }
            state.greeting_sent = true;
            if !state.chat_initiated {
                state.history.push(ChatMessage::system(self.dialogue.system_prompt.clone()));
                state.chat_initiated = true;
            }
            state.history.push(ChatMessage::assistant(self.dialogue.greeting.clone()));
            self.dialogue.greeting.clone()
        };
        session.speaker.enqueue(greeting, 0).await;
    }

    /// Run one turn. Events stream on the returned receiver; the turn keeps
    /// running even if the receiver is dropped.
    pub fn handle_turn(
        self: &Arc<Self>,
        session: Arc<Session>,
        utterance: String,
    ) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel(64);
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run(session, utterance, tx).await;
        });
        rx
    }

    async fn run(&self, session: Arc<Session>, utterance: String, tx: mpsc::Sender<TurnEvent>) {
        let _gate = session.turn_gate.lock().await;
        session.touch();
        tracing::info!(session = %session.id, utterance = %utterance, "handling turn");

        let (tool_choice, trigger_matched) = self.prepare(&session, &utterance).await;
        let start = Instant::now();

        let mut reply = if let Some(ToolChoice::Forced(name)) = tool_choice {
            self.forced_tool_turn(&session, name, &tx).await
        } else {
            self.streaming_turn(&session, &tx, start).await
        };

        // The model sometimes answers without calling the lookup tool even
        // though a record subject was named; fetch directly so the context
        // is loaded for the rest of the conversation
        if trigger_matched {
            if let Some(spoken) = self.direct_lookup_fallback(&session, &utterance).await {
                let _ = tx.send(TurnEvent::Token(spoken.clone())).await;
                session.speaker.enqueue(spoken.clone(), 0).await;
                if !reply.is_empty() {
                    reply.push(' ');
                }
                reply.push_str(&spoken);
            }
        }

        let reply = cap_words(&scrub_doc_refs(&reply), self.dialogue.reply_word_cap);
        // Exactly one assistant entry per turn, error or not
        session.append_history(ChatMessage::assistant(reply)).await;
    }

    /// Seed history, screen for interactions, append the user message, and
    /// decide the tool mode. Returns `None` for tool choice when no record
    /// store is configured.
    async fn prepare(
        &self,
        session: &Session,
        utterance: &str,
    ) -> (Option<ToolChoice>, bool) {
        let mut state = session.state.lock().await;
        if !state.chat_initiated {
            state.history.push(ChatMessage::system(self.dialogue.system_prompt.clone()));
            state.chat_initiated = true;
        }

        if let Some(records) = &state.record_context {
            let warnings = interactions::screen_utterance(utterance, records);
            if !warnings.is_empty() {
                tracing::warn!(session = %session.id, "medication interactions detected");
                state.history.push(ChatMessage::system(format!(
                    "MEDICATION INTERACTION ALERT: {} Please review before prescribing.",
                    warnings.join(" ")
                )));
            }
        }

        state.history.push(ChatMessage::user(utterance));

        let has_context = state.record_context.is_some();
        drop(state);

        if self.records.is_none() {
            return (None, false);
        }
        let matched = self.policy.matches(utterance);
        let choice = if matched && !has_context {
            ToolChoice::Forced(tools::GET_PATIENT_DATA.to_string())
        } else if has_context && TriggerPolicy::is_medication_query(utterance) {
            ToolChoice::Forced(tools::GET_MEDICATION_INFO.to_string())
        } else if has_context && TriggerPolicy::is_summary_request(utterance) {
            ToolChoice::Forced(tools::GET_PATIENT_SUMMARY.to_string())
        } else {
            ToolChoice::Auto
        };
        (Some(choice), matched && !has_context)
    }

    fn request(&self, messages: Vec<ChatMessage>, tool_choice: ToolChoice, stream: bool) -> CompletionRequest {
        let tools = if self.records.is_some() { tools::specs() } else { Vec::new() };
        CompletionRequest {
            messages,
            tools,
            tool_choice,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    /// Forced lookup path: one-shot completion, tool results spoken directly
    async fn forced_tool_turn(
        &self,
        session: &Arc<Session>,
        tool_name: String,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> String {
        if self.dialogue.quick_replies {
            // Pick before awaiting; ThreadRng must not cross an await
            let quick = QUICK_REPLIES.choose(&mut rand::thread_rng()).copied();
            if let Some(quick) = quick {
                session.speaker.enqueue(quick.to_string(), 2000).await;
            }
        }

        let messages = session.state.lock().await.history.clone();
        let request = self.request(messages, ToolChoice::Forced(tool_name), false);

        let response = match self.completion.complete(request).await {
            Ok(CompletionOutcome::Full(response)) => response,
            Ok(CompletionOutcome::Streaming(mut rx)) => {
                // Tolerate services that stream anyway
                let mut content = String::new();
                while let Some(chunk) = rx.recv().await {
                    match chunk {
                        Ok(c) => content.push_str(&c.token),
                        Err(e) => {
                            let _ = tx.send(TurnEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                }
                CompletionResponse { content: Some(content), tool_calls: Vec::new() }
            }
            Err(e) => {
                tracing::error!(session = %session.id, error = %e, "completion failed");
                let _ = tx.send(TurnEvent::Error(e.to_string())).await;
                return String::new();
            }
        };

        let mut reply = String::new();
        if let Some(store) = &self.records {
            for call in &response.tool_calls {
                let current = session.state.lock().await.record_context.clone();
                let outcome = tools::execute(call, store.as_ref(), current.as_ref()).await;
                if let Some(loaded) = outcome.loaded {
                    session.state.lock().await.record_context = Some(loaded);
                }
                let _ = tx.send(TurnEvent::Token(outcome.spoken.clone())).await;
                session.speaker.enqueue(outcome.spoken.clone(), 0).await;
                if !reply.is_empty() {
                    reply.push(' ');
                }
                reply.push_str(&outcome.spoken);
            }
        }

        if let Some(content) = response.content.filter(|c| !c.trim().is_empty()) {
            let _ = tx.send(TurnEvent::Token(content.clone())).await;
            session.speaker.enqueue(content.clone(), 0).await;
            if !reply.is_empty() {
                reply.push(' ');
            }
            reply.push_str(&content);
        }
        reply
    }

    /// Streaming path: tokens display as they arrive and sentences enqueue
    /// for speech as they close
    async fn streaming_turn(
        &self,
        session: &Arc<Session>,
        tx: &mpsc::Sender<TurnEvent>,
        start: Instant,
    ) -> String {
        let messages = session.state.lock().await.history.clone();
        let request = self.request(messages, ToolChoice::Auto, true);

        let mut stream = match self.completion.complete(request).await {
            Ok(CompletionOutcome::Streaming(rx)) => rx,
            Ok(CompletionOutcome::Full(response)) => {
                let content = response.content.unwrap_or_default();
                if !content.is_empty() {
                    let _ = tx.send(TurnEvent::Token(content.clone())).await;
                    session.speaker.enqueue(content.clone(), 0).await;
                }
                return content;
            }
            Err(e) => {
                tracing::error!(session = %session.id, error = %e, "completion failed");
                let _ = tx.send(TurnEvent::Error(e.to_string())).await;
                return String::new();
            }
        };

        let mut splitter = SentenceSplitter::new();
        let mut reply = String::new();
        let mut first_token = true;
        let mut first_sentence = true;

        while let Some(chunk) = stream.recv().await {
            let token = match chunk {
                Ok(c) => c.token,
                Err(e) => {
                    tracing::error!(session = %session.id, error = %e, "completion stream failed");
                    let _ = tx.send(TurnEvent::Error(e.to_string())).await;
                    break;
                }
            };
            if first_token {
                first_token = false;
                let _ = tx
                    .send(TurnEvent::Latency {
                        marker: "first_token",
                        ms: elapsed_ms(start),
                    })
                    .await;
            }
            let token = scrub_doc_refs(&token);
            let _ = tx.send(TurnEvent::Token(token.clone())).await;
            reply.push_str(&token);

            if let Some(sentence) = splitter.push(&token) {
                if first_sentence {
                    first_sentence = false;
                    let _ = tx
                        .send(TurnEvent::Latency {
                            marker: "first_sentence",
                            ms: elapsed_ms(start),
                        })
                        .await;
                }
                session.speaker.enqueue(sentence, 0).await;
            }
        }

        if let Some(rest) = splitter.flush() {
            session.speaker.enqueue(rest, 0).await;
        }
        reply
    }

    /// Direct record fetch when a subject was named but nothing got loaded
    async fn direct_lookup_fallback(
        &self,
        session: &Arc<Session>,
        utterance: &str,
    ) -> Option<String> {
        let store = self.records.as_ref()?;
        if session.state.lock().await.record_context.is_some() {
            return None;
        }
        let key = self.policy.extract_key(utterance)?;
        tracing::info!(session = %session.id, key = %key, "direct record lookup fallback");

        match store.lookup(&key).await {
            Ok(Some(set)) => {
                session.state.lock().await.record_context = Some(set);
                Some(format!(
                    "Patient information found for {key}. What would you like to know about \
                     this patient?"
                ))
            }
            Ok(None) => {
                Some(format!("No records found for {key}. Please verify the patient name."))
            }
            Err(e) => {
                tracing::error!(session = %session.id, error = %e, "fallback lookup failed");
                None
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> i64 {
    start.elapsed().as_millis() as i64
}

//! Drives one user turn through the model and the retrieval tools.
//!
//! A turn moves from awaiting the model, through any number of tool
//! round-trips, to streaming the final answer. Every exit path (success,
//! round cap, upstream failure, cancellation) ends generation on the
//! assistant message exactly once.

use super::conversation::{MessageId, Session, TurnEvent, TurnOutcome};
use crate::config::OrchestratorConfig;
use crate::error::{MedAssistError, Result};
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ModelIncrement, RawToolCall, ToolCall};
use crate::search::RetrievalService;
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tool result text when a search finds nothing
pub const NO_RESULTS_TEXT: &str = "No relevant information found.";

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Appended when a turn is cancelled
pub const CANCELLED_NOTE: &str = "(Response stopped.)";

/// A turn running in the background
#[derive(Debug)]
pub struct TurnHandle {
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
    cancel: CancellationToken,
    join: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Stop consuming the model stream; the turn still ends cleanly
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the turn to end
    pub async fn wait(self) -> Result<TurnOutcome> {
        self.join
            .await
            .map_err(|e| MedAssistError::ModelCall(format!("turn task failed: {}", e)))
    }
}

/// Tool-calling loop over a [`ChatModel`] and the [`RetrievalService`]
pub struct ToolOrchestrator {
    model: Arc<dyn ChatModel>,
    retrieval: Arc<RetrievalService>,
    config: OrchestratorConfig,
}

struct RoundResult {
    text: String,
    tool_calls: Vec<RawToolCall>,
}

impl ToolOrchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        retrieval: Arc<RetrievalService>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            model,
            retrieval,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn retrieval(&self) -> &Arc<RetrievalService> {
        &self.retrieval
    }

    /// Start a turn for `text`.
    ///
    /// The user message and an empty generating assistant message are
    /// appended before this returns; the rest runs on a spawned task. Must
    /// be called from within a tokio runtime.
    pub fn submit(self: &Arc<Self>, session: Arc<Session>, text: &str) -> Result<TurnHandle> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MedAssistError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        let (user_message_id, assistant_message_id) =
            session.update(|c| c.begin_turn(text))?;
        tracing::info!(
            "Turn started in session {} (assistant message {})",
            session.id(),
            assistant_message_id
        );

        let cancel = CancellationToken::new();
        let orchestrator = Arc::clone(self);
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            orchestrator
                .drive(session, assistant_message_id, token)
                .await
        });

        Ok(TurnHandle {
            user_message_id,
            assistant_message_id,
            cancel,
            join,
        })
    }

    /// Submit and wait for the turn to end
    pub async fn ask(self: &Arc<Self>, session: Arc<Session>, text: &str) -> Result<TurnOutcome> {
        self.submit(session, text)?.wait().await
    }

    async fn drive(
        &self,
        session: Arc<Session>,
        assistant: MessageId,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MedAssistError::Cancelled),
            result = AssertUnwindSafe(self.run_rounds(&session, assistant)).catch_unwind() => {
                result.unwrap_or_else(|panic| Err(MedAssistError::ModelCall(format!(
                    "turn panicked: {}",
                    panic_message(panic.as_ref())
                ))))
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(MedAssistError::Cancelled) => {
                tracing::info!("Turn {} cancelled", assistant);
                self.close_with(&session, assistant, CANCELLED_NOTE);
                TurnOutcome::Cancelled
            }
            Err(e) => {
                tracing::warn!("Turn {} failed: {}", assistant, e);
                self.close_with(&session, assistant, &self.config.apology);
                TurnOutcome::Failed
            }
        };

        if outcome == TurnOutcome::Completed {
            let empty = session
                .message(assistant)
                .map(|m| m.content.trim().is_empty())
                .unwrap_or(false);
            if empty {
                self.close_with(&session, assistant, &self.config.empty_answer_message);
            }
        }

        let finished = session.update(|c| c.finish(assistant));
        if let Err(e) = finished {
            tracing::warn!("Could not finish {}: {}", assistant, e);
        }

        let content = session
            .message(assistant)
            .map(|m| m.content)
            .unwrap_or_default();
        session.publish(TurnEvent::Status {
            message_id: assistant,
            status: None,
        });
        session.publish(TurnEvent::Done {
            message_id: assistant,
            content,
            outcome,
        });
        tracing::info!("Turn {} ended: {:?}", assistant, outcome);
        outcome
    }

    /// Append a closing paragraph while the message is still generating
    fn close_with(&self, session: &Session, assistant: MessageId, text: &str) {
        let appended = session.update(|c| {
            c.set_status(assistant, None)?;
            c.append_paragraph(assistant, text)
        });
        match appended {
            Ok(added) => {
                session.publish(TurnEvent::Delta {
                    message_id: assistant,
                    text: added,
                });
            }
            Err(e) => tracing::warn!("Could not append to {}: {}", assistant, e),
        }
    }

    async fn run_rounds(&self, session: &Session, assistant: MessageId) -> Result<TurnOutcome> {
        let mut transcript = session.read(|c| c.to_chat_messages(Some(assistant)));
        let mut round = 0;

        loop {
            tracing::debug!("Turn {} round {}: {} messages", assistant, round, transcript.len());
            let result = self.stream_round(session, assistant, &transcript).await?;

            if result.tool_calls.is_empty() {
                return Ok(TurnOutcome::Completed);
            }

            if round >= self.config.max_tool_rounds {
                tracing::warn!(
                    "Turn {} still requesting tools after {} rounds; giving up",
                    assistant,
                    round
                );
                self.close_with(session, assistant, &self.config.round_limit_message);
                return Ok(TurnOutcome::RoundLimit);
            }

            let calls: Vec<ToolCall> = result
                .tool_calls
                .iter()
                .filter_map(|raw| match ToolCall::parse(raw) {
                    Ok(call) => Some(call),
                    Err(e) => {
                        tracing::warn!("Skipping tool call {}: {}", raw.id, e);
                        None
                    }
                })
                .collect();

            if calls.is_empty() {
                return Ok(TurnOutcome::Completed);
            }

            transcript.push(ChatMessage::assistant_tool_calls(
                result.text,
                calls.iter().map(ToolCall::to_wire).collect(),
            ));

            for call in &calls {
                let content = self.execute_tool(session, assistant, call).await?;
                transcript.push(ChatMessage::tool(&call.id, call.kind.name(), content));
            }

            round += 1;
        }
    }

    /// One model call; text is streamed into the assistant message as it arrives
    async fn stream_round(
        &self,
        session: &Session,
        assistant: MessageId,
        transcript: &[ChatMessage],
    ) -> Result<RoundResult> {
        let mut stream = self
            .model
            .stream_chat(ChatRequest::new(transcript.to_vec()))
            .await?;

        let mut result = RoundResult {
            text: String::new(),
            tool_calls: Vec::new(),
        };

        let idle = Duration::from_secs(self.config.stream_idle_timeout_secs);
        loop {
            let Some(increment) = tokio::time::timeout(idle, stream.next())
                .await
                .map_err(|_| {
                    MedAssistError::ModelCall(format!(
                        "model stream idle for {}s",
                        idle.as_secs()
                    ))
                })?
            else {
                break;
            };
            match increment? {
                ModelIncrement::Text(text) => {
                    session.update(|c| c.append_content(assistant, &text))?;
                    session.publish(TurnEvent::Delta {
                        message_id: assistant,
                        text: text.clone(),
                    });
                    result.text.push_str(&text);
                }
                ModelIncrement::ToolCall(call) => {
                    tracing::debug!("Model requested {} ({})", call.name, call.id);
                    result.tool_calls.push(call);
                }
            }
        }

        Ok(result)
    }

    /// Run one tool call and record its result; returns the text for the model
    async fn execute_tool(
        &self,
        session: &Session,
        assistant: MessageId,
        call: &ToolCall,
    ) -> Result<String> {
        let status = call.kind.status_text().to_string();
        session.update(|c| c.set_status(assistant, Some(status.clone())))?;
        session.publish(TurnEvent::Status {
            message_id: assistant,
            status: Some(status),
        });

        let outcome = self.retrieval.execute(call).await?;
        tracing::debug!(
            "{} '{}' returned {} sources",
            call.kind,
            call.query,
            outcome.records.len()
        );

        session.record_search(&call.query, &outcome);
        session.publish(TurnEvent::Sources {
            tool: call.kind,
            records: outcome.records.clone(),
        });

        let content = if outcome.combined_text.trim().is_empty() {
            NO_RESULTS_TEXT.to_string()
        } else {
            outcome.combined_text
        };

        let tool_message = session.update(|c| {
            let id = c.push_tool_result(assistant, call, content.clone(), outcome.records)?;
            c.set_status(assistant, None)?;
            Ok::<_, MedAssistError>(id)
        })?;
        session.publish(TurnEvent::ToolResult {
            message_id: tool_message,
            tool: call.kind,
            tool_call_id: call.id.clone(),
            content: content.clone(),
        });
        session.publish(TurnEvent::Status {
            message_id: assistant,
            status: None,
        });

        Ok(content)
    }
}

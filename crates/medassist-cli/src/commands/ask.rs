//! One-shot question

use crate::app::{AskArgs, OutputFormat};
use crate::commands::build_orchestrator;
use crate::output;
use anyhow::Result;
use medassist_core::chat::ConversationStore;
use medassist_core::{Config, TurnEvent, TurnHandle, TurnOutcome};
use std::io::{self, Write};
use tokio::sync::broadcast::{error::RecvError, Receiver};

pub async fn run(args: AskArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let question = args.question.join(" ");
    let orchestrator = build_orchestrator(config)?;
    let store = ConversationStore::new(config.orchestrator.system_prompt.clone());
    let session = store.create("ask")?;

    // Subscribe before submitting so no delta is missed
    let events = session.events();
    let handle = orchestrator.submit(session.clone(), &question)?;
    let assistant_id = handle.assistant_message_id;

    let outcome = match format {
        OutputFormat::Cli => {
            let outcome = stream_to_terminal(handle, events).await?;
            println!();
            print!(
                "{}",
                output::format_sources(&session.current_sources(), format)
            );
            outcome
        }
        OutputFormat::Json => {
            let outcome = handle.wait().await?;
            let answer = session
                .message(assistant_id)
                .map(|m| m.content)
                .unwrap_or_default();
            let body = serde_json::json!({
                "question": question,
                "answer": answer,
                "outcome": outcome,
                "sources": session.current_sources(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            outcome
        }
    };

    tracing::debug!("Turn ended: {:?}", outcome);
    Ok(())
}

/// Print deltas as they arrive and status lines to stderr; Ctrl-C stops the turn.
pub async fn stream_to_terminal(
    handle: TurnHandle,
    mut events: Receiver<TurnEvent>,
) -> Result<TurnOutcome> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stdout = io::stdout();

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !handle.cancellation_token().is_cancelled() => {
                handle.cancel();
            }
            event = events.recv() => match event {
                Ok(TurnEvent::Delta { message_id, text }) if message_id == handle.assistant_message_id => {
                    write!(stdout, "{}", text)?;
                    stdout.flush()?;
                }
                Ok(TurnEvent::Status { status: Some(status), .. }) => {
                    eprintln!("[{}]", status);
                }
                Ok(TurnEvent::Done { message_id, .. }) if message_id == handle.assistant_message_id => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Terminal fell behind by {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    Ok(handle.wait().await?)
}

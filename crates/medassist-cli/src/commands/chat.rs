//! Interactive conversation

use crate::app::OutputFormat;
use crate::commands::build_orchestrator;
use crate::output;
use anyhow::Result;
use futures::StreamExt;
use medassist_core::chat::ConversationStore;
use medassist_core::{Config, MessageSnapshot, Session, StreamDispatcher, TurnHandle, TurnOutcome};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "Commands: /reset clears the conversation, /sources lists the latest sources, /quit exits";

pub async fn run(config: &Config, format: OutputFormat) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let store = ConversationStore::new(config.orchestrator.system_prompt.clone());
    let session = store.create("chat")?;
    let dispatcher = StreamDispatcher::new(&config.dispatcher);

    println!("MedAssist ready. {}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/reset" => {
                session.reset()?;
                println!("Conversation cleared.");
            }
            "/sources" => print!(
                "{}",
                output::format_sources(&session.current_sources(), format)
            ),
            question => {
                let handle = orchestrator.submit(session.clone(), question)?;
                let outcome = render_turn(&dispatcher, &session, handle).await?;
                tracing::debug!("Turn ended: {:?}", outcome);
            }
        }
    }

    Ok(())
}

/// Follow the assistant message through snapshots, printing only new text
async fn render_turn(
    dispatcher: &StreamDispatcher,
    session: &Arc<Session>,
    handle: TurnHandle,
) -> Result<TurnOutcome> {
    let mut snapshots = dispatcher.subscribe(session.clone(), handle.assistant_message_id);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stdout = io::stdout();
    let mut printed = 0;
    let mut status: Option<String> = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !handle.cancellation_token().is_cancelled() => {
                handle.cancel();
            }
            next = snapshots.next() => {
                let Some(snapshot) = next else { break };
                printed = write_new_text(&mut stdout, &snapshot, printed)?;
                if snapshot.status != status {
                    if let Some(text) = &snapshot.status {
                        eprintln!("\n[{}]", text);
                    }
                    status = snapshot.status.clone();
                }
            }
        }
    }
    println!();

    Ok(handle.wait().await?)
}

/// Content only grows while a message is generating
fn write_new_text(out: &mut impl Write, snapshot: &MessageSnapshot, printed: usize) -> Result<usize> {
    if let Some(new_text) = snapshot.content.get(printed..) {
        if !new_text.is_empty() {
            write!(out, "{}", new_text)?;
            out.flush()?;
        }
    }
    Ok(snapshot.content.len().max(printed))
}

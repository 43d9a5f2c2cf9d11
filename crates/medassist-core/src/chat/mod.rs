//! Conversation state, the tool-calling turn loop and snapshot streaming

mod conversation;
mod dispatcher;
mod orchestrator;

pub use crate::llm::Role;
pub use conversation::{
    Conversation, ConversationStore, CurrentSources, Message, MessageId, SearchHistoryEntry,
    Session, TurnEvent, TurnOutcome,
};
pub use dispatcher::{MessageSnapshot, StreamDispatcher};
pub use orchestrator::{ToolOrchestrator, TurnHandle, CANCELLED_NOTE, NO_RESULTS_TEXT};

//! Conversation log, per-session state and the session store

use crate::error::{MedAssistError, Result};
use crate::llm::{ChatMessage, Role, ToolCall, ToolKind};
use crate::search::{DoctorItem, KnowledgeItem, SearchOutcome, SourceRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{broadcast, watch};

/// Position of a message in its conversation's append-only log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub usize);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One entry of the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub generating: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool that produced a `tool` message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool calls executed while producing an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_sources: Option<Vec<SourceRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            generating: false,
            tool_call_id: None,
            tool_name: None,
            tool_calls: Vec::new(),
            attached_sources: None,
            status: None,
        }
    }
}

/// Ordered message log that always starts with one system message.
///
/// At most one message is generating at a time; content of a generating
/// message only grows, and is frozen once generation ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::new(Role::System, system_prompt)],
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.get(id.0)
    }

    fn message_mut(&mut self, id: MessageId) -> Result<&mut Message> {
        self.messages
            .get_mut(id.0)
            .ok_or(MedAssistError::MessageNotFound(id.0))
    }

    fn generating_message_mut(&mut self, id: MessageId) -> Result<&mut Message> {
        let message = self.message_mut(id)?;
        if !message.generating {
            return Err(MedAssistError::InvalidInput(format!(
                "message {} is no longer generating",
                id
            )));
        }
        Ok(message)
    }

    /// The message currently being generated, if any
    pub fn generating_message(&self) -> Option<MessageId> {
        self.messages
            .iter()
            .position(|m| m.generating)
            .map(MessageId)
    }

    fn push(&mut self, message: Message) -> MessageId {
        self.messages.push(message);
        MessageId(self.messages.len() - 1)
    }

    /// Append a user message and an empty generating assistant placeholder.
    ///
    /// Fails if another message is still generating.
    pub fn begin_turn(&mut self, user_text: impl Into<String>) -> Result<(MessageId, MessageId)> {
        if let Some(id) = self.generating_message() {
            return Err(MedAssistError::InvalidInput(format!(
                "a reply is still being generated ({})",
                id
            )));
        }
        let user = self.push(Message::new(Role::User, user_text));
        let assistant = self.push(Message {
            generating: true,
            ..Message::new(Role::Assistant, "")
        });
        Ok((user, assistant))
    }

    pub fn append_content(&mut self, id: MessageId, text: &str) -> Result<()> {
        self.generating_message_mut(id)?.content.push_str(text);
        Ok(())
    }

    /// Append a separate paragraph (status notes, apologies).
    /// Returns exactly what was added to the content.
    pub fn append_paragraph(&mut self, id: MessageId, text: &str) -> Result<String> {
        let message = self.generating_message_mut(id)?;
        let added = if message.content.trim().is_empty() {
            text.to_string()
        } else {
            format!("\n\n{}", text)
        };
        message.content.push_str(&added);
        Ok(added)
    }

    pub fn set_status(&mut self, id: MessageId, status: Option<String>) -> Result<()> {
        self.generating_message_mut(id)?.status = status;
        Ok(())
    }

    /// Record an executed tool call on the assistant message and append its
    /// `tool` result message.
    pub fn push_tool_result(
        &mut self,
        assistant: MessageId,
        call: &ToolCall,
        content: impl Into<String>,
        sources: Vec<SourceRecord>,
    ) -> Result<MessageId> {
        self.generating_message_mut(assistant)?
            .tool_calls
            .push(call.clone());
        Ok(self.push(Message {
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.kind.name().to_string()),
            attached_sources: Some(sources),
            ..Message::new(Role::Tool, content)
        }))
    }

    /// End generation. Returns false if the message had already finished.
    pub fn finish(&mut self, id: MessageId) -> Result<bool> {
        let message = self.message_mut(id)?;
        if !message.generating {
            return Ok(false);
        }
        message.generating = false;
        message.status = None;
        Ok(true)
    }

    /// Drop everything but the system message
    pub fn reset(&mut self) -> Result<()> {
        if let Some(id) = self.generating_message() {
            return Err(MedAssistError::InvalidInput(format!(
                "cannot reset while {} is generating",
                id
            )));
        }
        self.messages.truncate(1);
        Ok(())
    }

    /// Model-facing history.
    ///
    /// Assistant messages that used tools are replayed as an assistant
    /// `tool_calls` message, the matching tool results, then the answer
    /// text. `exclude` skips the placeholder of the turn being generated.
    pub fn to_chat_messages(&self, exclude: Option<MessageId>) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len());

        for (idx, message) in self.messages.iter().enumerate() {
            if exclude == Some(MessageId(idx)) {
                continue;
            }
            match message.role {
                Role::System => out.push(ChatMessage::system(&message.content)),
                Role::User => out.push(ChatMessage::user(&message.content)),
                Role::Tool => {}
                Role::Assistant => {
                    if !message.tool_calls.is_empty() {
                        let turn_end = self.messages[idx + 1..]
                            .iter()
                            .position(|m| m.role == Role::User)
                            .map(|p| idx + 1 + p)
                            .unwrap_or(self.messages.len());
                        // Results are appended in call order; ids may repeat across rounds
                        let results = self.messages[idx + 1..turn_end]
                            .iter()
                            .filter(|m| m.role == Role::Tool);
                        let pairs: Vec<(&ToolCall, &Message)> =
                            message.tool_calls.iter().zip(results).collect();
                        for group in split_on_repeated_ids(&pairs) {
                            out.push(ChatMessage::assistant_tool_calls(
                                "",
                                group.iter().map(|(call, _)| call.to_wire()).collect(),
                            ));
                            for (call, result) in group {
                                out.push(ChatMessage::tool(
                                    &call.id,
                                    call.kind.name(),
                                    &result.content,
                                ));
                            }
                        }
                    }
                    if !message.content.is_empty() {
                        out.push(ChatMessage::assistant(&message.content));
                    }
                }
            }
        }
        out
    }
}

/// Split recorded calls into groups with distinct ids, so no replayed
/// `tool_calls` message carries the same id twice.
fn split_on_repeated_ids<'a>(
    pairs: &'a [(&'a ToolCall, &'a Message)],
) -> Vec<&'a [(&'a ToolCall, &'a Message)]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 0..pairs.len() {
        if pairs[start..i].iter().any(|(call, _)| call.id == pairs[i].0.id) {
            groups.push(&pairs[start..i]);
            start = i;
        }
    }
    if start < pairs.len() {
        groups.push(&pairs[start..]);
    }
    groups
}

/// Sources most recently shown to the user, one list per category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentSources {
    pub knowledge_base: Vec<KnowledgeItem>,
    pub doctors: Vec<DoctorItem>,
}

impl CurrentSources {
    /// Replace the category the outcome belongs to
    pub fn replace(&mut self, outcome: &SearchOutcome) {
        match outcome.kind {
            ToolKind::SearchKnowledgeBase => {
                self.knowledge_base = outcome
                    .records
                    .iter()
                    .filter_map(|r| match r {
                        SourceRecord::Knowledge(item) => Some(item.clone()),
                        SourceRecord::Doctor(_) => None,
                    })
                    .collect();
            }
            ToolKind::SearchDoctors => {
                self.doctors = outcome
                    .records
                    .iter()
                    .filter_map(|r| match r {
                        SourceRecord::Doctor(item) => Some(item.clone()),
                        SourceRecord::Knowledge(_) => None,
                    })
                    .collect();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.knowledge_base.is_empty() && self.doctors.is_empty()
    }
}

/// A past knowledge-base search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub query: String,
    pub results: Vec<KnowledgeItem>,
    pub timestamp: DateTime<Utc>,
}

/// Why a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    RoundLimit,
    Failed,
    Cancelled,
}

/// Progress of a turn, published on the session's event channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Status {
        message_id: MessageId,
        status: Option<String>,
    },
    Delta {
        message_id: MessageId,
        text: String,
    },
    Sources {
        tool: ToolKind,
        records: Vec<SourceRecord>,
    },
    ToolResult {
        message_id: MessageId,
        tool: ToolKind,
        tool_call_id: String,
        content: String,
    },
    Done {
        message_id: MessageId,
        content: String,
        outcome: TurnOutcome,
    },
}

const EVENT_CAPACITY: usize = 256;

/// State of one conversation: its log, sources, search history and
/// change notification channels.
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    conversation: RwLock<Conversation>,
    sources: RwLock<CurrentSources>,
    history: RwLock<Vec<SearchHistoryEntry>>,
    version: watch::Sender<u64>,
    events: broadcast::Sender<TurnEvent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("version", &*self.version.borrow())
            .finish()
    }
}

impl Session {
    pub fn new(id: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        let (version, _) = watch::channel(0);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id: id.into(),
            created_at: Utc::now(),
            conversation: RwLock::new(Conversation::new(system_prompt)),
            sources: RwLock::new(CurrentSources::default()),
            history: RwLock::new(Vec::new()),
            version,
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Read the conversation under the lock
    pub fn read<R>(&self, f: impl FnOnce(&Conversation) -> R) -> R {
        let conversation = self
            .conversation
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&conversation)
    }

    /// Mutate the conversation and wake subscribers
    pub fn update<R>(&self, f: impl FnOnce(&mut Conversation) -> R) -> R {
        let result = {
            let mut conversation = self
                .conversation
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            f(&mut conversation)
        };
        self.bump();
        result
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.read(Conversation::snapshot)
    }

    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.read(|c| c.message(id).cloned())
    }

    pub fn len(&self) -> usize {
        self.read(Conversation::len)
    }

    pub fn is_generating(&self) -> bool {
        self.read(|c| c.generating_message().is_some())
    }

    pub fn current_sources(&self) -> CurrentSources {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn search_history(&self) -> Vec<SearchHistoryEntry> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record a search outcome in the sources projection (and history for
    /// knowledge-base searches)
    pub fn record_search(&self, query: &str, outcome: &SearchOutcome) {
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(outcome);

        if outcome.kind == ToolKind::SearchKnowledgeBase {
            let results = outcome
                .records
                .iter()
                .filter_map(|r| match r {
                    SourceRecord::Knowledge(item) => Some(item.clone()),
                    SourceRecord::Doctor(_) => None,
                })
                .collect();
            self.history
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(SearchHistoryEntry {
                    query: query.to_string(),
                    results,
                    timestamp: Utc::now(),
                });
        }
        self.bump();
    }

    /// Clear the log back to the system message and forget sources
    pub fn reset(&self) -> Result<()> {
        self.update(Conversation::reset)?;
        *self.sources.write().unwrap_or_else(PoisonError::into_inner) = CurrentSources::default();
        Ok(())
    }

    /// Publish an event; dropped silently when nobody listens
    pub fn publish(&self, event: TurnEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    pub fn events(&self) -> broadcast::Receiver<TurnEvent> {
        self.events.subscribe()
    }

    /// Receiver that changes on every mutation of this session
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

/// Session id → session
#[derive(Clone)]
pub struct ConversationStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    system_prompt: Arc<str>,
}

impl ConversationStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            system_prompt: Arc::from(system_prompt.into()),
        }
    }

    pub fn create(&self, id: impl Into<String>) -> Result<Arc<Session>> {
        let id = id.into();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&id) {
            return Err(MedAssistError::InvalidInput(format!(
                "session {} already exists",
                id
            )));
        }
        let session = Arc::new(Session::new(id.clone(), self.system_prompt.as_ref()));
        sessions.insert(id.clone(), Arc::clone(&session));
        tracing::debug!("Created session {}", id);
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| MedAssistError::SessionNotFound(id.to_string()))
    }

    pub fn get_or_create(&self, id: &str) -> Arc<Session> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            sessions
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Session::new(id, self.system_prompt.as_ref()))),
        )
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Session ids, sorted
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

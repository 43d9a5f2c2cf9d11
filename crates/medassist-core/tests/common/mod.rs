//! Test doubles shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use medassist_core::llm::{IncrementStream, RawToolCall};
use medassist_core::{
    ChatModel, ChatRequest, Embedder, MedAssistError, ModelIncrement, Result, RetrievalConfig,
    RetrievalService, SqliteIndex, VectorIndex,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Embedder driven by a table of `(needle, vector)` rules; the first rule
/// whose needle occurs in the text (case-insensitive) wins.
pub struct TableEmbedder {
    rules: Vec<(String, Vec<f32>)>,
    fallback: Vec<f32>,
    fail: bool,
}

impl TableEmbedder {
    pub fn new(rules: &[(&str, [f32; 3])]) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|(needle, v)| (needle.to_lowercase(), v.to_vec()))
                .collect(),
            fallback: vec![0.0, 0.0, 1.0],
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            rules: Vec::new(),
            fallback: vec![0.0, 0.0, 1.0],
            fail: true,
        }
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail {
            return Err(MedAssistError::Embedding("service unavailable".to_string()));
        }
        let lower = text.to_lowercase();
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| lower.contains(needle.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.fallback.clone()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        3
    }

    fn model_name(&self) -> &str {
        "table"
    }
}

/// One scripted model call
pub enum Script {
    /// Yield these increments, then end
    Stream(Vec<Result<ModelIncrement>>),
    /// Fail before streaming
    Fail(String),
    /// Yield these texts, then never finish
    Hang(Vec<String>),
    /// Panic inside the model call
    Panic,
}

pub fn text(s: &str) -> Result<ModelIncrement> {
    Ok(ModelIncrement::Text(s.to_string()))
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> Result<ModelIncrement> {
    Ok(ModelIncrement::ToolCall(RawToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }))
}

pub fn kb_call(id: &str, query: &str) -> Result<ModelIncrement> {
    tool_call(
        id,
        "search_knowledge_base",
        &serde_json::json!({ "query": query }).to_string(),
    )
}

pub fn doctor_call(id: &str, query: &str) -> Result<ModelIncrement> {
    tool_call(
        id,
        "search_doctors",
        &serde_json::json!({ "query": query }).to_string(),
    )
}

/// Chat model that replays scripts in order and records every request
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream_chat(&self, request: ChatRequest) -> Result<IncrementStream> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Stream(items)) => Ok(futures::stream::iter(items).boxed()),
            Some(Script::Fail(reason)) => Err(MedAssistError::ModelCall(reason)),
            Some(Script::Hang(texts)) => Ok(futures::stream::iter(
                texts.into_iter().map(|t| Ok(ModelIncrement::Text(t))),
            )
            .chain(futures::stream::pending())
            .boxed()),
            Some(Script::Panic) => panic!("scripted model panicked"),
            None => Err(MedAssistError::ModelCall("script exhausted".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Query and document vectors used across tests
pub fn embedder_rules() -> Vec<(&'static str, [f32; 3])> {
    vec![
        // Queries
        ("diabetes symptoms", [1.0, 0.0, 0.0]),
        ("recommend a doctor for eyesight", [0.9, 0.1, 0.0]),
        ("eye doctor", [0.9, 0.1, 0.0]),
        ("diabetes doctor", [0.0, 0.1, 0.9]),
        ("unrelated", [0.0, 0.0, -1.0]),
        // Documents
        ("ophthalmologist", [1.0, 0.0, 0.0]),
        ("breast cancer", [0.0, 1.0, 0.0]),
        ("diabetics", [0.0, 0.0, 1.0]),
    ]
}

/// In-memory index with a single "Diabetes Overview" article scoring 0.83
/// against the "diabetes symptoms" query.
pub async fn knowledge_index(config: &RetrievalConfig) -> Arc<SqliteIndex> {
    let index = Arc::new(SqliteIndex::open_in_memory().unwrap());
    index
        .ensure_collection(
            &config.knowledge_collection,
            3,
            medassist_core::Distance::Cosine,
        )
        .await
        .unwrap();
    index
        .upsert(
            &config.knowledge_collection,
            vec![medassist_core::Point {
                id: 1,
                vector: vec![0.83, 0.55776, 0.0],
                payload: serde_json::json!({
                    "title": "Diabetes Overview",
                    "content": "Diabetes is a condition where blood sugar is too high. Symptoms include thirst, frequent urination and fatigue.",
                    "source_link": "https://example.com/diabetes",
                    "chunk_index": 0,
                    "total_chunks": 1,
                }),
            }],
        )
        .await
        .unwrap();
    index
}

pub fn retrieval(
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
) -> Arc<RetrievalService> {
    Arc::new(RetrievalService::new(embedder, index, config))
}

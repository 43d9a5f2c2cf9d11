//! Incremental decoder for OpenAI-style server-sent completion streams.
//!
//! Text deltas are surfaced as soon as their line is complete. Tool-call
//! fragments are accumulated per `index` and only released, in index order,
//! when the stream finishes.

use super::{ModelIncrement, RawToolCall};
use crate::error::{MedAssistError, Result};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Line-buffered SSE decoder that tolerates chunks split mid-line or
/// mid-codepoint.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `data: [DONE]` has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes; returns the text increments completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<ModelIncrement>> {
        let mut out = Vec::new();
        if self.done {
            return Ok(out);
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.process_line(&line, &mut out)?;
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        Ok(out)
    }

    /// Flush any trailing line and release assembled tool calls
    pub fn finish(&mut self) -> Result<Vec<ModelIncrement>> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.process_line(&line, &mut out)?;
        }

        for (index, partial) in std::mem::take(&mut self.tool_calls) {
            tracing::debug!(
                "Assembled tool call #{} {} ({} bytes of arguments)",
                index,
                partial.name,
                partial.arguments.len()
            );
            out.push(ModelIncrement::ToolCall(RawToolCall {
                id: partial.id,
                name: partial.name,
                arguments: partial.arguments,
            }));
        }
        Ok(out)
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<ModelIncrement>) -> Result<()> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(data) = line.strip_prefix("data:") else {
            // Comments, `event:` and blank separators carry nothing for us
            return Ok(());
        };
        let data = data.trim_start();

        if data == "[DONE]" {
            self.done = true;
            return Ok(());
        }

        let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
            tracing::warn!("Skipping undecodable stream line: {}", data);
            return Ok(());
        };

        if let Some(error) = event.get("error").filter(|e| !e.is_null()) {
            let message = error["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(MedAssistError::ModelCall(format!(
                "stream reported error: {}",
                message
            )));
        }

        let delta = &event["choices"][0]["delta"];

        if let Some(content) = delta["content"].as_str() {
            if !content.is_empty() {
                out.push(ModelIncrement::Text(content.to_string()));
            }
        }

        if let Some(fragments) = delta["tool_calls"].as_array() {
            for fragment in fragments {
                let index = fragment["index"].as_u64().unwrap_or(0) as usize;
                let entry = self.tool_calls.entry(index).or_default();

                if let Some(id) = fragment["id"].as_str() {
                    if entry.id.is_empty() {
                        entry.id = id.to_string();
                    }
                }
                if let Some(name) = fragment["function"]["name"].as_str() {
                    if entry.name.is_empty() {
                        entry.name = name.to_string();
                    }
                }
                if let Some(arguments) = fragment["function"]["arguments"].as_str() {
                    entry.arguments.push_str(arguments);
                }
            }
        }

        Ok(())
    }
}

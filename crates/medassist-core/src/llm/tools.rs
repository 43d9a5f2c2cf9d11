//! Tool declarations offered to the model and parsing of its tool calls

use super::{WireFunction, WireToolCall};
use crate::error::{MedAssistError, Result};
use serde::{Deserialize, Serialize};

/// The retrieval tools the assistant may call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    SearchKnowledgeBase,
    SearchDoctors,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::SearchKnowledgeBase, ToolKind::SearchDoctors];

    /// Function name as declared to the model
    pub fn name(self) -> &'static str {
        match self {
            Self::SearchKnowledgeBase => "search_knowledge_base",
            Self::SearchDoctors => "search_doctors",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Status line shown on the assistant message while the tool runs
    pub fn status_text(self) -> &'static str {
        match self {
            Self::SearchKnowledgeBase => "Searching the knowledge base...",
            Self::SearchDoctors => "Looking for suitable doctors...",
        }
    }

    pub fn spec(self) -> ToolSpec {
        let (description, example) = match self {
            Self::SearchKnowledgeBase => (
                "Retrieve health information from the knowledge base given the query.",
                "The user query, e.g. what is diabetes?",
            ),
            Self::SearchDoctors => (
                "Get the suitable doctors based on the user's health query.",
                "The user query, e.g. recommend me a doctor for diabetes",
            ),
        };
        ToolSpec {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": example
                    }
                },
                "required": ["query"]
            }),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Function declaration sent with every completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    /// Both retrieval tools
    pub fn all() -> Vec<ToolSpec> {
        ToolKind::ALL.into_iter().map(ToolKind::spec).collect()
    }

    /// OpenAI function-calling wire format
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Tool call exactly as the model produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument text
    pub arguments: String,
}

/// Validated tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub kind: ToolKind,
    pub query: String,
}

#[derive(Deserialize)]
struct QueryArguments {
    query: String,
}

impl ToolCall {
    /// Validate a raw call: the name must be declared and the arguments must
    /// carry a non-empty `query` string.
    pub fn parse(raw: &RawToolCall) -> Result<ToolCall> {
        let kind = ToolKind::from_name(&raw.name)
            .ok_or_else(|| MedAssistError::UnknownTool(raw.name.clone()))?;

        let arguments = if raw.arguments.trim().is_empty() {
            "{}"
        } else {
            raw.arguments.as_str()
        };
        let parsed: QueryArguments =
            serde_json::from_str(arguments).map_err(|e| MedAssistError::InvalidToolArguments {
                tool: raw.name.clone(),
                reason: e.to_string(),
            })?;

        let query = parsed.query.trim();
        if query.is_empty() {
            return Err(MedAssistError::InvalidToolArguments {
                tool: raw.name.clone(),
                reason: "query is empty".to_string(),
            });
        }

        Ok(ToolCall {
            id: raw.id.clone(),
            kind,
            query: query.to_string(),
        })
    }

    pub fn to_wire(&self) -> WireToolCall {
        WireToolCall {
            id: self.id.clone(),
            call_type: "function".to_string(),
            function: WireFunction {
                name: self.kind.name().to_string(),
                arguments: serde_json::json!({ "query": self.query }).to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, arguments: &str) -> RawToolCall {
        RawToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_specs_declare_two_tools() {
        let specs = ToolSpec::all();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "search_knowledge_base");
        assert_eq!(specs[1].name, "search_doctors");
        assert_eq!(specs[0].parameters["required"][0], "query");

        let wire = specs[1].to_wire();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "search_doctors");
    }

    #[test]
    fn test_parse_valid_call() {
        let call = ToolCall::parse(&raw(
            "search_knowledge_base",
            r#"{"query": " diabetes symptoms "}"#,
        ))
        .unwrap();
        assert_eq!(call.kind, ToolKind::SearchKnowledgeBase);
        assert_eq!(call.query, "diabetes symptoms");
    }

    #[test]
    fn test_parse_unknown_tool() {
        let err = ToolCall::parse(&raw("get_weather", r#"{"query":"x"}"#)).unwrap_err();
        assert!(matches!(err, MedAssistError::UnknownTool(name) if name == "get_weather"));
    }

    #[test]
    fn test_parse_malformed_arguments() {
        let err = ToolCall::parse(&raw("search_doctors", r#"{"query": "#)).unwrap_err();
        assert!(matches!(err, MedAssistError::InvalidToolArguments { .. }));

        let err = ToolCall::parse(&raw("search_doctors", "")).unwrap_err();
        assert!(matches!(err, MedAssistError::InvalidToolArguments { .. }));

        let err = ToolCall::parse(&raw("search_doctors", r#"{"query": "  "}"#)).unwrap_err();
        assert!(matches!(err, MedAssistError::InvalidToolArguments { .. }));
    }

    #[test]
    fn test_to_wire_roundtrips_query() {
        let call = ToolCall {
            id: "call_9".to_string(),
            kind: ToolKind::SearchDoctors,
            query: "eye doctor".to_string(),
        };
        let wire = call.to_wire();
        assert_eq!(wire.function.name, "search_doctors");
        let args: serde_json::Value = serde_json::from_str(&wire.function.arguments).unwrap();
        assert_eq!(args["query"], "eye doctor");
    }
}

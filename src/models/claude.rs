use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Claude Messages API request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagesRequest {
    /// Model identifier (e.g., "claude-haiku-4-5-20251001")
    pub model: String,

    /// Conversation history with user/assistant alternation
    pub messages: Vec<Message>,

    /// Optional system prompt (top-level field)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Enable streaming
    #[serde(default)]
    pub stream: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// Extended thinking, e.g. `{"type":"enabled","budget_tokens":24000}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

/// Either a bare string or an array of content blocks. A string is
/// equivalent to a single text block.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<Block>),
}

/// A content block, with an explicit fallback for block types this gateway
/// does not understand; unknown blocks are skipped during translation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Block {
    Known(ContentBlock),
    Unknown(Value),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "thinking")]
    Thinking {
        thinking: String,
        /// Server-assigned opaque token the client echoes back verbatim.
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<ToolResultContent>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    #[serde(rename = "image")]
    Image { source: ImageSource },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<Block>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<Block>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// `tool_choice` with a fallback: shapes we do not recognize route to AUTO.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Known(ToolChoiceKind),
    Other(Value),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolChoiceKind {
    Auto,
    Any,
    None,
    Tool { name: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThinkingConfig {
    /// "enabled" or "disabled"
    #[serde(rename = "type")]
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

impl ThinkingConfig {
    pub fn is_enabled(&self) -> bool {
        self.mode == "enabled"
    }
}

/// Unary Claude Messages API response envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_request() {
        let json = r#"{
            "model": "claude-haiku-4-5-20251001",
            "messages": [
                {"role": "user", "content": "Hello"}
            ],
            "max_tokens": 100,
            "stream": true
        }"#;

        let req: MessagesRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.model, "claude-haiku-4-5-20251001");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.max_tokens, Some(100));
        assert!(req.stream);
        assert!(matches!(req.messages[0].content, MessageContent::Text(_)));
    }

    #[test]
    fn test_parse_content_blocks() {
        let json = r#"{
            "model": "claude-haiku-4-5",
            "messages": [
                {
                    "role": "assistant",
                    "content": [
                        {"type": "thinking", "thinking": "hmm", "signature": "c2ln"},
                        {"type": "tool_use", "id": "toolu_1", "name": "Read", "input": {"path": "/x"}}
                    ]
                }
            ]
        }"#;

        let req: MessagesRequest = serde_json::from_str(json).unwrap();
        let MessageContent::Blocks(blocks) = &req.messages[0].content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 2);
        assert!(matches!(
            &blocks[0],
            Block::Known(ContentBlock::Thinking { signature: Some(s), .. }) if s == "c2ln"
        ));
        assert!(matches!(
            &blocks[1],
            Block::Known(ContentBlock::ToolUse { name, .. }) if name == "Read"
        ));
    }

    #[test]
    fn test_unknown_block_falls_back() {
        let json = r#"[
            {"type": "text", "text": "hi"},
            {"type": "server_tool_use", "id": "srvtoolu_1", "name": "web_search"}
        ]"#;

        let blocks: Vec<Block> = serde_json::from_str(json).unwrap();
        assert!(matches!(&blocks[0], Block::Known(ContentBlock::Text { .. })));
        assert!(matches!(&blocks[1], Block::Unknown(_)));
    }

    #[test]
    fn test_tool_result_string_content() {
        let json = r#"{"type": "tool_result", "tool_use_id": "toolu_1", "content": "file"}"#;
        let block: ContentBlock = serde_json::from_str(json).unwrap();
        assert!(matches!(
            block,
            ContentBlock::ToolResult {
                content: Some(ToolResultContent::Text(_)),
                ..
            }
        ));
    }

    #[test]
    fn test_tool_choice_shapes() {
        let any: ToolChoice = serde_json::from_str(r#"{"type": "any"}"#).unwrap();
        assert!(matches!(any, ToolChoice::Known(ToolChoiceKind::Any)));

        let tool: ToolChoice =
            serde_json::from_str(r#"{"type": "tool", "name": "get_weather"}"#).unwrap();
        assert!(matches!(
            tool,
            ToolChoice::Known(ToolChoiceKind::Tool { name }) if name == "get_weather"
        ));

        let future: ToolChoice = serde_json::from_str(r#"{"type": "sampled", "k": 3}"#).unwrap();
        assert!(matches!(future, ToolChoice::Other(_)));
    }

    #[test]
    fn test_thinking_config() {
        let cfg: ThinkingConfig =
            serde_json::from_str(r#"{"type": "enabled", "budget_tokens": 2048}"#).unwrap();
        assert!(cfg.is_enabled());
        assert_eq!(cfg.budget_tokens, Some(2048));

        let off: ThinkingConfig = serde_json::from_str(r#"{"type": "disabled"}"#).unwrap();
        assert!(!off.is_enabled());
    }
}

use crate::models::claude::{
    Block, ContentBlock, Message, MessageContent, MessagesRequest, Role, SystemPrompt, ToolChoice,
    ToolChoiceKind, ToolResultContent,
};
use crate::models::gemini::{
    FunctionCall, FunctionCallingConfig, FunctionDeclaration, FunctionResponse, GeminiContent,
    GeminiRequest, GeminiTool, GenerationConfig, InlineData, Part, SystemInstruction,
    ThinkingConfig, ToolConfig,
};
use crate::translate::schema::clean_schema;
use serde_json::json;
use std::collections::HashMap;

/// Name substituted when a `tool_result` references a tool_use id that never
/// appeared in the history. The request is never failed over this.
const UNKNOWN_TOOL: &str = "unknown_tool";

/// Convert a Claude Messages request into a Gemini GenerateContent request.
///
/// Role mapping is `user -> user`, `assistant -> model`; consecutive
/// same-role messages are merged so the Gemini view strictly alternates.
pub fn anthropic_to_gemini(req: &MessagesRequest) -> GeminiRequest {
    let tool_names = collect_tool_names(&req.messages);

    let mut contents: Vec<GeminiContent> = Vec::new();
    for msg in &req.messages {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "model",
        };

        let parts = extract_parts(&msg.content, &tool_names);
        if parts.is_empty() {
            continue;
        }

        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => {
                last.parts.extend(parts);
            }
            _ => contents.push(GeminiContent {
                role: Some(role.to_string()),
                parts,
            }),
        }
    }

    GeminiRequest {
        contents,
        system_instruction: convert_system(req.system.as_ref()),
        tools: convert_tools(req.tools.as_deref()),
        tool_config: convert_tool_choice(req.tool_choice.as_ref()),
        generation_config: Some(build_generation_config(req)),
    }
}

/// Every assistant `tool_use.id -> name` in the history, so later
/// `tool_result` blocks can be named for Gemini.
fn collect_tool_names(messages: &[Message]) -> HashMap<String, String> {
    let mut names = HashMap::new();
    for msg in messages {
        if msg.role != Role::Assistant {
            continue;
        }
        let MessageContent::Blocks(blocks) = &msg.content else {
            continue;
        };
        for block in blocks {
            if let Block::Known(ContentBlock::ToolUse { id, name, .. }) = block {
                names.insert(id.clone(), name.clone());
            }
        }
    }
    names
}

fn extract_parts(content: &MessageContent, tool_names: &HashMap<String, String>) -> Vec<Part> {
    let blocks = match content {
        MessageContent::Text(text) => {
            if text.is_empty() {
                return Vec::new();
            }
            return vec![Part::text(text.clone())];
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut parts = Vec::new();
    // A thinking block's signature rides on the next functionCall part of
    // the same message, as `thoughtSignature`.
    let mut pending_signature: Option<String> = None;

    for block in blocks {
        let known = match block {
            Block::Known(known) => known,
            Block::Unknown(value) => {
                tracing::debug!(
                    block_type = value.get("type").and_then(serde_json::Value::as_str).unwrap_or("?"),
                    "Skipping unknown content block"
                );
                continue;
            }
        };

        match known {
            ContentBlock::Text { text } => {
                if !text.is_empty() {
                    parts.push(Part::text(text.clone()));
                }
            }
            ContentBlock::Thinking {
                thinking,
                signature,
            } => {
                parts.push(Part::thought(thinking.clone()));
                pending_signature = signature.clone();
            }
            ContentBlock::ToolUse { name, input, .. } => {
                let args = if input.is_null() {
                    Some(json!({}))
                } else {
                    Some(input.clone())
                };
                parts.push(Part::FunctionCall {
                    function_call: FunctionCall {
                        name: name.clone(),
                        args,
                    },
                    thought_signature: pending_signature.take(),
                });
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                let name = tool_names
                    .get(tool_use_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_TOOL.to_string());
                parts.push(Part::FunctionResponse {
                    function_response: FunctionResponse {
                        name,
                        response: json!({ "result": flatten_result(content.as_ref()) }),
                    },
                });
            }
            ContentBlock::Image { source } => {
                if source.source_type == "base64" {
                    parts.push(Part::InlineData {
                        inline_data: InlineData {
                            mime_type: source
                                .media_type
                                .clone()
                                .unwrap_or_else(|| "image/png".to_string()),
                            data: source.data.clone(),
                        },
                    });
                }
            }
        }
    }

    parts
}

/// Tool results arrive as a string or as nested blocks; Gemini wants one
/// string. Text sub-blocks are joined with newlines.
fn flatten_result(content: Option<&ToolResultContent>) -> String {
    match content {
        None => String::new(),
        Some(ToolResultContent::Text(text)) => text.clone(),
        Some(ToolResultContent::Blocks(blocks)) => blocks
            .iter()
            .filter_map(|block| match block {
                Block::Known(ContentBlock::Text { text }) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn convert_system(system: Option<&SystemPrompt>) -> Option<SystemInstruction> {
    let parts: Vec<Part> = match system? {
        SystemPrompt::Text(text) => {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Part::text(text.clone())]
            }
        }
        SystemPrompt::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                Block::Known(ContentBlock::Text { text }) if !text.is_empty() => {
                    Some(Part::text(text.clone()))
                }
                _ => None,
            })
            .collect(),
    };

    if parts.is_empty() {
        None
    } else {
        Some(SystemInstruction { parts })
    }
}

fn convert_tools(tools: Option<&[crate::models::claude::Tool]>) -> Option<Vec<GeminiTool>> {
    let tools = tools?;
    if tools.is_empty() {
        return None;
    }

    let function_declarations = tools
        .iter()
        .map(|tool| FunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.as_ref().map(clean_schema),
        })
        .collect();

    Some(vec![GeminiTool {
        function_declarations,
    }])
}

fn convert_tool_choice(choice: Option<&ToolChoice>) -> Option<ToolConfig> {
    let config = match choice? {
        ToolChoice::Known(ToolChoiceKind::None) => FunctionCallingConfig {
            mode: "NONE".to_string(),
            allowed_function_names: None,
        },
        ToolChoice::Known(ToolChoiceKind::Any) => FunctionCallingConfig {
            mode: "ANY".to_string(),
            allowed_function_names: None,
        },
        ToolChoice::Known(ToolChoiceKind::Tool { name }) => FunctionCallingConfig {
            mode: "ANY".to_string(),
            allowed_function_names: Some(vec![name.clone()]),
        },
        ToolChoice::Known(ToolChoiceKind::Auto) | ToolChoice::Other(_) => FunctionCallingConfig {
            mode: "AUTO".to_string(),
            allowed_function_names: None,
        },
    };

    Some(ToolConfig {
        function_calling_config: config,
    })
}

fn build_generation_config(req: &MessagesRequest) -> GenerationConfig {
    let thinking_config = req
        .thinking
        .as_ref()
        .filter(|thinking| thinking.is_enabled())
        .and_then(|thinking| thinking.budget_tokens)
        .map(|thinking_budget| ThinkingConfig { thinking_budget });

    GenerationConfig {
        max_output_tokens: req.max_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: req.top_k,
        stop_sequences: req.stop_sequences.clone(),
        thinking_config,
    }
}

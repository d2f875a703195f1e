use crate::ids;
use crate::models::claude::{ContentBlock, MessagesResponse, Usage};
use crate::models::gemini::{GeminiStreamChunk, Part};
use serde_json::json;

/// Convert a unary Gemini response into the Claude Messages envelope.
///
/// Walks `candidates[0].content.parts`; functionCall parts become tool_use
/// blocks with freshly minted ids, thought text becomes a thinking block
/// with a newly generated signature, plain text maps straight through.
pub fn gemini_response_to_anthropic(res: &GeminiStreamChunk, model_name: &str) -> MessagesResponse {
    let mut content = Vec::new();
    let mut has_function_call = false;

    let parts = res
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|c| c.parts.as_slice())
        .unwrap_or_default();

    for part in parts {
        match part {
            Part::FunctionCall { function_call, .. } => {
                has_function_call = true;
                content.push(ContentBlock::ToolUse {
                    id: ids::tool_use_id(),
                    name: function_call.name.clone(),
                    input: function_call.args.clone().unwrap_or_else(|| json!({})),
                });
            }
            Part::Text { text, thought, .. } if *thought => {
                if !text.is_empty() {
                    content.push(ContentBlock::Thinking {
                        thinking: text.clone(),
                        signature: Some(ids::thinking_signature()),
                    });
                }
            }
            Part::Text { text, .. } => {
                if !text.is_empty() {
                    content.push(ContentBlock::Text { text: text.clone() });
                }
            }
            _ => {}
        }
    }

    let usage = res
        .usage_metadata
        .as_ref()
        .map(|meta| Usage {
            input_tokens: meta.prompt_token_count.unwrap_or(0),
            output_tokens: meta.candidates_token_count.unwrap_or(0),
        })
        .unwrap_or_default();

    MessagesResponse {
        id: ids::message_id(),
        kind: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: model_name.to_string(),
        stop_reason: Some(if has_function_call {
            "tool_use".to_string()
        } else {
            "end_turn".to_string()
        }),
        stop_sequence: None,
        usage,
    }
}

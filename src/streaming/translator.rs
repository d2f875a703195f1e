use crate::ids;
use crate::models::gemini::{GeminiStreamChunk, Part};
use crate::streaming::sse::frame;
use serde_json::json;

/// Which content block is currently open on the client stream. Tool-use
/// blocks open and close within a single part, so they never stay active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveBlock {
    None,
    Text,
    Thinking,
}

/// Stateful converter from Gemini stream chunks to Claude SSE frames.
///
/// Maintains the block lifecycle invariants of the Claude wire protocol:
/// at most one content block is open at any moment, block indices strictly
/// increase from 0, `message_start` precedes everything, and `message_stop`
/// is last. Each returned frame is one contiguous
/// `event: <name>\ndata: <json>\n\n` string.
pub struct StreamTranslator {
    message_id: String,
    model_name: String,
    block_index: u32,
    active: ActiveBlock,
    started: bool,
    has_function_call: bool,
    input_tokens: u32,
    output_tokens: u32,
}

impl StreamTranslator {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            message_id: ids::message_id(),
            model_name: model_name.into(),
            block_index: 0,
            active: ActiveBlock::None,
            started: false,
            has_function_call: false,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Run one Gemini chunk through the state machine.
    pub fn process_chunk(&mut self, chunk: &GeminiStreamChunk) -> Vec<String> {
        let mut frames = Vec::new();

        if let Some(error) = &chunk.error {
            let message = error
                .message
                .clone()
                .unwrap_or_else(|| "upstream error".to_string());
            frames.push(frame(
                "error",
                &json!({
                    "type": "error",
                    "error": {"type": "api_error", "message": message}
                }),
            ));
            return frames;
        }

        if let Some(usage) = &chunk.usage_metadata {
            if let Some(prompt) = usage.prompt_token_count {
                self.input_tokens = prompt;
            }
            if let Some(candidates) = usage.candidates_token_count {
                self.output_tokens = candidates;
            }
        }

        if !self.started {
            frames.push(self.message_start());
            frames.push(frame("ping", &json!({"type": "ping"})));
            self.started = true;
        }

        for candidate in &chunk.candidates {
            if let Some(content) = &candidate.content {
                for part in &content.parts {
                    self.process_part(part, &mut frames);
                }
            }

            if candidate.finish_reason.is_some() {
                self.close_active(&mut frames);
                frames.push(frame(
                    "message_delta",
                    &json!({
                        "type": "message_delta",
                        "delta": {
                            "stop_reason": if self.has_function_call { "tool_use" } else { "end_turn" },
                            "stop_sequence": null
                        },
                        "usage": {"output_tokens": self.output_tokens}
                    }),
                ));
                frames.push(frame("message_stop", &json!({"type": "message_stop"})));
            }
        }

        frames
    }

    fn process_part(&mut self, part: &Part, frames: &mut Vec<String>) {
        match part {
            Part::FunctionCall { function_call, .. } => {
                self.close_active(frames);
                self.has_function_call = true;

                let index = self.block_index;
                frames.push(frame(
                    "content_block_start",
                    &json!({
                        "type": "content_block_start",
                        "index": index,
                        "content_block": {
                            "type": "tool_use",
                            "id": ids::tool_use_id(),
                            "name": function_call.name,
                            "input": {}
                        }
                    }),
                ));

                let args = function_call.args.clone().unwrap_or_else(|| json!({}));
                let partial_json =
                    serde_json::to_string(&args).unwrap_or_else(|_| "{}".to_string());
                frames.push(frame(
                    "content_block_delta",
                    &json!({
                        "type": "content_block_delta",
                        "index": index,
                        "delta": {"type": "input_json_delta", "partial_json": partial_json}
                    }),
                ));

                frames.push(frame(
                    "content_block_stop",
                    &json!({"type": "content_block_stop", "index": index}),
                ));
                self.block_index += 1;
            }
            Part::Text { text, thought, .. } if *thought => {
                if text.is_empty() {
                    return;
                }
                self.ensure_open(ActiveBlock::Thinking, frames);
                frames.push(frame(
                    "content_block_delta",
                    &json!({
                        "type": "content_block_delta",
                        "index": self.block_index,
                        "delta": {"type": "thinking_delta", "thinking": text}
                    }),
                ));
            }
            Part::Text { text, .. } => {
                if text.is_empty() {
                    return;
                }
                self.ensure_open(ActiveBlock::Text, frames);
                frames.push(frame(
                    "content_block_delta",
                    &json!({
                        "type": "content_block_delta",
                        "index": self.block_index,
                        "delta": {"type": "text_delta", "text": text}
                    }),
                ));
            }
            // Gemini does not emit these in responses.
            Part::FunctionResponse { .. } | Part::InlineData { .. } => {
                tracing::warn!("Unexpected part in Gemini response stream");
            }
        }
    }

    fn ensure_open(&mut self, wanted: ActiveBlock, frames: &mut Vec<String>) {
        if self.active == wanted {
            return;
        }
        self.close_active(frames);

        let content_block = match wanted {
            ActiveBlock::Text => json!({"type": "text", "text": ""}),
            ActiveBlock::Thinking => json!({"type": "thinking", "thinking": ""}),
            ActiveBlock::None => return,
        };
        frames.push(frame(
            "content_block_start",
            &json!({
                "type": "content_block_start",
                "index": self.block_index,
                "content_block": content_block
            }),
        ));
        self.active = wanted;
    }

    fn close_active(&mut self, frames: &mut Vec<String>) {
        if self.active == ActiveBlock::None {
            return;
        }

        // A thinking block carries its signature right before closing.
        if self.active == ActiveBlock::Thinking {
            frames.push(frame(
                "content_block_delta",
                &json!({
                    "type": "content_block_delta",
                    "index": self.block_index,
                    "delta": {
                        "type": "signature_delta",
                        "signature": ids::thinking_signature()
                    }
                }),
            ));
        }

        frames.push(frame(
            "content_block_stop",
            &json!({"type": "content_block_stop", "index": self.block_index}),
        ));
        self.block_index += 1;
        self.active = ActiveBlock::None;
    }

    fn message_start(&self) -> String {
        frame(
            "message_start",
            &json!({
                "type": "message_start",
                "message": {
                    "id": self.message_id,
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": self.model_name,
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {"input_tokens": self.input_tokens, "output_tokens": 0}
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn chunk(json: &str) -> GeminiStreamChunk {
        serde_json::from_str(json).unwrap()
    }

    fn event_types(frames: &[String]) -> Vec<String> {
        frames
            .iter()
            .map(|f| {
                f.lines()
                    .next()
                    .unwrap()
                    .strip_prefix("event: ")
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    fn data_of(frame: &str) -> Value {
        let line = frame
            .lines()
            .find(|l| l.starts_with("data: "))
            .expect("frame has data line");
        serde_json::from_str(&line["data: ".len()..]).unwrap()
    }

    #[test]
    fn test_text_streaming_sequence() {
        let mut translator = StreamTranslator::new("claude-haiku-4-5-20251001");

        let frames =
            translator.process_chunk(&chunk(r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#));
        assert_eq!(
            event_types(&frames),
            vec!["message_start", "ping", "content_block_start", "content_block_delta"]
        );

        let start = data_of(&frames[2]);
        assert_eq!(start["index"], 0);
        assert_eq!(start["content_block"]["type"], "text");
        let delta = data_of(&frames[3]);
        assert_eq!(delta["delta"]["type"], "text_delta");
        assert_eq!(delta["delta"]["text"], "Hello");

        // A follow-up text chunk produces only a delta at the same index.
        let frames = translator
            .process_chunk(&chunk(r#"{"candidates":[{"content":{"parts":[{"text":" world"}]}}]}"#));
        assert_eq!(event_types(&frames), vec!["content_block_delta"]);
        assert_eq!(data_of(&frames[0])["index"], 0);
        assert_eq!(data_of(&frames[0])["delta"]["text"], " world");
    }

    #[test]
    fn test_tool_call_sequence() {
        let mut translator = StreamTranslator::new("claude-haiku-4-5");

        let frames = translator.process_chunk(&chunk(
            r#"{
                "candidates": [{
                    "content": {"parts": [
                        {"functionCall": {"name": "get_weather", "args": {"location": "NYC"}}}
                    ]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5}
            }"#,
        ));

        assert_eq!(
            event_types(&frames),
            vec![
                "message_start",
                "ping",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop"
            ]
        );

        let start = data_of(&frames[2]);
        assert_eq!(start["content_block"]["type"], "tool_use");
        assert_eq!(start["content_block"]["name"], "get_weather");
        assert!(
            start["content_block"]["id"]
                .as_str()
                .unwrap()
                .starts_with("toolu_cmm_")
        );
        assert_eq!(start["content_block"]["input"], serde_json::json!({}));

        let delta = data_of(&frames[3]);
        assert_eq!(delta["delta"]["type"], "input_json_delta");
        assert_eq!(delta["delta"]["partial_json"], r#"{"location":"NYC"}"#);

        let message_delta = data_of(&frames[5]);
        assert_eq!(message_delta["delta"]["stop_reason"], "tool_use");
        assert_eq!(message_delta["usage"]["output_tokens"], 5);

        let start_usage = data_of(&frames[0]);
        assert_eq!(start_usage["message"]["usage"]["input_tokens"], 10);
    }

    #[test]
    fn test_multiple_function_calls_get_increasing_indices() {
        let mut translator = StreamTranslator::new("m");

        let frames = translator.process_chunk(&chunk(
            r#"{"candidates":[{"content":{"parts":[
                {"functionCall": {"name": "a", "args": {}}},
                {"functionCall": {"name": "b", "args": {}}}
            ]}}]}"#,
        ));

        let indices: Vec<u64> = frames
            .iter()
            .map(|f| data_of(f))
            .filter(|d| d["type"] == "content_block_start")
            .map(|d| d["index"].as_u64().unwrap())
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_thinking_closes_with_signature_delta() {
        let mut translator = StreamTranslator::new("m");

        translator.process_chunk(&chunk(
            r#"{"candidates":[{"content":{"parts":[{"text":"pondering","thought":true}]}}]}"#,
        ));
        let frames = translator.process_chunk(&chunk(
            r#"{"candidates":[{"content":{"parts":[{"text":"answer"}]}}]}"#,
        ));

        // Thinking block closes (signature first), then a text block opens.
        assert_eq!(
            event_types(&frames),
            vec![
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta"
            ]
        );
        let signature = data_of(&frames[0]);
        assert_eq!(signature["delta"]["type"], "signature_delta");
        assert_eq!(signature["index"], 0);
        assert!(
            !signature["delta"]["signature"]
                .as_str()
                .unwrap()
                .is_empty()
        );
        assert_eq!(data_of(&frames[2])["index"], 1);
        assert_eq!(data_of(&frames[2])["content_block"]["type"], "text");
    }

    #[test]
    fn test_thinking_before_finish_gets_signature() {
        let mut translator = StreamTranslator::new("m");

        let frames = translator.process_chunk(&chunk(
            r#"{"candidates":[{
                "content":{"parts":[{"text":"hmm","thought":true}]},
                "finishReason":"STOP"
            }]}"#,
        ));

        let types = event_types(&frames);
        assert_eq!(
            types,
            vec![
                "message_start",
                "ping",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop"
            ]
        );
        assert_eq!(data_of(&frames[4])["delta"]["type"], "signature_delta");
    }

    #[test]
    fn test_empty_candidates_emit_prelude_only() {
        let mut translator = StreamTranslator::new("m");
        let frames = translator.process_chunk(&chunk(r#"{"usageMetadata":{"promptTokenCount":7}}"#));
        assert_eq!(event_types(&frames), vec!["message_start", "ping"]);

        // Ping is emitted exactly once.
        let frames = translator.process_chunk(&chunk(r#"{"candidates":[]}"#));
        assert!(frames.is_empty());
    }

    #[test]
    fn test_empty_text_parts_skipped() {
        let mut translator = StreamTranslator::new("m");
        let frames = translator
            .process_chunk(&chunk(r#"{"candidates":[{"content":{"parts":[{"text":""}]}}]}"#));
        assert_eq!(event_types(&frames), vec!["message_start", "ping"]);
    }

    #[test]
    fn test_error_chunk_short_circuits() {
        let mut translator = StreamTranslator::new("m");
        let frames = translator
            .process_chunk(&chunk(r#"{"error":{"code":429,"message":"quota exhausted"}}"#));

        assert_eq!(event_types(&frames), vec!["error"]);
        let data = data_of(&frames[0]);
        assert_eq!(data["error"]["type"], "api_error");
        assert_eq!(data["error"]["message"], "quota exhausted");
    }

    #[test]
    fn test_text_block_closed_before_tool_use() {
        let mut translator = StreamTranslator::new("m");
        translator.process_chunk(&chunk(
            r#"{"candidates":[{"content":{"parts":[{"text":"checking"}]}}]}"#,
        ));
        let frames = translator.process_chunk(&chunk(
            r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"t","args":{}}}]}}]}"#,
        ));

        assert_eq!(
            event_types(&frames),
            vec![
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop"
            ]
        );
        assert_eq!(data_of(&frames[0])["index"], 0);
        assert_eq!(data_of(&frames[1])["index"], 1);
    }

    #[test]
    fn test_block_discipline_over_full_stream() {
        let mut translator = StreamTranslator::new("m");
        let mut frames = Vec::new();

        frames.extend(translator.process_chunk(&chunk(
            r#"{"candidates":[{"content":{"parts":[{"text":"think","thought":true}]}}]}"#,
        )));
        frames.extend(translator.process_chunk(&chunk(
            r#"{"candidates":[{"content":{"parts":[{"text":"say"}]}}]}"#,
        )));
        frames.extend(translator.process_chunk(&chunk(
            r#"{"candidates":[{"content":{"parts":[
                {"functionCall":{"name":"t","args":{"k":1}}}
            ]},"finishReason":"STOP"}]}"#,
        )));

        let events: Vec<Value> = frames.iter().map(|f| data_of(f)).collect();

        assert_eq!(events.first().unwrap()["type"], "message_start");
        assert_eq!(events.last().unwrap()["type"], "message_stop");

        // Every index has exactly one start and one stop, start before any
        // delta, and indices appear in increasing order.
        let mut starts = std::collections::BTreeMap::new();
        let mut stops = std::collections::BTreeMap::new();
        let mut last_started: i64 = -1;
        for event in &events {
            let index = event.get("index").and_then(Value::as_i64);
            match event["type"].as_str().unwrap() {
                "content_block_start" => {
                    let index = index.unwrap();
                    assert!(index > last_started, "indices strictly increase");
                    last_started = index;
                    *starts.entry(index).or_insert(0) += 1;
                }
                "content_block_stop" => {
                    *stops.entry(index.unwrap()).or_insert(0) += 1;
                }
                "content_block_delta" => {
                    let index = index.unwrap();
                    assert_eq!(starts.get(&index), Some(&1), "delta after start");
                    assert!(stops.get(&index).is_none(), "delta before stop");
                }
                _ => {}
            }
        }
        assert_eq!(starts, stops);
        assert_eq!(starts.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}

use serde_json::Value;

/// Remove every `thinking` block from assistant messages in a raw request
/// body. Messages keep their remaining blocks; a message is not dropped
/// just because stripping emptied it.
///
/// Used as the one-shot passthrough retry transform when the Anthropic
/// backend rejects a request over an invalid thinking-block signature.
pub fn strip_thinking_blocks(body: &Value) -> Value {
    let mut stripped = body.clone();

    let Some(messages) = stripped
        .get_mut("messages")
        .and_then(Value::as_array_mut)
    else {
        return stripped;
    };

    for message in messages {
        if message.get("role").and_then(Value::as_str) != Some("assistant") {
            continue;
        }
        let Some(blocks) = message.get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };
        blocks.retain(|block| block.get("type").and_then(Value::as_str) != Some("thinking"));
    }

    stripped
}

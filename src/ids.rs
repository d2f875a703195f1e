use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use rand::RngCore;

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::rng().fill_bytes(&mut buf);
    buf
}

/// Message id on the Anthropic wire: `msg_cmm_` + base64url(12 random bytes).
pub fn message_id() -> String {
    format!("msg_cmm_{}", URL_SAFE_NO_PAD.encode(random_bytes::<12>()))
}

/// Tool-use id: `toolu_cmm_` + base64url(12 random bytes).
pub fn tool_use_id() -> String {
    format!("toolu_cmm_{}", URL_SAFE_NO_PAD.encode(random_bytes::<12>()))
}

/// Opaque thinking-block signature: base64(64 random bytes).
pub fn thinking_signature() -> String {
    STANDARD.encode(random_bytes::<64>())
}

/// Prompt id attached when wrapping requests for a compatibility proxy.
pub fn user_prompt_id() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<12>())
}

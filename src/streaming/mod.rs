pub mod sse;
pub mod translator;

pub use sse::SseParser;
pub use translator::StreamTranslator;

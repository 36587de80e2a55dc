//! Document text extraction.

use tracing::debug;

use crate::tools::Payload;

/// Turns a tool payload into plain document text.
///
/// Never fails: an empty string means nothing could be extracted.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, name: &str, payload: &Payload) -> String;
}

/// Text payloads as-is, byte payloads only if they are valid UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, name: &str, payload: &Payload) -> String {
        match payload {
            Payload::Text(text) => text.trim().to_string(),
            Payload::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => text.trim().to_string(),
                Err(_) => {
                    debug!(document = name, "binary payload is not UTF-8 text");
                    String::new()
                }
            },
        }
    }
}

/// Tries each extractor in order; the first non-empty result wins.
pub struct FallbackExtractor {
    chain: Vec<Box<dyn TextExtractor>>,
}

impl FallbackExtractor {
    pub fn new() -> Self {
        Self { chain: Vec::new() }
    }

    pub fn then(mut self, extractor: impl TextExtractor + 'static) -> Self {
        self.chain.push(Box::new(extractor));
        self
    }
}

impl Default for FallbackExtractor {
    fn default() -> Self {
        Self::new().then(PlainTextExtractor)
    }
}

impl TextExtractor for FallbackExtractor {
    fn extract(&self, name: &str, payload: &Payload) -> String {
        self.chain
            .iter()
            .map(|extractor| extractor.extract(name, payload))
            .find(|text| !text.is_empty())
            .unwrap_or_default()
    }
}

//! Incremental extraction of `<file name="...">` blocks from model text.

use std::sync::LazyLock;

use regex::Regex;

static FILE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<file name="([^"]+)">\n(.*?)\n</file>"#).expect("file block pattern is valid")
});

/// Feeds on streamed text and yields each file once its closing tag arrives.
#[derive(Debug, Default)]
pub struct FileExtractor {
    buffer: String,
}

impl FileExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the files completed by it, in order.
    pub fn push(&mut self, chunk: &str) -> Vec<(String, String)> {
        self.buffer.push_str(chunk);
        let mut files = Vec::new();
        let mut consumed = 0;
        for caps in FILE_BLOCK.captures_iter(&self.buffer) {
            files.push((caps[1].to_string(), caps[2].to_string()));
            if let Some(m) = caps.get(0) {
                consumed = m.end();
            }
        }
        self.buffer.drain(..consumed);
        files
    }

    /// Text received after the last complete file block.
    pub fn remainder(&self) -> &str {
        &self.buffer
    }
}

/// Extract every file block from a complete response.
pub fn extract_files(text: &str) -> Vec<(String, String)> {
    FileExtractor::new().push(text)
}

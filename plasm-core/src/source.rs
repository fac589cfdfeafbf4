//! Registry of source texts keyed by [`FileId`].
//!
//! The pipeline itself works on byte spans; translating a span into a
//! line/column pair (for the `<Phase> error at L:C:` rendering) or into
//! the text of the offending line happens here.

use crate::span::FileId;

#[derive(Debug, Clone)]
struct SourceFile {
    name: String,
    text: String,
}

/// Maps file ids to their name and text.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> SourceMap {
        SourceMap { files: Vec::new() }
    }

    /// Register a source text and return its id.
    pub fn add(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile {
            name: name.into(),
            text: text.into(),
        });
        id
    }

    pub fn name(&self, file_id: FileId) -> Option<&str> {
        self.files.get(file_id.0 as usize).map(|f| f.name.as_str())
    }

    pub fn text(&self, file_id: FileId) -> Option<&str> {
        self.files.get(file_id.0 as usize).map(|f| f.text.as_str())
    }

    /// Translate a byte offset into a zero-based (line, column) pair.
    ///
    /// Offsets past the end of the file clamp to the last position.
    pub fn line_col(&self, file_id: FileId, offset: u32) -> Option<(u32, u32)> {
        let text = self.text(file_id)?;
        let offset = (offset as usize).min(text.len());
        let mut line = 0u32;
        let mut col = 0u32;
        for (i, ch) in text.char_indices() {
            if i >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        Some((line, col))
    }

    /// Return the text of the given zero-based line, without its
    /// trailing newline.
    pub fn line_str(&self, file_id: FileId, line: u32) -> Option<&str> {
        let text = self.text(file_id)?;
        text.lines().nth(line as usize)
    }
}

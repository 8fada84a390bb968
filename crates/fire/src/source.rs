//! Maps byte offsets inside a source file to (file, line, column) for diagnostics.

use std::fmt;
use std::path::{Path, PathBuf};

/// Index of a source file inside a [`SourceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// A half-open byte range `[start, end)` inside a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Self { file, start, end }
    }

    /// A zero-width span at `pos`, used for diagnostics that point at an
    /// insertion point rather than a token (e.g. "expected `;` here").
    pub fn point(file: FileId, pos: u32) -> Self {
        Self::new(file, pos, pos)
    }

    pub fn to(self, other: Span) -> Span {
        debug_assert_eq!(self.file, other.file);
        Span::new(self.file, self.start.min(other.start), self.end.max(other.end))
    }

    pub fn len(self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }
}

/// 1-based line and column, as shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single opened source file: its path, raw bytes, and a precomputed
/// line-start index used to answer byte-offset -> (line, column) queries
/// in O(log n).
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    /// Byte offset of the start of each line; `line_starts[0] == 0`.
    line_starts: Vec<u32>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: String) -> Self {
        let mut line_starts = vec![0u32];
        let bytes = text.as_bytes();
        let mut i = 0usize;
        while i < bytes.len() {
            if bytes[i] == b'\n' {
                line_starts.push((i + 1) as u32);
            }
            i += 1;
        }
        Self {
            path: path.into(),
            text,
            line_starts,
        }
    }

    pub fn line_col(&self, offset: u32) -> LineCol {
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[idx];
        // Account for a trailing \r on CRLF line endings when computing column.
        let column = offset.saturating_sub(line_start) + 1;
        LineCol {
            line: (idx + 1) as u32,
            column,
        }
    }

    pub fn line_text(&self, line: u32) -> Option<&str> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.line_starts.get(idx)? as usize;
        let end = self
            .line_starts
            .get(idx + 1)
            .map_or(self.text.len(), |&s| s as usize);
        Some(self.text[start..end].trim_end_matches(['\n', '\r']))
    }

    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }
}

/// Owns every source file opened during a compiler invocation. Shared by
/// reference through the lexer, parser, analyzer, and diagnostic renderer.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>, text: String) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(path, text));
        id
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    pub fn path(&self, id: FileId) -> &Path {
        &self.files[id.0 as usize].path
    }

    pub fn text(&self, id: FileId) -> &str {
        &self.files[id.0 as usize].text
    }

    pub fn snippet(&self, span: Span) -> &str {
        &self.text(span.file)[span.start as usize..span.end as usize]
    }

    pub fn line_col(&self, span: Span) -> LineCol {
        self.file(span.file).line_col(span.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_tracks_newlines() {
        let mut map = SourceMap::new();
        let id = map.add_file("t.fire", "let a = 1;\nlet b = 2;\n".to_string());
        assert_eq!(map.line_col(Span::point(id, 0)), LineCol { line: 1, column: 1 });
        assert_eq!(map.line_col(Span::point(id, 11)), LineCol { line: 2, column: 1 });
        assert_eq!(map.file(id).line_text(1), Some("let a = 1;"));
        assert_eq!(map.file(id).line_text(2), Some("let b = 2;"));
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let mut map = SourceMap::new();
        let id = map.add_file("t.fire", "a;\r\nb;\r\n".to_string());
        assert_eq!(map.file(id).line_count(), 3);
        assert_eq!(map.line_col(Span::point(id, 4)), LineCol { line: 2, column: 1 });
    }
}

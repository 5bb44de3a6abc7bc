//! Line buffer with a traversal cursor.
//!
//! Every rewrite pass is one forward scan over the buffer that may insert,
//! replace or delete lines while scanning. The cursor bookkeeping keeps a
//! scan correct under mutation:
//! - inserting before the cursor shifts it forward, so the scan stays on
//!   the same logical line and never revisits the inserted one;
//! - deleting at the cursor leaves the cursor on the line that slid into
//!   the gap, and the scan's usual trailing `advance()` does not skip it.

/// One instruction line: raw text, split at the first `;` into a command
/// part and an optional trailing comment.
///
/// A line is never edited in place; passes replace it wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    raw: String,
}

impl Line {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Full text of the line, comment included
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Command part before any comment, trimmed. Empty for comment-only
    /// lines.
    pub fn code(&self) -> &str {
        match self.raw.find(';') {
            Some(pos) => self.raw[..pos].trim(),
            None => self.raw.trim(),
        }
    }

    /// Comment text after the first `;`, if any
    pub fn comment(&self) -> Option<&str> {
        self.raw.find(';').map(|pos| &self.raw[pos + 1..])
    }

    /// True when the line carries no command, only a comment
    pub fn is_comment_only(&self) -> bool {
        self.code().is_empty() && self.comment().is_some()
    }
}

impl From<&str> for Line {
    fn from(raw: &str) -> Self {
        Line::new(raw)
    }
}

/// The file's lines plus one traversal cursor.
///
/// Owned exclusively by the active pipeline while a file is processed.
/// Reading past the end (`current()` returning `None`) is the normal
/// termination signal for a pass, not an error.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    lines: Vec<Line>,
    cursor: usize,
    // set by delete_current so the next advance() lands on the line that
    // slid into the deleted slot
    hold: bool,
}

impl LineBuffer {
    pub fn new(lines: Vec<Line>) -> Self {
        Self {
            lines,
            cursor: 0,
            hold: false,
        }
    }

    /// Build a buffer from raw text lines, trimming whitespace and
    /// dropping empty lines, the way the loader hands them over.
    pub fn from_raw_lines<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines = raw
            .into_iter()
            .filter_map(|l| {
                let trimmed = l.as_ref().trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Line::new(trimmed))
                }
            })
            .collect();
        Self::new(lines)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Current cursor position
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Line at the cursor, `None` once the scan is exhausted
    pub fn current(&self) -> Option<&Line> {
        self.lines.get(self.cursor)
    }

    /// Line at an arbitrary index
    pub fn get(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    /// Move the cursor to the next line. A no-op directly after
    /// `delete_current`, so the slid-in line is still visited.
    pub fn advance(&mut self) {
        if self.hold {
            self.hold = false;
        } else {
            self.cursor += 1;
        }
    }

    /// Insert a line at `index`. When the insertion point is at or before
    /// the cursor, the cursor shifts forward so the scan neither revisits
    /// old lines nor skips the one it was on.
    pub fn insert(&mut self, index: usize, line: Line) {
        debug_assert!(index <= self.lines.len());
        self.lines.insert(index, line);
        if index <= self.cursor {
            self.cursor += 1;
        }
    }

    /// Insert directly before the line the cursor is on
    pub fn insert_before_current(&mut self, line: Line) {
        let at = self.cursor;
        self.insert(at, line);
    }

    /// Replace the line at the cursor wholesale
    pub fn replace_current(&mut self, line: Line) {
        if self.cursor < self.lines.len() {
            self.lines[self.cursor] = line;
        }
    }

    /// Replace the line at an arbitrary (already visited) index
    pub fn replace(&mut self, index: usize, line: Line) {
        if index < self.lines.len() {
            self.lines[index] = line;
        }
    }

    /// Delete the line at the cursor and return it. The next read sees the
    /// line that slid into the gap.
    pub fn delete_current(&mut self) -> Option<Line> {
        if self.cursor < self.lines.len() {
            let line = self.lines.remove(self.cursor);
            self.hold = true;
            Some(line)
        } else {
            None
        }
    }

    /// Reset the cursor for the next pass
    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.hold = false;
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<Line> {
        self.lines
    }
}

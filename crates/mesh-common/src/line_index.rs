//! Mapping between byte offsets and line/column positions.
//!
//! Built once per file as a sorted vector of line-start offsets; lookups
//! are a binary search. Columns are byte-based by default; the UTF-16
//! variants exist for the LSP boundary, which speaks UTF-16 code units.

/// A zero-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

/// Sorted line-start offsets for one source file.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        LineIndex { line_starts }
    }

    /// Line/column (byte columns) for a byte offset.
    pub fn line_col(&self, offset: u32) -> LineCol {
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        LineCol {
            line: line as u32,
            col: offset - self.line_starts[line],
        }
    }

    /// Byte offset of a line/column position. Columns past the end of the
    /// line clamp into the following line; callers validate before use.
    pub fn offset(&self, pos: LineCol) -> u32 {
        let line_start = self
            .line_starts
            .get(pos.line as usize)
            .copied()
            .unwrap_or_else(|| *self.line_starts.last().unwrap_or(&0));
        line_start + pos.col
    }

    /// Line/column where the column counts UTF-16 code units, as required
    /// by LSP positions.
    pub fn line_col_utf16(&self, text: &str, offset: u32) -> LineCol {
        let pos = self.line_col(offset);
        let line_start = self.line_starts[pos.line as usize] as usize;
        let col16 = text[line_start..offset as usize]
            .chars()
            .map(|c| c.len_utf16() as u32)
            .sum();
        LineCol {
            line: pos.line,
            col: col16,
        }
    }

    /// Byte offset of a position whose column counts UTF-16 code units.
    pub fn offset_utf16(&self, text: &str, pos: LineCol) -> u32 {
        let line_start = match self.line_starts.get(pos.line as usize) {
            Some(&s) => s as usize,
            None => return text.len() as u32,
        };
        let mut remaining = pos.col;
        let mut offset = line_start;
        for c in text[line_start..].chars() {
            if remaining == 0 || c == '\n' {
                break;
            }
            let units = c.len_utf16() as u32;
            if units > remaining {
                break;
            }
            remaining -= units;
            offset += c.len_utf8();
        }
        offset as u32
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset at which `line` starts, if the line exists.
    pub fn line_start(&self, line: u32) -> Option<u32> {
        self.line_starts.get(line as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_offsets_across_lines() {
        let text = "ab\ncd\n\nef";
        let idx = LineIndex::new(text);
        assert_eq!(idx.line_col(0), LineCol { line: 0, col: 0 });
        assert_eq!(idx.line_col(1), LineCol { line: 0, col: 1 });
        assert_eq!(idx.line_col(3), LineCol { line: 1, col: 0 });
        assert_eq!(idx.line_col(6), LineCol { line: 2, col: 0 });
        assert_eq!(idx.line_col(8), LineCol { line: 3, col: 1 });
    }

    #[test]
    fn offset_round_trips() {
        let text = "fn main do\n  println(1)\nend\n";
        let idx = LineIndex::new(text);
        for off in 0..text.len() as u32 {
            assert_eq!(idx.offset(idx.line_col(off)), off);
        }
    }

    #[test]
    fn utf16_columns_count_code_units() {
        let text = "let s = \"héllo 𐐀\"";
        let idx = LineIndex::new(text);
        let offset = text.len() as u32;
        let pos = idx.line_col_utf16(text, offset);
        // 𐐀 is one char, two UTF-16 units, four UTF-8 bytes.
        let expected: u32 = text.chars().map(|c| c.len_utf16() as u32).sum();
        assert_eq!(pos.col, expected);
        assert_eq!(idx.offset_utf16(text, pos), offset);
    }

    #[test]
    fn empty_file_has_one_line() {
        let idx = LineIndex::new("");
        assert_eq!(idx.line_count(), 1);
        assert_eq!(idx.line_col(0), LineCol { line: 0, col: 0 });
    }
}

//! LSP position <-> byte offset conversion.
//!
//! LSP positions count UTF-16 code units in whitespace-preserved source
//! coordinates. The CST is byte-lossless, so tree offsets and source
//! offsets coincide; every boundary crossing goes through these helpers
//! to translate positions.

use mesh_common::{LineCol, LineIndex, Span};
use tower_lsp::lsp_types::{Position, Range};

pub fn position_to_offset(text: &str, index: &LineIndex, position: Position) -> u32 {
    index.offset_utf16(
        text,
        LineCol {
            line: position.line,
            col: position.character,
        },
    )
}

pub fn offset_to_position(text: &str, index: &LineIndex, offset: u32) -> Position {
    let pos = index.line_col_utf16(text, offset.min(text.len() as u32));
    Position {
        line: pos.line,
        character: pos.col,
    }
}

pub fn span_to_range(text: &str, index: &LineIndex, span: Span) -> Range {
    Range {
        start: offset_to_position(text, index, span.start),
        end: offset_to_position(text, index, span.end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ascii_positions() {
        let text = "fn main() do\n  1\nend\n";
        let index = LineIndex::new(text);
        let pos = Position {
            line: 1,
            character: 2,
        };
        let offset = position_to_offset(text, &index, pos);
        assert_eq!(offset_to_position(text, &index, offset), pos);
    }

    #[test]
    fn utf16_positions_translate() {
        let text = "let s = \"𐐀x\"\n";
        let index = LineIndex::new(text);
        // 𐐀 is 2 UTF-16 units, 4 UTF-8 bytes; 'x' sits after it.
        let x_offset = text.find('x').unwrap() as u32;
        let pos = offset_to_position(text, &index, x_offset);
        assert_eq!(pos.character, 11);
        assert_eq!(position_to_offset(text, &index, pos), x_offset);
    }
}

//! The tokenizer state machine.
//!
//! A context stack governs lexing mode:
//!
//! - `Normal`: ordinary tokenization.
//! - `InString`: inside a string literal, accumulating content until the
//!   closing quote or a `${` interpolation opener.
//! - `InInterpolation`: inside `${...}`; behaves like `Normal` but tracks
//!   `{`/`}` nesting so an interior literal brace does not close the
//!   interpolation early. `}` at depth 0 pops back to the string frame.
//!
//! Entering `${` pushes `InInterpolation` WITHOUT popping `InString`, which
//! is what lets strings nest inside interpolations inside strings.

use crate::token::{LexError, LexErrorKind, Token, TokenKind, keyword_kind};
use mesh_common::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    InString { triple: bool },
    InInterpolation { brace_depth: u32 },
}

/// The output of tokenization: tokens (terminated by `Eof`) plus lexical
/// errors. For any byte sequence this is a pure function of the input.
#[derive(Debug, Clone)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub errors: Vec<LexError>,
}

/// Tokenize a source buffer.
pub fn lex(source: &str) -> Lexed {
    let mut lexer = Lexer::new(source);
    lexer.run();
    Lexed {
        tokens: lexer.tokens,
        errors: lexer.errors,
    }
}

struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    modes: Vec<Mode>,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
    /// Set when an unterminated block comment aborts lexing.
    halted: bool,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            source,
            pos: 0,
            modes: Vec::new(),
            tokens: Vec::new(),
            errors: Vec::new(),
            halted: false,
        }
    }

    fn run(&mut self) {
        while !self.halted && self.pos < self.source.len() {
            match self.mode() {
                Mode::InString { triple } => self.lex_string(triple),
                Mode::Normal | Mode::InInterpolation { .. } => self.lex_normal(),
            }
        }
        if self.pos >= self.source.len() && !self.modes.is_empty() {
            // EOF with open string/interpolation frames.
            self.error(LexErrorKind::UnterminatedString, self.point_span());
            self.modes.clear();
        }
        self.push_token(TokenKind::Eof, self.point_span());
    }

    // ── Cursor helpers ──────────────────────────────────────────────────

    fn mode(&self) -> Mode {
        self.modes.last().copied().unwrap_or(Mode::Normal)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut chars = self.rest().chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn point_span(&self) -> Span {
        Span::point(self.pos as u32)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start as u32, self.pos as u32)
    }

    fn push_token(&mut self, kind: TokenKind, span: Span) {
        self.tokens.push(Token::new(kind, span));
    }

    fn error(&mut self, kind: LexErrorKind, span: Span) {
        self.errors.push(LexError { kind, span });
    }

    // ── Normal / interpolation mode ─────────────────────────────────────

    fn lex_normal(&mut self) {
        let start = self.pos;
        let c = match self.peek() {
            Some(c) => c,
            None => return,
        };

        match c {
            ' ' | '\t' => {
                while matches!(self.peek(), Some(' ' | '\t')) {
                    self.bump();
                }
                self.push_token(TokenKind::Whitespace, self.span_from(start));
            }
            '\n' => {
                self.bump();
                self.push_token(TokenKind::Newline, self.span_from(start));
            }
            '\r' => {
                self.bump();
                if self.peek() == Some('\n') {
                    self.bump();
                }
                self.push_token(TokenKind::Newline, self.span_from(start));
            }
            '#' => {
                if self.peek2() == Some('=') {
                    self.lex_block_comment();
                } else {
                    while let Some(c) = self.peek() {
                        if c == '\n' || c == '\r' {
                            break;
                        }
                        self.bump();
                    }
                    self.push_token(TokenKind::Comment, self.span_from(start));
                }
            }
            '"' => {
                if self.at("\"\"\"") {
                    self.pos += 3;
                    self.push_token(TokenKind::TripleStringStart, self.span_from(start));
                    self.modes.push(Mode::InString { triple: true });
                } else {
                    self.bump();
                    self.push_token(TokenKind::StringStart, self.span_from(start));
                    self.modes.push(Mode::InString { triple: false });
                }
            }
            c if c.is_ascii_digit() => self.lex_number(),
            c if c.is_alphabetic() || c == '_' => {
                while let Some(c) = self.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        self.bump();
                    } else {
                        break;
                    }
                }
                let span = self.span_from(start);
                let kind = keyword_kind(span.text(self.source)).unwrap_or(TokenKind::Ident);
                self.push_token(kind, span);
            }
            '{' => {
                self.bump();
                if let Some(Mode::InInterpolation { brace_depth }) = self.modes.last_mut() {
                    *brace_depth += 1;
                }
                self.push_token(TokenKind::LBrace, self.span_from(start));
            }
            '}' => {
                self.bump();
                match self.modes.last_mut() {
                    Some(Mode::InInterpolation { brace_depth }) if *brace_depth == 0 => {
                        self.modes.pop();
                        self.push_token(TokenKind::InterpolationEnd, self.span_from(start));
                    }
                    Some(Mode::InInterpolation { brace_depth }) => {
                        *brace_depth -= 1;
                        self.push_token(TokenKind::RBrace, self.span_from(start));
                    }
                    _ => self.push_token(TokenKind::RBrace, self.span_from(start)),
                }
            }
            _ => self.lex_operator(),
        }
    }

    fn lex_operator(&mut self) {
        let start = self.pos;
        let two = |l: &Lexer<'a>, s: &str| l.at(s);
        let kind = if two(self, "++") {
            self.pos += 2;
            TokenKind::PlusPlus
        } else if two(self, "->") {
            self.pos += 2;
            TokenKind::Arrow
        } else if two(self, "==") {
            self.pos += 2;
            TokenKind::EqEq
        } else if two(self, "!=") {
            self.pos += 2;
            TokenKind::NotEq
        } else if two(self, "<=") {
            self.pos += 2;
            TokenKind::LtEq
        } else if two(self, ">=") {
            self.pos += 2;
            TokenKind::GtEq
        } else if two(self, "::") {
            self.pos += 2;
            TokenKind::ColonColon
        } else if two(self, "|>") {
            self.pos += 2;
            TokenKind::PipeGt
        } else {
            let c = self.bump().unwrap_or('\0');
            match c {
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '%' => TokenKind::Percent,
                '=' => TokenKind::Eq,
                '<' => TokenKind::Lt,
                '>' => TokenKind::Gt,
                ':' => TokenKind::Colon,
                '.' => TokenKind::Dot,
                ',' => TokenKind::Comma,
                ';' => TokenKind::Semicolon,
                '?' => TokenKind::Question,
                '|' => TokenKind::Pipe,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                _ => {
                    // Invalid character: one Error token, cursor already
                    // advanced one scalar.
                    let span = self.span_from(start);
                    self.error(LexErrorKind::InvalidCharacter, span);
                    self.push_token(TokenKind::Error, span);
                    return;
                }
            }
        };
        self.push_token(kind, self.span_from(start));
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        let mut kind = TokenKind::Int;
        let mut valid = true;

        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
            self.bump();
        }
        // Fractional part only when a digit follows the dot, so `1.abs()`
        // still lexes as Int Dot Ident.
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            kind = TokenKind::Float;
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.pos;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                kind = TokenKind::Float;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                // `1e` with no exponent digits.
                self.pos = mark;
                self.bump();
                valid = false;
            }
        }

        let span = self.span_from(start);
        if valid {
            self.push_token(kind, span);
        } else {
            self.error(LexErrorKind::InvalidNumber, span);
            self.push_token(TokenKind::Error, span);
        }
    }

    fn lex_block_comment(&mut self) {
        let start = self.pos;
        debug_assert!(self.at("#="));
        self.pos += 2;
        let mut depth = 1u32;
        while depth > 0 {
            if self.at("#=") {
                depth += 1;
                self.pos += 2;
            } else if self.at("=#") {
                depth -= 1;
                self.pos += 2;
            } else if self.bump().is_none() {
                // Depth at EOF: error token, lexing stops.
                let span = self.span_from(start);
                self.error(LexErrorKind::UnterminatedBlockComment, span);
                self.push_token(TokenKind::Error, span);
                self.halted = true;
                return;
            }
        }
        self.push_token(TokenKind::Comment, self.span_from(start));
    }

    // ── String mode ─────────────────────────────────────────────────────

    fn lex_string(&mut self, triple: bool) {
        let content_start = self.pos;
        loop {
            if self.pos >= self.source.len() {
                // Unterminated: content up to end-of-input, then the error;
                // the state stack is cleared in run().
                if self.pos > content_start {
                    self.push_token(TokenKind::StringContent, self.span_from(content_start));
                }
                return;
            }
            if triple && self.at("\"\"\"") {
                if self.pos > content_start {
                    self.push_token(TokenKind::StringContent, self.span_from(content_start));
                }
                let end_start = self.pos;
                self.pos += 3;
                self.push_token(TokenKind::TripleStringEnd, self.span_from(end_start));
                self.modes.pop();
                return;
            }
            if !triple && self.at("\"") {
                if self.pos > content_start {
                    self.push_token(TokenKind::StringContent, self.span_from(content_start));
                }
                let end_start = self.pos;
                self.pos += 1;
                self.push_token(TokenKind::StringEnd, self.span_from(end_start));
                self.modes.pop();
                return;
            }
            if self.at("${") {
                if self.pos > content_start {
                    self.push_token(TokenKind::StringContent, self.span_from(content_start));
                }
                let interp_start = self.pos;
                self.pos += 2;
                self.push_token(TokenKind::InterpolationStart, self.span_from(interp_start));
                // Push WITHOUT popping the string frame.
                self.modes.push(Mode::InInterpolation { brace_depth: 0 });
                return;
            }
            if self.at("\\") {
                let esc_start = self.pos;
                self.bump();
                match self.bump() {
                    Some('n' | 't' | 'r' | '\\' | '"' | '$' | '0') => {}
                    _ => self.error(LexErrorKind::InvalidEscape, self.span_from(esc_start)),
                }
                continue;
            }
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .tokens
            .iter()
            .map(|t| t.kind)
            .filter(|k| !matches!(k, Whitespace))
            .collect()
    }

    /// Every token's span must slice back to its exact text, and the
    /// concatenation of all token texts must reproduce the source.
    fn assert_lossless(source: &str) {
        let lexed = lex(source);
        let rebuilt: String = lexed
            .tokens
            .iter()
            .map(|t| t.text(source))
            .collect::<Vec<_>>()
            .concat();
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn simple_function_tokens() {
        let src = "fn add(a :: Int) -> Int do a end";
        assert_eq!(
            kinds(src),
            vec![
                FnKw, Ident, LParen, Ident, ColonColon, Ident, RParen, Arrow, Ident, DoKw, Ident,
                EndKw, Eof
            ]
        );
        assert_lossless(src);
    }

    #[test]
    fn newlines_are_significant_tokens() {
        let src = "let x = 1\nlet y = 2";
        assert_eq!(
            kinds(src),
            vec![LetKw, Ident, Eq, Int, Newline, LetKw, Ident, Eq, Int, Eof]
        );
    }

    #[test]
    fn interpolation_pushes_and_pops_frames() {
        let src = r#""a ${x} b""#;
        assert_eq!(
            kinds(src),
            vec![
                StringStart,
                StringContent,
                InterpolationStart,
                Ident,
                InterpolationEnd,
                StringContent,
                StringEnd,
                Eof
            ]
        );
        assert_lossless(src);
    }

    #[test]
    fn nested_string_in_interpolation_in_string() {
        let src = r#""a ${f("b ${c} d")} e""#;
        let lexed = lex(src);
        assert!(lexed.errors.is_empty(), "{:?}", lexed.errors);
        let starts = lexed
            .tokens
            .iter()
            .filter(|t| t.kind == StringStart)
            .count();
        let ends = lexed.tokens.iter().filter(|t| t.kind == StringEnd).count();
        assert_eq!(starts, 2);
        assert_eq!(ends, 2);
        assert_lossless(src);
    }

    #[test]
    fn interior_braces_do_not_close_interpolation() {
        let src = r#""${ {1} }""#;
        assert_eq!(
            kinds(src),
            vec![
                StringStart,
                InterpolationStart,
                LBrace,
                Int,
                RBrace,
                InterpolationEnd,
                StringEnd,
                Eof
            ]
        );
    }

    #[test]
    fn triple_strings_allow_quotes_and_newlines() {
        let src = "\"\"\"a \" b\nc\"\"\"";
        assert_eq!(
            kinds(src),
            vec![TripleStringStart, StringContent, TripleStringEnd, Eof]
        );
        assert_lossless(src);
    }

    #[test]
    fn nested_block_comments() {
        let src = "#= outer #= inner =# still outer =# 1";
        let lexed = lex(src);
        assert!(lexed.errors.is_empty());
        assert_eq!(kinds(src), vec![Comment, Int, Eof]);
        assert_lossless(src);
    }

    #[test]
    fn unterminated_block_comment_stops_lexing() {
        let src = "#= never closed\nfn ignored";
        let lexed = lex(src);
        assert_eq!(lexed.errors.len(), 1);
        assert_eq!(
            lexed.errors[0].kind,
            LexErrorKind::UnterminatedBlockComment
        );
        // Nothing after the error token except Eof.
        assert_eq!(
            lexed.tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![Error, Eof]
        );
    }

    #[test]
    fn unterminated_string_recovers() {
        let src = "let s = \"abc";
        let lexed = lex(src);
        assert!(
            lexed
                .errors
                .iter()
                .any(|e| e.kind == LexErrorKind::UnterminatedString)
        );
        assert!(lexed.tokens.iter().any(|t| t.kind == StringContent));
        assert_eq!(lexed.tokens.last().map(|t| t.kind), Some(Eof));
    }

    #[test]
    fn invalid_character_advances_one_scalar() {
        let src = "let £ = 1";
        let lexed = lex(src);
        assert_eq!(lexed.errors.len(), 1);
        assert_eq!(lexed.errors[0].kind, LexErrorKind::InvalidCharacter);
        assert!(lexed.tokens.iter().any(|t| t.kind == Error));
        // Lexing continues after the bad scalar.
        assert!(lexed.tokens.iter().filter(|t| t.kind == Int).count() == 1);
        assert_lossless(src);
    }

    #[test]
    fn float_and_int_literals() {
        assert_eq!(kinds("1 2.5 3e4 1_000"), vec![Int, Float, Float, Int, Eof]);
        // A dot not followed by a digit is a method call, not a float.
        assert_eq!(kinds("1.abs"), vec![Int, Dot, Ident, Eof]);
    }

    #[test]
    fn invalid_exponent_is_an_error_token() {
        let lexed = lex("1e");
        assert_eq!(lexed.errors.len(), 1);
        assert_eq!(lexed.errors[0].kind, LexErrorKind::InvalidNumber);
    }

    #[test]
    fn invalid_escape_is_reported_but_content_continues() {
        let src = r#""a\qb""#;
        let lexed = lex(src);
        assert_eq!(lexed.errors.len(), 1);
        assert_eq!(lexed.errors[0].kind, LexErrorKind::InvalidEscape);
        assert_eq!(
            kinds(src),
            vec![StringStart, StringContent, StringEnd, Eof]
        );
    }

    #[test]
    fn deriving_is_contextual_not_reserved() {
        assert_eq!(kinds("deriving"), vec![Ident, Eof]);
    }

    #[test]
    fn determinism() {
        let src = r#"fn f do "a ${1 + 2} b" end"#;
        let a = lex(src);
        let b = lex(src);
        assert_eq!(a.tokens, b.tokens);
    }

    #[test]
    fn crlf_is_one_newline_token() {
        let src = "a\r\nb";
        let lexed = lex(src);
        let newlines: Vec<_> = lexed
            .tokens
            .iter()
            .filter(|t| t.kind == Newline)
            .collect();
        assert_eq!(newlines.len(), 1);
        assert_eq!(newlines[0].text(src), "\r\n");
        assert_lossless(src);
    }
}

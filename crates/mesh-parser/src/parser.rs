//! Parser infrastructure: token cursor, green-tree builder, error list.
//!
//! Trivia (whitespace, comments) is flushed into the tree lazily, just
//! before the next significant token is consumed or a node boundary is
//! taken, which keeps the tree byte-lossless without the grammar ever
//! mentioning trivia.
//!
//! Newlines are significant statement terminators, EXCEPT while the
//! bracket depth is nonzero or immediately after a continuation token
//! (binary operator, comma, `do`, `=`), where they are consumed as if
//! they were trivia.

use crate::grammar;
use crate::syntax_kind::{SyntaxKind, token_kind_to_syntax};
use crate::{MeshLanguage, ParseError};
use mesh_common::Span;
use mesh_lexer::{Token, TokenKind};
use rowan::{Checkpoint, GreenNode, GreenNodeBuilder, Language};

pub(crate) struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
    depth: u32,
    builder: GreenNodeBuilder<'static>,
    errors: Vec<ParseError>,
}

pub(crate) fn parse_tokens(source: &str, tokens: &[Token]) -> (GreenNode, Vec<ParseError>) {
    let mut p = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
        builder: GreenNodeBuilder::new(),
        errors: Vec::new(),
    };
    grammar::source_file(&mut p);
    (p.builder.finish(), p.errors)
}

impl<'a> Parser<'a> {
    // ── Cursor ──────────────────────────────────────────────────────────

    fn token_at(&self, pos: usize) -> Option<&Token> {
        match self.tokens.get(pos) {
            Some(t) if t.kind == TokenKind::Eof => None,
            other => other,
        }
    }

    /// Kind of the next significant token, flushing trivia (and newlines
    /// suppressed by bracket depth) into the tree.
    pub(crate) fn current(&mut self) -> SyntaxKind {
        self.flush_insignificant();
        self.token_at(self.pos)
            .map(|t| token_kind_to_syntax(t.kind))
            .unwrap_or(SyntaxKind::EOF)
    }

    /// Text of the next significant token (empty at EOF).
    pub(crate) fn current_text(&mut self) -> &'a str {
        self.flush_insignificant();
        self.token_at(self.pos)
            .map(|t| t.text(self.source))
            .unwrap_or("")
    }

    pub(crate) fn current_span(&mut self) -> Span {
        self.flush_insignificant();
        self.token_at(self.pos)
            .map(|t| t.span)
            .unwrap_or_else(|| Span::point(self.source.len() as u32))
    }

    /// Lookahead over significant tokens without consuming anything.
    /// `nth(0)` is the same kind `current()` returns; trivia is skipped,
    /// but suppressed newlines are NOT skipped (lookahead is used for
    /// same-line decisions like `Name {` struct literals).
    pub(crate) fn nth(&mut self, n: usize) -> SyntaxKind {
        self.flush_insignificant();
        let mut seen = 0usize;
        let mut pos = self.pos;
        while let Some(t) = self.token_at(pos) {
            if !t.kind.is_trivia() {
                if seen == n {
                    return token_kind_to_syntax(t.kind);
                }
                seen += 1;
            }
            pos += 1;
        }
        SyntaxKind::EOF
    }

    pub(crate) fn at(&mut self, kind: SyntaxKind) -> bool {
        self.current() == kind
    }

    pub(crate) fn at_eof(&mut self) -> bool {
        self.at(SyntaxKind::EOF)
    }

    // ── Consuming ───────────────────────────────────────────────────────

    fn push_raw_token(&mut self) {
        if let Some(t) = self.tokens.get(self.pos) {
            let kind = token_kind_to_syntax(t.kind);
            self.builder
                .token(MeshLanguage::kind_to_raw(kind), t.text(self.source));
            self.pos += 1;
        }
    }

    fn flush_trivia(&mut self) {
        while let Some(t) = self.token_at(self.pos) {
            if t.kind.is_trivia() {
                self.push_raw_token();
            } else {
                break;
            }
        }
    }

    fn flush_insignificant(&mut self) {
        loop {
            self.flush_trivia();
            match self.token_at(self.pos) {
                Some(t) if t.kind == TokenKind::Newline && self.depth > 0 => {
                    self.push_raw_token();
                }
                _ => break,
            }
        }
    }

    /// Consume the current significant token into the tree.
    pub(crate) fn bump(&mut self) {
        self.flush_insignificant();
        let Some(t) = self.token_at(self.pos) else {
            return;
        };
        let kind = t.kind;
        match kind {
            TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::InterpolationStart => self.depth += 1,
            TokenKind::RParen
            | TokenKind::RBracket
            | TokenKind::RBrace
            | TokenKind::InterpolationEnd => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.push_raw_token();
        if is_continuation(kind) {
            self.eat_newlines();
        }
    }

    /// Consume any run of newline tokens into the tree.
    pub(crate) fn eat_newlines(&mut self) {
        loop {
            self.flush_trivia();
            match self.token_at(self.pos) {
                Some(t) if t.kind == TokenKind::Newline => self.push_raw_token(),
                _ => break,
            }
        }
    }

    /// Bump iff at `kind`; returns whether it did.
    pub(crate) fn eat(&mut self, kind: SyntaxKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Bump `kind` or record an error naming `what`.
    pub(crate) fn expect(&mut self, kind: SyntaxKind, what: &str) -> bool {
        if self.eat(kind) {
            return true;
        }
        self.error(what);
        false
    }

    // ── Tree building ───────────────────────────────────────────────────

    /// Start the root node. Unlike `start_node` this must not flush
    /// trivia first: tokens cannot precede the root in a green tree.
    pub(crate) fn start_root(&mut self) {
        self.builder
            .start_node(MeshLanguage::kind_to_raw(SyntaxKind::SOURCE_FILE));
    }

    pub(crate) fn start_node(&mut self, kind: SyntaxKind) {
        self.flush_insignificant();
        self.builder.start_node(MeshLanguage::kind_to_raw(kind));
    }

    pub(crate) fn finish_node(&mut self) {
        self.builder.finish_node();
    }

    pub(crate) fn checkpoint(&mut self) -> Checkpoint {
        self.flush_insignificant();
        self.builder.checkpoint()
    }

    pub(crate) fn start_node_at(&mut self, checkpoint: Checkpoint, kind: SyntaxKind) {
        self.builder
            .start_node_at(checkpoint, MeshLanguage::kind_to_raw(kind));
    }

    /// Finish the whole file: flush every remaining token (trivia or not)
    /// so the tree stays lossless even after a hard parse failure.
    pub(crate) fn flush_remaining(&mut self) {
        while self.token_at(self.pos).is_some() {
            self.push_raw_token();
        }
    }

    // ── Errors ──────────────────────────────────────────────────────────

    pub(crate) fn error(&mut self, expected: &str) {
        let span = self.current_span();
        let found = match self.current() {
            SyntaxKind::EOF => "end of file".to_string(),
            _ => format!("`{}`", self.current_text()),
        };
        self.errors.push(ParseError {
            expected: expected.to_string(),
            found,
            span,
        });
    }

    /// Record an error and swallow one token inside an ERROR node, unless
    /// the token is in `recovery` (or EOF), in which case the caller's
    /// loop gets a chance to resynchronize on it.
    pub(crate) fn error_recover(&mut self, expected: &str, recovery: &[SyntaxKind]) {
        self.error(expected);
        let kind = self.current();
        if kind == SyntaxKind::EOF || recovery.contains(&kind) {
            return;
        }
        self.start_node(SyntaxKind::ERROR);
        self.bump();
        self.finish_node();
    }
}

/// Tokens after which a newline does not terminate the statement.
fn is_continuation(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent
            | TokenKind::PlusPlus
            | TokenKind::EqEq
            | TokenKind::NotEq
            | TokenKind::Lt
            | TokenKind::Gt
            | TokenKind::LtEq
            | TokenKind::GtEq
            | TokenKind::AndKw
            | TokenKind::OrKw
            | TokenKind::PipeGt
            | TokenKind::Pipe
            | TokenKind::Comma
            | TokenKind::DoKw
            | TokenKind::Eq
            | TokenKind::Arrow
            | TokenKind::Dot
    )
}

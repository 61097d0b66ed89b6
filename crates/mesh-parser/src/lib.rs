//! Mesh parser: tokens to a lossless rowan CST plus a diagnostics list.
//!
//! The parser always produces a tree. On syntax errors it records a
//! diagnostic, wraps the offending tokens in an `ERROR` node, and keeps
//! going. Re-serializing any tree reproduces the original source
//! byte-for-byte; whitespace and comments are attached as trivia.
//!
//! The [`ast`] module layers typed accessors over the raw CST nodes; all
//! accessors return `Option`-shaped results so a partially-parsed tree is
//! safe to walk.

pub mod ast;
mod grammar;
mod parser;
pub mod syntax_kind;

use mesh_common::Span;
use mesh_lexer::{LexError, lex};
use rowan::GreenNode;

pub use syntax_kind::SyntaxKind;

/// The rowan language tag for Mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MeshLanguage {}

impl rowan::Language for MeshLanguage {
    type Kind = SyntaxKind;

    fn kind_from_raw(raw: rowan::SyntaxKind) -> SyntaxKind {
        SyntaxKind::from_raw(raw.0)
    }

    fn kind_to_raw(kind: SyntaxKind) -> rowan::SyntaxKind {
        rowan::SyntaxKind(kind as u16)
    }
}

pub type SyntaxNode = rowan::SyntaxNode<MeshLanguage>;
pub type SyntaxToken = rowan::SyntaxToken<MeshLanguage>;
pub type SyntaxElement = rowan::SyntaxElement<MeshLanguage>;

/// A recoverable syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub span: Span,
}

impl ParseError {
    pub fn message(&self) -> String {
        format!("expected {}, found {}", self.expected, self.found)
    }
}

/// The result of parsing one source file: the green tree, syntax errors,
/// and the lexical errors encountered while tokenizing.
#[derive(Debug, Clone)]
pub struct Parse {
    green: GreenNode,
    errors: Vec<ParseError>,
    lex_errors: Vec<LexError>,
}

impl Parse {
    pub fn syntax(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }

    pub fn tree(&self) -> ast::SourceFile {
        use ast::AstNode;
        ast::SourceFile::cast(self.syntax()).expect("root node is SOURCE_FILE")
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn lex_errors(&self) -> &[LexError] {
        &self.lex_errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || !self.lex_errors.is_empty()
    }
}

/// Parse a source file. Always yields a tree.
pub fn parse(source: &str) -> Parse {
    let lexed = lex(source);
    let (green, errors) = parser::parse_tokens(source, &lexed.tokens);
    Parse {
        green,
        errors,
        lex_errors: lexed.errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_lossless(source: &str) {
        let parse = parse(source);
        assert_eq!(
            parse.syntax().text().to_string(),
            source,
            "tree must reserialize to the original source"
        );
    }

    #[test]
    fn lossless_roundtrip_simple() {
        assert_lossless("fn main() do\n  println(\"hi\")\nend\n");
    }

    #[test]
    fn lossless_roundtrip_with_trivia_and_errors() {
        assert_lossless("# comment\nfn broken( do 1 end\n\n  \t#= block =#\nlet x = ");
    }

    #[test]
    fn lossless_roundtrip_interpolation() {
        assert_lossless(r#"fn f(n :: Int) -> String do "n = ${n + 1}!" end"#);
    }

    #[test]
    fn error_recovery_still_produces_items() {
        let src = "fn good() do 1 end\n@@@\nfn also_good() do 2 end\n";
        let parse = parse(src);
        let names: Vec<_> = parse
            .tree()
            .items()
            .filter_map(|i| match i {
                ast::Item::FnDef(f) => f.name().map(|n| n.text()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["good", "also_good"]);
        assert!(parse.has_errors());
        assert_lossless(src);
    }

    #[test]
    fn parser_never_panics_on_garbage() {
        for src in ["", ")", "end end end", "fn", "struct do end", "\"${", "${}"] {
            let parse = parse(src);
            assert_eq!(parse.syntax().text().to_string(), src);
        }
    }
}

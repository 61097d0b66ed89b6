//! Typed accessors over CST nodes.
//!
//! Every accessor returns an `Option` (or an iterator that may be empty):
//! a tree produced under error recovery can be missing any child, and the
//! AST layer must stay total over it.

mod expr;
mod item;
mod pat;

pub use expr::*;
pub use item::*;
pub use pat::*;

use crate::syntax_kind::SyntaxKind;
use crate::{SyntaxNode, SyntaxToken};

pub trait AstNode {
    fn cast(syntax: SyntaxNode) -> Option<Self>
    where
        Self: Sized;
    fn syntax(&self) -> &SyntaxNode;
}

macro_rules! ast_node {
    ($name:ident, $kind:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            pub(crate) syntax: SyntaxNode,
        }

        impl AstNode for $name {
            fn cast(syntax: SyntaxNode) -> Option<Self> {
                (syntax.kind() == SyntaxKind::$kind).then(|| $name { syntax })
            }

            fn syntax(&self) -> &SyntaxNode {
                &self.syntax
            }
        }
    };
}
pub(crate) use ast_node;

pub(crate) fn child<N: AstNode>(parent: &SyntaxNode) -> Option<N> {
    parent.children().find_map(N::cast)
}

pub(crate) fn children<N: AstNode>(parent: &SyntaxNode) -> impl Iterator<Item = N> + use<N> {
    parent.children().filter_map(N::cast)
}

pub(crate) fn token(parent: &SyntaxNode, kind: SyntaxKind) -> Option<SyntaxToken> {
    parent
        .children_with_tokens()
        .filter_map(|el| el.into_token())
        .find(|t| t.kind() == kind)
}

// ── Source file ─────────────────────────────────────────────────────────

ast_node!(SourceFile, SOURCE_FILE);

impl SourceFile {
    pub fn items(&self) -> impl Iterator<Item = Item> + use<> {
        self.syntax.children().filter_map(Item::cast)
    }

    /// Top-level statements that are not items (script-style tails).
    pub fn trailing_exprs(&self) -> impl Iterator<Item = Expr> + use<> {
        self.syntax.children().filter_map(Expr::cast)
    }
}

// ── Shared name nodes ───────────────────────────────────────────────────

ast_node!(Name, NAME);
ast_node!(NameRef, NAME_REF);
ast_node!(Path, PATH);
ast_node!(Visibility, VISIBILITY);

impl Name {
    pub fn text(&self) -> String {
        self.syntax.text().to_string()
    }

    pub fn ident_token(&self) -> Option<SyntaxToken> {
        token(&self.syntax, SyntaxKind::IDENT)
    }
}

impl NameRef {
    pub fn text(&self) -> String {
        self.syntax.text().to_string()
    }
}

impl Path {
    /// Dotted path segments in source order.
    pub fn segments(&self) -> Vec<String> {
        self.syntax
            .children_with_tokens()
            .filter_map(|el| el.into_token())
            .filter(|t| {
                matches!(
                    t.kind(),
                    SyntaxKind::IDENT | SyntaxKind::SELF_TYPE_KW
                )
            })
            .map(|t| t.text().to_string())
            .collect()
    }

    /// The path joined with `.` (e.g. `Math.Vector`).
    pub fn dotted(&self) -> String {
        self.segments().join(".")
    }
}

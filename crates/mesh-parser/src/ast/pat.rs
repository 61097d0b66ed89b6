//! Pattern AST nodes.

use super::{AstNode, Literal, Name, Path, StringExpr, ast_node, child};
use crate::SyntaxNode;
use crate::syntax_kind::SyntaxKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Wildcard(WildcardPat),
    Ident(IdentPat),
    Literal(LiteralPat),
    Tuple(TuplePat),
    Constructor(ConstructorPat),
    Or(OrPat),
}

ast_node!(WildcardPat, WILDCARD_PAT);
ast_node!(IdentPat, IDENT_PAT);
ast_node!(LiteralPat, LITERAL_PAT);
ast_node!(TuplePat, TUPLE_PAT);
ast_node!(ConstructorPat, CONSTRUCTOR_PAT);
ast_node!(OrPat, OR_PAT);

impl Pattern {
    pub fn cast(syntax: SyntaxNode) -> Option<Pattern> {
        use SyntaxKind::*;
        Some(match syntax.kind() {
            WILDCARD_PAT => Pattern::Wildcard(WildcardPat { syntax }),
            IDENT_PAT => Pattern::Ident(IdentPat { syntax }),
            LITERAL_PAT => Pattern::Literal(LiteralPat { syntax }),
            TUPLE_PAT => Pattern::Tuple(TuplePat { syntax }),
            CONSTRUCTOR_PAT => Pattern::Constructor(ConstructorPat { syntax }),
            OR_PAT => Pattern::Or(OrPat { syntax }),
            _ => return None,
        })
    }

    pub fn syntax(&self) -> &SyntaxNode {
        match self {
            Pattern::Wildcard(it) => it.syntax(),
            Pattern::Ident(it) => it.syntax(),
            Pattern::Literal(it) => it.syntax(),
            Pattern::Tuple(it) => it.syntax(),
            Pattern::Constructor(it) => it.syntax(),
            Pattern::Or(it) => it.syntax(),
        }
    }
}

impl IdentPat {
    pub fn name(&self) -> Option<Name> {
        child(&self.syntax)
    }
}

impl LiteralPat {
    /// Numeric/bool literal, when the pattern is one.
    pub fn literal(&self) -> Option<Literal> {
        child(&self.syntax)
    }

    /// String literal, when the pattern is one.
    pub fn string(&self) -> Option<StringExpr> {
        child(&self.syntax)
    }
}

impl TuplePat {
    pub fn items(&self) -> impl Iterator<Item = Pattern> + use<> {
        self.syntax.children().filter_map(Pattern::cast)
    }
}

impl ConstructorPat {
    /// `Shape.Circle(r)`: the (possibly qualified) constructor path.
    pub fn path(&self) -> Option<Path> {
        child(&self.syntax)
    }

    pub fn args(&self) -> impl Iterator<Item = Pattern> + use<> {
        self.syntax.children().filter_map(Pattern::cast)
    }
}

impl OrPat {
    pub fn alternatives(&self) -> impl Iterator<Item = Pattern> + use<> {
        self.syntax.children().filter_map(Pattern::cast)
    }
}

//! Expression-level AST nodes.

use super::{AstNode, LetStmt, Name, NameRef, Param, ParamList, Pattern, ast_node, child, children, token};
use crate::syntax_kind::SyntaxKind;
use crate::{SyntaxNode, SyntaxToken};

/// Any expression node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(Literal),
    StringExpr(StringExpr),
    NameRef(NameRef),
    BinaryExpr(BinaryExpr),
    UnaryExpr(UnaryExpr),
    CallExpr(CallExpr),
    FieldAccess(FieldAccess),
    ParenExpr(ParenExpr),
    TupleExpr(TupleExpr),
    ListExpr(ListExpr),
    IfExpr(IfExpr),
    CaseExpr(CaseExpr),
    ForExpr(ForExpr),
    LambdaExpr(LambdaExpr),
    ReceiveExpr(ReceiveExpr),
    SpawnExpr(SpawnExpr),
    SendExpr(SendExpr),
    ReturnExpr(ReturnExpr),
    TryExpr(TryExpr),
    StructLit(StructLit),
}

impl Expr {
    pub fn cast(syntax: SyntaxNode) -> Option<Expr> {
        use SyntaxKind::*;
        Some(match syntax.kind() {
            LITERAL => Expr::Literal(Literal { syntax }),
            STRING_EXPR => Expr::StringExpr(StringExpr { syntax }),
            NAME_REF => Expr::NameRef(NameRef { syntax }),
            BINARY_EXPR => Expr::BinaryExpr(BinaryExpr { syntax }),
            UNARY_EXPR => Expr::UnaryExpr(UnaryExpr { syntax }),
            CALL_EXPR => Expr::CallExpr(CallExpr { syntax }),
            FIELD_ACCESS => Expr::FieldAccess(FieldAccess { syntax }),
            PAREN_EXPR => Expr::ParenExpr(ParenExpr { syntax }),
            TUPLE_EXPR => Expr::TupleExpr(TupleExpr { syntax }),
            LIST_EXPR => Expr::ListExpr(ListExpr { syntax }),
            IF_EXPR => Expr::IfExpr(IfExpr { syntax }),
            CASE_EXPR => Expr::CaseExpr(CaseExpr { syntax }),
            FOR_EXPR => Expr::ForExpr(ForExpr { syntax }),
            LAMBDA_EXPR => Expr::LambdaExpr(LambdaExpr { syntax }),
            RECEIVE_EXPR => Expr::ReceiveExpr(ReceiveExpr { syntax }),
            SPAWN_EXPR => Expr::SpawnExpr(SpawnExpr { syntax }),
            SEND_EXPR => Expr::SendExpr(SendExpr { syntax }),
            RETURN_EXPR => Expr::ReturnExpr(ReturnExpr { syntax }),
            TRY_EXPR => Expr::TryExpr(TryExpr { syntax }),
            STRUCT_LIT => Expr::StructLit(StructLit { syntax }),
            _ => return None,
        })
    }

    pub fn syntax(&self) -> &SyntaxNode {
        match self {
            Expr::Literal(it) => it.syntax(),
            Expr::StringExpr(it) => it.syntax(),
            Expr::NameRef(it) => it.syntax(),
            Expr::BinaryExpr(it) => it.syntax(),
            Expr::UnaryExpr(it) => it.syntax(),
            Expr::CallExpr(it) => it.syntax(),
            Expr::FieldAccess(it) => it.syntax(),
            Expr::ParenExpr(it) => it.syntax(),
            Expr::TupleExpr(it) => it.syntax(),
            Expr::ListExpr(it) => it.syntax(),
            Expr::IfExpr(it) => it.syntax(),
            Expr::CaseExpr(it) => it.syntax(),
            Expr::ForExpr(it) => it.syntax(),
            Expr::LambdaExpr(it) => it.syntax(),
            Expr::ReceiveExpr(it) => it.syntax(),
            Expr::SpawnExpr(it) => it.syntax(),
            Expr::SendExpr(it) => it.syntax(),
            Expr::ReturnExpr(it) => it.syntax(),
            Expr::TryExpr(it) => it.syntax(),
            Expr::StructLit(it) => it.syntax(),
        }
    }
}

// ── Blocks ──────────────────────────────────────────────────────────────

ast_node!(Block, BLOCK);

/// A statement inside a block: a let binding or a bare expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Let(LetStmt),
    Expr(Expr),
}

impl Block {
    pub fn stmts(&self) -> impl Iterator<Item = Stmt> + use<> {
        self.syntax.children().filter_map(|node| {
            if node.kind() == SyntaxKind::LET_STMT {
                LetStmt::cast(node).map(Stmt::Let)
            } else {
                Expr::cast(node).map(Stmt::Expr)
            }
        })
    }

    /// The trailing expression, i.e. the block's value.
    pub fn tail_expr(&self) -> Option<Expr> {
        self.syntax
            .children()
            .filter(|n| n.kind() != SyntaxKind::LET_STMT)
            .filter_map(Expr::cast)
            .last()
    }
}

// ── Literals and strings ────────────────────────────────────────────────

ast_node!(Literal, LITERAL);

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralKind {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Literal {
    pub fn kind(&self) -> Option<LiteralKind> {
        let tok = self.syntax.first_token()?;
        match tok.kind() {
            SyntaxKind::INT => {
                let cleaned: String = tok.text().chars().filter(|&c| c != '_').collect();
                cleaned.parse().ok().map(LiteralKind::Int)
            }
            SyntaxKind::FLOAT => {
                let cleaned: String = tok.text().chars().filter(|&c| c != '_').collect();
                cleaned.parse().ok().map(LiteralKind::Float)
            }
            SyntaxKind::TRUE_KW => Some(LiteralKind::Bool(true)),
            SyntaxKind::FALSE_KW => Some(LiteralKind::Bool(false)),
            _ => None,
        }
    }
}

ast_node!(StringExpr, STRING_EXPR);
ast_node!(Interpolation, INTERPOLATION);

/// One piece of a (possibly interpolated) string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringSegment {
    /// Raw content between quotes/interpolations (escapes unresolved).
    Content(SyntaxToken),
    /// A `${expr}` interpolation.
    Interpolation(Interpolation),
}

impl StringExpr {
    pub fn segments(&self) -> Vec<StringSegment> {
        self.syntax
            .children_with_tokens()
            .filter_map(|el| match el {
                rowan::NodeOrToken::Token(t) if t.kind() == SyntaxKind::STRING_CONTENT => {
                    Some(StringSegment::Content(t))
                }
                rowan::NodeOrToken::Node(n) => {
                    Interpolation::cast(n).map(StringSegment::Interpolation)
                }
                _ => None,
            })
            .collect()
    }

    pub fn is_triple(&self) -> bool {
        token(&self.syntax, SyntaxKind::TRIPLE_STRING_START).is_some()
    }

    /// The literal text with escapes resolved, or `None` when the string
    /// contains interpolations.
    pub fn as_plain_string(&self) -> Option<String> {
        let mut out = String::new();
        for seg in self.segments() {
            match seg {
                StringSegment::Content(t) => out.push_str(&unescape(t.text())),
                StringSegment::Interpolation(_) => return None,
            }
        }
        Some(out)
    }
}

impl Interpolation {
    pub fn expr(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }
}

/// Resolve the escape sequences the lexer accepted.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('$') => out.push('$'),
            Some('0') => out.push('\0'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ── Operators ───────────────────────────────────────────────────────────

ast_node!(BinaryExpr, BINARY_EXPR);
ast_node!(UnaryExpr, UNARY_EXPR);

impl BinaryExpr {
    pub fn lhs(&self) -> Option<Expr> {
        self.syntax.children().filter_map(Expr::cast).next()
    }

    pub fn rhs(&self) -> Option<Expr> {
        self.syntax.children().filter_map(Expr::cast).nth(1)
    }

    pub fn op_token(&self) -> Option<SyntaxToken> {
        self.syntax
            .children_with_tokens()
            .filter_map(|el| el.into_token())
            .find(|t| is_binary_op(t.kind()))
    }

    pub fn op_kind(&self) -> Option<SyntaxKind> {
        self.op_token().map(|t| t.kind())
    }
}

pub fn is_binary_op(kind: SyntaxKind) -> bool {
    use SyntaxKind::*;
    matches!(
        kind,
        PLUS | MINUS
            | STAR
            | SLASH
            | PERCENT
            | PLUS_PLUS
            | EQ_EQ
            | NOT_EQ
            | LT
            | GT
            | LT_EQ
            | GT_EQ
            | AND_KW
            | OR_KW
            | PIPE_GT
    )
}

impl UnaryExpr {
    pub fn operand(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }

    pub fn op_kind(&self) -> Option<SyntaxKind> {
        self.syntax
            .children_with_tokens()
            .filter_map(|el| el.into_token())
            .map(|t| t.kind())
            .find(|k| matches!(k, SyntaxKind::MINUS | SyntaxKind::NOT_KW))
    }
}

// ── Calls and access ────────────────────────────────────────────────────

ast_node!(CallExpr, CALL_EXPR);
ast_node!(ArgList, ARG_LIST);
ast_node!(FieldAccess, FIELD_ACCESS);
ast_node!(TryExpr, TRY_EXPR);

impl CallExpr {
    pub fn callee(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }

    pub fn arg_list(&self) -> Option<ArgList> {
        child(&self.syntax)
    }
}

impl ArgList {
    pub fn args(&self) -> impl Iterator<Item = Expr> + use<> {
        self.syntax.children().filter_map(Expr::cast)
    }
}

impl FieldAccess {
    pub fn base(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }

    pub fn field_name(&self) -> Option<NameRef> {
        // The NAME_REF after the dot; the base itself may be a NAME_REF.
        let mut refs = children::<NameRef>(&self.syntax);
        let first = refs.next();
        match refs.next() {
            Some(second) => Some(second),
            None => {
                // Base was not a NAME_REF; the only NAME_REF is the field.
                let base_is_ref = matches!(self.base(), Some(Expr::NameRef(_)));
                if base_is_ref { None } else { first }
            }
        }
    }
}

impl TryExpr {
    pub fn expr(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }
}

// ── Grouping ────────────────────────────────────────────────────────────

ast_node!(ParenExpr, PAREN_EXPR);
ast_node!(TupleExpr, TUPLE_EXPR);
ast_node!(ListExpr, LIST_EXPR);

impl ParenExpr {
    pub fn expr(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }
}

impl TupleExpr {
    pub fn items(&self) -> impl Iterator<Item = Expr> + use<> {
        self.syntax.children().filter_map(Expr::cast)
    }
}

impl ListExpr {
    pub fn items(&self) -> impl Iterator<Item = Expr> + use<> {
        self.syntax.children().filter_map(Expr::cast)
    }
}

// ── Control flow ────────────────────────────────────────────────────────

ast_node!(IfExpr, IF_EXPR);
ast_node!(CaseExpr, CASE_EXPR);
ast_node!(CaseArm, CASE_ARM);
ast_node!(GuardClause, GUARD_CLAUSE);
ast_node!(ForExpr, FOR_EXPR);
ast_node!(ReturnExpr, RETURN_EXPR);

impl IfExpr {
    pub fn condition(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }

    pub fn then_block(&self) -> Option<Block> {
        children::<Block>(&self.syntax).next()
    }

    pub fn else_block(&self) -> Option<Block> {
        children::<Block>(&self.syntax).nth(1)
    }
}

impl CaseExpr {
    pub fn scrutinee(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }

    pub fn arms(&self) -> impl Iterator<Item = CaseArm> + use<> {
        children(&self.syntax)
    }
}

impl CaseArm {
    pub fn pattern(&self) -> Option<Pattern> {
        self.syntax.children().find_map(Pattern::cast)
    }

    pub fn guard(&self) -> Option<GuardClause> {
        child(&self.syntax)
    }

    pub fn body(&self) -> Option<Expr> {
        self.syntax.children().filter_map(Expr::cast).last()
    }
}

impl GuardClause {
    pub fn condition(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }
}

impl ForExpr {
    pub fn binding(&self) -> Option<Name> {
        child(&self.syntax)
    }

    pub fn iterable(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }

    /// The `when` filter, if present.
    pub fn filter(&self) -> Option<GuardClause> {
        child(&self.syntax)
    }

    pub fn body(&self) -> Option<Block> {
        child(&self.syntax)
    }
}

impl ReturnExpr {
    pub fn expr(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }
}

// ── Actors ──────────────────────────────────────────────────────────────

ast_node!(ReceiveExpr, RECEIVE_EXPR);
ast_node!(AfterClause, AFTER_CLAUSE);
ast_node!(SpawnExpr, SPAWN_EXPR);
ast_node!(SendExpr, SEND_EXPR);

impl ReceiveExpr {
    pub fn arms(&self) -> impl Iterator<Item = CaseArm> + use<> {
        children(&self.syntax)
    }

    pub fn after(&self) -> Option<AfterClause> {
        child(&self.syntax)
    }
}

impl AfterClause {
    pub fn timeout(&self) -> Option<Expr> {
        self.syntax.children().filter_map(Expr::cast).next()
    }

    pub fn body(&self) -> Option<Expr> {
        self.syntax.children().filter_map(Expr::cast).nth(1)
    }
}

impl SpawnExpr {
    pub fn arg_list(&self) -> Option<ArgList> {
        child(&self.syntax)
    }
}

impl SendExpr {
    pub fn arg_list(&self) -> Option<ArgList> {
        child(&self.syntax)
    }
}

// ── Lambdas and struct literals ─────────────────────────────────────────

ast_node!(LambdaExpr, LAMBDA_EXPR);
ast_node!(StructLit, STRUCT_LIT);
ast_node!(StructLitField, STRUCT_LIT_FIELD);

impl LambdaExpr {
    pub fn param_list(&self) -> Option<ParamList> {
        child(&self.syntax)
    }

    pub fn params(&self) -> Vec<Param> {
        self.param_list()
            .map(|pl| pl.params().collect())
            .unwrap_or_default()
    }

    pub fn body(&self) -> Option<Block> {
        child(&self.syntax)
    }
}

impl StructLit {
    pub fn type_name(&self) -> Option<NameRef> {
        child(&self.syntax)
    }

    pub fn fields(&self) -> impl Iterator<Item = StructLitField> + use<> {
        children(&self.syntax)
    }
}

impl StructLitField {
    pub fn name(&self) -> Option<Name> {
        child(&self.syntax)
    }

    pub fn value(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }
}

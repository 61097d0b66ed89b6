//! The Mesh grammar: top-down for items, Pratt for expressions.
//!
//! Every production is total: on unexpected input it records a diagnostic,
//! wraps what it can in an ERROR node, and resynchronizes on item or
//! statement boundaries.

use crate::parser::Parser;
use crate::syntax_kind::SyntaxKind::{self, *};

/// Kinds that can begin a top-level item.
const ITEM_FIRST: &[SyntaxKind] = &[
    FN_KW,
    STRUCT_KW,
    TYPE_KW,
    INTERFACE_KW,
    IMPL_KW,
    IMPORT_KW,
    FROM_KW,
    PUB_KW,
    LET_KW,
];

pub(crate) fn source_file(p: &mut Parser<'_>) {
    p.start_root();
    loop {
        while p.at(NEWLINE) || p.at(SEMICOLON) {
            p.bump();
        }
        if p.at_eof() {
            break;
        }
        item(p);
    }
    p.flush_remaining();
    p.finish_node();
}

// ── Items ───────────────────────────────────────────────────────────────

fn item(p: &mut Parser<'_>) {
    let cp = p.checkpoint();
    let has_vis = p.at(PUB_KW);
    if has_vis {
        p.start_node(VISIBILITY);
        p.bump();
        p.finish_node();
    }

    match p.current() {
        FN_KW => fn_def(p, cp),
        STRUCT_KW => struct_def(p, cp),
        TYPE_KW => sum_type_def(p, cp),
        INTERFACE_KW => interface_def(p, cp),
        IMPL_KW => impl_def(p, cp),
        IMPORT_KW => import_decl(p, cp),
        FROM_KW => from_import_decl(p, cp),
        LET_KW => let_stmt(p),
        _ if has_vis => {
            p.error_recover("an item after `pub`", ITEM_FIRST);
            // Close the dangling visibility inside an ERROR item.
            p.start_node_at(cp, ERROR);
            p.finish_node();
        }
        _ => {
            // Top-level expression (script style).
            if !expr(p) {
                p.error_recover("an item or expression", ITEM_FIRST);
            }
        }
    }
}

fn fn_def(p: &mut Parser<'_>, cp: rowan::Checkpoint) {
    p.start_node_at(cp, FN_DEF);
    p.bump(); // fn
    name(p);
    param_list(p);
    if p.at(ARROW) {
        p.start_node(RETURN_TYPE);
        p.bump();
        type_ref(p);
        p.finish_node();
    }
    p.expect(DO_KW, "`do`");
    block(p, &[END_KW]);
    p.expect(END_KW, "`end`");
    p.finish_node();
}

fn param_list(p: &mut Parser<'_>) {
    p.start_node(PARAM_LIST);
    if p.expect(L_PAREN, "`(`") {
        while !p.at(R_PAREN) && !p.at_eof() {
            p.start_node(PARAM);
            if p.at(SELF_KW) {
                p.bump();
            } else {
                name(p);
                if p.eat(COLON_COLON) {
                    type_ref(p);
                }
            }
            p.finish_node();
            if !p.eat(COMMA) {
                break;
            }
        }
        p.expect(R_PAREN, "`)`");
    }
    p.finish_node();
}

fn struct_def(p: &mut Parser<'_>, cp: rowan::Checkpoint) {
    p.start_node_at(cp, STRUCT_DEF);
    p.bump(); // struct
    name(p);
    p.expect(DO_KW, "`do`");
    loop {
        while p.at(NEWLINE) || p.at(SEMICOLON) {
            p.bump();
        }
        if p.at(END_KW) || p.at_eof() {
            break;
        }
        if p.at(IDENT) {
            p.start_node(FIELD_DEF);
            name(p);
            p.expect(COLON_COLON, "`::`");
            type_ref(p);
            p.finish_node();
        } else {
            p.error_recover("a field definition", &[END_KW]);
        }
    }
    p.expect(END_KW, "`end`");
    deriving_clause_opt(p);
    p.finish_node();
}

fn sum_type_def(p: &mut Parser<'_>, cp: rowan::Checkpoint) {
    p.start_node_at(cp, SUM_TYPE_DEF);
    p.bump(); // type
    name(p);
    p.expect(DO_KW, "`do`");
    loop {
        while p.at(NEWLINE) || p.at(SEMICOLON) {
            p.bump();
        }
        if p.at(END_KW) || p.at_eof() {
            break;
        }
        if p.at(IDENT) {
            p.start_node(VARIANT_DEF);
            name(p);
            if p.at(L_PAREN) {
                p.bump();
                while !p.at(R_PAREN) && !p.at_eof() {
                    type_ref(p);
                    if !p.eat(COMMA) {
                        break;
                    }
                }
                p.expect(R_PAREN, "`)`");
            }
            p.finish_node();
        } else {
            p.error_recover("a variant definition", &[END_KW]);
        }
    }
    p.expect(END_KW, "`end`");
    deriving_clause_opt(p);
    p.finish_node();
}

/// `deriving(Id, Id, ...)` — `deriving` is a contextual identifier, so
/// this only fires on the exact `deriving (` shape after `end`.
fn deriving_clause_opt(p: &mut Parser<'_>) {
    if p.at(IDENT) && p.current_text() == "deriving" && p.nth(1) == L_PAREN {
        p.start_node(DERIVING_CLAUSE);
        p.bump(); // deriving
        p.bump(); // (
        while !p.at(R_PAREN) && !p.at_eof() {
            if p.at(IDENT) {
                p.start_node(NAME_REF);
                p.bump();
                p.finish_node();
            } else {
                p.error_recover("a trait name", &[R_PAREN]);
            }
            if !p.eat(COMMA) {
                break;
            }
        }
        p.expect(R_PAREN, "`)`");
        p.finish_node();
    }
}

fn interface_def(p: &mut Parser<'_>, cp: rowan::Checkpoint) {
    p.start_node_at(cp, INTERFACE_DEF);
    p.bump(); // interface
    name(p);
    p.expect(DO_KW, "`do`");
    loop {
        while p.at(NEWLINE) || p.at(SEMICOLON) {
            p.bump();
        }
        if p.at(END_KW) || p.at_eof() {
            break;
        }
        match p.current() {
            TYPE_KW => {
                p.start_node(ASSOC_TYPE_DECL);
                p.bump();
                name(p);
                p.finish_node();
            }
            FN_KW => {
                p.start_node(INTERFACE_METHOD);
                p.bump();
                name(p);
                param_list(p);
                if p.at(ARROW) {
                    p.start_node(RETURN_TYPE);
                    p.bump();
                    type_ref(p);
                    p.finish_node();
                }
                // Optional default body.
                if p.at(DO_KW) {
                    p.bump();
                    block(p, &[END_KW]);
                    p.expect(END_KW, "`end`");
                }
                p.finish_node();
            }
            _ => p.error_recover("an interface member", &[END_KW]),
        }
    }
    p.expect(END_KW, "`end`");
    p.finish_node();
}

fn impl_def(p: &mut Parser<'_>, cp: rowan::Checkpoint) {
    p.start_node_at(cp, IMPL_DEF);
    p.bump(); // impl
    path(p);
    p.expect(FOR_KW, "`for`");
    path(p);
    p.expect(DO_KW, "`do`");
    loop {
        while p.at(NEWLINE) || p.at(SEMICOLON) {
            p.bump();
        }
        if p.at(END_KW) || p.at_eof() {
            break;
        }
        match p.current() {
            TYPE_KW => {
                p.start_node(ASSOC_TYPE_BINDING);
                p.bump();
                name(p);
                p.expect(EQ, "`=`");
                type_ref(p);
                p.finish_node();
            }
            FN_KW => {
                let fn_cp = p.checkpoint();
                fn_def(p, fn_cp);
            }
            _ => p.error_recover("an impl member", &[END_KW]),
        }
    }
    p.expect(END_KW, "`end`");
    p.finish_node();
}

fn import_decl(p: &mut Parser<'_>, cp: rowan::Checkpoint) {
    p.start_node_at(cp, IMPORT_DECL);
    p.bump(); // import
    path(p);
    p.finish_node();
}

fn from_import_decl(p: &mut Parser<'_>, cp: rowan::Checkpoint) {
    p.start_node_at(cp, FROM_IMPORT_DECL);
    p.bump(); // from
    path(p);
    p.expect(IMPORT_KW, "`import`");
    loop {
        if p.at(IDENT) {
            p.start_node(NAME_REF);
            p.bump();
            p.finish_node();
        } else {
            p.error("an imported name");
            break;
        }
        if !p.eat(COMMA) {
            break;
        }
    }
    p.finish_node();
}

fn name(p: &mut Parser<'_>) {
    if p.at(IDENT) {
        p.start_node(NAME);
        p.bump();
        p.finish_node();
    } else {
        p.error("a name");
    }
}

fn path(p: &mut Parser<'_>) {
    p.start_node(PATH);
    if p.at(IDENT) || p.at(SELF_TYPE_KW) {
        p.bump();
        while p.at(DOT) && p.nth(1) == IDENT {
            p.bump(); // .
            p.bump(); // segment
        }
    } else {
        p.error("a module path");
    }
    p.finish_node();
}

// ── Types ───────────────────────────────────────────────────────────────

fn type_ref(p: &mut Parser<'_>) {
    match p.current() {
        L_PAREN => {
            p.start_node(TUPLE_TYPE);
            p.bump();
            while !p.at(R_PAREN) && !p.at_eof() {
                type_ref(p);
                if !p.eat(COMMA) {
                    break;
                }
            }
            p.expect(R_PAREN, "`)`");
            p.finish_node();
        }
        FN_KW => {
            p.start_node(FN_TYPE);
            p.bump();
            p.expect(L_PAREN, "`(`");
            while !p.at(R_PAREN) && !p.at_eof() {
                type_ref(p);
                if !p.eat(COMMA) {
                    break;
                }
            }
            p.expect(R_PAREN, "`)`");
            if p.eat(ARROW) {
                type_ref(p);
            }
            p.finish_node();
        }
        IDENT | SELF_TYPE_KW => {
            p.start_node(PATH_TYPE);
            path(p);
            if p.at(LT) {
                p.start_node(TYPE_ARG_LIST);
                p.bump();
                while !p.at(GT) && !p.at_eof() {
                    type_ref(p);
                    if !p.eat(COMMA) {
                        break;
                    }
                }
                p.expect(GT, "`>`");
                p.finish_node();
            }
            p.finish_node();
        }
        _ => p.error_recover("a type", &[END_KW, DO_KW, NEWLINE, R_PAREN, COMMA]),
    }
}

// ── Statements / blocks ─────────────────────────────────────────────────

fn block(p: &mut Parser<'_>, terminators: &[SyntaxKind]) {
    p.start_node(BLOCK);
    loop {
        while p.at(NEWLINE) || p.at(SEMICOLON) {
            p.bump();
        }
        let kind = p.current();
        if kind == EOF || terminators.contains(&kind) {
            break;
        }
        if kind == LET_KW {
            let_stmt(p);
        } else if !expr(p) {
            p.error_recover("a statement", terminators);
        }
    }
    p.finish_node();
}

fn let_stmt(p: &mut Parser<'_>) {
    p.start_node(LET_STMT);
    p.bump(); // let
    name(p);
    p.expect(EQ, "`=`");
    expr(p);
    p.finish_node();
}

// ── Expressions (Pratt) ─────────────────────────────────────────────────

fn infix_binding_power(kind: SyntaxKind) -> Option<(u8, u8)> {
    Some(match kind {
        PIPE_GT => (1, 2),
        OR_KW => (3, 4),
        AND_KW => (5, 6),
        EQ_EQ | NOT_EQ | LT | GT | LT_EQ | GT_EQ => (7, 8),
        PLUS_PLUS => (9, 10),
        PLUS | MINUS => (11, 12),
        STAR | SLASH | PERCENT => (13, 14),
        _ => return None,
    })
}

/// Postfix binding powers: `?` then call/field, per the expression grammar.
const QUESTION_BP: u8 = 24;
const POSTFIX_BP: u8 = 25;
const PREFIX_BP: u8 = 15;

pub(crate) fn expr(p: &mut Parser<'_>) -> bool {
    expr_bp(p, 0)
}

fn expr_bp(p: &mut Parser<'_>, min_bp: u8) -> bool {
    let cp = p.checkpoint();
    if !lhs(p) {
        return false;
    }

    loop {
        match p.current() {
            DOT if POSTFIX_BP >= min_bp => {
                p.start_node_at(cp, FIELD_ACCESS);
                p.bump();
                if p.at(IDENT) {
                    p.start_node(NAME_REF);
                    p.bump();
                    p.finish_node();
                } else {
                    p.error("a field or method name");
                }
                p.finish_node();
            }
            L_PAREN if POSTFIX_BP >= min_bp => {
                p.start_node_at(cp, CALL_EXPR);
                arg_list(p);
                p.finish_node();
            }
            QUESTION if QUESTION_BP >= min_bp => {
                p.start_node_at(cp, TRY_EXPR);
                p.bump();
                p.finish_node();
            }
            kind => {
                let Some((lbp, rbp)) = infix_binding_power(kind) else {
                    break;
                };
                if lbp < min_bp {
                    break;
                }
                p.start_node_at(cp, BINARY_EXPR);
                p.bump();
                expr_bp(p, rbp);
                p.finish_node();
            }
        }
    }
    true
}

fn lhs(p: &mut Parser<'_>) -> bool {
    match p.current() {
        INT | FLOAT | TRUE_KW | FALSE_KW => {
            p.start_node(LITERAL);
            p.bump();
            p.finish_node();
        }
        STRING_START | TRIPLE_STRING_START => string_expr(p),
        MINUS | NOT_KW => {
            p.start_node(UNARY_EXPR);
            p.bump();
            expr_bp(p, PREFIX_BP);
            p.finish_node();
        }
        IDENT if p.nth(1) == L_BRACE => struct_lit(p),
        IDENT | SELF_KW => {
            p.start_node(NAME_REF);
            p.bump();
            p.finish_node();
        }
        L_PAREN => paren_or_tuple(p),
        L_BRACKET => list_expr(p),
        IF_KW => if_expr(p),
        CASE_KW => case_expr(p),
        FOR_KW => for_expr(p),
        RECEIVE_KW => receive_expr(p),
        FN_KW => lambda_expr(p),
        SPAWN_KW => {
            p.start_node(SPAWN_EXPR);
            p.bump();
            arg_list(p);
            p.finish_node();
        }
        SEND_KW => {
            p.start_node(SEND_EXPR);
            p.bump();
            arg_list(p);
            p.finish_node();
        }
        RETURN_KW => {
            p.start_node(RETURN_EXPR);
            p.bump();
            if starts_expr(p.current()) {
                expr(p);
            }
            p.finish_node();
        }
        _ => return false,
    }
    true
}

fn starts_expr(kind: SyntaxKind) -> bool {
    matches!(
        kind,
        INT | FLOAT
            | TRUE_KW
            | FALSE_KW
            | STRING_START
            | TRIPLE_STRING_START
            | IDENT
            | SELF_KW
            | L_PAREN
            | L_BRACKET
            | IF_KW
            | CASE_KW
            | FOR_KW
            | RECEIVE_KW
            | FN_KW
            | SPAWN_KW
            | SEND_KW
            | MINUS
            | NOT_KW
    )
}

fn arg_list(p: &mut Parser<'_>) {
    p.start_node(ARG_LIST);
    p.expect(L_PAREN, "`(`");
    while !p.at(R_PAREN) && !p.at_eof() {
        if !expr(p) {
            p.error_recover("an argument", &[R_PAREN]);
        }
        if !p.eat(COMMA) {
            break;
        }
    }
    p.expect(R_PAREN, "`)`");
    p.finish_node();
}

fn string_expr(p: &mut Parser<'_>) {
    p.start_node(STRING_EXPR);
    let triple = p.at(TRIPLE_STRING_START);
    p.bump(); // opening quote
    loop {
        match p.current() {
            STRING_CONTENT => p.bump(),
            INTERPOLATION_START => {
                p.start_node(INTERPOLATION);
                p.bump();
                if !expr(p) {
                    p.error("an interpolated expression");
                }
                p.expect(INTERPOLATION_END, "`}`");
                p.finish_node();
            }
            STRING_END | TRIPLE_STRING_END => {
                p.bump();
                break;
            }
            EOF => {
                p.error(if triple { "`\"\"\"`" } else { "`\"`" });
                break;
            }
            _ => {
                p.error_recover("string content", &[STRING_END, TRIPLE_STRING_END]);
            }
        }
    }
    p.finish_node();
}

fn struct_lit(p: &mut Parser<'_>) {
    p.start_node(STRUCT_LIT);
    p.start_node(NAME_REF);
    p.bump(); // type name
    p.finish_node();
    p.bump(); // {
    while !p.at(R_BRACE) && !p.at_eof() {
        if p.at(IDENT) {
            p.start_node(STRUCT_LIT_FIELD);
            name(p);
            p.expect(COLON, "`:`");
            expr(p);
            p.finish_node();
        } else {
            p.error_recover("a field initializer", &[R_BRACE]);
        }
        if !p.eat(COMMA) {
            break;
        }
    }
    p.expect(R_BRACE, "`}`");
    p.finish_node();
}

fn paren_or_tuple(p: &mut Parser<'_>) {
    let cp = p.checkpoint();
    p.bump(); // (
    if p.at(R_PAREN) {
        // Unit literal `()`.
        p.start_node_at(cp, TUPLE_EXPR);
        p.bump();
        p.finish_node();
        return;
    }
    expr(p);
    if p.at(COMMA) {
        p.start_node_at(cp, TUPLE_EXPR);
        while p.eat(COMMA) {
            if p.at(R_PAREN) {
                break;
            }
            expr(p);
        }
        p.expect(R_PAREN, "`)`");
        p.finish_node();
    } else {
        p.start_node_at(cp, PAREN_EXPR);
        p.expect(R_PAREN, "`)`");
        p.finish_node();
    }
}

fn list_expr(p: &mut Parser<'_>) {
    p.start_node(LIST_EXPR);
    p.bump(); // [
    while !p.at(R_BRACKET) && !p.at_eof() {
        if !expr(p) {
            p.error_recover("a list element", &[R_BRACKET]);
        }
        if !p.eat(COMMA) {
            break;
        }
    }
    p.expect(R_BRACKET, "`]`");
    p.finish_node();
}

fn if_expr(p: &mut Parser<'_>) {
    p.start_node(IF_EXPR);
    p.bump(); // if
    if !expr(p) {
        p.error("a condition");
    }
    p.expect(DO_KW, "`do`");
    block(p, &[ELSE_KW, END_KW]);
    if p.eat(ELSE_KW) {
        block(p, &[END_KW]);
    }
    p.expect(END_KW, "`end`");
    p.finish_node();
}

fn case_expr(p: &mut Parser<'_>) {
    p.start_node(CASE_EXPR);
    p.bump(); // case
    if !expr(p) {
        p.error("a scrutinee expression");
    }
    p.expect(DO_KW, "`do`");
    loop {
        while p.at(NEWLINE) || p.at(SEMICOLON) {
            p.bump();
        }
        if p.at(END_KW) || p.at_eof() {
            break;
        }
        case_arm(p);
    }
    p.expect(END_KW, "`end`");
    p.finish_node();
}

fn case_arm(p: &mut Parser<'_>) {
    p.start_node(CASE_ARM);
    pattern(p);
    if p.at(WHEN_KW) {
        p.start_node(GUARD_CLAUSE);
        p.bump();
        expr(p);
        p.finish_node();
    }
    p.expect(ARROW, "`->`");
    if !expr(p) {
        p.error("an arm body");
    }
    p.finish_node();
}

fn for_expr(p: &mut Parser<'_>) {
    p.start_node(FOR_EXPR);
    p.bump(); // for
    name(p);
    p.expect(IN_KW, "`in`");
    if !expr(p) {
        p.error("an iterable expression");
    }
    if p.at(WHEN_KW) {
        p.start_node(GUARD_CLAUSE);
        p.bump();
        expr(p);
        p.finish_node();
    }
    p.expect(DO_KW, "`do`");
    block(p, &[END_KW]);
    p.expect(END_KW, "`end`");
    p.finish_node();
}

fn receive_expr(p: &mut Parser<'_>) {
    p.start_node(RECEIVE_EXPR);
    p.bump(); // receive
    p.expect(DO_KW, "`do`");
    loop {
        while p.at(NEWLINE) || p.at(SEMICOLON) {
            p.bump();
        }
        match p.current() {
            END_KW | EOF => break,
            AFTER_KW => {
                p.start_node(AFTER_CLAUSE);
                p.bump();
                if !expr(p) {
                    p.error("a timeout expression");
                }
                p.expect(ARROW, "`->`");
                if !expr(p) {
                    p.error("a timeout body");
                }
                p.finish_node();
            }
            _ => case_arm(p),
        }
    }
    p.expect(END_KW, "`end`");
    p.finish_node();
}

fn lambda_expr(p: &mut Parser<'_>) {
    p.start_node(LAMBDA_EXPR);
    p.bump(); // fn
    param_list(p);
    if p.at(ARROW) {
        p.start_node(RETURN_TYPE);
        p.bump();
        type_ref(p);
        p.finish_node();
    }
    p.expect(DO_KW, "`do`");
    block(p, &[END_KW]);
    p.expect(END_KW, "`end`");
    p.finish_node();
}

// ── Patterns ────────────────────────────────────────────────────────────

fn pattern(p: &mut Parser<'_>) {
    let cp = p.checkpoint();
    pattern_primary(p);
    if p.at(PIPE) {
        p.start_node_at(cp, OR_PAT);
        while p.eat(PIPE) {
            pattern_primary(p);
        }
        p.finish_node();
    }
}

fn pattern_primary(p: &mut Parser<'_>) {
    match p.current() {
        INT | FLOAT | TRUE_KW | FALSE_KW => {
            p.start_node(LITERAL_PAT);
            p.start_node(LITERAL);
            p.bump();
            p.finish_node();
            p.finish_node();
        }
        STRING_START | TRIPLE_STRING_START => {
            p.start_node(LITERAL_PAT);
            string_expr(p);
            p.finish_node();
        }
        IDENT if p.current_text() == "_" => {
            p.start_node(WILDCARD_PAT);
            p.bump();
            p.finish_node();
        }
        IDENT if p.nth(1) == DOT || p.nth(1) == L_PAREN => constructor_pat(p),
        IDENT => {
            p.start_node(IDENT_PAT);
            p.start_node(NAME);
            p.bump();
            p.finish_node();
            p.finish_node();
        }
        L_PAREN => {
            p.start_node(TUPLE_PAT);
            p.bump();
            while !p.at(R_PAREN) && !p.at_eof() {
                pattern(p);
                if !p.eat(COMMA) {
                    break;
                }
            }
            p.expect(R_PAREN, "`)`");
            p.finish_node();
        }
        _ => p.error_recover("a pattern", &[ARROW, END_KW, WHEN_KW]),
    }
}

fn constructor_pat(p: &mut Parser<'_>) {
    p.start_node(CONSTRUCTOR_PAT);
    path(p);
    if p.at(L_PAREN) {
        p.bump();
        while !p.at(R_PAREN) && !p.at_eof() {
            pattern(p);
            if !p.eat(COMMA) {
                break;
            }
        }
        p.expect(R_PAREN, "`)`");
    }
    p.finish_node();
}

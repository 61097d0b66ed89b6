//! Signature help, triggered on `(` and `,`.
//!
//! Walk upward from the cursor to the enclosing ARG_LIST whose parent
//! is a CALL_EXPR; count COMMA tokens before the cursor for the active
//! parameter. The callee type resolves through three strategies in
//! order: a direct text-range lookup in the typeck result, the callee's
//! NAME_REF children, and finally a containment scan for `Ty::Fun`
//! values whose range encloses the callee. Parameter names come from
//! the resolved FnDef's AST; built-ins fall back to type-only labels.

use mesh_parser::ast::{self, AstNode, Expr, Item};
use mesh_parser::{SyntaxKind, SyntaxNode};
use mesh_typeck::TypeckResult;
use mesh_typeck::ty::Ty;
use tower_lsp::lsp_types::{
    ParameterInformation, ParameterLabel, SignatureHelp, SignatureInformation,
};

pub fn signature_help(
    parse: &mesh_parser::Parse,
    typeck: &TypeckResult,
    offset: u32,
) -> Option<SignatureHelp> {
    let root = parse.syntax();
    let token = root
        .token_at_offset(rowan::TextSize::from(offset))
        .left_biased()?;

    // Find the enclosing ARG_LIST under a CALL_EXPR.
    let mut node = token.parent();
    let (arg_list, call) = loop {
        let current = node?;
        if current.kind() == SyntaxKind::ARG_LIST {
            if let Some(parent) = current.parent() {
                if parent.kind() == SyntaxKind::CALL_EXPR {
                    break (current, parent);
                }
            }
        }
        node = current.parent();
    };

    let active_parameter = arg_list
        .children_with_tokens()
        .filter_map(|el| el.into_token())
        .filter(|t| t.kind() == SyntaxKind::COMMA)
        .filter(|t| u32::from(t.text_range().start()) < offset)
        .count() as u32;

    let call = ast::CallExpr::cast(call)?;
    let callee = call.callee()?;
    let callee_name = callee_name(&callee);
    let fn_ty = resolve_callee_type(&callee, typeck)?;

    let Ty::Fun(params, ret) = &fn_ty else {
        return None;
    };

    // Parameter names from the source FnDef when the callee resolves to
    // one; otherwise type-only labels.
    let param_names = callee_name
        .as_deref()
        .and_then(|name| fn_param_names(parse, name));
    let labels: Vec<String> = params
        .iter()
        .enumerate()
        .map(|(i, ty)| match param_names.as_ref().and_then(|n| n.get(i)) {
            Some(name) => format!("{name} :: {ty}"),
            None => ty.to_string(),
        })
        .collect();

    let label = format!(
        "{}({}) -> {}",
        callee_name.unwrap_or_else(|| "fn".to_string()),
        labels.join(", "),
        ret
    );
    let parameters = labels
        .into_iter()
        .map(|l| ParameterInformation {
            label: ParameterLabel::Simple(l),
            documentation: None,
        })
        .collect();

    Some(SignatureHelp {
        signatures: vec![SignatureInformation {
            label,
            documentation: None,
            parameters: Some(parameters),
            active_parameter: Some(active_parameter),
        }],
        active_signature: Some(0),
        active_parameter: Some(active_parameter),
    })
}

fn callee_name(callee: &Expr) -> Option<String> {
    match callee {
        Expr::NameRef(n) => Some(n.text()),
        Expr::FieldAccess(fa) => fa.field_name().map(|n| n.text()),
        _ => None,
    }
}

/// The multi-strategy callee type lookup.
fn resolve_callee_type(callee: &Expr, typeck: &TypeckResult) -> Option<Ty> {
    // Strategy 1: exact range.
    if let Some(ty) = typeck.types.get(&callee.syntax().text_range()) {
        if matches!(ty, Ty::Fun(..)) {
            return Some(ty.clone());
        }
    }
    // Strategy 2: NAME_REF children of the callee.
    for child in callee.syntax().descendants() {
        if child.kind() == SyntaxKind::NAME_REF {
            if let Some(ty) = typeck.types.get(&child.text_range()) {
                if matches!(ty, Ty::Fun(..)) {
                    return Some(ty.clone());
                }
            }
        }
    }
    // Strategy 2b: known top-level function schemes by name.
    if let Expr::NameRef(name_ref) = callee {
        if let Some(scheme) = typeck.fn_schemes.get(&name_ref.text()) {
            if matches!(scheme.ty, Ty::Fun(..)) {
                return Some(scheme.ty.clone());
            }
        }
    }
    // Strategy 3: containment scan over recorded Fun types.
    let callee_range = callee.syntax().text_range();
    typeck
        .types
        .iter()
        .filter(|(range, ty)| {
            matches!(ty, Ty::Fun(..)) && range.contains_range(callee_range)
        })
        .min_by_key(|(range, _)| range.len())
        .map(|(_, ty)| ty.clone())
}

fn fn_param_names(parse: &mesh_parser::Parse, name: &str) -> Option<Vec<String>> {
    for item in parse.tree().items() {
        if let Item::FnDef(f) = item {
            if f.name().map(|n| n.text()).as_deref() == Some(name) {
                let names = f
                    .param_list()?
                    .params()
                    .filter_map(|p| p.name().map(|n| n.text()))
                    .collect();
                return Some(names);
            }
        }
    }
    None
}

/// Shared by hover: the smallest recorded type whose range encloses the
/// offset.
pub fn type_at_offset(typeck: &TypeckResult, root: &SyntaxNode, offset: u32) -> Option<Ty> {
    let token = root
        .token_at_offset(rowan::TextSize::from(offset))
        .left_biased()?;
    let mut node = Some(token.parent()?);
    while let Some(current) = node {
        if let Some(ty) = typeck.types.get(&current.text_range()) {
            return Some(ty.clone());
        }
        node = current.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(src: &str) -> (mesh_parser::Parse, TypeckResult) {
        let parse = mesh_parser::parse(src);
        assert!(parse.errors().is_empty(), "{:?}", parse.errors());
        let typeck = mesh_typeck::check(&parse);
        (parse, typeck)
    }

    #[test]
    fn active_parameter_counts_commas() {
        let src = "fn add(a :: Int, b :: Int) -> Int do\n  a + b\nend\n\nfn g() -> Int do\n  add(1, 2)\nend\n";
        let (parse, typeck) = setup(src);
        let after_comma = src.rfind(", 2").unwrap() as u32 + 1;
        let help = signature_help(&parse, &typeck, after_comma).expect("signature help");
        assert_eq!(help.active_parameter, Some(1));
        let sig = &help.signatures[0];
        assert!(sig.label.contains("add("), "{}", sig.label);
        assert!(sig.label.contains("a :: Int"), "{}", sig.label);
        assert!(sig.label.contains("-> Int"));
    }

    #[test]
    fn first_parameter_before_any_comma() {
        let src = "fn add(a :: Int, b :: Int) -> Int do\n  a + b\nend\n\nfn g() -> Int do\n  add(1, 2)\nend\n";
        let (parse, typeck) = setup(src);
        let after_paren = src.rfind("add(1").unwrap() as u32 + 4;
        let help = signature_help(&parse, &typeck, after_paren).expect("signature help");
        assert_eq!(help.active_parameter, Some(0));
    }

    #[test]
    fn no_help_outside_call_arguments() {
        let src = "fn g() -> Int do\n  1\nend\n";
        let (parse, typeck) = setup(src);
        assert!(signature_help(&parse, &typeck, 5).is_none());
    }
}

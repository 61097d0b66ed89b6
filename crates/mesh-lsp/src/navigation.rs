//! Hover, go-to-definition, and document symbols: plain CST walks over
//! the same parse and typeck data the other features use.

use crate::offset::span_to_range;
use mesh_common::LineIndex;
use mesh_parser::ast::{self, AstNode, Item};
use mesh_parser::{SyntaxKind, SyntaxNode, SyntaxToken};
use mesh_typeck::TypeckResult;
use tower_lsp::lsp_types::{
    DocumentSymbol, Hover, HoverContents, MarkedString, Range, SymbolKind,
};

fn ident_at(root: &SyntaxNode, offset: u32) -> Option<SyntaxToken> {
    root.token_at_offset(rowan::TextSize::from(offset))
        .left_biased()
        .filter(|t| t.kind() == SyntaxKind::IDENT)
}

pub fn hover(
    parse: &mesh_parser::Parse,
    typeck: &TypeckResult,
    source: &str,
    index: &LineIndex,
    offset: u32,
) -> Option<Hover> {
    let root = parse.syntax();
    let token = ident_at(&root, offset)?;
    let name = token.text().to_string();
    let ty = crate::signature::type_at_offset(typeck, &root, offset)
        .or_else(|| typeck.fn_schemes.get(&name).map(|s| s.ty.clone()))?;
    let range = span_to_range(source, index, mesh_common::Span::from(token.text_range()));
    Some(Hover {
        contents: HoverContents::Scalar(MarkedString::from_language_code(
            "mesh".to_string(),
            format!("{name} :: {ty}"),
        )),
        range: Some(range),
    })
}

/// Find the definition site of the identifier under the cursor: a
/// top-level item name, a parameter, a let binding, or a loop binder.
pub fn definition(
    parse: &mesh_parser::Parse,
    source: &str,
    index: &LineIndex,
    offset: u32,
) -> Option<Range> {
    let root = parse.syntax();
    let token = ident_at(&root, offset)?;
    let name = token.text().to_string();

    // Walk outward looking for the nearest binder of that name.
    let mut node = token.parent();
    while let Some(current) = node {
        for descendant in current.descendants() {
            let found = match descendant.kind() {
                SyntaxKind::LET_STMT => ast::LetStmt::cast(descendant.clone())
                    .and_then(|l| l.name())
                    .filter(|n| n.text() == name),
                SyntaxKind::PARAM => ast::Param::cast(descendant.clone())
                    .and_then(|p| p.name())
                    .filter(|n| n.text() == name),
                SyntaxKind::FOR_EXPR => ast::ForExpr::cast(descendant.clone())
                    .and_then(|f| f.binding())
                    .filter(|n| n.text() == name),
                _ => None,
            };
            if let Some(binder) = found {
                // A binder is only a definition when it precedes the use.
                if binder.syntax().text_range().start() <= token.text_range().start() {
                    return Some(span_to_range(
                        source,
                        index,
                        mesh_common::Span::from(binder.syntax().text_range()),
                    ));
                }
            }
        }
        node = current.parent();
    }

    // Fall back to top-level items by name.
    let file = parse.tree();
    for item in file.items() {
        if let Some(item_name) = item.name() {
            if item_name.text() == name {
                return Some(span_to_range(
                    source,
                    index,
                    mesh_common::Span::from(item_name.syntax().text_range()),
                ));
            }
        }
    }
    None
}

pub fn document_symbols(
    parse: &mesh_parser::Parse,
    source: &str,
    index: &LineIndex,
) -> Vec<DocumentSymbol> {
    let file = parse.tree();
    let mut out = Vec::new();
    for item in file.items() {
        let (kind, name) = match &item {
            Item::FnDef(f) => (SymbolKind::FUNCTION, f.name()),
            Item::StructDef(s) => (SymbolKind::STRUCT, s.name()),
            Item::SumTypeDef(t) => (SymbolKind::ENUM, t.name()),
            Item::InterfaceDef(i) => (SymbolKind::INTERFACE, i.name()),
            Item::LetStmt(l) => (SymbolKind::VARIABLE, l.name()),
            _ => continue,
        };
        let Some(name) = name else { continue };
        let full_range = span_to_range(
            source,
            index,
            mesh_common::Span::from(item.syntax().text_range()),
        );
        let name_range = span_to_range(
            source,
            index,
            mesh_common::Span::from(name.syntax().text_range()),
        );
        #[allow(deprecated)]
        out.push(DocumentSymbol {
            name: name.text(),
            detail: None,
            kind,
            tags: None,
            deprecated: None,
            range: full_range,
            selection_range: name_range,
            children: None,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(src: &str) -> (mesh_parser::Parse, TypeckResult, LineIndex) {
        let parse = mesh_parser::parse(src);
        let typeck = mesh_typeck::check(&parse);
        let index = LineIndex::new(src);
        (parse, typeck, index)
    }

    #[test]
    fn hover_shows_inferred_type() {
        let src = "fn f(count :: Int) -> Int do\n  count\nend\n";
        let (parse, typeck, index) = setup(src);
        let use_offset = src.rfind("count").unwrap() as u32 + 1;
        let hover = hover(&parse, &typeck, src, &index, use_offset).expect("hover");
        let HoverContents::Scalar(MarkedString::LanguageString(ls)) = hover.contents else {
            panic!("expected language string");
        };
        assert!(ls.value.contains("Int"), "{}", ls.value);
    }

    #[test]
    fn definition_finds_let_binding() {
        let src = "fn f() -> Int do\n  let answer = 42\n  answer\nend\n";
        let (parse, _typeck, index) = setup(src);
        let use_offset = src.rfind("answer").unwrap() as u32 + 1;
        let range = definition(&parse, src, &index, use_offset).expect("definition");
        // The binding is on line 1.
        assert_eq!(range.start.line, 1);
    }

    #[test]
    fn definition_finds_top_level_fn() {
        let src = "fn helper() -> Int do 1 end\n\nfn g() -> Int do\n  helper()\nend\n";
        let (parse, _typeck, index) = setup(src);
        let use_offset = src.rfind("helper").unwrap() as u32 + 1;
        let range = definition(&parse, src, &index, use_offset).expect("definition");
        assert_eq!(range.start.line, 0);
    }

    #[test]
    fn symbols_list_top_level_items() {
        let src = "struct P do\n  x :: Int\nend\n\nfn f() do 1 end\n";
        let (parse, _typeck, index) = setup(src);
        let symbols = document_symbols(&parse, src, &index);
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["P", "f"]);
        assert_eq!(symbols[0].kind, SymbolKind::STRUCT);
        assert_eq!(symbols[1].kind, SymbolKind::FUNCTION);
    }
}

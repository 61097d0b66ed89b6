//! Completion: four tiers merged by `sort_text`.
//!
//! Tier 0: scope-aware names collected by walking the CST upward from
//! the cursor token. Tier 1: built-in types. Tier 2: keywords. Tier 3:
//! snippet templates. When the cursor sits in whitespace (no token
//! under it), the scope tier falls back to the file's top-level names.

use mesh_parser::ast::{self, AstNode, Item};
use mesh_parser::{SyntaxKind, SyntaxNode};
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, InsertTextFormat,
};

const KEYWORDS: &[&str] = &[
    "fn", "end", "do", "struct", "type", "interface", "impl", "for", "in", "when", "case",
    "receive", "after", "import", "from", "pub", "let", "if", "else", "true", "false", "and",
    "or", "not", "self", "spawn", "send", "return",
];

struct Snippet {
    label: &'static str,
    body: &'static str,
    detail: &'static str,
}

const SNIPPETS: &[Snippet] = &[
    Snippet {
        label: "fn",
        body: "fn ${1:name}(${2}) do\n  ${0}\nend",
        detail: "function definition",
    },
    Snippet {
        label: "struct",
        body: "struct ${1:Name} do\n  ${2:field} :: ${3:Int}\nend",
        detail: "struct definition",
    },
    Snippet {
        label: "case",
        body: "case ${1:value} do\n  ${2:pattern} -> ${3}\n  _ -> ${0}\nend",
        detail: "case expression",
    },
    Snippet {
        label: "for",
        body: "for ${1:x} in ${2:items} do\n  ${0}\nend",
        detail: "for loop",
    },
    Snippet {
        label: "receive",
        body: "receive do\n  ${1:pattern} -> ${0}\nend",
        detail: "receive expression",
    },
];

pub fn completions(parse: &mesh_parser::Parse, offset: u32) -> Vec<CompletionItem> {
    let root = parse.syntax();
    let mut items = Vec::new();

    // Tier 0: names visible at the cursor.
    for (name, kind) in scope_names(&root, offset) {
        items.push(CompletionItem {
            label: name.clone(),
            kind: Some(kind),
            sort_text: Some(format!("0_{name}")),
            ..CompletionItem::default()
        });
    }

    // Tier 1: built-in types.
    for ty in mesh_typeck::builtins::BUILTIN_TYPES {
        items.push(CompletionItem {
            label: (*ty).to_string(),
            kind: Some(CompletionItemKind::CLASS),
            sort_text: Some(format!("1_{ty}")),
            ..CompletionItem::default()
        });
    }

    // Tier 2: keywords.
    for kw in KEYWORDS {
        items.push(CompletionItem {
            label: (*kw).to_string(),
            kind: Some(CompletionItemKind::KEYWORD),
            sort_text: Some(format!("2_{kw}")),
            ..CompletionItem::default()
        });
    }

    // Tier 3: snippets.
    for snippet in SNIPPETS {
        items.push(CompletionItem {
            label: snippet.label.to_string(),
            kind: Some(CompletionItemKind::SNIPPET),
            detail: Some(snippet.detail.to_string()),
            insert_text: Some(snippet.body.to_string()),
            insert_text_format: Some(InsertTextFormat::SNIPPET),
            sort_text: Some(format!("3_{}", snippet.label)),
            ..CompletionItem::default()
        });
    }

    items
}

/// Walk the CST upward from the cursor, collecting let-bindings,
/// parameters, loop binders, and top-level definitions visible there.
fn scope_names(root: &SyntaxNode, offset: u32) -> Vec<(String, CompletionItemKind)> {
    let mut out: Vec<(String, CompletionItemKind)> = Vec::new();
    let mut push = |name: String, kind: CompletionItemKind, out: &mut Vec<_>| {
        if !name.is_empty() && !out.iter().any(|(n, _): &(String, _)| *n == name) {
            out.push((name, kind));
        }
    };

    let token = root
        .token_at_offset(rowan::TextSize::from(offset))
        .left_biased()
        .filter(|t| t.kind() != SyntaxKind::WHITESPACE);

    if let Some(token) = token {
        let mut node = token.parent();
        while let Some(current) = node {
            match current.kind() {
                SyntaxKind::BLOCK => {
                    if let Some(block) = ast::Block::cast(current.clone()) {
                        for stmt in block.stmts() {
                            if let ast::Stmt::Let(l) = stmt {
                                let starts_before =
                                    u32::from(l.syntax().text_range().start()) < offset;
                                if starts_before {
                                    if let Some(name) = l.name() {
                                        push(
                                            name.text(),
                                            CompletionItemKind::VARIABLE,
                                            &mut out,
                                        );
                                    }
                                }
                            }
                        }
                    }
                }
                SyntaxKind::FN_DEF => {
                    if let Some(f) = ast::FnDef::cast(current.clone()) {
                        if let Some(pl) = f.param_list() {
                            for p in pl.params() {
                                if let Some(name) = p.name() {
                                    push(name.text(), CompletionItemKind::VARIABLE, &mut out);
                                }
                            }
                        }
                    }
                }
                SyntaxKind::LAMBDA_EXPR => {
                    if let Some(l) = ast::LambdaExpr::cast(current.clone()) {
                        for p in l.params() {
                            if let Some(name) = p.name() {
                                push(name.text(), CompletionItemKind::VARIABLE, &mut out);
                            }
                        }
                    }
                }
                SyntaxKind::FOR_EXPR => {
                    if let Some(f) = ast::ForExpr::cast(current.clone()) {
                        if let Some(binding) = f.binding() {
                            push(binding.text(), CompletionItemKind::VARIABLE, &mut out);
                        }
                    }
                }
                _ => {}
            }
            node = current.parent();
        }
    }

    // Top-level names are always in scope (and are the whole scope tier
    // when the cursor is in whitespace).
    if let Some(file) = ast::SourceFile::cast(root.clone()) {
        for item in file.items() {
            let kind = match &item {
                Item::FnDef(_) => CompletionItemKind::FUNCTION,
                Item::StructDef(_) => CompletionItemKind::STRUCT,
                Item::SumTypeDef(_) => CompletionItemKind::ENUM,
                Item::InterfaceDef(_) => CompletionItemKind::INTERFACE,
                Item::LetStmt(_) => CompletionItemKind::VARIABLE,
                _ => continue,
            };
            if let Some(name) = item.name() {
                push(name.text(), kind, &mut out);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels_in_tier(items: &[CompletionItem], tier: char) -> Vec<String> {
        items
            .iter()
            .filter(|i| {
                i.sort_text
                    .as_deref()
                    .is_some_and(|s| s.starts_with(tier))
            })
            .map(|i| i.label.clone())
            .collect()
    }

    #[test]
    fn scope_tier_sees_params_and_earlier_lets() {
        let src = "fn add(first :: Int, second :: Int) -> Int do\n  let total = first\n  tot\nend\n";
        let parse = mesh_parser::parse(src);
        let offset = src.find("tot\n").unwrap() as u32 + 2;
        let items = completions(&parse, offset);
        let scope = labels_in_tier(&items, '0');
        assert!(scope.contains(&"first".to_string()), "{scope:?}");
        assert!(scope.contains(&"second".to_string()));
        assert!(scope.contains(&"total".to_string()));
        assert!(scope.contains(&"add".to_string()));
    }

    #[test]
    fn whitespace_cursor_falls_back_to_top_level_names() {
        let src = "fn first() do 1 end\n\n\nfn second() do 2 end\n";
        let parse = mesh_parser::parse(src);
        let offset = src.find("\n\n").unwrap() as u32 + 2;
        let items = completions(&parse, offset);
        let scope = labels_in_tier(&items, '0');
        assert!(scope.contains(&"first".to_string()));
        assert!(scope.contains(&"second".to_string()));
    }

    #[test]
    fn four_tiers_are_present_and_ordered() {
        let parse = mesh_parser::parse("fn f() do 1 end\n");
        let items = completions(&parse, 0);
        assert!(!labels_in_tier(&items, '1').is_empty());
        assert!(labels_in_tier(&items, '2').contains(&"case".to_string()));
        assert!(labels_in_tier(&items, '3').contains(&"receive".to_string()));
        // sort_text ordering puts scope names before keywords.
        let mut sorted: Vec<&CompletionItem> = items.iter().collect();
        sorted.sort_by_key(|i| i.sort_text.clone());
        assert!(sorted.first().unwrap().sort_text.as_deref() < Some("4"));
    }
}

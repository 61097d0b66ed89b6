//! Item-level parsing behavior: visibility markers, deriving clauses,
//! imports, and the accessors the later passes depend on.

use mesh_parser::ast::{self, Item};
use mesh_parser::parse;

fn items(source: &str) -> Vec<Item> {
    let p = parse(source);
    assert!(
        p.errors().is_empty(),
        "unexpected parse errors: {:?}",
        p.errors()
    );
    p.tree().items().collect()
}

#[test]
fn fn_def_accessors() {
    let src = "pub fn add(a :: Int, b :: Int) -> Int do\n  a + b\nend\n";
    let items = items(src);
    let Item::FnDef(f) = &items[0] else {
        panic!("expected fn def")
    };
    assert_eq!(f.name().unwrap().text(), "add");
    assert!(f.visibility().is_some());
    let params: Vec<_> = f
        .param_list()
        .unwrap()
        .params()
        .map(|p| p.name().unwrap().text())
        .collect();
    assert_eq!(params, vec!["a", "b"]);
    assert!(f.return_type().is_some());
    assert!(f.body().is_some());
}

#[test]
fn private_fn_has_no_visibility() {
    let items = items("fn helper() do 1 end\n");
    assert!(items[0].visibility().is_none());
}

#[test]
fn struct_with_deriving_clause() {
    let src = "struct Point do\n  x :: Int\n  y :: Int\nend deriving(Eq, Display, Hash)\n";
    let items = items(src);
    let Item::StructDef(s) = &items[0] else {
        panic!("expected struct")
    };
    assert_eq!(s.name().unwrap().text(), "Point");
    let fields: Vec<_> = s.fields().map(|f| f.name().unwrap().text()).collect();
    assert_eq!(fields, vec!["x", "y"]);
    assert_eq!(
        s.deriving().unwrap().traits(),
        vec!["Eq", "Display", "Hash"]
    );
}

#[test]
fn empty_deriving_clause_derives_nothing() {
    let src = "struct P do\n  x :: Int\nend deriving()\n";
    let items = items(src);
    let Item::StructDef(s) = &items[0] else {
        panic!()
    };
    let clause = s.deriving().unwrap();
    assert!(clause.traits().is_empty());
}

#[test]
fn absent_deriving_clause() {
    let items = items("struct P do\n  x :: Int\nend\n");
    let Item::StructDef(s) = &items[0] else {
        panic!()
    };
    assert!(s.deriving().is_none());
}

#[test]
fn sum_type_variants() {
    let src = "pub type Shape do\n  Circle(Float)\n  Rect(Float, Float)\n  Empty\nend\n";
    let items = items(src);
    let Item::SumTypeDef(t) = &items[0] else {
        panic!()
    };
    assert_eq!(t.name().unwrap().text(), "Shape");
    let variants: Vec<(String, usize)> = t
        .variants()
        .map(|v| (v.name().unwrap().text(), v.field_types().count()))
        .collect();
    assert_eq!(
        variants,
        vec![
            ("Circle".to_string(), 1),
            ("Rect".to_string(), 2),
            ("Empty".to_string(), 0)
        ]
    );
}

#[test]
fn imports() {
    let src = "import Math.Vector\nfrom Math.Vector import add, dot\n";
    let items = items(src);
    let Item::ImportDecl(i) = &items[0] else {
        panic!()
    };
    assert_eq!(i.module_path().unwrap().dotted(), "Math.Vector");
    let Item::FromImportDecl(f) = &items[1] else {
        panic!()
    };
    assert_eq!(f.module_path().unwrap().dotted(), "Math.Vector");
    let names: Vec<_> = f.names().map(|n| n.text()).collect();
    assert_eq!(names, vec!["add", "dot"]);
}

#[test]
fn interface_with_associated_type() {
    let src = "interface Iter do\n  type Item\n  fn next(self) -> Option<Self.Item>\nend\n";
    let items = items(src);
    let Item::InterfaceDef(i) = &items[0] else {
        panic!()
    };
    assert_eq!(i.name().unwrap().text(), "Iter");
    assert_eq!(i.assoc_types().count(), 1);
    let m: Vec<_> = i.methods().collect();
    assert_eq!(m.len(), 1);
    assert_eq!(m[0].name().unwrap().text(), "next");
    assert!(m[0].default_body().is_none());
}

#[test]
fn impl_block() {
    let src = "impl Display for Point do\n  fn to_string(self) -> String do \"p\" end\nend\n";
    let items = items(src);
    let Item::ImplDef(i) = &items[0] else {
        panic!()
    };
    assert_eq!(i.trait_path().unwrap().dotted(), "Display");
    assert_eq!(i.type_path().unwrap().dotted(), "Point");
    assert_eq!(i.methods().count(), 1);
}

#[test]
fn call_and_field_accessors() {
    let src = "fn f(p :: Point) do\n  p.to_string()\nend\n";
    let p = parse(src);
    let file = p.tree();
    let Item::FnDef(f) = file.items().next().unwrap() else {
        panic!()
    };
    let body = f.body().unwrap();
    let ast::Expr::CallExpr(call) = body.tail_expr().unwrap() else {
        panic!("expected call")
    };
    let ast::Expr::FieldAccess(fa) = call.callee().unwrap() else {
        panic!("expected field access callee")
    };
    assert_eq!(fa.field_name().unwrap().text(), "to_string");
    assert!(matches!(fa.base(), Some(ast::Expr::NameRef(_))));
    assert_eq!(call.arg_list().unwrap().args().count(), 0);
}

#[test]
fn newline_continuation_inside_brackets_and_after_operators() {
    let src = "fn f() do\n  let x = [1,\n    2]\n  let y = 1 +\n    2\n  x\nend\n";
    let p = parse(src);
    assert!(p.errors().is_empty(), "{:?}", p.errors());
}

#[test]
fn case_with_string_patterns_and_wildcard() {
    let src = "fn d(name :: String) -> String do\n  case name do\n    \"alice\" -> \"Alice\"\n    \"bob\" -> \"Bob\"\n    _ -> \"Other\"\n  end\nend\n";
    let p = parse(src);
    assert!(p.errors().is_empty(), "{:?}", p.errors());
    let Item::FnDef(f) = p.tree().items().next().unwrap() else {
        panic!()
    };
    let ast::Expr::CaseExpr(case) = f.body().unwrap().tail_expr().unwrap() else {
        panic!("expected case expr")
    };
    let arms: Vec<_> = case.arms().collect();
    assert_eq!(arms.len(), 3);
    assert!(matches!(
        arms[0].pattern(),
        Some(ast::Pattern::Literal(_))
    ));
    assert!(matches!(
        arms[2].pattern(),
        Some(ast::Pattern::Wildcard(_))
    ));
}

#[test]
fn for_with_filter() {
    let src = "fn f(xs :: List<Int>) do\n  for x in xs when x > 2 do\n    println(\"${x}\")\n  end\nend\n";
    let p = parse(src);
    assert!(p.errors().is_empty(), "{:?}", p.errors());
    let Item::FnDef(f) = p.tree().items().next().unwrap() else {
        panic!()
    };
    let ast::Expr::ForExpr(fe) = f.body().unwrap().tail_expr().unwrap() else {
        panic!()
    };
    assert_eq!(fe.binding().unwrap().text(), "x");
    assert!(fe.filter().is_some());
    assert!(fe.body().is_some());
}

#[test]
fn receive_with_after() {
    let src = "fn loop_() do\n  receive do\n    (a, b) -> a\n  after 1000 -> 0\n  end\nend\n";
    let p = parse(src);
    assert!(p.errors().is_empty(), "{:?}", p.errors());
    let Item::FnDef(f) = p.tree().items().next().unwrap() else {
        panic!()
    };
    let ast::Expr::ReceiveExpr(r) = f.body().unwrap().tail_expr().unwrap() else {
        panic!()
    };
    assert_eq!(r.arms().count(), 1);
    assert!(r.after().is_some());
}

#[test]
fn struct_literal_and_interpolated_string() {
    let src = "fn f() do\n  let p = Point{x: 10, y: 20}\n  \"p = ${p.to_string()}\"\nend\n";
    let p = parse(src);
    assert!(p.errors().is_empty(), "{:?}", p.errors());
    let Item::FnDef(f) = p.tree().items().next().unwrap() else {
        panic!()
    };
    let ast::Expr::StringExpr(s) = f.body().unwrap().tail_expr().unwrap() else {
        panic!()
    };
    let segs = s.segments();
    assert_eq!(segs.len(), 2);
    assert!(matches!(segs[0], ast::StringSegment::Content(_)));
    assert!(matches!(segs[1], ast::StringSegment::Interpolation(_)));
}

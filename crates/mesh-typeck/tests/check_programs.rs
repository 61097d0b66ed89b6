//! End-to-end type checking over source programs.

use mesh_typeck::ty::Ty;
use mesh_typeck::{ImportContext, check, check_with_imports, collect_exports};

fn check_ok(src: &str) -> mesh_typeck::TypeckResult {
    let parse = mesh_parser::parse(src);
    assert!(parse.errors().is_empty(), "parse: {:?}", parse.errors());
    let result = check(&parse);
    assert!(
        result.errors.is_empty(),
        "unexpected type errors: {:?}",
        result.errors
    );
    result
}

fn check_err(src: &str) -> Vec<mesh_typeck::error::TypeError> {
    let parse = mesh_parser::parse(src);
    assert!(parse.errors().is_empty(), "parse: {:?}", parse.errors());
    check(&parse).errors
}

#[test]
fn infers_simple_arithmetic_function() {
    let result = check_ok("fn add(a :: Int, b :: Int) -> Int do\n  a + b\nend\n");
    let scheme = result.fn_schemes.get("add").unwrap();
    assert_eq!(
        scheme.ty,
        Ty::Fun(vec![Ty::int(), Ty::int()], Box::new(Ty::int()))
    );
}

#[test]
fn let_polymorphism_generalizes() {
    check_ok(
        "fn id(x :: a) -> a do x end\n\nfn f() -> Int do\n  let s = id(\"s\")\n  id(1)\nend\n",
    );
}

#[test]
fn type_mismatch_is_e0002() {
    let errors = check_err("fn f() -> Int do\n  \"nope\"\nend\n");
    assert!(errors.iter().any(|e| e.code() == "E0002"), "{errors:?}");
}

#[test]
fn unknown_name_suggests_close_match() {
    let errors =
        check_err("fn helper() -> Int do 1 end\nfn g() -> Int do\n  helpr()\nend\n");
    let unknown = errors.iter().find(|e| e.code() == "E0001").unwrap();
    let help = unknown.help().unwrap();
    assert!(help.contains("helper"), "{help}");
}

#[test]
fn string_match_without_wildcard_is_e0012() {
    let errors = check_err(
        "fn d(name :: String) -> String do\n  case name do\n    \"alice\" -> \"Alice\"\n    \"bob\" -> \"Bob\"\n  end\nend\n",
    );
    let err = errors.iter().find(|e| e.code() == "E0012").unwrap();
    assert!(
        err.message().contains("non-exhaustive match on String"),
        "{}",
        err.message()
    );
}

#[test]
fn string_match_with_wildcard_checks() {
    check_ok(
        "fn d(name :: String) -> String do\n  case name do\n    \"alice\" -> \"Alice\"\n    _ -> \"Other\"\n  end\nend\n",
    );
}

#[test]
fn sum_type_match_exhaustiveness() {
    let errors = check_err(
        "type Color do\n  Red\n  Green\n  Blue\nend\n\nfn f(c :: Color) -> Int do\n  case c do\n    Red -> 1\n    Green -> 2\n  end\nend\n",
    );
    let err = errors.iter().find(|e| e.code() == "E0012").unwrap();
    assert!(err.help().unwrap().contains("Blue"));
}

#[test]
fn method_dot_syntax_resolves_through_derived_display() {
    check_ok(
        "struct Point do\n  x :: Int\n  y :: Int\nend deriving(Display)\n\nfn f(p :: Point) -> String do\n  p.to_string()\nend\n",
    );
}

#[test]
fn bare_name_trait_call_matches_dot_syntax() {
    check_ok(
        "struct Point do\n  x :: Int\n  y :: Int\nend deriving(Display)\n\nfn f(p :: Point) -> String do\n  to_string(p)\nend\n",
    );
}

#[test]
fn no_such_method_is_reported_with_help() {
    let errors = check_err(
        "struct Point do\n  x :: Int\nend deriving()\n\nfn f(p :: Point) -> String do\n  p.to_string()\nend\n",
    );
    let err = errors.iter().find(|e| e.code() == "E0009").unwrap();
    assert!(err.message().contains("to_string"));
    assert!(err.help().is_some());
}

#[test]
fn variant_constructor_via_dot_still_works() {
    check_ok(
        "type Shape do\n  Circle(Float)\n  Empty\nend\n\nfn f() -> Shape do\n  Shape.Circle(1.5)\nend\n",
    );
}

#[test]
fn struct_field_access() {
    check_ok(
        "struct Point do\n  x :: Int\n  y :: Int\nend\n\nfn f(p :: Point) -> Int do\n  p.x + p.y\nend\n",
    );
}

#[test]
fn unsupported_derive_is_e0032() {
    let errors = check_err("struct P do\n  x :: Int\nend deriving(Clone)\n");
    assert!(errors.iter().any(|e| e.code() == "E0032"), "{errors:?}");
}

#[test]
fn generic_derive_is_e0033() {
    let errors = check_err("struct Box do\n  value :: a\nend deriving(Eq)\n");
    assert!(errors.iter().any(|e| e.code() == "E0033"), "{errors:?}");
}

#[test]
fn default_derive_set_registers_eq() {
    // No deriving clause: default set applies, so == works on the struct.
    check_ok(
        "struct P do\n  x :: Int\nend\n\nfn f(a :: P, b :: P) -> Bool do\n  a.eq(b)\nend\n",
    );
}

#[test]
fn iterator_combinators_collapse_at_collect() {
    let result = check_ok(
        "fn f(xs :: List<Int>) -> List<Int> do\n  xs.map(fn(x) do x + 1 end).filter(fn(x) do x > 2 end).collect()\nend\n",
    );
    assert!(result.errors.is_empty());
}

#[test]
fn for_in_filter_must_be_bool() {
    let errors = check_err(
        "fn f(xs :: List<Int>) do\n  for x in xs when x + 1 do\n    println(\"${x}\")\n  end\nend\n",
    );
    assert!(errors.iter().any(|e| e.code() == "E0002"), "{errors:?}");
}

#[test]
fn interpolation_types_are_checked() {
    check_ok("fn f(n :: Int) -> String do\n  \"n = ${n}\"\nend\n");
}

#[test]
fn question_mark_needs_result_return() {
    check_ok(
        "fn parse(s :: String) -> Result<Int, String> do\n  Ok(1)\nend\n\nfn f(s :: String) -> Result<Int, String> do\n  let n = parse(s)?\n  Ok(n + 1)\nend\n",
    );
}

#[test]
fn spawn_and_send_are_typed() {
    check_ok(
        "fn worker(n :: Int) do\n  println(\"${n}\")\nend\n\nfn f() do\n  let pid = spawn(worker, 1)\n  send(pid, 42)\nend\n",
    );
}

// ── Cross-module behavior ───────────────────────────────────────────────

fn exports_of(src: &str) -> mesh_typeck::ExportedSymbols {
    let parse = mesh_parser::parse(src);
    assert!(parse.errors().is_empty());
    let result = check(&parse);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    collect_exports(&parse, &result)
}

#[test]
fn collect_exports_partitions_by_visibility() {
    let exports = exports_of(
        "pub fn visible() -> Int do 1 end\nfn hidden() -> Int do 2 end\npub struct P do\n  x :: Int\nend\n",
    );
    assert!(exports.functions.contains_key("visible"));
    assert!(!exports.functions.contains_key("hidden"));
    assert!(exports.private_names.contains("hidden"));
    assert!(!exports.private_names.contains("visible"));
    assert!(exports.struct_defs.contains_key("P"));
}

#[test]
fn private_import_is_e0035_with_pub_help() {
    let util_src = "fn helper() -> Int do 1 end\n";
    let util_parse = mesh_parser::parse(util_src);
    let util_result = check(&util_parse);
    let util_exports = collect_exports(&util_parse, &util_result);

    let mut ictx = ImportContext::empty();
    ictx.modules.insert("Util".to_string(), util_exports);

    let main_src = "from Util import helper\n\nfn f() -> Int do\n  helper()\nend\n";
    let main_parse = mesh_parser::parse(main_src);
    let result = check_with_imports(&main_parse, &ictx);
    let err = result.errors.iter().find(|e| e.code() == "E0035").unwrap();
    assert!(err.message().contains("private"), "{}", err.message());
    assert!(
        err.help().unwrap().contains("add `pub`"),
        "{:?}",
        err.help()
    );
}

#[test]
fn public_import_binds_function() {
    let util_src = "pub fn double(n :: Int) -> Int do n * 2 end\n";
    let util_parse = mesh_parser::parse(util_src);
    let util_result = check(&util_parse);
    let util_exports = collect_exports(&util_parse, &util_result);

    let mut ictx = ImportContext::empty();
    ictx.modules.insert("Util".to_string(), util_exports);

    let main_src = "from Util import double\n\nfn f() -> Int do\n  double(21)\nend\n";
    let main_parse = mesh_parser::parse(main_src);
    let result = check_with_imports(&main_parse, &ictx);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.imported_functions, vec!["double"]);
}

#[test]
fn import_name_not_found_is_e0031_with_fuzzy_help() {
    let util_src = "pub fn distance(n :: Int) -> Int do n end\n";
    let util_parse = mesh_parser::parse(util_src);
    let util_result = check(&util_parse);
    let util_exports = collect_exports(&util_parse, &util_result);

    let mut ictx = ImportContext::empty();
    ictx.modules.insert("Util".to_string(), util_exports);

    let main_src = "from Util import distnce\n";
    let main_parse = mesh_parser::parse(main_src);
    let result = check_with_imports(&main_parse, &ictx);
    let err = result.errors.iter().find(|e| e.code() == "E0031").unwrap();
    assert!(err.help().unwrap().contains("distance"));
}

#[test]
fn unresolved_from_import_is_e0030() {
    let main_parse = mesh_parser::parse("from Nowhere import thing\n");
    let result = check_with_imports(&main_parse, &ImportContext::empty());
    assert!(result.errors.iter().any(|e| e.code() == "E0030"));
}

#[test]
fn qualified_module_access() {
    let vec_src = "pub fn dot(a :: Int, b :: Int) -> Int do a * b end\n";
    let vec_parse = mesh_parser::parse(vec_src);
    let vec_result = check(&vec_parse);
    let vec_exports = collect_exports(&vec_parse, &vec_result);

    let mut ictx = ImportContext::empty();
    ictx.modules.insert("Math.Vector".to_string(), vec_exports);

    let main_src = "import Math.Vector\n\nfn f() -> Int do\n  Vector.dot(2, 3)\nend\n";
    let main_parse = mesh_parser::parse(main_src);
    let result = check_with_imports(&main_parse, &ictx);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
}

#[test]
fn trait_impls_are_exported_even_without_pub() {
    let exports = exports_of(
        "pub struct P do\n  x :: Int\nend deriving()\n\ninterface Show do\n  fn show(self) -> String\nend\n\nimpl Show for P do\n  fn show(self) -> String do \"p\" end\nend\n",
    );
    assert!(
        exports
            .trait_impls
            .iter()
            .any(|i| i.trait_name == "Show"),
        "impl should be exported unconditionally"
    );
}

#[test]
fn interface_with_assoc_type_and_impl() {
    check_ok(
        "interface Container do\n  type Item\n  fn first(self) -> Self.Item\nend\n\nstruct Wrapper do\n  value :: Int\nend deriving()\n\nimpl Container for Wrapper do\n  type Item = Int\n  fn first(self) -> Self.Item do\n    self.value\n  end\nend\n\nfn f(w :: Wrapper) -> Int do\n  w.first()\nend\n",
    );
}

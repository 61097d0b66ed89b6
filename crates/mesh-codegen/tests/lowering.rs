//! Lowering behavior: method-call desugaring, interpolation, derives,
//! and end-to-end IR emission over real programs.

use mesh_codegen::{LowerOptions, MirExpr, MirModule, emit, lower};

fn lower_program(src: &str, is_entry: bool) -> MirModule {
    let parse = mesh_parser::parse(src);
    assert!(parse.errors().is_empty(), "parse: {:?}", parse.errors());
    let typeck = mesh_typeck::check(&parse);
    assert!(typeck.errors.is_empty(), "typeck: {:?}", typeck.errors);
    let opts = LowerOptions {
        module_name: "Main".to_string(),
        is_entry,
        ..LowerOptions::default()
    };
    lower(&parse, &typeck, &opts)
}

fn fn_body<'m>(module: &'m MirModule, name: &str) -> &'m MirExpr {
    &module
        .functions
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no function {name}"))
        .body
}

const POINT_PREFIX: &str =
    "struct Point do\n  x :: Int\n  y :: Int\nend deriving(Display)\n\n";

#[test]
fn dot_syntax_and_bare_name_produce_identical_mir() {
    let dot = lower_program(
        &format!("{POINT_PREFIX}fn f(p :: Point) -> String do\n  p.to_string()\nend\n"),
        false,
    );
    let bare = lower_program(
        &format!("{POINT_PREFIX}fn f(p :: Point) -> String do\n  to_string(p)\nend\n"),
        false,
    );
    let dot_body = format!("{:?}", fn_body(&dot, "Main__f"));
    let bare_body = format!("{:?}", fn_body(&bare, "Main__f"));
    assert_eq!(dot_body, bare_body);
}

#[test]
fn method_call_targets_mangled_trait_symbol() {
    let module = lower_program(
        &format!("{POINT_PREFIX}fn f(p :: Point) -> String do\n  p.to_string()\nend\n"),
        false,
    );
    let body = format!("{:?}", fn_body(&module, "Main__f"));
    assert!(
        body.contains("Display__to_string__Point"),
        "dispatch must use the Trait__Method__Type mangling: {body}"
    );
}

#[test]
fn interpolation_lowers_to_concat_chain_with_display_dispatch() {
    let module = lower_program(
        "fn f(n :: Int, s :: String) -> String do\n  \"n=${n} s=${s}\"\nend\n",
        false,
    );
    let body = format!("{:?}", fn_body(&module, "Main__f"));
    assert!(body.contains("mesh_string_concat"));
    assert!(body.contains("mesh_int_to_string"));
}

#[test]
fn string_patterns_compile_to_chained_string_eq() {
    let module = lower_program(
        "fn d(name :: String) -> String do\n  case name do\n    \"alice\" -> \"Alice\"\n    \"bob\" -> \"Bob\"\n    _ -> \"Other\"\n  end\nend\n",
        false,
    );
    let body = format!("{:?}", fn_body(&module, "Main__d"));
    let hits = body.matches("mesh_string_eq").count();
    assert_eq!(hits, 2, "one string_eq per literal arm: {body}");
}

#[test]
fn derives_synthesize_display_for_struct() {
    let module = lower_program(
        &format!("{POINT_PREFIX}fn f() -> Int do 1 end\n"),
        false,
    );
    assert!(
        module
            .functions
            .iter()
            .any(|f| f.name == "Display__to_string__Point")
    );
}

#[test]
fn default_derive_set_applies_without_clause() {
    let module = lower_program(
        "struct P do\n  x :: Int\nend\n\nfn f() -> Int do 1 end\n",
        false,
    );
    let names: Vec<&str> = module.functions.iter().map(|f| f.name.as_str()).collect();
    for expected in ["Debug__inspect__P", "Eq__eq__P", "Ord__compare__P", "Hash__hash__P"] {
        assert!(names.contains(&expected), "missing {expected}: {names:?}");
    }
    assert!(!names.contains(&"Display__to_string__P"));
}

#[test]
fn spawn_generates_tuple_unpacking_wrapper() {
    let module = lower_program(
        "fn worker(n :: Int) do\n  println(\"${n}\")\nend\n\nfn main() do\n  spawn(worker, 7)\nend\n",
        true,
    );
    assert!(
        module
            .functions
            .iter()
            .any(|f| f.name == "Main__worker__spawn"),
        "spawn wrapper missing"
    );
    assert_eq!(module.entry_function.as_deref(), Some("Main__main"));
}

#[test]
fn lambdas_lift_with_captures() {
    let module = lower_program(
        "fn f(base :: Int, xs :: List<Int>) -> List<Int> do\n  xs.map(fn(x) do x + base end).collect()\nend\n",
        false,
    );
    let lifted = module
        .functions
        .iter()
        .find(|f| f.is_closure_fn)
        .expect("lifted lambda");
    assert_eq!(lifted.captures.len(), 1);
    assert_eq!(lifted.captures[0].0, "base");
}

#[test]
fn for_with_filter_keeps_filter_in_mir() {
    let module = lower_program(
        "fn f(xs :: List<Int>) do\n  for x in xs when x > 2 do\n    println(\"${x}\")\n  end\nend\n",
        false,
    );
    let body = fn_body(&module, "Main__f");
    fn has_filtered_for(e: &MirExpr) -> bool {
        match e {
            MirExpr::ForIn { filter, .. } => filter.is_some(),
            MirExpr::Block(stmts, _) => stmts.iter().any(has_filtered_for),
            _ => false,
        }
    }
    assert!(has_filtered_for(body));
}

#[test]
fn whole_program_emits_valid_looking_ir() {
    let module = lower_program(
        &format!(
            "{POINT_PREFIX}fn main() do\n  let p = Point{{x: 10, y: 20}}\n  println(p.to_string())\nend\n"
        ),
        true,
    );
    let ir = emit(&module);
    assert!(ir.contains("define "));
    assert!(ir.contains("@Main__main"));
    assert!(ir.contains("define i32 @main()"));
    assert!(ir.contains("call ptr @mesh_string_concat"));
    // Balanced braces is a cheap well-formedness proxy for the IR text.
    assert_eq!(ir.matches("{{").count(), 0);
    assert_eq!(
        ir.matches("define ").count(),
        ir.matches("\n}").count(),
        "every define must close"
    );
}

#[test]
fn five_block_loop_shape_for_filtered_for() {
    let module = lower_program(
        "fn main() do\n  for x in range(0, 10) when x % 2 == 0 do\n    println(\"${x}\")\n  end\nend\n",
        true,
    );
    let ir = emit(&module);
    assert!(ir.contains("for_header"));
    assert!(ir.contains("for_body"));
    assert!(ir.contains("for_filter_body"));
    assert!(ir.contains("for_latch"));
    assert!(ir.contains("for_merge"));
}

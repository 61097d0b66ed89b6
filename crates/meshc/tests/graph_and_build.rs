//! Module graph determinism and end-to-end (pre-link) builds over real
//! project directories.

use meshc::module_graph::ModuleGraph;
use meshc::{BuildError, compile_to_ir};
use std::fs;
use std::path::Path;

fn write_project(root: &Path, files: &[(&str, &str)]) {
    for (path, contents) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, contents).unwrap();
    }
}

#[test]
fn toposort_is_deterministic_regardless_of_discovery_order() {
    // A depends on B, C; B depends on D; C depends on D; D has no deps.
    // The sort must always yield [D, B, C, A].
    let dir = tempfile::tempdir().unwrap();
    write_project(
        dir.path(),
        &[
            ("main.snow", "import A\n\nfn main() do\n  1\nend\n"),
            ("a.snow", "import B\nimport C\n\npub fn fa() -> Int do 1 end\n"),
            ("b.snow", "import D\n\npub fn fb() -> Int do 2 end\n"),
            ("c.snow", "import D\n\npub fn fc() -> Int do 3 end\n"),
            ("d.snow", "pub fn fd() -> Int do 4 end\n"),
        ],
    );
    let graph = ModuleGraph::build(dir.path()).unwrap();
    let order = graph.topological_sort().unwrap();
    let names: Vec<&str> = order
        .iter()
        // The entry sorts among the zero-dependency... filter it out to
        // focus on the scenario modules.
        .map(|id| graph.modules[id.0 as usize].name.as_str())
        .filter(|n| *n != "Main")
        .collect();
    assert_eq!(names, vec!["D", "B", "C", "A"]);
}

#[test]
fn discovery_skips_dot_directories_and_sorts() {
    let dir = tempfile::tempdir().unwrap();
    write_project(
        dir.path(),
        &[
            ("main.snow", "fn main() do 1 end\n"),
            ("zeta.snow", "pub fn z() -> Int do 1 end\n"),
            ("alpha/util.snow", "pub fn u() -> Int do 1 end\n"),
            (".hidden/skip.snow", "pub fn s() -> Int do 1 end\n"),
        ],
    );
    let files = meshc::module_graph::discover_files(dir.path()).unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    assert_eq!(names, vec!["alpha/util.snow", "main.snow", "zeta.snow"]);
}

#[test]
fn self_import_is_a_distinct_error() {
    let dir = tempfile::tempdir().unwrap();
    write_project(
        dir.path(),
        &[
            ("main.snow", "fn main() do 1 end\n"),
            ("util.snow", "import Util\n\npub fn u() -> Int do 1 end\n"),
        ],
    );
    let err = ModuleGraph::build(dir.path()).unwrap_err();
    assert!(matches!(
        err,
        meshc::GraphError::SelfImport { ref module } if module == "Util"
    ));
}

#[test]
fn cycle_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    write_project(
        dir.path(),
        &[
            ("main.snow", "fn main() do 1 end\n"),
            ("a.snow", "import B\n\npub fn fa() -> Int do 1 end\n"),
            ("b.snow", "import C\n\npub fn fb() -> Int do 2 end\n"),
            ("c.snow", "import A\n\npub fn fc() -> Int do 3 end\n"),
        ],
    );
    let graph = ModuleGraph::build(dir.path()).unwrap();
    let err = graph.topological_sort().unwrap_err();
    let meshc::GraphError::Cycle { cycle_path } = err else {
        panic!("expected a cycle error");
    };
    // An indirect self-import (A -> B -> C -> A) is a cycle, not a
    // self-import.
    assert_eq!(cycle_path, vec!["A", "B", "C", "A"]);
}

#[test]
fn entry_module_is_not_importable() {
    let dir = tempfile::tempdir().unwrap();
    write_project(
        dir.path(),
        &[
            ("main.snow", "fn main() do 1 end\n"),
            ("util.snow", "import Main\n\npub fn u() -> Int do 1 end\n"),
        ],
    );
    let graph = ModuleGraph::build(dir.path()).unwrap();
    let util = graph
        .modules
        .iter()
        .find(|m| m.name == "Util")
        .unwrap();
    assert!(util.dependencies.is_empty());
}

#[test]
fn cross_module_project_compiles_to_ir() {
    let dir = tempfile::tempdir().unwrap();
    write_project(
        dir.path(),
        &[
            (
                "main.snow",
                "from Util import double\n\nfn main() do\n  println(\"${double(21)}\")\nend\n",
            ),
            (
                "util.snow",
                "pub fn double(n :: Int) -> Int do\n  n * 2\nend\n",
            ),
        ],
    );
    let ir = compile_to_ir(dir.path()).unwrap();
    assert!(ir.contains("define i64 @Util__double"), "{ir}");
    assert!(ir.contains("@Main__main"));
    assert!(ir.contains("call i64 @Util__double"));
    assert!(ir.contains("define i32 @main()"));
}

#[test]
fn private_import_fails_the_build() {
    let dir = tempfile::tempdir().unwrap();
    write_project(
        dir.path(),
        &[
            (
                "main.snow",
                "from Util import helper\n\nfn main() do\n  helper()\nend\n",
            ),
            ("util.snow", "fn helper() -> Int do 1 end\n"),
        ],
    );
    let err = compile_to_ir(dir.path()).unwrap_err();
    assert!(matches!(err, BuildError::Compile { error_count } if error_count >= 1));
}

#[test]
fn qualified_import_compiles() {
    let dir = tempfile::tempdir().unwrap();
    write_project(
        dir.path(),
        &[
            (
                "main.snow",
                "import Math.Vector\n\nfn main() do\n  println(\"${Vector.dot(2, 3)}\")\nend\n",
            ),
            (
                "math/vector.snow",
                "pub fn dot(a :: Int, b :: Int) -> Int do\n  a * b\nend\n",
            ),
        ],
    );
    let ir = compile_to_ir(dir.path()).unwrap();
    assert!(ir.contains("define i64 @Math_Vector__dot"), "{ir}");
    assert!(ir.contains("call i64 @Math_Vector__dot"));
}

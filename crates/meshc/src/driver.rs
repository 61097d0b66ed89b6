//! The build pipeline: parse every module, type-check leaves first,
//! lower entry-reachable code, emit one LLVM IR file, link with clang
//! against the runtime staticlib.
//!
//! Compile-time errors accumulate per pass and later passes still run
//! where possible; a nonempty diagnostic list after all passes fails
//! the build with exit code 1.

use crate::module_graph::{GraphError, ModuleGraph, ModuleId};
use mesh_codegen::mir::lower::LowerOptions;
use mesh_common::Diagnostic;
use mesh_parser::ast::Item;
use mesh_typeck::{ExportedSymbols, ImportContext};
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, info};

#[derive(Debug, Default, Clone)]
pub struct BuildOptions {
    /// Keep the intermediate `.ll` file next to the binary.
    pub keep_ir: bool,
}

#[derive(Debug)]
pub enum BuildError {
    Graph(GraphError),
    Io(std::io::Error),
    /// Diagnostics were already rendered to stderr.
    Compile { error_count: usize },
    Link(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Graph(e) => write!(f, "{e}"),
            BuildError::Io(e) => write!(f, "i/o error: {e}"),
            BuildError::Compile { error_count } => {
                write!(f, "build failed with {error_count} error(s)")
            }
            BuildError::Link(msg) => write!(f, "linking failed: {msg}"),
        }
    }
}

impl From<GraphError> for BuildError {
    fn from(e: GraphError) -> Self {
        BuildError::Graph(e)
    }
}

impl From<std::io::Error> for BuildError {
    fn from(e: std::io::Error) -> Self {
        BuildError::Io(e)
    }
}

struct CheckedModule {
    id: ModuleId,
    parse: mesh_parser::Parse,
    typeck: mesh_typeck::TypeckResult,
}

/// Compile a project directory down to LLVM IR text. This is the whole
/// pipeline minus the external linker, which keeps it testable.
pub fn compile_to_ir(project_dir: &Path) -> Result<String, BuildError> {
    let graph = ModuleGraph::build(project_dir)?;
    let order = graph.topological_sort()?;
    info!(modules = graph.modules.len(), "project graph built");

    // Type-check in topological order, threading exports leaf-first.
    let mut import_ctx = ImportContext::empty();
    let mut exports_by_name: FxHashMap<String, ExportedSymbols> = FxHashMap::default();
    let mut checked: Vec<CheckedModule> = Vec::new();
    let mut error_count = 0usize;

    for &id in &order {
        let info = &graph.modules[id.0 as usize];
        let full_path = project_dir.join(&info.path);
        let source = std::fs::read_to_string(&full_path)?;
        let filename = info.path.display().to_string();
        let parse = mesh_parser::parse(&source);

        for lex_error in parse.lex_errors() {
            let d = Diagnostic::error("E0000", lex_error.message(), lex_error.span);
            eprintln!("{}", d.render(&source, &filename));
            error_count += 1;
        }
        for parse_error in parse.errors() {
            let d = Diagnostic::error("E0001", parse_error.message(), parse_error.span);
            eprintln!("{}", d.render(&source, &filename));
            error_count += 1;
        }

        // Best-effort: the type checker runs even over trees with parse
        // errors.
        let typeck = mesh_typeck::check_with_imports(&parse, &import_ctx);
        for error in &typeck.errors {
            eprintln!("{}", error.to_diagnostic().render(&source, &filename));
            error_count += 1;
        }
        debug!(module = %info.name, errors = typeck.errors.len(), "checked");

        let exports = mesh_typeck::collect_exports(&parse, &typeck);
        for def in &exports.trait_defs {
            import_ctx.all_trait_defs.push(def.clone());
        }
        for impl_def in &exports.trait_impls {
            import_ctx.all_trait_impls.push(impl_def.clone());
        }
        // The entry module is not importable; everything else is.
        if !info.is_entry {
            import_ctx
                .modules
                .insert(info.name.clone(), exports.clone());
        }
        exports_by_name.insert(info.name.clone(), exports);
        checked.push(CheckedModule { id, parse, typeck });
    }

    if error_count > 0 {
        return Err(BuildError::Compile { error_count });
    }

    // Lower every module and merge into one program.
    let mut mir_modules = Vec::new();
    for module in &checked {
        let info = &graph.modules[module.id.0 as usize];
        let opts = lower_options(info, &module.parse, &exports_by_name);
        mir_modules.push(mesh_codegen::lower(&module.parse, &module.typeck, &opts));
    }
    let merged = mesh_codegen::merge_modules(mir_modules);
    Ok(mesh_codegen::emit(&merged))
}

/// Resolve imported names to their defining modules' mangled symbols.
fn lower_options(
    info: &crate::module_graph::ModuleInfo,
    parse: &mesh_parser::Parse,
    exports_by_name: &FxHashMap<String, ExportedSymbols>,
) -> LowerOptions {
    let mut extern_fns = FxHashMap::default();
    let mut qualified_fns: FxHashMap<String, FxHashMap<String, String>> = FxHashMap::default();

    for item in parse.tree().items() {
        match &item {
            Item::FromImportDecl(decl) => {
                let Some(module_name) = decl.module_path().map(|p| p.dotted()) else {
                    continue;
                };
                let Some(exports) = exports_by_name.get(&module_name) else {
                    continue;
                };
                for name_ref in decl.names() {
                    let name = name_ref.text();
                    if exports.functions.contains_key(&name) {
                        extern_fns.insert(
                            name.clone(),
                            mesh_codegen::mangle_module_fn(&module_name, &name),
                        );
                    }
                }
            }
            Item::ImportDecl(decl) => {
                let Some(path) = decl.module_path() else { continue };
                let module_name = path.dotted();
                let Some(alias) = path.segments().last().cloned() else {
                    continue;
                };
                let Some(exports) = exports_by_name.get(&module_name) else {
                    continue;
                };
                let table = exports
                    .functions
                    .keys()
                    .map(|f| {
                        (
                            f.clone(),
                            mesh_codegen::mangle_module_fn(&module_name, f),
                        )
                    })
                    .collect();
                qualified_fns.insert(alias, table);
            }
            _ => {}
        }
    }

    LowerOptions {
        module_name: info.name.clone(),
        is_entry: info.is_entry,
        extern_fns,
        qualified_fns,
    }
}

/// Full build: IR + clang link. The binary lands at
/// `<project-dir>/<entry-module-name>`.
pub fn build_project(project_dir: &Path, opts: &BuildOptions) -> Result<PathBuf, BuildError> {
    let graph = ModuleGraph::build(project_dir)?;
    let entry_name = graph.entry().name.clone();
    let ir = compile_to_ir(project_dir)?;

    let ir_path = project_dir.join(format!("{entry_name}.ll"));
    std::fs::write(&ir_path, &ir)?;
    let binary = project_dir.join(&entry_name);

    let result = link(&ir_path, &binary);
    if !opts.keep_ir {
        let _ = std::fs::remove_file(&ir_path);
    }
    result?;
    info!(binary = %binary.display(), "build complete");
    Ok(binary)
}

/// Minimum clang major version; the generated IR uses opaque pointers.
const MIN_CLANG_VERSION: u32 = 15;

static CLANG_VERSION_CHECKED: OnceLock<Result<u32, String>> = OnceLock::new();

fn check_clang_version() -> Result<u32, String> {
    CLANG_VERSION_CHECKED
        .get_or_init(|| {
            let output = Command::new("clang")
                .arg("--version")
                .output()
                .map_err(|e| {
                    format!("failed to run clang: {e}. Install clang {MIN_CLANG_VERSION}+.")
                })?;
            let text = String::from_utf8_lossy(&output.stdout);
            let version = parse_clang_version(&text).ok_or_else(|| {
                format!(
                    "could not parse clang version from: {}",
                    text.lines().next().unwrap_or("")
                )
            })?;
            if version < MIN_CLANG_VERSION {
                return Err(format!(
                    "clang {version} found, but {MIN_CLANG_VERSION}+ is required \
                     (opaque pointer IR)"
                ));
            }
            Ok(version)
        })
        .clone()
}

fn parse_clang_version(output: &str) -> Option<u32> {
    for line in output.lines() {
        if let Some(idx) = line.find("clang version ") {
            let rest = &line[idx + "clang version ".len()..];
            let major: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !major.is_empty() {
                return major.parse().ok();
            }
        }
    }
    None
}

/// Locate the runtime staticlib: `MESH_RT_LIB` wins, then the directories
/// around the compiler binary (target/debug, target/release layouts).
fn find_runtime_lib() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("MESH_RT_LIB") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }
    let exe = std::env::current_exe().ok()?;
    let mut dir = exe.parent()?.to_path_buf();
    for _ in 0..3 {
        let candidate = dir.join("libmesh_rt.a");
        if candidate.exists() {
            return Some(candidate);
        }
        for sub in ["debug", "release"] {
            let candidate = dir.join(sub).join("libmesh_rt.a");
            if candidate.exists() {
                return Some(candidate);
            }
        }
        dir = dir.parent()?.to_path_buf();
    }
    None
}

fn link(ir_path: &Path, binary: &Path) -> Result<(), BuildError> {
    check_clang_version().map_err(BuildError::Link)?;
    let runtime = find_runtime_lib().ok_or_else(|| {
        BuildError::Link(
            "runtime library libmesh_rt.a not found; build mesh-rt or set MESH_RT_LIB"
                .to_string(),
        )
    })?;
    let output = Command::new("clang")
        .arg(ir_path)
        .arg(&runtime)
        .arg("-o")
        .arg(binary)
        .args(["-lpthread", "-ldl", "-lm"])
        .output()
        .map_err(|e| BuildError::Link(format!("failed to run clang: {e}")))?;
    if !output.status.success() {
        return Err(BuildError::Link(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clang_version_parsing() {
        assert_eq!(
            parse_clang_version("clang version 17.0.6 (Fedora ...)"),
            Some(17)
        );
        assert_eq!(
            parse_clang_version("Homebrew clang version 15.0.0"),
            Some(15)
        );
        assert_eq!(parse_clang_version("gcc (GCC) 13"), None);
    }
}

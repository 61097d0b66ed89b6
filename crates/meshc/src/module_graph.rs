//! Module graph: discovery, naming, dependency edges, topological sort.
//!
//! Discovery walks the project root recursively, collecting `.snow` (and
//! `.mpl`) files and skipping dot-directories. Paths are sorted
//! lexicographically so the graph is identical across platforms and
//! filesystem enumeration orders. The sort is Kahn's algorithm with
//! alphabetical tie-breaking, which makes the compile order fully
//! deterministic.

use mesh_parser::ast::Item;
use rustc_hash::FxHashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Dense module index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub id: ModuleId,
    /// Dotted PascalCase name (`Math.LinearAlgebra`); the entry module
    /// bears the canonical name `Main`.
    pub name: String,
    /// Path relative to the project root.
    pub path: PathBuf,
    /// Modules this module imports. No duplicates.
    pub dependencies: Vec<ModuleId>,
    /// True for exactly one module: the root `main.snow`.
    pub is_entry: bool,
}

#[derive(Debug, Clone)]
pub struct ModuleGraph {
    pub modules: Vec<ModuleInfo>,
    pub name_to_id: FxHashMap<String, ModuleId>,
}

#[derive(Debug)]
pub enum GraphError {
    Io(io::Error),
    /// `import X` inside module X itself.
    SelfImport { module: String },
    /// The graph is not a DAG; the path traces the cycle
    /// (`A -> B -> A`).
    Cycle { cycle_path: Vec<String> },
    NoEntry,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Io(e) => write!(f, "i/o error while scanning project: {e}"),
            GraphError::SelfImport { module } => {
                write!(f, "module `{module}` imports itself")
            }
            GraphError::Cycle { cycle_path } => {
                write!(f, "import cycle: {}", cycle_path.join(" -> "))
            }
            GraphError::NoEntry => write!(f, "no `main.snow` found in the project root"),
        }
    }
}

impl From<io::Error> for GraphError {
    fn from(e: io::Error) -> Self {
        GraphError::Io(e)
    }
}

/// Recursively collect source files, skipping any directory whose name
/// begins with `.`. Returns relative paths sorted lexicographically.
pub fn discover_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(root, root, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() {
            if name.starts_with('.') {
                continue;
            }
            walk(root, &path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("snow") | Some("mpl")
        ) {
            if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
    }
    Ok(())
}

fn pascal_case(segment: &str) -> String {
    segment
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Compute the dotted module name for a relative path, and whether it is
/// the entry module. Only the root `main.snow` is the entry; a
/// subdirectory `main.snow` maps to a regular `X.Main` module.
pub fn module_name_for(rel_path: &Path) -> (String, bool) {
    let stem = rel_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut segments: Vec<String> = rel_path
        .parent()
        .into_iter()
        .flat_map(|p| p.components())
        .map(|c| pascal_case(&c.as_os_str().to_string_lossy()))
        .filter(|s| !s.is_empty())
        .collect();
    let is_entry = stem == "main" && segments.is_empty();
    segments.push(pascal_case(&stem));
    (segments.join("."), is_entry)
}

impl ModuleGraph {
    /// Build the graph for a project directory: discover files, register
    /// all modules (two-phase, so forward references resolve trivially),
    /// then parse each file and extract import edges. Unresolved import
    /// names are skipped silently; they may refer to stdlib modules the
    /// type checker owns.
    pub fn build(root: &Path) -> Result<ModuleGraph, GraphError> {
        let files = discover_files(root)?;
        let mut modules = Vec::new();
        let mut name_to_id = FxHashMap::default();

        // Phase one: register everything.
        for (index, path) in files.iter().enumerate() {
            let (name, is_entry) = module_name_for(path);
            let id = ModuleId(index as u32);
            name_to_id.insert(name.clone(), id);
            modules.push(ModuleInfo {
                id,
                name,
                path: path.clone(),
                dependencies: Vec::new(),
                is_entry,
            });
        }
        if !modules.iter().any(|m| m.is_entry) {
            return Err(GraphError::NoEntry);
        }

        // Phase two: parse and wire dependency edges.
        for index in 0..modules.len() {
            let source = std::fs::read_to_string(root.join(&modules[index].path))?;
            let parse = mesh_parser::parse(&source);
            let mut deps = Vec::new();
            for item in parse.tree().items() {
                let target = match &item {
                    Item::ImportDecl(decl) => decl.module_path().map(|p| p.dotted()),
                    Item::FromImportDecl(decl) => decl.module_path().map(|p| p.dotted()),
                    _ => None,
                };
                let Some(target) = target else { continue };
                if target == modules[index].name {
                    return Err(GraphError::SelfImport {
                        module: target,
                    });
                }
                let Some(&dep_id) = name_to_id.get(&target) else {
                    continue;
                };
                // The entry module is not importable.
                if modules[dep_id.0 as usize].is_entry {
                    continue;
                }
                if !deps.contains(&dep_id) {
                    deps.push(dep_id);
                }
            }
            modules[index].dependencies = deps;
        }

        Ok(ModuleGraph {
            modules,
            name_to_id,
        })
    }

    pub fn entry(&self) -> &ModuleInfo {
        self.modules
            .iter()
            .find(|m| m.is_entry)
            .expect("graph construction guarantees an entry module")
    }

    /// Kahn's algorithm with alphabetical tie-breaking. For every edge
    /// `(u, v)` where u depends on v, v appears before u in the order.
    pub fn topological_sort(&self) -> Result<Vec<ModuleId>, GraphError> {
        let count = self.modules.len();
        let mut in_degree: Vec<usize> =
            self.modules.iter().map(|m| m.dependencies.len()).collect();

        // Reverse edges: who depends on each module.
        let mut dependents: Vec<Vec<ModuleId>> = vec![Vec::new(); count];
        for module in &self.modules {
            for &dep in &module.dependencies {
                dependents[dep.0 as usize].push(module.id);
            }
        }

        let mut queue: Vec<ModuleId> = self
            .modules
            .iter()
            .filter(|m| m.dependencies.is_empty())
            .map(|m| m.id)
            .collect();
        self.sort_alphabetical(&mut queue);

        let mut order = Vec::with_capacity(count);
        while let Some(next) = queue.first().copied() {
            queue.remove(0);
            order.push(next);
            let mut newly_ready = Vec::new();
            for &dependent in &dependents[next.0 as usize] {
                let degree = &mut in_degree[dependent.0 as usize];
                *degree -= 1;
                if *degree == 0 {
                    newly_ready.push(dependent);
                }
            }
            self.sort_alphabetical(&mut newly_ready);
            queue.extend(newly_ready);
            self.sort_alphabetical(&mut queue);
        }

        if order.len() < count {
            return Err(GraphError::Cycle {
                cycle_path: self.extract_cycle(&order),
            });
        }
        Ok(order)
    }

    fn sort_alphabetical(&self, ids: &mut [ModuleId]) {
        ids.sort_by(|a, b| {
            self.modules[a.0 as usize]
                .name
                .cmp(&self.modules[b.0 as usize].name)
        });
    }

    /// Trace a cycle among the still-pending modules: starting from any
    /// pending module, follow pending outgoing edges until a module
    /// repeats; report the path back to its origin.
    fn extract_cycle(&self, order: &[ModuleId]) -> Vec<String> {
        let done: Vec<bool> = {
            let mut v = vec![false; self.modules.len()];
            for &id in order {
                v[id.0 as usize] = true;
            }
            v
        };
        let mut pending: Vec<ModuleId> = self
            .modules
            .iter()
            .filter(|m| !done[m.id.0 as usize])
            .map(|m| m.id)
            .collect();
        self.sort_alphabetical(&mut pending);
        let Some(&start) = pending.first() else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut current = start;
        loop {
            let next = self.modules[current.0 as usize]
                .dependencies
                .iter()
                .copied()
                .find(|d| !done[d.0 as usize]);
            let Some(next) = next else { break };
            if let Some(pos) = path.iter().position(|&p| p == next) {
                let mut cycle: Vec<String> = path[pos..]
                    .iter()
                    .map(|&id| self.modules[id.0 as usize].name.clone())
                    .collect();
                cycle.push(self.modules[next.0 as usize].name.clone());
                return cycle;
            }
            path.push(next);
            current = next;
        }
        path.iter()
            .map(|&id| self.modules[id.0 as usize].name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_case_splits_on_underscores() {
        assert_eq!(pascal_case("linear_algebra"), "LinearAlgebra");
        assert_eq!(pascal_case("main"), "Main");
        assert_eq!(pascal_case("a"), "A");
        assert_eq!(pascal_case("http_server_v2"), "HttpServerV2");
    }

    #[test]
    fn module_names_from_paths() {
        assert_eq!(
            module_name_for(Path::new("math/linear_algebra.snow")),
            ("Math.LinearAlgebra".to_string(), false)
        );
        assert_eq!(
            module_name_for(Path::new("main.snow")),
            ("Main".to_string(), true)
        );
        // Subdirectory main.snow is a regular module, not an entry.
        assert_eq!(
            module_name_for(Path::new("tools/main.snow")),
            ("Tools.Main".to_string(), false)
        );
    }
}

//! Mesh type checker: Hindley-Milner inference with extensions.
//!
//! Builds on the parser's CST/AST to assign types to all expressions,
//! detect type errors, and support:
//!
//! - let-polymorphism with unification and occurs check
//! - user-defined interfaces with associated types
//! - method-dot resolution and bare-name trait dispatch
//! - cross-module imports with `pub` visibility
//! - deriving clauses with a closed derivable set
//!
//! # Architecture
//!
//! - [`ty`]: core type representation (Ty, Scheme)
//! - [`unify`]: unification engine over an ena union-find table
//! - [`env`]: type environment with scope stack
//! - [`builtins`]: built-in types, functions, and operator traits
//! - [`traits`]: trait registry and mangled-name dispatch
//! - [`infer`]: the inference walker
//! - [`exhaustiveness`]: match coverage checking
//! - [`error`]: the closed error taxonomy with stable codes

pub mod builtins;
pub mod env;
pub mod error;
pub mod exhaustiveness;
pub mod infer;
pub mod traits;
pub mod ty;
pub mod unify;

use mesh_parser::Parse;
use mesh_parser::ast::Item;
use rowan::TextRange;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::TypeError;
use crate::traits::{TraitDef, TraitImplDef, TraitRegistry};
use crate::ty::Scheme;

pub use crate::infer::{
    StructDefInfo, SumTypeDefInfo, TypeRegistry, VariantInfo, infer, infer_with_imports,
};

// ── Cross-module types ──────────────────────────────────────────────────

/// Context built by the driver from already-checked dependency modules.
/// Pre-seeds the checker's environments before inference begins.
#[derive(Debug, Default)]
pub struct ImportContext {
    /// Full dotted module name -> that module's exports.
    pub modules: FxHashMap<String, ExportedSymbols>,
    /// Trait definitions from all processed modules (globally visible).
    pub all_trait_defs: Vec<TraitDef>,
    /// Trait impls from all processed modules. Impls are always globally
    /// visible: a concrete type's operators must not vanish across
    /// modules because an impl block was not marked `pub`.
    pub all_trait_impls: Vec<TraitImplDef>,
}

impl ImportContext {
    /// An empty context, for single-file checking.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Symbols a module presents to its importers after type checking.
/// A given top-level name is in exactly one of the exported maps or in
/// `private_names`.
#[derive(Debug, Default, Clone)]
pub struct ExportedSymbols {
    /// Public function schemes, keyed by unqualified name.
    pub functions: FxHashMap<String, Scheme>,
    /// Public struct definitions.
    pub struct_defs: FxHashMap<String, StructDefInfo>,
    /// Public sum type definitions.
    pub sum_type_defs: FxHashMap<String, SumTypeDefInfo>,
    /// Public trait definitions declared in this module.
    pub trait_defs: Vec<TraitDef>,
    /// Trait impls declared in this module; exported unconditionally.
    pub trait_impls: Vec<TraitImplDef>,
    /// Top-level names that exist but are not `pub`.
    pub private_names: FxHashSet<String>,
}

// ── TypeckResult ────────────────────────────────────────────────────────

/// The result of type checking one Mesh module.
pub struct TypeckResult {
    /// Source ranges to their inferred (fully resolved) types.
    pub types: FxHashMap<TextRange, ty::Ty>,
    /// Type errors found during checking.
    pub errors: Vec<TypeError>,
    /// Warnings (kept separate so builds can stay warning-clean).
    pub warnings: Vec<TypeError>,
    /// Type of the last top-level expression, for script-style modules.
    pub result_type: Option<ty::Ty>,
    /// Struct/sum definitions; codegen reads memory layouts from here.
    pub type_registry: TypeRegistry,
    /// Trait definitions and impls; MIR lowering dispatches through it.
    pub trait_registry: TraitRegistry,
    /// `(trait, method)` -> range of the INTERFACE_METHOD node carrying a
    /// default body, for the lowerer to find the AST again.
    pub default_method_bodies: FxHashMap<(String, String), TextRange>,
    /// Namespace alias -> exported function names, from `import M`.
    pub qualified_modules: FxHashMap<String, Vec<String>>,
    /// Names bound by `from M import ...`, directly callable.
    pub imported_functions: Vec<String>,
    /// Inferred schemes of this module's top-level functions.
    pub fn_schemes: FxHashMap<String, Scheme>,
}

impl TypeckResult {
    /// Render all errors as formatted diagnostic strings.
    pub fn render_errors(&self, source: &str, filename: &str) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| e.to_diagnostic().render(source, filename))
            .collect()
    }
}

/// Type-check a parsed module in isolation.
pub fn check(parse: &Parse) -> TypeckResult {
    infer::infer(parse)
}

/// Type-check a parsed module with pre-resolved imports. This is the
/// multi-module entry point; the driver calls it in topological order,
/// leaves first.
pub fn check_with_imports(parse: &Parse, import_ctx: &ImportContext) -> TypeckResult {
    infer::infer_with_imports(parse, import_ctx)
}

/// Collect a module's exported symbols, partitioning top-level names by
/// visibility: names without `pub` land in `private_names` and nowhere
/// else. Trait impls are exported regardless of visibility.
pub fn collect_exports(parse: &Parse, typeck: &TypeckResult) -> ExportedSymbols {
    let tree = parse.tree();
    let mut exports = ExportedSymbols::default();

    for item in tree.items() {
        match &item {
            Item::FnDef(f) => {
                let Some(name) = f.name().map(|n| n.text()) else {
                    continue;
                };
                if item.visibility().is_some() {
                    if let Some(scheme) = typeck.fn_schemes.get(&name) {
                        exports.functions.insert(name, scheme.clone());
                    }
                } else {
                    exports.private_names.insert(name);
                }
            }
            Item::StructDef(s) => {
                let Some(name) = s.name().map(|n| n.text()) else {
                    continue;
                };
                if item.visibility().is_some() {
                    if let Some(def) = typeck.type_registry.struct_defs.get(&name) {
                        exports.struct_defs.insert(name, def.clone());
                    }
                } else {
                    exports.private_names.insert(name);
                }
            }
            Item::SumTypeDef(t) => {
                let Some(name) = t.name().map(|n| n.text()) else {
                    continue;
                };
                if item.visibility().is_some() {
                    if let Some(def) = typeck.type_registry.sum_type_defs.get(&name) {
                        exports.sum_type_defs.insert(name, def.clone());
                    }
                } else {
                    exports.private_names.insert(name);
                }
            }
            Item::InterfaceDef(i) => {
                let Some(name) = i.name().map(|n| n.text()) else {
                    continue;
                };
                if item.visibility().is_some() {
                    if let Some(def) = typeck.trait_registry.get_trait(&name) {
                        exports.trait_defs.push(def.clone());
                    }
                } else {
                    exports.private_names.insert(name);
                }
            }
            Item::ImplDef(impl_def) => {
                // Always exported: match this block's trait/type pair
                // against the registry.
                let trait_name = impl_def.trait_path().map(|p| p.dotted());
                let type_name = impl_def.type_path().map(|p| p.dotted());
                if let (Some(tn), Some(ty_name)) = (trait_name, type_name) {
                    for candidate in typeck.trait_registry.all_impls() {
                        if candidate.trait_name == tn
                            && candidate.impl_type.head_name() == Some(ty_name.as_str())
                        {
                            exports.trait_impls.push(candidate.clone());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // Derived impls ride along with their exported types.
    for def in exports.struct_defs.values() {
        push_derived_impls(typeck, &def.name, &def.derives, &mut exports.trait_impls);
    }
    for def in exports.sum_type_defs.values() {
        push_derived_impls(typeck, &def.name, &def.derives, &mut exports.trait_impls);
    }

    exports
}

fn push_derived_impls(
    typeck: &TypeckResult,
    type_name: &str,
    derives: &[String],
    out: &mut Vec<TraitImplDef>,
) {
    for trait_name in derives {
        for candidate in typeck.trait_registry.all_impls() {
            if candidate.trait_name == *trait_name
                && candidate.impl_type.head_name() == Some(type_name)
                && !out
                    .iter()
                    .any(|i| i.trait_name == candidate.trait_name && i.impl_type == candidate.impl_type)
            {
                out.push(candidate.clone());
            }
        }
    }
}

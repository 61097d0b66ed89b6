//! Mesh code generation: MIR lowering and LLVM IR text emission.
//!
//! The driver lowers each type-checked module to MIR, merges the MIR
//! modules into one program, and emits a single `.ll` file that links
//! against the runtime staticlib.

pub mod builtins;
pub mod llvm;
pub mod mir;

pub use builtins::map_builtin_name;
pub use llvm::emit;
pub use mir::lower::{LowerOptions, lower, mangle_module_fn};
pub use mir::{MirExpr, MirFunction, MirModule, MirType};

/// Merge per-module MIR into one program unit. Type definitions are
/// deduplicated by name (imported defs appear in every importing
/// module's registry); at most one module contributes an entry.
pub fn merge_modules(modules: Vec<MirModule>) -> MirModule {
    let mut merged = MirModule::default();
    let mut seen_fns = rustc_hash::FxHashSet::default();
    for module in modules {
        for f in module.functions {
            if seen_fns.insert(f.name.clone()) {
                merged.functions.push(f);
            }
        }
        for s in module.structs {
            if merged.struct_def(&s.name).is_none() {
                merged.structs.push(s);
            }
        }
        for s in module.sum_types {
            if merged.sum_type_def(&s.name).is_none() {
                merged.sum_types.push(s);
            }
        }
        if module.entry_function.is_some() {
            merged.entry_function = module.entry_function;
        }
    }
    merged
}

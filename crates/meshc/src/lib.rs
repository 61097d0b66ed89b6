//! Mesh compiler driver library.
//!
//! The driver owns the module graph (discovery, naming, import edges,
//! topological order) and the build pipeline that runs each module
//! through parse -> typecheck -> lower, then emits and links one
//! program.

pub mod driver;
pub mod module_graph;

pub use driver::{BuildError, BuildOptions, build_project, compile_to_ir};
pub use module_graph::{GraphError, ModuleGraph, ModuleId, ModuleInfo};

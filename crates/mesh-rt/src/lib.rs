//! Mesh runtime: the native library compiled programs link against.
//!
//! Key design points:
//! - Values are opaque 8-byte words; heap objects are i64 slot arrays
//!   allocated from per-actor bump arenas.
//! - Actors are may coroutines with 64 KiB stacks, bounded mailboxes,
//!   and catch-unwind crash isolation.
//! - All exported symbols use the `mesh_` prefix and C-unwind ABI so a
//!   `mesh_panic` raised inside runtime code unwinds back to the actor
//!   boundary instead of aborting.

pub mod convert;
pub mod gc;
pub mod http;
pub mod io;
pub mod list;
pub mod map;
pub mod panic;
pub mod scheduler;
pub mod set;
pub mod string;
pub mod tuple;
pub mod variant;
pub mod ws;

pub use gc::{current_pid, mesh_gc_alloc_actor, set_current_pid};
pub use panic::mesh_panic;
pub use scheduler::{
    ProcessId, mesh_actor_receive, mesh_actor_self, mesh_actor_send, mesh_actor_spawn,
    mesh_rt_init, mesh_rt_run,
};
pub use string::MeshString;

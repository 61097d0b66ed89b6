//! Per-actor bump arenas.
//!
//! Every allocation is tagged with the owning process id through the
//! thread-local current-pid cell. The scheduler re-asserts the cell at
//! every suspension point, which is exactly where a coroutine can
//! migrate between worker threads, so allocations between suspension
//! points always land in the running actor's arena.
//!
//! On actor termination the arena is dropped wholesale; there is no
//! traversal cost.

use bumpalo::Bump;
use std::alloc::Layout;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

thread_local! {
    static CURRENT_PID: Cell<u64> = const { Cell::new(0) };
}

/// One actor's heap. The mutex is uncontended in practice: only the
/// running actor allocates from its own arena.
pub struct ProcessArena {
    bump: Mutex<Bump>,
}

impl ProcessArena {
    pub fn new() -> Self {
        ProcessArena {
            bump: Mutex::new(Bump::new()),
        }
    }

    fn alloc(&self, size: usize, align: usize) -> *mut u8 {
        let layout = Layout::from_size_align(size.max(1), align.max(1))
            .unwrap_or_else(|_| Layout::new::<u64>());
        let bump = self.bump.lock().expect("arena lock poisoned");
        bump.alloc_layout(layout).as_ptr()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.bump
            .lock()
            .map(|b| b.allocated_bytes())
            .unwrap_or(0)
    }
}

impl Default for ProcessArena {
    fn default() -> Self {
        Self::new()
    }
}

static ARENAS: OnceLock<Mutex<HashMap<u64, Arc<ProcessArena>>>> = OnceLock::new();

fn arenas() -> &'static Mutex<HashMap<u64, Arc<ProcessArena>>> {
    ARENAS.get_or_init(|| {
        let mut map = HashMap::new();
        // Pid 0 is the root context (main thread before the scheduler,
        // tests, listener setup).
        map.insert(0, Arc::new(ProcessArena::new()));
        Mutex::new(map)
    })
}

pub fn set_current_pid(pid: u64) {
    CURRENT_PID.with(|c| c.set(pid));
}

pub fn current_pid() -> u64 {
    CURRENT_PID.with(|c| c.get())
}

/// Register a fresh arena for a spawned process.
pub fn register_arena(pid: u64) {
    arenas()
        .lock()
        .expect("arena registry lock poisoned")
        .insert(pid, Arc::new(ProcessArena::new()));
}

/// Drop a terminated process's arena, reclaiming its heap wholesale.
pub fn drop_arena(pid: u64) {
    if pid == 0 {
        return;
    }
    arenas()
        .lock()
        .expect("arena registry lock poisoned")
        .remove(&pid);
}

fn arena_of(pid: u64) -> Arc<ProcessArena> {
    let map = arenas().lock().expect("arena registry lock poisoned");
    map.get(&pid)
        .or_else(|| map.get(&0))
        .expect("root arena always present")
        .clone()
}

/// Allocate from the current actor's arena.
///
/// # Safety
/// The returned memory is valid until the owning actor terminates; it
/// is uninitialized and must be written before reads.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_gc_alloc_actor(size: u64, align: u64) -> *mut u8 {
    let arena = arena_of(current_pid());
    arena.alloc(size as usize, align as usize)
}

/// Allocate in a specific actor's arena (used when the runtime builds a
/// message destined for another actor's mailbox).
pub fn alloc_in(pid: u64, size: usize, align: usize) -> *mut u8 {
    arena_of(pid).alloc(size, align)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_come_from_the_current_arena() {
        register_arena(991);
        set_current_pid(991);
        let p = unsafe { mesh_gc_alloc_actor(64, 8) };
        assert!(!p.is_null());
        assert!(arena_of(991).allocated_bytes() >= 64);
        set_current_pid(0);
        drop_arena(991);
    }

    #[test]
    fn dropping_an_arena_reclaims_wholesale() {
        register_arena(992);
        set_current_pid(992);
        for _ in 0..100 {
            unsafe { mesh_gc_alloc_actor(1024, 8) };
        }
        set_current_pid(0);
        drop_arena(992);
        // A new arena under the same pid starts empty.
        register_arena(992);
        assert_eq!(arena_of(992).allocated_bytes(), 0);
        drop_arena(992);
    }

    #[test]
    fn unknown_pid_falls_back_to_root_arena() {
        set_current_pid(123_456);
        let p = unsafe { mesh_gc_alloc_actor(8, 8) };
        assert!(!p.is_null());
        set_current_pid(0);
    }

    #[test]
    fn alignment_is_respected() {
        let p = unsafe { mesh_gc_alloc_actor(24, 8) };
        assert_eq!(p as usize % 8, 0);
    }
}

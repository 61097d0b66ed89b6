//! The M:N actor scheduler.
//!
//! A small pool of OS worker threads (managed by may) runs cooperative
//! coroutines, one per actor, each with a 64 KiB stack. Actors never
//! share mutable memory; they communicate through bounded per-actor
//! mailboxes with FIFO delivery per sender-receiver pair.
//!
//! Suspension points are exactly `receive`, sleep, and blocking I/O
//! intrinsics. A running actor never preempts another; kill flags are
//! observed at the next suspension point. Every actor entry runs under
//! a catch-unwind boundary: a panic terminates the actor, notifies its
//! links, and leaves the worker thread running.

use crate::gc;
use may::coroutine;
use may::sync::mpmc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Once, OnceLock};
use std::time::Duration;

/// Opaque process identifier.
pub type ProcessId = u64;

/// Coroutine stack size: 64 KiB.
const STACK_SIZE: usize = 0x10000;

/// Mailbox capacity; a send to a full mailbox blocks the sender until a
/// slot frees.
const MAILBOX_CAPACITY: usize = 1024;

static SCHEDULER_INIT: Once = Once::new();
static ACTIVE_ACTORS: AtomicUsize = AtomicUsize::new(0);
static SHUTDOWN_CONDVAR: Condvar = Condvar::new();
static SHUTDOWN_MUTEX: Mutex<()> = Mutex::new(());
static NEXT_PID: AtomicU64 = AtomicU64::new(1);

/// Exit reasons carried on link notifications.
const EXIT_NORMAL: u64 = 0;
const EXIT_CRASH: u64 = 1;
const EXIT_KILLED: u64 = 2;

/// Sentinel panic payload used to unwind a killed actor out of its
/// current suspension point.
struct Killed;

/// A bounded FIFO mailbox built from two coroutine-aware channels: one
/// carries messages, the other carries capacity credits. Receiving a
/// message returns its credit, so a send blocks (cooperatively) exactly
/// when the mailbox holds `capacity` undelivered messages.
pub struct Mailbox {
    data_tx: mpmc::Sender<u64>,
    data_rx: mpmc::Receiver<u64>,
    credit_tx: mpmc::Sender<()>,
    credit_rx: mpmc::Receiver<()>,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        let (data_tx, data_rx) = mpmc::channel();
        let (credit_tx, credit_rx) = mpmc::channel();
        for _ in 0..capacity {
            let _ = credit_tx.send(());
        }
        Mailbox {
            data_tx,
            data_rx,
            credit_tx,
            credit_rx,
        }
    }

    /// Blocks the sending coroutine while the mailbox is full.
    pub fn send(&self, value: u64) {
        if self.credit_rx.recv().is_ok() {
            let _ = self.data_tx.send(value);
        }
    }

    pub fn recv(&self) -> Option<u64> {
        let value = self.data_rx.recv().ok()?;
        let _ = self.credit_tx.send(());
        Some(value)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<u64> {
        let value = self.data_rx.recv_timeout(timeout).ok()?;
        let _ = self.credit_tx.send(());
        Some(value)
    }
}

/// One actor.
pub struct Process {
    pub pid: ProcessId,
    pub mailbox: Mailbox,
    /// Observed at suspension points; set by kill/link propagation.
    pub kill: AtomicBool,
    /// When set, exit signals arrive as messages instead of killing.
    pub trap: AtomicBool,
    pub links: Mutex<Vec<ProcessId>>,
    /// One-way observers: notified by message on any termination,
    /// regardless of their trap flag.
    pub monitors: Mutex<Vec<ProcessId>>,
}

static PROCESSES: OnceLock<Mutex<HashMap<ProcessId, Arc<Process>>>> = OnceLock::new();

fn processes() -> &'static Mutex<HashMap<ProcessId, Arc<Process>>> {
    PROCESSES.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lookup(pid: ProcessId) -> Option<Arc<Process>> {
    processes()
        .lock()
        .expect("process table lock poisoned")
        .get(&pid)
        .cloned()
}

fn current_process() -> Option<Arc<Process>> {
    lookup(gc::current_pid())
}

/// Initialize the scheduler. Idempotent.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_rt_init() {
    SCHEDULER_INIT.call_once(|| {
        may::config().set_stack_size(STACK_SIZE);
    });
}

/// Drive the scheduler until every actor has terminated. Returns the
/// process exit code.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_rt_run() -> i64 {
    let mut guard = SHUTDOWN_MUTEX
        .lock()
        .expect("shutdown mutex poisoned while waiting for actors");
    while ACTIVE_ACTORS.load(Ordering::Acquire) > 0 {
        guard = SHUTDOWN_CONDVAR
            .wait(guard)
            .expect("shutdown condvar wait failed");
    }
    0
}

/// Spawn an actor.
///
/// # Safety
/// `entry` must be a function compiled against this runtime's calling
/// convention: it receives the packed argument tuple (or null) and may
/// unwind. Ownership of `args` transfers to the new actor.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_actor_spawn(
    entry: extern "C-unwind" fn(*mut u8),
    args: *mut u8,
) -> ProcessId {
    mesh_rt_init();
    let pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);
    let process = Arc::new(Process {
        pid,
        mailbox: Mailbox::new(MAILBOX_CAPACITY),
        kill: AtomicBool::new(false),
        trap: AtomicBool::new(false),
        links: Mutex::new(Vec::new()),
        monitors: Mutex::new(Vec::new()),
    });
    processes()
        .lock()
        .expect("process table lock poisoned")
        .insert(pid, process);
    gc::register_arena(pid);
    ACTIVE_ACTORS.fetch_add(1, Ordering::Release);

    // Raw pointers are not Send; the caller guarantees thread safety of
    // the packed argument tuple.
    let args_addr = args as usize;
    unsafe {
        coroutine::spawn(move || {
            gc::set_current_pid(pid);
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                entry(args_addr as *mut u8);
            }));
            let reason = match result {
                Ok(()) => EXIT_NORMAL,
                Err(payload) if payload.is::<Killed>() => EXIT_KILLED,
                Err(payload) => {
                    let message = panic_message(&payload);
                    eprintln!("actor {pid} crashed: {message}");
                    EXIT_CRASH
                }
            };
            terminate(pid, reason);
        });
    }
    pid
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Tear down a finished actor: notify links, free the arena wholesale,
/// and wake the shutdown waiter when this was the last actor.
fn terminate(pid: ProcessId, reason: u64) {
    let process = {
        processes()
            .lock()
            .expect("process table lock poisoned")
            .remove(&pid)
    };
    if let Some(process) = process {
        let links = process
            .links
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default();
        for linked in links {
            notify_link(linked, pid, reason);
        }
        let monitors = process
            .monitors
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default();
        for monitor in monitors {
            send_exit_message(monitor, pid, reason);
        }
    }
    gc::drop_arena(pid);
    gc::set_current_pid(0);

    let prev = ACTIVE_ACTORS.fetch_sub(1, Ordering::AcqRel);
    if prev == 1 {
        let _guard = SHUTDOWN_MUTEX
            .lock()
            .expect("shutdown mutex poisoned during final notify");
        SHUTDOWN_CONDVAR.notify_all();
    }
}

/// Deliver an exit signal: trapped actors get it as an ordinary message;
/// others are killed.
fn notify_link(target: ProcessId, from: ProcessId, reason: u64) {
    let Some(process) = lookup(target) else {
        return;
    };
    if reason == EXIT_NORMAL {
        return;
    }
    if process.trap.load(Ordering::Acquire) {
        send_exit_message(target, from, reason);
    } else {
        process.kill.store(true, Ordering::Release);
        // Nudge the target out of a blocking receive.
        let _ = process.mailbox.data_tx.send(u64::MAX);
    }
}

/// An exit notification as an ordinary message: a `(pid, reason)` tuple
/// allocated in the receiver's own arena, ordered like any other
/// message to that mailbox.
fn send_exit_message(target: ProcessId, from: ProcessId, reason: u64) {
    let Some(process) = lookup(target) else {
        return;
    };
    let msg = gc::alloc_in(target, 8 * 3, 8) as *mut u64;
    unsafe {
        msg.write(2);
        msg.add(1).write(from);
        msg.add(2).write(reason);
    }
    process.mailbox.send(msg as u64);
}

/// Send a message. Blocks while the target mailbox is full; sends to a
/// dead actor are dropped silently.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_actor_send(target: ProcessId, value: u64) {
    if let Some(process) = lookup(target) {
        process.mailbox.send(value);
    }
}

/// Receive a message into `out`.
///
/// `timeout_ms < 0` blocks until a message arrives. Returns 1 when a
/// message was received, 0 on timeout. The kill flag is observed before
/// blocking and again after resuming, making this a cancellation point.
///
/// # Safety
/// `out` must point to writable memory for one u64.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_actor_receive(timeout_ms: i64, out: *mut u64) -> u8 {
    let Some(process) = current_process() else {
        return 0;
    };
    let pid = process.pid;
    check_killed(&process);

    let received = if timeout_ms < 0 {
        process.mailbox.recv()
    } else {
        process
            .mailbox
            .recv_timeout(Duration::from_millis(timeout_ms as u64))
    };

    // Suspension point: the coroutine may have migrated workers.
    gc::set_current_pid(pid);
    check_killed(&process);

    match received {
        Some(value) => {
            unsafe { out.write(value) };
            1
        }
        None => 0,
    }
}

fn check_killed(process: &Process) {
    if process.kill.load(Ordering::Acquire) {
        std::panic::panic_any(Killed);
    }
}

/// The running actor's own pid (0 outside any actor).
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_actor_self() -> ProcessId {
    gc::current_pid()
}

/// Link the running actor to `target` (bidirectional).
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_actor_link(target: ProcessId) {
    let me = gc::current_pid();
    if me == 0 || me == target {
        return;
    }
    if let Some(process) = lookup(target) {
        if let Ok(mut links) = process.links.lock() {
            if !links.contains(&me) {
                links.push(me);
            }
        }
    }
    if let Some(process) = lookup(me) {
        if let Ok(mut links) = process.links.lock() {
            if !links.contains(&target) {
                links.push(target);
            }
        }
    }
}

/// Watch `target` without linking fates: the running actor receives a
/// `(pid, reason)` message when `target` terminates, for any reason.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_actor_monitor(target: ProcessId) {
    let me = gc::current_pid();
    if me == 0 || me == target {
        return;
    }
    if let Some(process) = lookup(target) {
        if let Ok(mut monitors) = process.monitors.lock() {
            if !monitors.contains(&me) {
                monitors.push(me);
            }
        }
    }
}

/// Set the running actor's trap flag: exit signals become messages.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_actor_trap(enabled: i64) {
    if let Some(process) = current_process() {
        process.trap.store(enabled != 0, Ordering::Release);
    }
}

/// Request termination of `target`; observed at its next suspension
/// point. There is no forced interruption of running user code.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_actor_kill(target: ProcessId) {
    if let Some(process) = lookup(target) {
        process.kill.store(true, Ordering::Release);
        let _ = process.mailbox.data_tx.send(u64::MAX);
    }
}

/// Block the current coroutine for `ms` milliseconds; a cancellation
/// point like every suspension.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_sleep(ms: i64) {
    let pid = gc::current_pid();
    coroutine::sleep(Duration::from_millis(ms.max(0) as u64));
    gc::set_current_pid(pid);
    if let Some(process) = current_process() {
        check_killed(&process);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::AtomicU32;

    fn wait_all() {
        let mut guard = SHUTDOWN_MUTEX.lock().unwrap();
        while ACTIVE_ACTORS.load(Ordering::Acquire) > 0 {
            guard = SHUTDOWN_CONDVAR.wait(guard).unwrap();
        }
    }

    #[test]
    #[serial]
    fn spawned_actors_all_run() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        extern "C-unwind" fn work(_args: *mut u8) {
            COUNTER.fetch_add(1, Ordering::SeqCst);
        }
        COUNTER.store(0, Ordering::SeqCst);
        for _ in 0..100 {
            unsafe { mesh_actor_spawn(work, std::ptr::null_mut()) };
        }
        wait_all();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 100);
    }

    #[test]
    #[serial]
    fn pids_are_unique_and_positive() {
        extern "C-unwind" fn noop(_args: *mut u8) {}
        let mut pids = Vec::new();
        for _ in 0..50 {
            pids.push(unsafe { mesh_actor_spawn(noop, std::ptr::null_mut()) });
        }
        wait_all();
        let unique: std::collections::HashSet<_> = pids.iter().collect();
        assert_eq!(unique.len(), 50);
        assert!(pids.iter().all(|&p| p > 0));
    }

    #[test]
    #[serial]
    fn messages_are_fifo_per_sender() {
        static SUM_OK: AtomicBool = AtomicBool::new(false);
        extern "C-unwind" fn receiver(_args: *mut u8) {
            let mut last = 0u64;
            let mut ordered = true;
            for _ in 0..100 {
                let mut value = 0u64;
                let got = unsafe { mesh_actor_receive(-1, &mut value) };
                if got == 0 || value <= last {
                    ordered = false;
                    break;
                }
                last = value;
            }
            SUM_OK.store(ordered, Ordering::SeqCst);
        }
        SUM_OK.store(false, Ordering::SeqCst);
        let pid = unsafe { mesh_actor_spawn(receiver, std::ptr::null_mut()) };
        for i in 1..=100u64 {
            mesh_actor_send(pid, i);
        }
        wait_all();
        assert!(SUM_OK.load(Ordering::SeqCst), "delivery must be in send order");
    }

    #[test]
    #[serial]
    fn receive_timeout_returns_zero() {
        static TIMED_OUT: AtomicBool = AtomicBool::new(false);
        extern "C-unwind" fn receiver(_args: *mut u8) {
            let mut value = 0u64;
            let got = unsafe { mesh_actor_receive(20, &mut value) };
            TIMED_OUT.store(got == 0, Ordering::SeqCst);
        }
        TIMED_OUT.store(false, Ordering::SeqCst);
        unsafe { mesh_actor_spawn(receiver, std::ptr::null_mut()) };
        wait_all();
        assert!(TIMED_OUT.load(Ordering::SeqCst));
    }

    #[test]
    #[serial]
    fn a_panicking_actor_does_not_take_down_others() {
        static SURVIVOR_RAN: AtomicBool = AtomicBool::new(false);
        extern "C-unwind" fn crasher(_args: *mut u8) {
            panic!("deliberate crash");
        }
        extern "C-unwind" fn survivor(_args: *mut u8) {
            // Runs after the crasher has had a chance to die.
            mesh_sleep(30);
            SURVIVOR_RAN.store(true, Ordering::SeqCst);
        }
        SURVIVOR_RAN.store(false, Ordering::SeqCst);
        unsafe {
            mesh_actor_spawn(crasher, std::ptr::null_mut());
            mesh_actor_spawn(survivor, std::ptr::null_mut());
        }
        wait_all();
        assert!(SURVIVOR_RAN.load(Ordering::SeqCst));
    }

    #[test]
    #[serial]
    fn killed_actor_stops_at_next_suspension_point() {
        static STOPPED_EARLY: AtomicBool = AtomicBool::new(true);
        extern "C-unwind" fn victim(_args: *mut u8) {
            let mut value = 0u64;
            unsafe { mesh_actor_receive(-1, &mut value) };
            // Never reached: the kill unwinds out of the receive.
            STOPPED_EARLY.store(false, Ordering::SeqCst);
        }
        STOPPED_EARLY.store(true, Ordering::SeqCst);
        let pid = unsafe { mesh_actor_spawn(victim, std::ptr::null_mut()) };
        std::thread::sleep(Duration::from_millis(20));
        mesh_actor_kill(pid);
        wait_all();
        assert!(STOPPED_EARLY.load(Ordering::SeqCst));
    }

    #[test]
    #[serial]
    fn trapped_actor_receives_exit_signal_message() {
        static REASON_WAS_CRASH: AtomicBool = AtomicBool::new(false);

        extern "C-unwind" fn delayed_crasher(_args: *mut u8) {
            // Give the supervisor time to establish the link.
            mesh_sleep(30);
            panic!("child failure");
        }

        extern "C-unwind" fn supervisor(_args: *mut u8) {
            mesh_actor_trap(1);
            let child = unsafe { mesh_actor_spawn(delayed_crasher, std::ptr::null_mut()) };
            mesh_actor_link(child);
            let mut value = 0u64;
            let got = unsafe { mesh_actor_receive(2000, &mut value) };
            if got == 1 {
                let tuple = value as *const u64;
                let from = unsafe { tuple.add(1).read() };
                let reason = unsafe { tuple.add(2).read() };
                REASON_WAS_CRASH.store(from == child && reason == EXIT_CRASH, Ordering::SeqCst);
            }
        }

        REASON_WAS_CRASH.store(false, Ordering::SeqCst);
        unsafe {
            mesh_actor_spawn(supervisor, std::ptr::null_mut());
        }
        wait_all();
        assert!(
            REASON_WAS_CRASH.load(Ordering::SeqCst),
            "trapping supervisor must receive the exit signal as a message"
        );
    }

    #[test]
    #[serial]
    fn mailbox_bounds_are_enforced_by_credits() {
        let mailbox = Mailbox::new(2);
        mailbox.send(1);
        mailbox.send(2);
        // Third send would block; verify indirectly through the credit
        // channel being empty.
        assert!(mailbox.credit_rx.try_recv().is_err());
        assert_eq!(mailbox.recv(), Some(1));
        // Receiving returned a credit.
        assert!(mailbox.credit_rx.try_recv().is_ok());
    }
}

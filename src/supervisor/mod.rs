//! Prefork supervisor (§4.6): forks and maintains a fixed pool of worker
//! processes, tracks per-worker liveness via the shared-memory heartbeat
//! block, and drains the pool on a shutdown signal.
//!
//! Grounded on the fork/waitpid/kill raw-`libc` pattern used for prefork
//! worker management elsewhere in the broader example pack (the `libc`
//! bindings, not a higher-level process crate, since fork has no safe
//! abstraction in std).

pub mod heartbeat;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::SupervisorConfig;
use crate::error::WharfError;
use heartbeat::{HeartbeatBlock, HeartbeatCell, monotonic_seconds};

/// Lifecycle states for the supervisor (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    PreFork,
    Forking,
    Supervising,
    Draining,
    Stopped,
}

/// A soft shutdown (INT/TERM/QUIT) has been requested.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
/// A second soft signal arrived while already draining: escalate to KILL.
static HARD_SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_soft_signal(_signum: libc::c_int) {
    if SHUTDOWN_REQUESTED.swap(true, Ordering::SeqCst) {
        HARD_SHUTDOWN.store(true, Ordering::SeqCst);
    }
}

/// Installs the INT/TERM/QUIT handler. Inherited across `fork()`, so
/// workers react to the same signals the supervisor forwards to them.
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, handle_soft_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_soft_signal as libc::sighandler_t);
        libc::signal(libc::SIGQUIT, handle_soft_signal as libc::sighandler_t);
    }
}

/// Returns `true` once a soft shutdown signal has been observed. Exposed so
/// an in-process worker loop (no separate supervisor) can react the same way
/// a forked child would.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// A supervisor-owned worker slot (§3). Free when `pid == 0`.
#[derive(Debug, Clone, Copy, Default)]
struct WorkerSlot {
    pid: libc::pid_t,
    birth: i64,
}

impl WorkerSlot {
    fn is_free(&self) -> bool {
        self.pid == 0
    }
}

/// The prefork supervisor.
pub struct Supervisor {
    config: SupervisorConfig,
    slots: Vec<WorkerSlot>,
    heartbeat: HeartbeatBlock,
    state: SupervisorState,
}

impl Supervisor {
    /// Allocates the heartbeat block and an empty slot table sized to
    /// `config.worker_count`.
    pub fn new(config: SupervisorConfig) -> Result<Self, WharfError> {
        let heartbeat = HeartbeatBlock::new(config.worker_count)
            .map_err(|e| WharfError::Supervisor(format!("failed to map heartbeat block: {e}")))?;
        Ok(Self {
            slots: vec![WorkerSlot::default(); config.worker_count],
            heartbeat,
            config,
            state: SupervisorState::Starting,
        })
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Runs the full lifecycle: fork the initial pool, supervise until a
    /// shutdown signal arrives, then drain. `spawn_child` is called once per
    /// forked slot *in the child*, after `fork()` returns 0; it should run
    /// the worker to completion and return its exit code.
    pub fn run<F>(&mut self, spawn_child: F) -> Result<(), WharfError>
    where
        F: Fn(usize, HeartbeatCell) -> i32,
    {
        self.state = SupervisorState::PreFork;
        install_signal_handlers();

        self.state = SupervisorState::Forking;
        for index in 0..self.slots.len() {
            self.fork_into_slot(index, &spawn_child)?;
        }

        self.state = SupervisorState::Supervising;
        while !shutdown_requested() {
            std::thread::sleep(Duration::from_secs(self.config.interval()));
            self.reap_exited();
            if self.config.heartbeat_enabled {
                self.kill_stalled();
            }
            for index in 0..self.slots.len() {
                if self.slots[index].is_free() {
                    self.fork_into_slot(index, &spawn_child)?;
                }
            }
        }

        self.drain();
        Ok(())
    }

    fn fork_into_slot<F>(&mut self, index: usize, spawn_child: &F) -> Result<(), WharfError>
    where
        F: Fn(usize, HeartbeatCell) -> i32,
    {
        let cell = self.heartbeat.cell(index);
        // SAFETY: `fork()` is always safe to call; the child branch below
        // only calls async-signal-safe operations before running
        // application code and exiting.
        let pid = unsafe { libc::fork() };
        match pid {
            -1 => Err(WharfError::Supervisor("fork failed".to_string())),
            0 => {
                let code = spawn_child(index, cell);
                std::process::exit(code);
            }
            child_pid => {
                self.slots[index] = WorkerSlot {
                    pid: child_pid,
                    birth: monotonic_seconds(),
                };
                info!(pid = child_pid, slot = index, "forked worker");
                Ok(())
            }
        }
    }

    /// Non-blocking reap of any exited children, freeing their slots.
    fn reap_exited(&mut self) {
        for slot in &mut self.slots {
            if slot.is_free() {
                continue;
            }
            let mut status: libc::c_int = 0;
            // SAFETY: `slot.pid` is a child of this process, reaped at most
            // once per exit since the slot is zeroed immediately after.
            let result = unsafe { libc::waitpid(slot.pid, &mut status, libc::WNOHANG) };
            if result == slot.pid {
                info!(pid = slot.pid, "worker exited, slot freed");
                *slot = WorkerSlot::default();
            }
        }
    }

    /// Kills any worker whose heartbeat cell hasn't advanced in
    /// `interval / 2` seconds. The supervisor reaps it on the next cycle.
    fn kill_stalled(&mut self) {
        let threshold = self.config.stall_threshold() as i64;
        let now = monotonic_seconds();
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.is_free() {
                continue;
            }
            let last_beat = self.heartbeat.cell(index).last();
            let reference = if last_beat == 0 { slot.birth } else { last_beat };
            if now - reference > threshold {
                warn!(pid = slot.pid, slot = index, "heartbeat stale, killing worker");
                // SAFETY: `slot.pid` is a live child of this process.
                unsafe {
                    libc::kill(slot.pid, libc::SIGKILL);
                }
            }
        }
    }

    /// Stops forking, signals all live children, and waits for them to exit.
    fn drain(&mut self) {
        self.state = SupervisorState::Draining;
        let signal = if HARD_SHUTDOWN.load(Ordering::SeqCst) {
            libc::SIGKILL
        } else {
            libc::SIGTERM
        };
        info!(signal, "draining worker pool");

        for slot in &self.slots {
            if !slot.is_free() {
                // SAFETY: `slot.pid` is a live child of this process.
                unsafe {
                    libc::kill(slot.pid, signal);
                }
            }
        }
        for slot in &mut self.slots {
            if !slot.is_free() {
                let mut status: libc::c_int = 0;
                // SAFETY: blocking wait on a child of this process.
                unsafe {
                    libc::waitpid(slot.pid, &mut status, 0);
                }
                *slot = WorkerSlot::default();
            }
        }

        self.state = SupervisorState::Stopped;
    }
}

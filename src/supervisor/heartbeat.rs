//! Shared-memory heartbeat block (§3, §4.6): one `i64` cell per worker slot,
//! holding the monotonic seconds of that worker's last request start.
//!
//! The block is created by the supervisor in the pre-fork phase via
//! `mmap(MAP_SHARED | MAP_ANON)` so it survives `fork()` and is visible to
//! both the parent (reader) and the child that owns each cell (writer).

use std::ptr::NonNull;
use std::sync::atomic::{AtomicI64, Ordering};

/// A `MAP_SHARED` block of `slots` monotonic-second counters.
pub struct HeartbeatBlock {
    ptr: NonNull<i64>,
    slots: usize,
}

// SAFETY: the block is backed by `mmap(MAP_SHARED)`, which is exactly the
// kind of memory the OS guarantees safe concurrent access to across
// processes; each cell is accessed through `AtomicI64::from_ptr`.
unsafe impl Send for HeartbeatBlock {}
unsafe impl Sync for HeartbeatBlock {}

impl HeartbeatBlock {
    /// Maps a new zero-initialized block sized `slots * size_of::<i64>()`
    /// bytes.
    pub fn new(slots: usize) -> std::io::Result<Self> {
        let len = slots.max(1) * std::mem::size_of::<i64>();
        // SAFETY: fixed-size anonymous mapping, no file descriptor involved.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error());
        }
        let ptr = NonNull::new(addr as *mut i64).expect("mmap returned non-null on success");
        Ok(Self { ptr, slots })
    }

    /// Returns a handle to the cell for `index`, usable from any process
    /// that shares this mapping (i.e. after `fork()`).
    ///
    /// # Panics
    ///
    /// Panics if `index >= slots`.
    pub fn cell(&self, index: usize) -> HeartbeatCell {
        assert!(index < self.slots, "heartbeat slot index out of range");
        // SAFETY: index bound-checked above; pointer stays valid for the
        // lifetime of the mapping, which this handle does not outlive in
        // practice (the supervisor holds the block for the process lifetime).
        let cell_ptr = unsafe { self.ptr.as_ptr().add(index) };
        HeartbeatCell { ptr: cell_ptr }
    }

    pub fn slots(&self) -> usize {
        self.slots
    }
}

impl Drop for HeartbeatBlock {
    fn drop(&mut self) {
        let len = self.slots.max(1) * std::mem::size_of::<i64>();
        // SAFETY: `self.ptr` was returned by the matching `mmap` call above.
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, len);
        }
    }
}

/// A handle to one heartbeat cell, safe to hold across a `fork()` boundary.
#[derive(Clone, Copy)]
pub struct HeartbeatCell {
    ptr: *mut i64,
}

// SAFETY: see `HeartbeatBlock`.
unsafe impl Send for HeartbeatCell {}
unsafe impl Sync for HeartbeatCell {}

impl HeartbeatCell {
    fn atomic(&self) -> &AtomicI64 {
        // SAFETY: the pointer was derived from a live `HeartbeatBlock`
        // mapping and is aligned for `i64`.
        unsafe { AtomicI64::from_ptr(self.ptr) }
    }

    /// Writes the current monotonic-seconds timestamp to this cell.
    /// Non-blocking (§5).
    pub fn beat(&self) {
        self.atomic().store(monotonic_seconds(), Ordering::SeqCst);
    }

    /// Reads the last-written monotonic-seconds timestamp.
    pub fn last(&self) -> i64 {
        self.atomic().load(Ordering::SeqCst)
    }
}

/// Monotonic seconds since an unspecified epoch, via `CLOCK_MONOTONIC`.
pub fn monotonic_seconds() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, live `timespec`; `CLOCK_MONOTONIC` is
    // supported on every platform this crate targets.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beat_then_last_round_trips() {
        let block = HeartbeatBlock::new(2).unwrap();
        let cell = block.cell(0);
        assert_eq!(cell.last(), 0);
        cell.beat();
        assert!(cell.last() > 0);
    }

    #[test]
    fn cells_are_independent() {
        let block = HeartbeatBlock::new(2).unwrap();
        let a = block.cell(0);
        let b = block.cell(1);
        a.beat();
        assert!(a.last() > 0);
        assert_eq!(b.last(), 0);
    }

    #[test]
    fn successive_beats_are_non_decreasing() {
        let block = HeartbeatBlock::new(1).unwrap();
        let cell = block.cell(0);
        cell.beat();
        let first = cell.last();
        cell.beat();
        let second = cell.last();
        assert!(second >= first);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_index_panics() {
        let block = HeartbeatBlock::new(1).unwrap();
        block.cell(1);
    }
}

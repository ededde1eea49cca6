//! A process-wide free list of reusable [`Vm`] handles (spec §4.7/§5).
//!
//! Each call's operand stack and locals array is already allocated fresh
//! per frame (see the parent module's doc comment for why), so the only
//! state worth amortizing across runs is the [`Vm`] struct itself — the
//! pool exists to avoid a fresh allocation-free struct construction on
//! every acquire rather than to reuse a pre-sized stack/globals array.
//! Acquire/release is a plain `Mutex`-guarded free list: a lock held only
//! long enough to push or pop one entry, guaranteeing single-owner access
//! to each pooled [`Vm`] (§5's concurrency invariant).

use std::sync::Mutex;

use super::Vm;

/// A bounded free list of idle [`Vm`]s. Acquiring past the pool's current
/// size just allocates a fresh one; releasing past `max_size` drops it
/// instead of growing the pool without bound.
#[derive(Debug)]
pub struct VmPool {
    idle: Mutex<Vec<Vm>>,
    max_size: usize,
}

impl VmPool {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_size,
        }
    }

    /// Takes an idle `Vm` from the pool, or builds a fresh one if the pool
    /// is empty.
    ///
    /// # Panics
    /// Panics if the pool's mutex is poisoned by a prior panic while held.
    #[must_use]
    pub fn acquire(&self) -> Vm {
        self.idle.lock().expect("VM pool mutex poisoned").pop().unwrap_or_default()
    }

    /// Returns a `Vm` to the pool for reuse, dropping it instead if the
    /// pool is already at capacity.
    ///
    /// # Panics
    /// Panics if the pool's mutex is poisoned by a prior panic while held.
    pub fn release(&self, vm: Vm) {
        let mut idle = self.idle.lock().expect("VM pool mutex poisoned");
        if idle.len() < self.max_size {
            idle.push(vm);
        }
    }

    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().expect("VM pool mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_on_an_empty_pool_builds_a_fresh_vm() {
        let pool = VmPool::new(4);
        let _vm = pool.acquire();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn released_vm_is_reused_on_next_acquire() {
        let pool = VmPool::new(4);
        let vm = pool.acquire();
        pool.release(vm);
        assert_eq!(pool.idle_count(), 1);
        let _vm = pool.acquire();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn release_past_capacity_drops_the_extra_vm() {
        let pool = VmPool::new(1);
        pool.release(Vm::new());
        pool.release(Vm::new());
        assert_eq!(pool.idle_count(), 1);
    }
}

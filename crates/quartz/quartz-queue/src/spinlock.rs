//! Process-shared spinlock guarding consumer registration.
//!
//! Lives inside the mapped segment, so it must be a plain atomic word with no
//! OS handle behind it. Only registration, unregistration and the occasional
//! watermark refresh take it; the push/pop data path never does.
//!
//! A process that dies while holding the lock leaves it held. Recovering from
//! that is a deployment concern (recreate the queue).

use std::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Spins before falling back to `yield_now` while contended.
const SPINS_BEFORE_YIELD: u32 = 64;

#[repr(C)]
pub struct RegistrationLock {
    state: AtomicU32,
}

/// Releases the lock on drop.
pub struct RegistrationGuard<'a> {
    lock: &'a RegistrationLock,
}

impl RegistrationLock {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
        }
    }

    /// Acquire the lock, spinning and then yielding while another process
    /// holds it.
    pub fn lock(&self) -> RegistrationGuard<'_> {
        let mut spins = 0u32;
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            // Wait on a plain load so contended CAS traffic stays off the line.
            while self.state.load(Ordering::Relaxed) == LOCKED {
                if spins < SPINS_BEFORE_YIELD {
                    spins += 1;
                    std::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }
        }
    }

    pub fn try_lock(&self) -> Option<RegistrationGuard<'_>> {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| RegistrationGuard { lock: self })
    }
}

impl Default for RegistrationLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.lock.state.store(UNLOCKED, Ordering::Release);
    }
}

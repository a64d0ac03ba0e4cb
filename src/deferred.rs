//! Single slot handoff of a setpoint from the sampling context to a lower
//! priority context.
//!
//! Writing overwrites; only the most recent value is ever observed. Neither
//! side blocks.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[derive(Debug)]
pub struct DeferredSetpoint {
    bits: AtomicU32,
    pending: AtomicBool,
}

impl Default for DeferredSetpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredSetpoint {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            pending: AtomicBool::new(false),
        }
    }

    /// Replaces any value not yet taken.
    #[inline]
    pub fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    /// The latest stored value, if one arrived since the last take.
    ///
    /// A store racing with this call is either returned now or on the next
    /// take; applying the same value twice is harmless.
    #[inline]
    pub fn take(&self) -> Option<f32> {
        if self.pending.swap(false, Ordering::Acquire) {
            Some(f32::from_bits(self.bits.load(Ordering::Relaxed)))
        } else {
            None
        }
    }

    /// The last stored value, pending or not.
    pub fn latest(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
        self.bits.store(0, Ordering::Relaxed);
    }
}

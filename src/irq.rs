//! Interrupt-mask guard.
//!
//! Every index update that races an interrupt handler happens while an
//! [`IrqMask`] is alive. On the target the critical-section implementation
//! disables interrupts; on the host it is the `std` global lock.

use critical_section::RestoreState;

/// Scoped interrupt mask. Interrupts are restored when the guard drops,
/// on every exit path.
#[must_use = "interrupts are re-enabled as soon as the guard is dropped"]
pub struct IrqMask {
    state: RestoreState,
}

impl IrqMask {
    /// Disable interrupts until the returned guard is dropped.
    #[inline]
    pub fn acquire() -> Self {
        // SAFETY: the matching release happens exactly once, in Drop,
        // and guards are never moved across contexts.
        let state = unsafe { critical_section::acquire() };
        Self { state }
    }
}

impl Drop for IrqMask {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: `state` came from the acquire in `IrqMask::acquire`.
        unsafe { critical_section::release(self.state) };
    }
}

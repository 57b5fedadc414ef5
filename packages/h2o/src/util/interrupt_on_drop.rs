//! Interrupt utility.

use crate::Interrupt;


/// Wrapper around an [`Interrupt`] that raises it if dropped while armed.
///
/// Ties the lifetime of a blocking operation running elsewhere to the lifetime of this guard.
#[derive(Debug)]
pub struct InterruptOnDrop(Option<Interrupt>);

impl InterruptOnDrop {
    /// Wrap an interrupt, armed.
    pub fn new(interrupt: Interrupt) -> Self {
        InterruptOnDrop(Some(interrupt))
    }

    /// Raise the interrupt now, unless disarmed.
    pub fn interrupt(&self) {
        if let Some(interrupt) = &self.0 {
            interrupt.interrupt();
        }
    }

    /// Disarm, so dropping does nothing.
    pub fn disarm(&mut self) {
        self.0 = None;
    }

    /// Whether still armed.
    pub fn is_armed(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        self.interrupt();
    }
}

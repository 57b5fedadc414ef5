//! Misc utilities.

mod interrupt_on_drop;

pub use self::interrupt_on_drop::InterruptOnDrop;

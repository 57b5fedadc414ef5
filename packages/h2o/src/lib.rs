//! Two-hydrogens-one-oxygen rendezvous engine.
//!
//! Writers submit byte payloads as hydrogens and readers request oxygens. Every pair of
//! hydrogens meets one oxygen to form a molecule, which the reader receives as the two payloads
//! concatenated in arrival order. See [`Engine`].

#[macro_use]
extern crate tracing;

pub extern crate bytes;

mod engine;
pub mod util;

pub use crate::engine::api::*;

/// Error types
pub mod error {
    pub use crate::engine::error::*;
}

/// Future types
pub mod future {
    pub use crate::engine::api::future::*;
}

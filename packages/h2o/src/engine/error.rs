// engine error types.

use thiserror::Error;


// ==== base error types ====


/// Error for a blocked operation whose [`Interrupt`](crate::Interrupt) was raised before the
/// condition it was waiting for held
///
/// The operation made no change to the engine past the point where it was interrupted. Callers
/// are expected to treat this as "try again later".
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("interrupted while blocked")]
pub struct Interrupted;

/// Error for a copy into or out of caller-owned memory failing
///
/// `offset` is the index of the first byte that could not be transferred. Bytes before it were
/// transferred.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("bad address at byte {offset} of caller buffer")]
pub struct Fault {
    /// Index of the first byte that failed to transfer
    pub offset: usize,
}

/// Error for a hydrogen payload not fitting into the engine's remaining buffer capacity
///
/// The `committed` prefix was stored and forms part of the molecule like any other payload. The
/// `rejected` tail was dropped.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("payload exceeds remaining capacity ({committed} bytes committed, {rejected} rejected)")]
pub struct CapacityExceeded {
    /// Bytes stored in the buffer
    pub committed: usize,
    /// Bytes dropped
    pub rejected: usize,
}


// ==== compound error types ====


/// Error for submitting a hydrogen or requesting an oxygen
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Error {
    /// A blocked wait was interrupted
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    /// The boundary byte transfer failed
    #[error(transparent)]
    Fault(#[from] Fault),
    /// The payload did not fully fit
    #[error(transparent)]
    CapacityExceeded(#[from] CapacityExceeded),
}

impl Error {
    /// Whether this is [`Error::Interrupted`]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted(_))
    }

    /// Bytes committed by the failed call before it failed
    ///
    /// Only a [`CapacityExceeded`] write reports committed bytes; an interrupted or faulted call
    /// reports 0 even when an earlier step of it took effect.
    pub fn committed(&self) -> usize {
        match self {
            Error::CapacityExceeded(e) => e.committed,
            Error::Interrupted(_) | Error::Fault(_) => 0,
        }
    }
}

/// Error for constructing an engine from an invalid configuration
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ConfigError {
    /// The buffer capacity was zero
    #[error("engine capacity must be non-zero")]
    ZeroCapacity,
}

// copying bytes into and out of caller-owned memory.
//
// the engine never holds its lock while running these copies. writes copy the caller's payload
// into an engine-owned staging buffer before locking, and reads assemble the molecule under the
// lock and copy it out afterwards.

use super::error::Fault;
use bytes::{Bytes, BytesMut};


/// Caller-owned memory a hydrogen payload is copied from
///
/// Implementations for plain byte containers never fault. Boundary layers implement this for
/// memory that may be partially inaccessible.
pub trait ByteSource {
    /// Length of the payload in bytes
    fn len(&self) -> usize;

    /// Whether the payload is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the first `dst.len()` bytes of the payload into `dst`
    ///
    /// On failure, the bytes before the returned [`Fault::offset`] have been copied.
    fn copy_to(&self, dst: &mut [u8]) -> Result<(), Fault>;
}

/// Caller-owned memory a molecule is copied into
pub trait ByteSink {
    /// Space available in bytes
    fn len(&self) -> usize;

    /// Whether there is no space
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `src` into the first `src.len()` bytes of this memory
    ///
    /// On failure, the bytes before the returned [`Fault::offset`] have been copied.
    fn copy_from(&mut self, src: &[u8]) -> Result<(), Fault>;
}

// copy the first `n` bytes of `src` into a fresh engine-owned buffer.
pub(crate) fn stage<S: ByteSource + ?Sized>(src: &S, n: usize) -> Result<Bytes, Fault> {
    let mut staged = BytesMut::zeroed(n);
    src.copy_to(&mut staged)?;
    Ok(staged.freeze())
}

impl ByteSource for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_to(&self, dst: &mut [u8]) -> Result<(), Fault> {
        dst.copy_from_slice(&self[..dst.len()]);
        Ok(())
    }
}

impl<const N: usize> ByteSource for [u8; N] {
    fn len(&self) -> usize {
        N
    }

    fn copy_to(&self, dst: &mut [u8]) -> Result<(), Fault> {
        self[..].copy_to(dst)
    }
}

impl ByteSource for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn copy_to(&self, dst: &mut [u8]) -> Result<(), Fault> {
        self[..].copy_to(dst)
    }
}

impl ByteSource for Bytes {
    fn len(&self) -> usize {
        Bytes::len(self)
    }

    fn copy_to(&self, dst: &mut [u8]) -> Result<(), Fault> {
        self[..].copy_to(dst)
    }
}

impl ByteSink for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_from(&mut self, src: &[u8]) -> Result<(), Fault> {
        self[..src.len()].copy_from_slice(src);
        Ok(())
    }
}

impl<const N: usize> ByteSink for [u8; N] {
    fn len(&self) -> usize {
        N
    }

    fn copy_from(&mut self, src: &[u8]) -> Result<(), Fault> {
        self[..].copy_from(src)
    }
}

impl ByteSink for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn copy_from(&mut self, src: &[u8]) -> Result<(), Fault> {
        self[..].copy_from(src)
    }
}

// simulated caller memory.

use h2o::{error::Fault, ByteSink, ByteSource};


/// Simulated caller-owned memory, of which only a prefix is accessible
///
/// Copies touching bytes at or past the accessible prefix fail with a [`Fault`] at the first
/// inaccessible byte, after transferring everything before it. A fully accessible buffer behaves
/// like a plain byte buffer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserBuf {
    bytes: Vec<u8>,
    // bytes at or past this index fault
    accessible: usize,
}

impl UserBuf {
    /// Fully accessible buffer holding `bytes`
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let accessible = bytes.len();
        UserBuf { bytes, accessible }
    }

    /// Fully accessible buffer of `len` zero bytes
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    /// Make bytes at or past `offset` inaccessible
    pub fn fault_at(mut self, offset: usize) -> Self {
        self.accessible = offset.min(self.bytes.len());
        self
    }

    /// Length in bytes, including the inaccessible part
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the length is zero
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of leading accessible bytes
    pub fn accessible(&self) -> usize {
        self.accessible
    }

    /// Inspect the contents, including the inaccessible part
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    // how many of the first n bytes can be transferred, and the fault if not all of them
    fn check(&self, n: usize) -> (usize, Result<(), Fault>) {
        if n <= self.accessible {
            (n, Ok(()))
        } else {
            trace!(n, accessible = self.accessible, "simulated fault");
            (self.accessible, Err(Fault { offset: self.accessible }))
        }
    }
}

impl ByteSource for UserBuf {
    fn len(&self) -> usize {
        UserBuf::len(self)
    }

    fn copy_to(&self, dst: &mut [u8]) -> Result<(), Fault> {
        let (ok, result) = self.check(dst.len());
        dst[..ok].copy_from_slice(&self.bytes[..ok]);
        result
    }
}

impl ByteSink for UserBuf {
    fn len(&self) -> usize {
        UserBuf::len(self)
    }

    fn copy_from(&mut self, src: &[u8]) -> Result<(), Fault> {
        let (ok, result) = self.check(src.len());
        self.bytes[..ok].copy_from_slice(&src[..ok]);
        result
    }
}

// open files on a device.

use crate::registry::Device;
use h2o::{error::Error, ByteSink, ByteSource, Interrupt};
use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};


/// Mode a [`File`] was opened in
///
/// Only used for logging. Access is not enforced.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
    Unknown,
}

impl AccessMode {
    /// Mode from the readable and writable bits of open flags
    pub fn from_flags(readable: bool, writable: bool) -> Self {
        match (readable, writable) {
            (true, true) => AccessMode::ReadWrite,
            (false, true) => AccessMode::Write,
            (true, false) => AccessMode::Read,
            (false, false) => AccessMode::Unknown,
        }
    }
}

impl Display for AccessMode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::ReadWrite => "read-write",
            AccessMode::Unknown => "unknown",
        })
    }
}


/// A file open on a [`Device`]
///
/// Writes submit hydrogens to the device's engine and reads request oxygens from it. Both block
/// the way the engine does. Dropping the file releases it.
#[derive(Debug)]
pub struct File {
    device: Arc<Device>,
    id: u64,
    mode: AccessMode,
}

impl File {
    pub(crate) fn new(device: Arc<Device>, id: u64, mode: AccessMode) -> Self {
        File { device, id, mode }
    }

    /// Identifier, unique among files opened on the same device
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Mode this file was opened in
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Device this file is open on
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Write `src` as one hydrogen. See [`h2o::Engine::submit_hydrogen`].
    pub fn write<S>(&self, src: &S, interrupt: &Interrupt) -> Result<usize, Error>
    where
        S: ByteSource + ?Sized,
    {
        trace!(file = self.id, len = src.len(), "write");
        self.device
            .engine()
            .submit_hydrogen(src, interrupt)
            .inspect_err(|e| debug!(file = self.id, %e, "write failed"))
    }

    /// Read one molecule into `dst`. See [`h2o::Engine::request_oxygen_into`].
    pub fn read<K>(&self, dst: &mut K, interrupt: &Interrupt) -> Result<usize, Error>
    where
        K: ByteSink + ?Sized,
    {
        trace!(file = self.id, len = dst.len(), "read");
        self.device
            .engine()
            .request_oxygen_into(dst, interrupt)
            .inspect_err(|e| debug!(file = self.id, %e, "read failed"))
    }
}

impl Drop for File {
    fn drop(&mut self) {
        self.device.release(self.id);
    }
}

// molecule assembly policy.
//
// this is not a lock domain of its own. it is the bookkeeping which makes sure that the bytes an
// oxygen request gets are exactly the pending hydrogen payloads, in the order they were
// committed, and nothing else. it relies on the engine lock making "commit payload + count
// hydrogen" one atomic step, so commit order is hydrogen arrival order.

use super::{
    counts::HYDROGENS_PER_MOLECULE,
    ring_buffer::RingBuffer,
};
use bytes::{Bytes, BytesMut};
use smallvec::SmallVec;


/// Committed lengths of the hydrogen payloads of the molecule currently forming.
#[derive(Debug, Default)]
pub(crate) struct MoleculeAssembler {
    // front is the oldest payload.
    //
    // invariant: the ring holds exactly sum(pending) bytes, which are these payloads back to back
    pending: SmallVec<[usize; HYDROGENS_PER_MOLECULE as usize]>,
}

impl MoleculeAssembler {
    /// Commit as much of `payload` as fits into `ring` as the next hydrogen payload. Returns the
    /// number of bytes committed, which may be 0.
    pub(crate) fn commit(&mut self, ring: &mut RingBuffer, payload: &[u8]) -> usize {
        debug_assert!(self.pending.len() < HYDROGENS_PER_MOLECULE as usize);
        let committed = ring.write(payload);
        self.pending.push(committed);
        debug_assert_eq!(ring.len(), self.molecule_len());
        committed
    }

    /// Total length of the pending payloads.
    pub(crate) fn molecule_len(&self) -> usize {
        self.pending.iter().sum()
    }

    /// Drain every pending payload out of `ring` and concatenate them, oldest first. Bytes past
    /// `max_len` are consumed but discarded.
    pub(crate) fn assemble(&mut self, ring: &mut RingBuffer, max_len: usize) -> Bytes {
        debug_assert_eq!(ring.len(), self.molecule_len());
        let total = self.molecule_len();
        let keep = total.min(max_len);

        let mut molecule = BytesMut::with_capacity(keep);
        ring.read(keep, &mut molecule);
        ring.skip(total - keep);
        self.pending.clear();

        debug_assert!(ring.is_empty());
        molecule.freeze()
    }
}

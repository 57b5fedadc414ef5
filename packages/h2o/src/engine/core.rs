// the rendezvous coordinator. the exposed API is a convenience wrapper around this.

use super::{
    assembler::MoleculeAssembler,
    counts::ParticipantCounts,
    error::{CapacityExceeded, Error},
    ring_buffer::RingBuffer,
    transfer::{stage, ByteSink, ByteSource},
    wait::{wait_while, Interrupt},
};
use bytes::Bytes;
use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    task::{Wake, Waker},
};


// handle to an engine.
#[derive(Clone)]
pub(crate) struct Coordinator {
    shared: Arc<Shared>,
    // one per condvar, each taking the lock and broadcasting that condvar when woken. handed to
    // interrupt tokens while blocked.
    wakers: Wakers,
}

#[derive(Clone)]
struct Wakers {
    hydrogen_ready: Waker,
    slot_free: Waker,
    molecule_done: Waker,
}

// engine shared state.
struct Shared {
    // the one lock. everything mutable lives behind it.
    lockable: Mutex<Lockable>,
    // ring capacity, copied out so it can be read without locking.
    capacity: usize,

    // broadcast when the pending molecule gets its second hydrogen. oxygen requests wait on it.
    hydrogen_ready: Condvar,
    // broadcast when a molecule is taken and its hydrogen slots free up. writers that found both
    // slots taken wait on it.
    slot_free: Condvar,
    // broadcast when a molecule is taken. writers whose hydrogen is in it wait on it.
    molecule_done: Condvar,
}

// engine lockable state.
struct Lockable {
    // holds exactly the committed payloads of the pending hydrogens.
    ring: RingBuffer,
    counts: ParticipantCounts,
    assembler: MoleculeAssembler,
    // number of molecules taken so far. the pending molecule's index is this value, so a writer
    // knows its molecule was taken once this moves past the value it saw when committing.
    molecules: u64,
}

// identifies one of Shared's condvars.
#[derive(Debug, Copy, Clone)]
enum Cond {
    HydrogenReady,
    SlotFree,
    MoleculeDone,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lockable> {
        // the critical sections never panic part way through a mutation, so a poisoned lock
        // still guards consistent state
        self.lockable.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cond(&self, cond: Cond) -> &Condvar {
        match cond {
            Cond::HydrogenReady => &self.hydrogen_ready,
            Cond::SlotFree => &self.slot_free,
            Cond::MoleculeDone => &self.molecule_done,
        }
    }
}

// waker that broadcasts a condvar under the lock.
struct CondWaker {
    shared: Arc<Shared>,
    cond: Cond,
}

impl Wake for CondWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let _lock = self.shared.lock();
        self.shared.cond(self.cond).notify_all();
    }
}

/// Point-in-time view of an engine's counters
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Snapshot {
    /// Hydrogens committed to the pending molecule, 0 to 2
    pub hydrogens: u8,
    /// Oxygen requests currently waiting or assembling
    pub oxygens: usize,
    /// Bytes currently buffered
    pub occupancy: usize,
    /// Buffer capacity in bytes
    pub capacity: usize,
    /// Molecules completed since the engine was constructed
    pub molecules: u64,
}

impl Coordinator {
    // construct empty. panics if capacity is zero.
    pub(crate) fn new(capacity: usize) -> Self {
        let shared = Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                ring: RingBuffer::new(capacity),
                counts: ParticipantCounts::default(),
                assembler: MoleculeAssembler::default(),
                molecules: 0,
            }),
            capacity,
            hydrogen_ready: Condvar::new(),
            slot_free: Condvar::new(),
            molecule_done: Condvar::new(),
        });
        let waker = |cond: Cond| {
            Waker::from(Arc::new(CondWaker { shared: Arc::clone(&shared), cond }))
        };
        let wakers = Wakers {
            hydrogen_ready: waker(Cond::HydrogenReady),
            slot_free: waker(Cond::SlotFree),
            molecule_done: waker(Cond::MoleculeDone),
        };
        Coordinator { shared, wakers }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.shared.capacity
    }

    // submit a hydrogen and block until the molecule it becomes part of is taken.
    //
    // the payload is staged before locking, so a fault in the source leaves the engine untouched.
    pub(crate) fn submit_hydrogen<S>(&self, src: &S, interrupt: &Interrupt) -> Result<usize, Error>
    where
        S: ByteSource + ?Sized,
    {
        let len = src.len();
        if len == 0 {
            return Ok(0);
        }

        // the whole payload is staged, so a fault anywhere in it is reported, even in a tail that
        // would be rejected for capacity
        let staged = stage(src, len)
            .inspect_err(|fault| warn!(offset = fault.offset, len, "fault staging hydrogen"))?;

        // wait for a free slot
        let lock = self.shared.lock();
        let (mut lock, result) = wait_while(
            &self.shared.slot_free,
            lock,
            interrupt,
            &self.wakers.slot_free,
            |l| l.counts.slots_full(),
        );
        if let Err(e) = result {
            debug!(len, "hydrogen interrupted waiting for a free slot");
            return Err(e.into());
        }

        // commit payload and count the hydrogen, as one step
        let l = &mut *lock;
        let committed = l.assembler.commit(&mut l.ring, &staged);
        let molecule = l.molecules;
        let pair_ready = l.counts.add_hydrogen();
        trace!(molecule, committed, hydrogens = l.counts.hydrogens(), "hydrogen committed");
        if pair_ready {
            self.shared.hydrogen_ready.notify_all();
        }

        // wait for an oxygen request to take our molecule
        let (lock, result) = wait_while(
            &self.shared.molecule_done,
            lock,
            interrupt,
            &self.wakers.molecule_done,
            |l| l.molecules == molecule,
        );
        drop(lock);
        if let Err(e) = result {
            // the hydrogen stays in the molecule, it was committed before the interrupt
            debug!(molecule, committed, "hydrogen interrupted waiting for its molecule");
            return Err(e.into());
        }

        if committed < len {
            Err(CapacityExceeded { committed, rejected: len - committed }.into())
        } else {
            Ok(committed)
        }
    }

    // block until a molecule is ready, then take it, truncated to `max_len`.
    pub(crate) fn request_oxygen(
        &self,
        max_len: usize,
        interrupt: &Interrupt,
    ) -> Result<Bytes, Error> {
        if max_len == 0 {
            return Ok(Bytes::new());
        }

        // wait for a pair of hydrogens
        let mut lock = self.shared.lock();
        lock.counts.enter_oxygen();
        let (mut lock, result) = wait_while(
            &self.shared.hydrogen_ready,
            lock,
            interrupt,
            &self.wakers.hydrogen_ready,
            |l| !l.counts.pair_ready(),
        );
        if let Err(e) = result {
            lock.counts.leave_oxygen();
            debug!("oxygen interrupted waiting for hydrogens");
            return Err(e.into());
        }

        // take the molecule
        let l = &mut *lock;
        let molecule = l.assembler.assemble(&mut l.ring, max_len);
        l.counts.consume_pair();
        debug!(molecule = l.molecules, len = molecule.len(), "molecule completed");
        l.molecules += 1;

        // release its writers, and writers waiting to start the next one
        self.shared.molecule_done.notify_all();
        self.shared.slot_free.notify_all();
        drop(lock);

        Ok(molecule)
    }

    // request_oxygen, then copy the molecule out to `dst` with the lock released.
    //
    // the molecule is taken even if the copy faults.
    pub(crate) fn request_oxygen_into<K>(
        &self,
        dst: &mut K,
        interrupt: &Interrupt,
    ) -> Result<usize, Error>
    where
        K: ByteSink + ?Sized,
    {
        let molecule = self.request_oxygen(dst.len(), interrupt)?;
        dst.copy_from(&molecule).inspect_err(|fault| {
            warn!(offset = fault.offset, len = molecule.len(), "fault delivering molecule")
        })?;
        trace!(len = molecule.len(), "molecule delivered");
        Ok(molecule.len())
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let lock = self.shared.lock();
        Snapshot {
            hydrogens: lock.counts.hydrogens(),
            oxygens: lock.counts.oxygens(),
            occupancy: lock.ring.len(),
            capacity: lock.ring.capacity(),
            molecules: lock.molecules,
        }
    }
}

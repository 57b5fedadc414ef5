// implementation of the h2o engine.
//
// the architecture is as such:
//
// engine handles wrap around Arc<shared state>
//                                 |
//          /----------------------/
//          v
//       shared state
//          |
//          |------ one Mutex around all lockable state:
//          |
//          |          |------ a ring_buffer::RingBuffer, a fixed-capacity byte FIFO holding the
//          |          |       committed payloads of the hydrogens of the pending molecule
//          |          |
//          |          |------ a counts::ParticipantCounts, how many hydrogens and oxygens are
//          |          |       currently in play
//          |          |
//          |          |------ an assembler::MoleculeAssembler, which remembers where one pending
//          |          |       payload ends and the next begins
//          |          |
//          |          \------ the number of molecules taken so far, which writers use to tell
//          |                  when their molecule is gone
//          |
//          \------ one Condvar per thing a caller can block on: hydrogen pair ready, hydrogen
//                  slot free, molecule taken
//
// every blocking wait goes through wait::wait_while, which lets the caller's Interrupt token end
// the wait early without a lost wakeup.
//
// the organization of these modules is as such:
//
//      These are used like
//      library utilities:
//    /--------------------\
//
//      ring_buffer<------------core: Owns the lock and condvars and sequences the rendezvous. All
//                    |         ^     waiting, counting, and committing happens here.
//      counts<-------|         |
//                    |         |
//      assembler<----|         |
//                    |         |
//      wait<---------|         |
//                    |         |
//      transfer<-----/         api: This is a wrapper around core that adapts it into the
//                                   public API, plus configuration and async adapters. The crate
//                                   re-exports this API publically.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publically.

pub(crate) mod error;
pub(crate) mod api;

mod ring_buffer;
mod counts;
mod assembler;
mod wait;
mod transfer;
mod core;

// cancellable condition waits.
//
// every blocking path in the engine goes through `wait_while`. it is a plain mutex + condvar
// predicate loop, with one addition: the caller's `Interrupt` token can end the wait early.
//
// waking a thread blocked on a condvar requires notifying that condvar, and doing so without a
// lost wakeup requires taking the mutex it waits with. so while a thread is blocked, it registers
// a `Waker` on its interrupt token. the waker is constructed by the engine and, when woken, takes
// the engine lock and broadcasts the condvar. the sequence is then:
//
// - waiter (holding lock): register waker, check flag, condvar-wait (releasing lock)
// - interrupter: raise flag, clone registered wakers, wake them (taking lock, broadcasting)
//
// a waker stays registered for the whole wait, so a token that is raised, reset, and raised again
// still reaches a waiter that slept through the first raise.
//
// if the interrupter reads the wakers before the waiter registered, the waiter's flag check sees
// the raised flag. otherwise, the waker's broadcast cannot run until the waiter is parked on the
// condvar, because it needs the lock.

use super::error::Interrupted;
use smallvec::SmallVec;
use std::{
    sync::{
        atomic::{
            AtomicBool,
            AtomicU64,
            Ordering::{Relaxed, SeqCst},
        },
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    task::Waker,
};


/// Cooperative cancellation token for blocking engine operations
///
/// Cloning produces another handle to the same token. Raising it with
/// [`interrupt`](Self::interrupt) makes every operation currently blocked with it return
/// [`Interrupted`](crate::error::Interrupted), as well as any operation that would block later,
/// until the token is [`reset`](Self::reset). Operations that can proceed without blocking are
/// not affected.
///
/// This is the analogue of a signal being delivered to a thread blocked in a system call. It
/// never carries a deadline.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<InterruptInner>);

#[derive(Debug, Default)]
struct InterruptInner {
    raised: AtomicBool,
    next_key: AtomicU64,
    // wakers of waits currently blocked with this token, keyed so each wait can unregister its own
    wakers: Mutex<SmallVec<[(u64, Waker); 1]>>,
}

impl Interrupt {
    /// Construct a token that is not raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the token, waking every operation blocked with it
    pub fn interrupt(&self) {
        self.0.raised.store(true, SeqCst);
        // clone the wakers out before waking them, so that we never hold our mutex while a waker
        // takes an engine lock. they stay registered, in case the token is reset and raised
        // again before their waits notice.
        let wakers = self
            .lock_wakers()
            .iter()
            .map(|(_, waker)| waker.clone())
            .collect::<SmallVec<[Waker; 1]>>();
        trace!(count = wakers.len(), "interrupt raised");
        for waker in wakers {
            waker.wake();
        }
    }

    /// Whether the token is raised
    pub fn is_interrupted(&self) -> bool {
        self.0.raised.load(SeqCst)
    }

    /// Lower the token so it can be reused
    pub fn reset(&self) {
        self.0.raised.store(false, SeqCst);
    }

    fn lock_wakers(&self) -> MutexGuard<'_, SmallVec<[(u64, Waker); 1]>> {
        self.0.wakers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // register a waker to be woken whenever the token is raised. it stays registered until the
    // returned guard is dropped.
    fn register(&self, waker: &Waker) -> Registration<'_> {
        let key = self.0.next_key.fetch_add(1, Relaxed);
        self.lock_wakers().push((key, waker.clone()));
        Registration { interrupt: self, key }
    }
}

// unregisters a waker when dropped.
struct Registration<'a> {
    interrupt: &'a Interrupt,
    key: u64,
}

impl<'a> Drop for Registration<'a> {
    fn drop(&mut self) {
        self.interrupt.lock_wakers().retain(|(key, _)| *key != self.key);
    }
}

// block on `cond` for as long as `blocked` returns true, or until `interrupt` is raised.
//
// - `blocked` is re-evaluated after every wakeup, whether or not it was meant for this waiter.
// - `waker` must take the lock `guard` belongs to and then broadcast `cond`.
// - the lock is held again when this returns, in all cases.
// - if `blocked` is already false, this returns immediately without looking at the interrupt.
// - if interrupted, `blocked` was still true at the last check, and nothing beyond evaluating
//   `blocked` was done to the guarded state.
pub(crate) fn wait_while<'a, T, F>(
    cond: &Condvar,
    mut guard: MutexGuard<'a, T>,
    interrupt: &Interrupt,
    waker: &Waker,
    mut blocked: F,
) -> (MutexGuard<'a, T>, Result<(), Interrupted>)
where
    F: FnMut(&mut T) -> bool,
{
    if !blocked(&mut guard) {
        return (guard, Ok(()));
    }

    let registration = interrupt.register(waker);
    loop {
        if interrupt.is_interrupted() {
            drop(registration);
            return (guard, Err(Interrupted));
        }

        guard = cond.wait(guard).unwrap_or_else(PoisonError::into_inner);

        if !blocked(&mut guard) {
            drop(registration);
            return (guard, Ok(()));
        }
    }
}

// exposed API of engines

use self::future::*;
use super::{
    core,
    error::*,
};
use bytes::Bytes;
use std::fmt::{self, Debug, Formatter};

pub use super::{
    core::Snapshot,
    transfer::{ByteSink, ByteSource},
    wait::Interrupt,
};


/// Default buffer capacity in bytes
pub const DEFAULT_CAPACITY: usize = 8;


/// Configuration for constructing an [`Engine`]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EngineConfig {
    /// Buffer capacity in bytes. Bounds the combined size of the two hydrogen payloads of a
    /// molecule. Must be non-zero.
    pub capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { capacity: DEFAULT_CAPACITY }
    }
}

impl EngineConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Ownership-chaining setter for [`capacity`](Self::capacity)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Validate and construct an engine
    pub fn build(self) -> Result<Engine, ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Engine(core::Coordinator::new(self.capacity)))
    }
}


/// H2O rendezvous engine
///
/// Writers submit hydrogen payloads and readers request oxygen. Every two hydrogens and one
/// oxygen form a molecule: the reader receives the two payloads concatenated in the order they
/// were committed, and all three calls return.
///
/// - A writer blocks while the pending molecule already has two hydrogens, then commits its
///   payload and blocks until a reader takes the molecule.
/// - A reader blocks until the pending molecule has two hydrogens, then takes it.
/// - Any blocked call can be aborted with the [`Interrupt`] it was given.
///
/// All state sits behind one lock, with one condition variable per thing a caller can wait for.
/// Cloning produces another handle to the same engine. The engine's state is released when the
/// last handle is dropped.
#[derive(Clone)]
pub struct Engine(core::Coordinator);

impl Engine {
    /// Construct an empty engine whose buffer holds `capacity` bytes
    ///
    /// Panics if `capacity` is zero. See [`EngineConfig::build`] for a non-panicking version.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Engine capacity must be non-zero");
        Engine(core::Coordinator::new(capacity))
    }

    /// Buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.0.capacity()
    }

    /// Submit a hydrogen, blocking until the molecule it becomes part of is taken
    ///
    /// Returns the number of bytes committed. An empty payload returns `Ok(0)` immediately
    /// without counting as a hydrogen.
    ///
    /// Errors:
    ///
    /// - [`CapacityExceeded`]: the payload did not fully fit. The committed prefix still counted
    ///   as a hydrogen and was taken as part of a molecule before this returned.
    /// - [`Interrupted`]: interrupted while waiting for a hydrogen slot (nothing committed), or
    ///   while waiting for the molecule to be taken (the hydrogen remains in the molecule).
    /// - [`Fault`]: the payload could not be copied out of `payload`. Nothing was committed.
    pub fn submit_hydrogen<S>(&self, payload: &S, interrupt: &Interrupt) -> Result<usize, Error>
    where
        S: ByteSource + ?Sized,
    {
        self.0.submit_hydrogen(payload, interrupt)
    }

    /// Request an oxygen, blocking until a molecule is ready and taking it
    ///
    /// Returns the molecule: the two hydrogen payloads concatenated, oldest first, truncated to
    /// `max_len`. Truncated bytes are discarded along with the rest of the molecule. A `max_len`
    /// of 0 returns an empty molecule immediately without taking anything.
    ///
    /// Errors with [`Interrupted`] if interrupted before a molecule was ready, in which case
    /// nothing was taken.
    pub fn request_oxygen(&self, max_len: usize, interrupt: &Interrupt) -> Result<Bytes, Error> {
        self.0.request_oxygen(max_len, interrupt)
    }

    /// Like [`request_oxygen`](Self::request_oxygen) with `max_len` being `dst.len()`, but
    /// copies the molecule into `dst`
    ///
    /// Returns the number of bytes copied. The copy happens after the engine lock is released.
    /// If it errors with [`Fault`], the molecule was still taken, and the bytes before the fault
    /// offset were copied.
    pub fn request_oxygen_into<K>(&self, dst: &mut K, interrupt: &Interrupt) -> Result<usize, Error>
    where
        K: ByteSink + ?Sized,
    {
        self.0.request_oxygen_into(dst, interrupt)
    }

    /// Read the counters
    pub fn snapshot(&self) -> Snapshot {
        self.0.snapshot()
    }

    /// Submit a hydrogen from async code
    ///
    /// The blocking call runs on tokio's blocking thread pool. Dropping the returned future
    /// before it resolves interrupts the call.
    ///
    /// Panics if called outside the context of a tokio runtime.
    pub fn submit_hydrogen_async(&self, payload: impl Into<Bytes>) -> HydrogenFut {
        let payload = payload.into();
        let engine = self.clone();
        HydrogenFut(Blocking::spawn(move |interrupt| engine.submit_hydrogen(&payload, interrupt)))
    }

    /// Request an oxygen from async code
    ///
    /// The blocking call runs on tokio's blocking thread pool. Dropping the returned future
    /// before it resolves interrupts the call, in which case nothing is taken unless a molecule
    /// was already being taken.
    ///
    /// Panics if called outside the context of a tokio runtime.
    pub fn request_oxygen_async(&self, max_len: usize) -> OxygenFut {
        let engine = self.clone();
        OxygenFut(Blocking::spawn(move |interrupt| engine.request_oxygen(max_len, interrupt)))
    }
}

impl Debug for Engine {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("Engine").field(&self.snapshot()).finish()
    }
}


// future types for engines.
pub(crate) mod future {
    use super::*;
    use crate::util::InterruptOnDrop;
    use std::{
        future::Future,
        panic::resume_unwind,
        pin::Pin,
        task::{Context, Poll},
    };
    use tokio::task::{spawn_blocking, JoinHandle};

    // blocking engine call running on the blocking pool, interrupted if dropped.
    pub(crate) struct Blocking<T> {
        // none once resolved
        join: Option<JoinHandle<Result<T, Error>>>,
        guard: InterruptOnDrop,
    }

    impl<T: Send + 'static> Blocking<T> {
        pub(crate) fn spawn<F>(f: F) -> Self
        where
            F: FnOnce(&Interrupt) -> Result<T, Error> + Send + 'static,
        {
            let interrupt = Interrupt::new();
            let guard = InterruptOnDrop::new(interrupt.clone());
            let join = spawn_blocking(move || f(&interrupt));
            Blocking { join: Some(join), guard }
        }
    }

    impl<T> Blocking<T> {
        fn poll(&mut self, cx: &mut Context) -> Poll<Result<T, Error>> {
            // for implementation of FusedFuture
            let Some(join) = self.join.as_mut() else { return Poll::Pending };
            let result = match Pin::new(join).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(result) => result,
            };
            self.join = None;
            self.guard.disarm();
            Poll::Ready(match result {
                Ok(result) => result,
                Err(e) if e.is_panic() => resume_unwind(e.into_panic()),
                // the runtime is shutting down
                Err(_) => Err(Interrupted.into()),
            })
        }

        fn interrupt(&self) {
            self.guard.interrupt();
        }

        fn is_terminated(&self) -> bool {
            self.join.is_none()
        }
    }

    /// Future for [`Engine::submit_hydrogen_async`]
    ///
    /// Resolves to the same result the blocking call returns. Dropping it before it resolves
    /// interrupts the call.
    pub struct HydrogenFut(pub(super) Blocking<usize>);

    impl HydrogenFut {
        /// Interrupt the call without dropping the future
        ///
        /// The future then resolves with whatever the interrupted call returns, usually
        /// [`Interrupted`].
        pub fn interrupt(&self) {
            self.0.interrupt();
        }

        /// Whether this future has already resolved
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }
    }

    impl Future for HydrogenFut {
        type Output = Result<usize, Error>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            self.get_mut().0.poll(cx)
        }
    }

    #[cfg(feature = "futures")]
    impl futures::future::FusedFuture for HydrogenFut {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }

    /// Future for [`Engine::request_oxygen_async`]
    ///
    /// Resolves to the same result the blocking call returns. Dropping it before it resolves
    /// interrupts the call.
    pub struct OxygenFut(pub(super) Blocking<Bytes>);

    impl OxygenFut {
        /// Interrupt the call without dropping the future
        ///
        /// The future then resolves with whatever the interrupted call returns, usually
        /// [`Interrupted`].
        pub fn interrupt(&self) {
            self.0.interrupt();
        }

        /// Whether this future has already resolved
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }
    }

    impl Future for OxygenFut {
        type Output = Result<Bytes, Error>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            self.get_mut().0.poll(cx)
        }
    }

    #[cfg(feature = "futures")]
    impl futures::future::FusedFuture for OxygenFut {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }
}


// ==== tests ====


#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_pcg::Pcg32;
    use std::{
        thread::{self, JoinHandle},
        time::{Duration, Instant},
    };

    // poll the engine's counters until they satisfy `pred`, or panic after a while
    fn wait_for(engine: &Engine, what: &str, pred: impl Fn(&Snapshot) -> bool) -> Snapshot {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let snapshot = engine.snapshot();
            if pred(&snapshot) {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {}: {:?}", what, snapshot);
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn spawn_write(
        engine: &Engine,
        payload: &'static [u8],
        interrupt: &Interrupt,
    ) -> JoinHandle<Result<usize, Error>> {
        let engine = engine.clone();
        let interrupt = interrupt.clone();
        thread::spawn(move || engine.submit_hydrogen(payload, &interrupt))
    }

    fn spawn_read(
        engine: &Engine,
        max_len: usize,
        interrupt: &Interrupt,
    ) -> JoinHandle<Result<Bytes, Error>> {
        let engine = engine.clone();
        let interrupt = interrupt.clone();
        thread::spawn(move || engine.request_oxygen(max_len, &interrupt))
    }

    // make sure a thread is still blocked after giving it a chance to run
    fn assert_blocked<T>(join: &JoinHandle<T>) {
        thread::sleep(Duration::from_millis(50));
        assert!(!join.is_finished(), "expected thread to still be blocked");
    }

    #[test]
    fn writers_first() {
        let engine = Engine::new(8);
        let never = Interrupt::new();

        let w1 = spawn_write(&engine, b"abc", &never);
        wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        let w2 = spawn_write(&engine, b"def", &never);
        wait_for(&engine, "second hydrogen", |s| s.hydrogens == 2);

        let molecule = engine.request_oxygen(6, &never).unwrap();
        assert_eq!(&molecule[..], b"abcdef");
        let after = engine.snapshot();
        assert_eq!(after.hydrogens, 0);
        assert_eq!(after.oxygens, 0);
        assert_eq!(after.occupancy, 0);
        assert_eq!(after.molecules, 1);

        assert_eq!(w1.join().unwrap(), Ok(3));
        assert_eq!(w2.join().unwrap(), Ok(3));
    }

    #[test]
    fn reader_first() {
        let engine = Engine::new(8);
        let never = Interrupt::new();

        let r = spawn_read(&engine, 4, &never);
        wait_for(&engine, "oxygen waiting", |s| s.oxygens == 1);
        let w1 = spawn_write(&engine, b"gh", &never);
        wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        assert_blocked(&r);
        let w2 = spawn_write(&engine, b"ij", &never);

        assert_eq!(&r.join().unwrap().unwrap()[..], b"ghij");
        assert_eq!(w1.join().unwrap(), Ok(2));
        assert_eq!(w2.join().unwrap(), Ok(2));
        assert_eq!(engine.snapshot().hydrogens, 0);
    }

    #[test]
    fn third_writer_waits_for_next_molecule() {
        let engine = Engine::new(8);
        let never = Interrupt::new();

        let w1 = spawn_write(&engine, b"a", &never);
        wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        let w2 = spawn_write(&engine, b"b", &never);
        wait_for(&engine, "second hydrogen", |s| s.hydrogens == 2);

        let w3 = spawn_write(&engine, b"c", &never);
        assert_blocked(&w3);
        let blocked = engine.snapshot();
        assert_eq!(blocked.hydrogens, 2);
        assert_eq!(blocked.occupancy, 2);

        assert_eq!(&engine.request_oxygen(8, &never).unwrap()[..], b"ab");
        assert_eq!(w1.join().unwrap(), Ok(1));
        assert_eq!(w2.join().unwrap(), Ok(1));

        // the third writer starts the next molecule
        wait_for(&engine, "third hydrogen", |s| s.hydrogens == 1 && s.molecules == 1);
        assert_blocked(&w3);
        let w4 = spawn_write(&engine, b"d", &never);
        assert_eq!(&engine.request_oxygen(8, &never).unwrap()[..], b"cd");
        assert_eq!(w3.join().unwrap(), Ok(1));
        assert_eq!(w4.join().unwrap(), Ok(1));
    }

    #[test]
    fn competing_writers_fill_exactly_two_slots() {
        let engine = Engine::new(64);
        let never = Interrupt::new();

        let writers: Vec<_> = [b"1", b"2", b"3", b"4"]
            .into_iter()
            .map(|payload| spawn_write(&engine, payload, &never))
            .collect();
        wait_for(&engine, "pair", |s| s.hydrogens == 2);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.snapshot().hydrogens, 2);
        assert_eq!(engine.snapshot().occupancy, 2);

        let m1 = engine.request_oxygen(64, &never).unwrap();
        let m2 = engine.request_oxygen(64, &never).unwrap();
        assert_eq!(m1.len(), 2);
        assert_eq!(m2.len(), 2);
        let mut all: Vec<u8> = m1.iter().chain(m2.iter()).copied().collect();
        all.sort();
        assert_eq!(all, b"1234");

        for writer in writers {
            assert_eq!(writer.join().unwrap(), Ok(1));
        }
    }

    #[test]
    fn shared_token_interrupts_every_blocked_call() {
        let engine = Engine::new(8);
        let never = Interrupt::new();
        let signal = Interrupt::new();

        let w1 = spawn_write(&engine, b"a", &never);
        let w2 = spawn_write(&engine, b"b", &never);
        wait_for(&engine, "pair", |s| s.hydrogens == 2);
        // one writer waiting for a slot, and one reader on a second engine, both on one token
        let other = Engine::new(8);
        let w3 = spawn_write(&engine, b"c", &signal);
        let r = spawn_read(&other, 8, &signal);
        wait_for(&other, "oxygen waiting", |s| s.oxygens == 1);
        assert_blocked(&w3);
        let before = engine.snapshot();

        signal.interrupt();
        assert_eq!(w3.join().unwrap(), Err(Interrupted.into()));
        assert_eq!(r.join().unwrap(), Err(Interrupted.into()));
        assert_eq!(engine.snapshot(), before);
        let other_after = other.snapshot();
        assert_eq!(other_after.oxygens, 0);
        assert_eq!(other_after.hydrogens, 0);

        assert_eq!(engine.request_oxygen(8, &never).unwrap().len(), 2);
        w1.join().unwrap().unwrap();
        w2.join().unwrap().unwrap();
    }

    #[test]
    fn shared_token_blocks_two_readers() {
        let engine = Engine::new(8);
        let never = Interrupt::new();
        let signal = Interrupt::new();

        let w1 = spawn_write(&engine, b"x", &never);
        let before = wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        let r1 = spawn_read(&engine, 8, &signal);
        let r2 = spawn_read(&engine, 8, &signal);
        wait_for(&engine, "two oxygens waiting", |s| s.oxygens == 2);

        signal.interrupt();
        assert_eq!(r1.join().unwrap(), Err(Interrupted.into()));
        assert_eq!(r2.join().unwrap(), Err(Interrupted.into()));
        assert_eq!(engine.snapshot(), before);

        let w2 = spawn_write(&engine, b"y", &never);
        assert_eq!(&engine.request_oxygen(8, &never).unwrap()[..], b"xy");
        w1.join().unwrap().unwrap();
        w2.join().unwrap().unwrap();
    }

    #[test]
    fn token_raised_again_after_reset() {
        let engine = Engine::new(8);
        let signal = Interrupt::new();

        let r = spawn_read(&engine, 8, &signal);
        wait_for(&engine, "oxygen waiting", |s| s.oxygens == 1);
        signal.interrupt();
        signal.reset();
        thread::sleep(Duration::from_millis(20));
        // whether or not it saw the first raise, it must see this one
        signal.interrupt();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !r.is_finished() {
            assert!(Instant::now() < deadline, "reader missed the second raise");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(r.join().unwrap(), Err(Interrupted.into()));
        assert_eq!(engine.snapshot().oxygens, 0);

        // the lowered token can be reused
        signal.reset();
        let never = Interrupt::new();
        let w1 = spawn_write(&engine, b"re", &never);
        wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        let w2 = spawn_write(&engine, b"try", &never);
        assert_eq!(&engine.request_oxygen(8, &signal).unwrap()[..], b"retry");
        w1.join().unwrap().unwrap();
        w2.join().unwrap().unwrap();
    }

    #[test]
    fn interrupted_reader_changes_nothing() {
        let engine = Engine::new(8);
        let never = Interrupt::new();
        let signal = Interrupt::new();

        let w1 = spawn_write(&engine, b"xy", &never);
        wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        let r = spawn_read(&engine, 8, &signal);
        let before = wait_for(&engine, "oxygen waiting", |s| s.oxygens == 1);

        signal.interrupt();
        assert_eq!(r.join().unwrap(), Err(Interrupted.into()));
        let after = engine.snapshot();
        assert_eq!(after.hydrogens, before.hydrogens);
        assert_eq!(after.oxygens, 0);
        assert_eq!(after.occupancy, before.occupancy);

        // the engine keeps working
        let w2 = spawn_write(&engine, b"z", &never);
        assert_eq!(&engine.request_oxygen(8, &never).unwrap()[..], b"xyz");
        assert_eq!(w1.join().unwrap(), Ok(2));
        assert_eq!(w2.join().unwrap(), Ok(1));
    }

    #[test]
    fn interrupted_writer_waiting_for_slot_changes_nothing() {
        let engine = Engine::new(8);
        let never = Interrupt::new();
        let signal = Interrupt::new();

        let w1 = spawn_write(&engine, b"a", &never);
        let w2 = spawn_write(&engine, b"b", &never);
        let before = wait_for(&engine, "pair", |s| s.hydrogens == 2);
        let w3 = spawn_write(&engine, b"c", &signal);
        assert_blocked(&w3);

        signal.interrupt();
        assert_eq!(w3.join().unwrap(), Err(Interrupted.into()));
        assert_eq!(engine.snapshot(), before);

        let molecule = engine.request_oxygen(8, &never).unwrap();
        assert_eq!(molecule.len(), 2);
        assert!(!molecule.contains(&b'c'));
        w1.join().unwrap().unwrap();
        w2.join().unwrap().unwrap();
    }

    #[test]
    fn interrupted_writer_leaves_hydrogen_in_molecule() {
        let engine = Engine::new(8);
        let never = Interrupt::new();
        let signal = Interrupt::new();

        let w1 = spawn_write(&engine, b"kept", &signal);
        wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        signal.interrupt();
        assert_eq!(w1.join().unwrap(), Err(Interrupted.into()));
        assert_eq!(engine.snapshot().hydrogens, 1);

        let w2 = spawn_write(&engine, b"!", &never);
        assert_eq!(&engine.request_oxygen(8, &never).unwrap()[..], b"kept!");
        assert_eq!(w2.join().unwrap(), Ok(1));
    }

    #[test]
    fn interrupt_raised_before_call_is_seen_at_first_wait() {
        let engine = Engine::new(8);
        let signal = Interrupt::new();
        signal.interrupt();

        assert_eq!(engine.request_oxygen(8, &signal), Err(Interrupted.into()));
        assert_eq!(engine.snapshot().oxygens, 0);

        // the hydrogen never has to wait for a slot, so it is committed before the interrupt is
        // observed
        assert_eq!(engine.submit_hydrogen(b"q", &signal), Err(Interrupted.into()));
        assert_eq!(engine.snapshot().hydrogens, 1);
        assert_eq!(engine.snapshot().occupancy, 1);
    }

    #[test]
    fn capacity_exceeded_commits_prefix() {
        let engine = Engine::new(8);
        let never = Interrupt::new();

        let w1 = spawn_write(&engine, b"abcde", &never);
        wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        let w2 = spawn_write(&engine, b"fghij", &never);
        wait_for(&engine, "second hydrogen", |s| s.hydrogens == 2);
        assert_eq!(engine.snapshot().occupancy, 8);

        assert_eq!(&engine.request_oxygen(8, &never).unwrap()[..], b"abcdefgh");
        assert_eq!(w1.join().unwrap(), Ok(5));
        let err = w2.join().unwrap().unwrap_err();
        assert_eq!(err, CapacityExceeded { committed: 3, rejected: 2 }.into());
        assert_eq!(err.committed(), 3);
    }

    #[test]
    fn payload_larger_than_capacity() {
        let engine = Engine::new(4);
        let never = Interrupt::new();

        let w1 = spawn_write(&engine, b"0123456789", &never);
        wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        // buffer is already full, so this one commits nothing but still counts
        let w2 = spawn_write(&engine, b"x", &never);
        assert_eq!(&engine.request_oxygen(100, &never).unwrap()[..], b"0123");
        assert_eq!(
            w1.join().unwrap(),
            Err(CapacityExceeded { committed: 4, rejected: 6 }.into()),
        );
        assert_eq!(
            w2.join().unwrap(),
            Err(CapacityExceeded { committed: 0, rejected: 1 }.into()),
        );
    }

    #[test]
    fn truncated_read_discards_rest_of_molecule() {
        let engine = Engine::new(8);
        let never = Interrupt::new();

        let w1 = spawn_write(&engine, b"abc", &never);
        wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        let w2 = spawn_write(&engine, b"def", &never);
        assert_eq!(&engine.request_oxygen(2, &never).unwrap()[..], b"ab");
        assert_eq!(engine.snapshot().occupancy, 0);
        w1.join().unwrap().unwrap();
        w2.join().unwrap().unwrap();
    }

    #[test]
    fn zero_length_calls_are_no_ops() {
        let engine = Engine::new(8);
        let never = Interrupt::new();
        let before = engine.snapshot();

        assert_eq!(engine.submit_hydrogen(b"", &never), Ok(0));
        assert_eq!(engine.request_oxygen(0, &never).map(|b| b.len()), Ok(0));
        assert_eq!(engine.request_oxygen_into(&mut [0u8; 0], &never), Ok(0));
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn request_into_buffer() {
        let engine = Engine::new(8);
        let never = Interrupt::new();

        let w1 = spawn_write(&engine, b"he", &never);
        wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        let w2 = spawn_write(&engine, b"llo", &never);
        let mut buf = [0u8; 16];
        assert_eq!(engine.request_oxygen_into(&mut buf, &never), Ok(5));
        assert_eq!(&buf[..5], b"hello");
        w1.join().unwrap().unwrap();
        w2.join().unwrap().unwrap();
    }

    #[test]
    fn faulted_write_commits_nothing() {
        struct BadAddress;

        impl ByteSource for BadAddress {
            fn len(&self) -> usize {
                4
            }

            fn copy_to(&self, dst: &mut [u8]) -> Result<(), Fault> {
                dst[0] = b'!';
                Err(Fault { offset: 1 })
            }
        }

        let engine = Engine::new(8);
        let before = engine.snapshot();
        assert_eq!(
            engine.submit_hydrogen(&BadAddress, &Interrupt::new()),
            Err(Fault { offset: 1 }.into()),
        );
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn fault_in_rejected_tail_is_reported() {
        // ten bytes, of which only the first six are accessible
        struct ShortMapping;

        impl ByteSource for ShortMapping {
            fn len(&self) -> usize {
                10
            }

            fn copy_to(&self, dst: &mut [u8]) -> Result<(), Fault> {
                let ok = dst.len().min(6);
                dst[..ok].fill(b'a');
                if ok < dst.len() {
                    return Err(Fault { offset: ok });
                }
                Ok(())
            }
        }

        let engine = Engine::new(4);
        let before = engine.snapshot();
        assert_eq!(
            engine.submit_hydrogen(&ShortMapping, &Interrupt::new()),
            Err(Fault { offset: 6 }.into()),
        );
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn config_rejects_zero_capacity() {
        let zero = EngineConfig::new().with_capacity(0);
        assert_eq!(zero.build().err(), Some(ConfigError::ZeroCapacity));
        let engine = EngineConfig::new().build().unwrap();
        assert_eq!(engine.capacity(), DEFAULT_CAPACITY);
        assert_eq!(engine.snapshot().capacity, DEFAULT_CAPACITY);
    }

    // many writers and readers with random payload sizes. every molecule must be two whole
    // payloads back to back, and every payload must end up in exactly one molecule.
    #[test]
    fn stochastic_cycles() {
        const CAPACITY: usize = 16;
        const WRITERS: usize = 4;
        const PER_WRITER: usize = 250;

        let mut rng = Pcg32::from_seed(0xdeadbeefdeadbeefdeadbeefdeadbeefu128.to_le_bytes());
        let engine = Engine::new(CAPACITY);

        // payload = [writer, seq, filler...], at most CAPACITY / 2 so nothing is ever rejected
        let plans: Vec<Vec<Vec<u8>>> = (0..WRITERS)
            .map(|w| {
                (0..PER_WRITER)
                    .map(|seq| {
                        let len = rng.gen_range(2..=CAPACITY / 2);
                        let mut payload = vec![w as u8, seq as u8];
                        payload.resize(len, b'.');
                        payload
                    })
                    .collect()
            })
            .collect();

        let writers: Vec<_> = plans
            .clone()
            .into_iter()
            .map(|plan| {
                let engine = engine.clone();
                thread::spawn(move || {
                    let never = Interrupt::new();
                    for payload in plan {
                        assert_eq!(engine.submit_hydrogen(&payload, &never), Ok(payload.len()));
                        assert!(engine.snapshot().occupancy <= CAPACITY);
                    }
                })
            })
            .collect();

        let molecules = WRITERS * PER_WRITER / 2;
        let readers: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || {
                    let never = Interrupt::new();
                    (0..molecules / 2)
                        .map(|_| engine.request_oxygen(CAPACITY, &never).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        let mut seen = vec![vec![false; PER_WRITER]; WRITERS];
        for reader in readers {
            for molecule in reader.join().unwrap() {
                // split the molecule back into its two payloads using the plans
                let mut rest = &molecule[..];
                for _ in 0..2 {
                    let (w, seq) = (rest[0] as usize, rest[1] as usize);
                    let payload = &plans[w][seq];
                    assert_eq!(&rest[..payload.len()], &payload[..]);
                    assert!(!seen[w][seq], "payload delivered twice");
                    seen[w][seq] = true;
                    rest = &rest[payload.len()..];
                }
                assert!(rest.is_empty());
            }
        }
        assert!(seen.iter().flatten().all(|&s| s));

        let end = engine.snapshot();
        assert_eq!(end.hydrogens, 0);
        assert_eq!(end.occupancy, 0);
        assert_eq!(end.molecules, molecules as u64);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn async_round_trip() {
        let engine = Engine::new(8);
        let oxygen = engine.request_oxygen_async(8);
        let h1 = engine.submit_hydrogen_async(&b"as"[..]);
        wait_for(&engine, "first hydrogen", |s| s.hydrogens == 1);
        let h2 = engine.submit_hydrogen_async(&b"ync"[..]);

        assert_eq!(&oxygen.await.unwrap()[..], b"async");
        assert_eq!(h1.await, Ok(2));
        assert_eq!(h2.await, Ok(3));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropping_async_request_interrupts_it() {
        let engine = Engine::new(8);
        let oxygen = engine.request_oxygen_async(8);
        wait_for(&engine, "oxygen waiting", |s| s.oxygens == 1);
        drop(oxygen);
        wait_for(&engine, "oxygen gone", |s| s.oxygens == 0);
        assert_eq!(engine.snapshot().hydrogens, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interrupting_async_request() {
        let engine = Engine::new(8);
        let mut oxygen = engine.request_oxygen_async(8);
        wait_for(&engine, "oxygen waiting", |s| s.oxygens == 1);
        oxygen.interrupt();
        assert_eq!((&mut oxygen).await, Err(Interrupted.into()));
        assert!(oxygen.is_terminated());
    }
}

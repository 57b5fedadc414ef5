// participant counters for the 2:1 ratio.

/// Hydrogens needed to form a molecule.
pub(crate) const HYDROGENS_PER_MOLECULE: u8 = 2;


/// Pending-hydrogen and pending-oxygen counters
///
/// Only mutated under the engine lock.
#[derive(Debug, Default)]
pub(crate) struct ParticipantCounts {
    // invariant: hydrogens <= HYDROGENS_PER_MOLECULE
    hydrogens: u8,
    // readers currently waiting or assembling
    oxygens: usize,
}

impl ParticipantCounts {
    pub(crate) fn hydrogens(&self) -> u8 {
        self.hydrogens
    }

    pub(crate) fn oxygens(&self) -> usize {
        self.oxygens
    }

    /// Whether the pending molecule already has all its hydrogens, so further writers must wait.
    pub(crate) fn slots_full(&self) -> bool {
        self.hydrogens == HYDROGENS_PER_MOLECULE
    }

    /// Whether an oxygen request can take the pending molecule.
    pub(crate) fn pair_ready(&self) -> bool {
        self.hydrogens == HYDROGENS_PER_MOLECULE
    }

    /// Count one more hydrogen. Returns true if this completed the pair.
    ///
    /// Panics if the pair was already complete.
    pub(crate) fn add_hydrogen(&mut self) -> bool {
        assert!(!self.slots_full(), "hydrogen added to complete pair (internal bug)");
        self.hydrogens += 1;
        self.pair_ready()
    }

    pub(crate) fn enter_oxygen(&mut self) {
        self.oxygens += 1;
    }

    /// Undo `enter_oxygen` for a request that gave up before taking a pair.
    pub(crate) fn leave_oxygen(&mut self) {
        debug_assert!(self.oxygens > 0);
        self.oxygens -= 1;
    }

    /// Retire a complete pair and the oxygen request that took it.
    ///
    /// Panics if the pair is not complete.
    pub(crate) fn consume_pair(&mut self) {
        assert!(self.pair_ready(), "pair consumed before complete (internal bug)");
        self.hydrogens -= HYDROGENS_PER_MOLECULE;
        self.leave_oxygen();
    }
}

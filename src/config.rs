//! Detector configuration.
//!
//! A plain struct with a builder-lite API, matching `samply`'s
//! `shared/prop_types.rs` structs (e.g. `RecordingProps`): `Default` plus
//! `with_*` setters that consume and return `Self`. No environment
//! variables are read (spec §6: "Environment variables: none required").

/// How many bytes of address space share one [`crate::access_history::AccessHistory`]
/// cell. See spec §3 ShadowMemory and §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// One cell per byte.
    Byte,
    /// One cell per aligned 4-byte word.
    Word,
    /// One cell per aligned 8-byte longword.
    LongWord,
}

impl Granularity {
    /// Number of low address bits masked to zero for this granularity.
    pub fn low_zero_bits(self) -> u32 {
        match self {
            Granularity::Byte => 0,
            Granularity::Word => 2,
            Granularity::LongWord => 3,
        }
    }
}

/// Upper bound on the number of locks a [`crate::lockset::Lockset`] can hold
/// at once (spec §3, §4.3): four is sufficient for the nesting depths these
/// task-based runtimes exhibit in practice.
pub const MAX_LOCKSET_SIZE: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Bits of a virtual address used to index the first-level shadow page
    /// table (spec §4.6).
    pub l1_bits: u32,
    /// Bits used to index the second-level (leaf) shadow page table.
    pub l2_bits: u32,
    /// Number of effective virtual address bits (48 on x86-64/AArch64).
    pub addr_bits: u32,
    /// Shadow memory cell granularity.
    pub granularity: Granularity,
    /// Abort the process as soon as the first race is reported (spec §5
    /// "Cancellation"). When false (the default) detection continues and
    /// the caller observes races via the reporting callback.
    pub abort_on_first_race: bool,
    /// Skip checks for reads classified as thread-private below the
    /// current exit frame (spec §4.5 step 4, §9 performance note).
    pub filter_thread_private_reads: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            l1_bits: 16,
            l2_bits: 16,
            addr_bits: 48,
            granularity: Granularity::Byte,
            abort_on_first_race: false,
            filter_thread_private_reads: true,
        }
    }
}

impl DetectorConfig {
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_abort_on_first_race(mut self, abort: bool) -> Self {
        self.abort_on_first_race = abort;
        self
    }

    pub fn with_page_table_bits(mut self, l1_bits: u32, l2_bits: u32) -> Self {
        self.l1_bits = l1_bits;
        self.l2_bits = l2_bits;
        self
    }

    pub fn with_filter_thread_private_reads(mut self, filter: bool) -> Self {
        self.filter_thread_private_reads = filter;
        self
    }
}

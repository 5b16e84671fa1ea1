//! C6: `ShadowMemory` — the two-level sparse page table mapping a
//! program address to its [`AccessHistory`] cell.
//!
//! `RompLib/include/ShadowMemory.h` sketches exactly this two-level
//! `_pageTable[l1][l2] -> leaf page` shape, but its `getOrCreatePageForMemAddr`,
//! `_getShadowPage`, and `_saveShadowPage` are all `//TODO` stubs — per
//! spec §9's open-questions note ("the source contains multiple
//! half-written variants of `ShadowMemory`"), this module is the
//! completed design spec §4.6 specifies: lock-free CAS publication of
//! both table levels, with a thread-local free-cache of spare pages so a
//! thread that loses the install race doesn't need to hit the allocator
//! again on its next page fault.

use std::cell::RefCell;
use std::sync::atomic::{AtomicPtr, Ordering};

use parking_lot::Mutex;

use crate::access_history::AccessHistory;
use crate::config::{DetectorConfig, Granularity};
use crate::error::fatal;

struct LeafPage {
    cells: Vec<Mutex<AccessHistory>>,
}

impl LeafPage {
    fn new(num_entries: usize) -> Box<Self> {
        let mut cells = Vec::with_capacity(num_entries);
        cells.resize_with(num_entries, || Mutex::new(AccessHistory::new()));
        Box::new(LeafPage { cells })
    }
}

struct L2Table {
    slots: Vec<AtomicPtr<LeafPage>>,
}

impl L2Table {
    fn new(num_entries: usize) -> Box<Self> {
        let mut slots = Vec::with_capacity(num_entries);
        slots.resize_with(num_entries, || AtomicPtr::new(std::ptr::null_mut()));
        Box::new(L2Table { slots })
    }
}

thread_local! {
    static FREE_L2: RefCell<Vec<Box<L2Table>>> = RefCell::new(Vec::new());
    static FREE_LEAF: RefCell<Vec<Box<LeafPage>>> = RefCell::new(Vec::new());
}

/// Two-level sparse page table over effective virtual addresses (spec
/// §3/§4.6). `l1` is a fixed-size array of pointers to [`L2Table`]s; each
/// `L2Table` is itself a fixed-size array of pointers to [`LeafPage`]s,
/// the latter holding one [`AccessHistory`] per granularity chunk.
pub struct ShadowMemory {
    l1: Vec<AtomicPtr<L2Table>>,
    l1_shift: u32,
    l2_shift: u32,
    l2_mask: u64,
    page_offset_mask: u64,
    offset_shift: u32,
    num_l2_entries: usize,
    num_entries_per_page: usize,
}

impl ShadowMemory {
    /// Spec §4.6 `newShadow(l1Bits, l2Bits, addrBits, granularity)`.
    pub fn new(config: &DetectorConfig) -> Self {
        let DetectorConfig {
            l1_bits,
            l2_bits,
            addr_bits,
            granularity,
            ..
        } = *config;
        if l1_bits + l2_bits >= addr_bits {
            fatal(format!(
                "l1_bits ({l1_bits}) + l2_bits ({l2_bits}) must leave room for a page offset \
                 within addr_bits ({addr_bits})"
            ));
        }
        let low_zero_bits = granularity.low_zero_bits();
        let remaining_bits = addr_bits - l1_bits - l2_bits;
        let shadow_page_bits = remaining_bits - low_zero_bits;
        let num_entries_per_page = 1usize << shadow_page_bits;
        let page_offset_mask = gen_offset_mask(remaining_bits as u64, low_zero_bits as u64);

        let num_l1_entries = 1usize << l1_bits;
        let num_l2_entries = 1usize << l2_bits;

        let mut l1 = Vec::with_capacity(num_l1_entries);
        l1.resize_with(num_l1_entries, || AtomicPtr::new(std::ptr::null_mut()));

        ShadowMemory {
            l1,
            l1_shift: l2_bits + remaining_bits,
            l2_shift: remaining_bits,
            l2_mask: (num_l2_entries as u64) - 1,
            page_offset_mask,
            offset_shift: low_zero_bits,
            num_l2_entries,
            num_entries_per_page,
        }
    }

    pub fn num_entries_per_page(&self) -> usize {
        self.num_entries_per_page
    }

    fn page_offset(&self, addr: u64) -> usize {
        ((addr & self.page_offset_mask) >> self.offset_shift) as usize
    }

    /// Spec §4.6 `getOrCreate(addr)`: install any missing table levels via
    /// single-CAS publish, pulling fresh pages from the calling thread's
    /// free-cache before falling back to the allocator.
    pub fn get_or_create(&self, addr: u64) -> &Mutex<AccessHistory> {
        let i1 = (addr >> self.l1_shift) as usize;
        let l2 = self.get_or_install_l2(i1);

        let i2 = ((addr >> self.l2_shift) & self.l2_mask) as usize;
        let leaf = self.get_or_install_leaf(l2, i2);

        let offset = self.page_offset(addr);
        &leaf.cells[offset]
    }

    /// Spec §4.6 `getAllocated(addr)`: read-only traversal, returns `None`
    /// if any intermediate slot is absent.
    pub fn get_allocated(&self, addr: u64) -> Option<&Mutex<AccessHistory>> {
        let i1 = (addr >> self.l1_shift) as usize;
        let l2_ptr = self.l1[i1].load(Ordering::Acquire);
        if l2_ptr.is_null() {
            return None;
        }
        let l2 = unsafe { &*l2_ptr };

        let i2 = ((addr >> self.l2_shift) & self.l2_mask) as usize;
        let leaf_ptr = l2.slots[i2].load(Ordering::Acquire);
        if leaf_ptr.is_null() {
            return None;
        }
        let leaf = unsafe { &*leaf_ptr };
        let offset = self.page_offset(addr);
        Some(&leaf.cells[offset])
    }

    fn get_or_install_l2(&self, i1: usize) -> &L2Table {
        let slot = &self.l1[i1];
        let existing = slot.load(Ordering::Acquire);
        if !existing.is_null() {
            return unsafe { &*existing };
        }

        let candidate = FREE_L2.with(|cache| cache.borrow_mut().pop())
            .unwrap_or_else(|| L2Table::new(self.num_l2_entries));
        let candidate_ptr = Box::into_raw(candidate);

        match slot.compare_exchange(
            std::ptr::null_mut(),
            candidate_ptr,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => unsafe { &*candidate_ptr },
            Err(winner) => {
                // Lost the race: reclaim our candidate into the free-cache
                // for next time instead of dropping the allocation.
                let reclaimed = unsafe { Box::from_raw(candidate_ptr) };
                FREE_L2.with(|cache| cache.borrow_mut().push(reclaimed));
                unsafe { &*winner }
            }
        }
    }

    fn get_or_install_leaf<'a>(&self, l2: &'a L2Table, i2: usize) -> &'a LeafPage {
        let slot = &l2.slots[i2];
        let existing = slot.load(Ordering::Acquire);
        if !existing.is_null() {
            return unsafe { &*existing };
        }

        let candidate = FREE_LEAF
            .with(|cache| cache.borrow_mut().pop())
            .unwrap_or_else(|| LeafPage::new(self.num_entries_per_page));
        let candidate_ptr = Box::into_raw(candidate);

        match slot.compare_exchange(
            std::ptr::null_mut(),
            candidate_ptr,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => unsafe { &*candidate_ptr },
            Err(winner) => {
                let reclaimed = unsafe { Box::from_raw(candidate_ptr) };
                FREE_LEAF.with(|cache| cache.borrow_mut().push(reclaimed));
                unsafe { &*winner }
            }
        }
    }
}

impl Drop for ShadowMemory {
    fn drop(&mut self) {
        for slot in &self.l1 {
            let l2_ptr = slot.load(Ordering::Acquire);
            if l2_ptr.is_null() {
                continue;
            }
            let l2 = unsafe { Box::from_raw(l2_ptr) };
            for leaf_slot in &l2.slots {
                let leaf_ptr = leaf_slot.load(Ordering::Acquire);
                if !leaf_ptr.is_null() {
                    unsafe { drop(Box::from_raw(leaf_ptr)) };
                }
            }
        }
    }
}

fn gen_offset_mask(num_bits: u64, low_zeros: u64) -> u64 {
    (1u64 << num_bits) - (1u64 << low_zeros)
}

/// Byte/word/longword granularity is modeled purely through
/// [`Granularity::low_zero_bits`]; re-exported here so callers configuring
/// a `ShadowMemory` don't need a second import.
pub use crate::config::Granularity as ShadowGranularity;

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> DetectorConfig {
        DetectorConfig::default().with_page_table_bits(4, 4)
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let sm = ShadowMemory::new(&small_config());
        let a = sm.get_or_create(0x1000) as *const _;
        let b = sm.get_or_create(0x1000) as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_addresses_in_same_page_share_the_page_but_not_the_cell() {
        let sm = ShadowMemory::new(&small_config());
        let a = sm.get_or_create(0x2000) as *const _;
        let b = sm.get_or_create(0x2001) as *const _;
        assert_ne!(a, b);
    }

    #[test]
    fn get_allocated_is_read_only() {
        let sm = ShadowMemory::new(&small_config());
        assert!(sm.get_allocated(0x3000).is_none());
        sm.get_or_create(0x3000);
        assert!(sm.get_allocated(0x3000).is_some());
    }

    #[test]
    fn word_granularity_merges_aligned_bytes() {
        let cfg = small_config().with_granularity(Granularity::Word);
        let sm = ShadowMemory::new(&cfg);
        let a = sm.get_or_create(0x4000) as *const _;
        let b = sm.get_or_create(0x4003) as *const _;
        assert_eq!(a, b);
    }
}

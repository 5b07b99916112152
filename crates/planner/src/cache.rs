//! Open-addressed memoization table for planning decisions.
//!
//! The table maps problem signatures to `(search flags, solver index)`
//! records using double hashing: the probe position and stride come from
//! independent words of the signature, so no chaining memory is needed.
//! Entries that share a signature but are not ordered under the subsumption
//! relation coexist on the same probe chain.

use crate::fingerprint::Signature;
use crate::flags::{Amnesia, SearchFlags};

/// What a cache entry records for a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Index of the winning solver in the registry.
    Solver(u32),
    /// No registered solver could build a plan at this flags level.
    Infeasible,
}

impl Slot {
    fn wire(self) -> i32 {
        match self {
            Slot::Solver(i) => i as i32,
            Slot::Infeasible => -1,
        }
    }

    fn from_wire(v: i32) -> Slot {
        if v < 0 {
            Slot::Infeasible
        } else {
            Slot::Solver(v as u32)
        }
    }
}

/// A successful lookup, copied out of the table.
#[derive(Debug, Clone, Copy)]
pub struct CacheEntry {
    pub flags: SearchFlags,
    pub slot: Slot,
}

#[derive(Clone, Copy)]
struct Cell {
    sig: Signature,
    flags: SearchFlags,
    slv: i32,
}

const EMPTY: Cell = Cell {
    sig: Signature([0; 4]),
    flags: SearchFlags::empty(),
    slv: -1,
};

impl Cell {
    fn live(&self) -> bool {
        self.flags.contains(SearchFlags::VALID)
    }
}

/// Lookup/insert/rehash counters, mostly for tests and debug logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
    pub inserts: u64,
    pub rehashes: u64,
}

pub struct SolutionCache {
    cells: Vec<Cell>,
    len: usize,
    stats: CacheStats,
}

impl SolutionCache {
    pub fn new() -> SolutionCache {
        let mut cache = SolutionCache {
            cells: Vec::new(),
            len: 0,
            stats: CacheStats::default(),
        };
        cache.rehash(nextsz(0));
        cache.stats.rehashes = 0;
        cache
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current table size; prime, and strictly larger than `len`.
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Find an entry for `sig` whose flags are ordered with respect to
    /// `flags`. Unordered entries on the chain are skipped, not trusted.
    pub fn lookup(&mut self, sig: &Signature, flags: SearchFlags) -> Option<CacheEntry> {
        self.stats.lookups += 1;
        let pos = self.lookup_pos(sig, flags)?;
        self.stats.hits += 1;
        let cell = &self.cells[pos];
        Some(CacheEntry {
            flags: cell.flags.remove(SearchFlags::VALID),
            slot: Slot::from_wire(cell.slv),
        })
    }

    /// Record a decision.
    ///
    /// If an ordered entry already exists: a dominating (at least as
    /// thorough) new record overwrites it, a dominated one is a no-op.
    /// Either way a retention marker on the losing side is merged into the
    /// survivor rather than lost.
    pub fn insert(&mut self, sig: Signature, flags: SearchFlags, slot: Slot) {
        self.stats.inserts += 1;
        if let Some(pos) = self.lookup_pos(&sig, flags) {
            let existing = self.cells[pos];
            if flags.subsumes(existing.flags) {
                let merged = merge_retention(flags, existing.flags);
                self.cells[pos] = Cell {
                    sig,
                    flags: merged | SearchFlags::VALID,
                    slv: slot.wire(),
                };
            } else {
                self.cells[pos].flags = merge_retention(existing.flags, flags);
            }
            return;
        }

        self.len += 1;
        self.grow();
        let pos = self.free_slot(&sig);
        self.cells[pos] = Cell {
            sig,
            flags: flags | SearchFlags::VALID,
            slv: slot.wire(),
        };
    }

    /// Bulk eviction.
    ///
    /// Two passes: retention markers of dominated duplicates are first
    /// merged into their dominating entries, then entries are dropped
    /// according to the amnesia level, and the table is rehashed to its new
    /// minimal size.
    pub fn forget(&mut self, amnesia: Amnesia) {
        if amnesia != Amnesia::Everything {
            self.consolidate_retention();
        }
        for cell in &mut self.cells {
            if !cell.live() {
                continue;
            }
            let keep =
                amnesia == Amnesia::NonRetained && cell.flags.contains(SearchFlags::BLESSING);
            if !keep {
                *cell = EMPTY;
                self.len -= 1;
            }
        }
        // Always rehash after deletions to keep probe chains short.
        self.rehash(nextsz(self.len));
    }

    /// Entries that the wisdom codec should emit.
    pub(crate) fn retained(&self) -> impl Iterator<Item = (Signature, SearchFlags, u32)> + '_ {
        self.cells.iter().filter_map(|c| {
            if c.live() && c.flags.contains(SearchFlags::BLESSING) && c.slv >= 0 {
                Some((c.sig, c.flags.remove(SearchFlags::VALID), c.slv as u32))
            } else {
                None
            }
        })
    }

    /// All live entries, for tests and debugging.
    pub fn entries(&self) -> Vec<(Signature, SearchFlags, Slot)> {
        self.cells
            .iter()
            .filter(|c| c.live())
            .map(|c| {
                (
                    c.sig,
                    c.flags.remove(SearchFlags::VALID),
                    Slot::from_wire(c.slv),
                )
            })
            .collect()
    }

    /// Merge retention markers of subsumed duplicates into the entries that
    /// dominate them, and clear the markers on the losers.
    pub(crate) fn consolidate_retention(&mut self) {
        let size = self.cells.len();
        for h in 0..size {
            if !self.cells[h].live() {
                continue;
            }
            let sig = self.cells[h].sig;
            let d = sig.h2(size);
            let mut g = (h + d) % size;
            while g != h {
                let m = self.cells[g];
                if !m.live() {
                    break;
                }
                if m.sig == sig && self.cells[h].flags.subsumes(m.flags) {
                    self.cells[h].flags = merge_retention(self.cells[h].flags, m.flags);
                    self.cells[g].flags = self.cells[g].flags.remove(SearchFlags::BLESSING);
                }
                g = (g + d) % size;
            }
        }
    }

    fn lookup_pos(&self, sig: &Signature, flags: SearchFlags) -> Option<usize> {
        let size = self.cells.len();
        let d = sig.h2(size);
        let mut g = sig.h1(size);
        for _ in 0..size {
            let cell = &self.cells[g];
            if !cell.live() {
                return None;
            }
            if cell.sig == *sig && cell.flags.ordered(flags) {
                return Some(g);
            }
            g = (g + d) % size;
        }
        None
    }

    fn free_slot(&self, sig: &Signature) -> usize {
        let size = self.cells.len();
        let d = sig.h2(size);
        let mut g = sig.h1(size);
        loop {
            if !self.cells[g].live() {
                return g;
            }
            g = (g + d) % size;
        }
    }

    fn grow(&mut self) {
        if minsz(self.len) >= self.cells.len() {
            self.rehash(nextsz(self.len));
        }
    }

    fn rehash(&mut self, nsiz: usize) {
        let nsiz = next_prime(nsiz.max(2));
        let old = std::mem::replace(&mut self.cells, vec![EMPTY; nsiz]);
        self.stats.rehashes += 1;
        for cell in old {
            if cell.live() {
                let pos = self.free_slot(&cell.sig);
                self.cells[pos] = cell;
            }
        }
    }
}

impl Default for SolutionCache {
    fn default() -> SolutionCache {
        SolutionCache::new()
    }
}

fn merge_retention(dst: SearchFlags, src: SearchFlags) -> SearchFlags {
    if src.contains(SearchFlags::BLESSING) {
        dst | SearchFlags::BLESSING
    } else {
        dst
    }
}

/// Smallest table size that holds `nelem` entries with headroom.
fn minsz(nelem: usize) -> usize {
    1 + nelem + nelem / 8
}

fn nextsz(nelem: usize) -> usize {
    minsz(minsz(nelem))
}

fn first_divisor(n: usize) -> usize {
    if n <= 1 {
        return n;
    }
    if n % 2 == 0 {
        return 2;
    }
    let mut i = 3;
    while i * i <= n {
        if n % i == 0 {
            return i;
        }
        i += 2;
    }
    n
}

fn is_prime(n: usize) -> bool {
    n > 1 && first_divisor(n) == n
}

fn next_prime(mut n: usize) -> usize {
    while !is_prime(n) {
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::Patience;

    fn sig(seed: u64) -> Signature {
        let mut fp = crate::fingerprint::Fingerprinter::new();
        fp.add_u64(seed);
        fp.finish()
    }

    #[test]
    fn next_prime_basics() {
        assert_eq!(next_prime(2), 2);
        assert_eq!(next_prime(8), 11);
        assert_eq!(next_prime(14), 17);
        assert!(is_prime(4099));
    }

    #[test]
    fn insert_then_lookup() {
        let mut cache = SolutionCache::new();
        let f = Patience::Measure.search_flags();
        cache.insert(sig(1), f, Slot::Solver(3));
        let hit = cache.lookup(&sig(1), f).expect("hit");
        assert_eq!(hit.slot, Slot::Solver(3));
        assert!(cache.lookup(&sig(2), f).is_none());
    }

    #[test]
    fn thorough_entry_serves_weaker_request() {
        let mut cache = SolutionCache::new();
        cache.insert(sig(7), Patience::Exhaustive.search_flags(), Slot::Solver(1));
        for level in Patience::LADDER {
            let hit = cache.lookup(&sig(7), level.search_flags()).expect("hit");
            assert!(hit.flags.subsumes(level.search_flags()));
        }
    }

    #[test]
    fn dominated_insert_is_a_noop_but_transfers_blessing() {
        let mut cache = SolutionCache::new();
        let thorough = Patience::Thorough.search_flags();
        let quick = Patience::Estimate.search_flags();
        cache.insert(sig(9), thorough, Slot::Solver(2));
        cache.insert(sig(9), quick | SearchFlags::BLESSING, Slot::Solver(5));
        assert_eq!(cache.len(), 1);

        let hit = cache.lookup(&sig(9), thorough).expect("hit");
        assert_eq!(hit.slot, Slot::Solver(2), "dominating entry untouched");
        assert!(hit.flags.contains(SearchFlags::BLESSING), "blessing merged");
    }

    #[test]
    fn dominating_insert_overwrites_and_keeps_blessing() {
        let mut cache = SolutionCache::new();
        let quick = Patience::Estimate.search_flags();
        let thorough = Patience::Thorough.search_flags();
        cache.insert(sig(4), quick | SearchFlags::BLESSING, Slot::Solver(1));
        cache.insert(sig(4), thorough, Slot::Solver(8));
        assert_eq!(cache.len(), 1);

        let hit = cache.lookup(&sig(4), thorough).expect("hit");
        assert_eq!(hit.slot, Slot::Solver(8));
        assert!(hit.flags.contains(SearchFlags::BLESSING));
    }

    #[test]
    fn unordered_entries_coexist() {
        // Two records whose impatience sets are incomparable neither serve
        // nor displace each other; they share a probe chain.
        let f1 = SearchFlags::ESTIMATE | SearchFlags::NO_EXHAUSTIVE;
        let f2 = SearchFlags::NO_DEEP | SearchFlags::NO_EXHAUSTIVE;
        assert!(!f1.ordered(f2));

        let mut cache = SolutionCache::new();
        cache.insert(sig(11), f1, Slot::Solver(0));
        cache.insert(sig(11), f2, Slot::Solver(1));
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.lookup(&sig(11), f1).map(|e| e.flags.impatience()),
            Some(f1.impatience())
        );
        assert_eq!(
            cache.lookup(&sig(11), f2).map(|e| e.flags.impatience()),
            Some(f2.impatience())
        );
    }

    #[test]
    fn negative_entries_round_trip() {
        let mut cache = SolutionCache::new();
        let f = Patience::Measure.search_flags();
        cache.insert(sig(13), f, Slot::Infeasible);
        assert_eq!(cache.lookup(&sig(13), f).map(|e| e.slot), Some(Slot::Infeasible));
    }

    #[test]
    fn forget_everything_clears_the_table() {
        let mut cache = SolutionCache::new();
        let f = Patience::Measure.search_flags();
        for i in 0..100 {
            cache.insert(sig(i), f | SearchFlags::BLESSING, Slot::Solver(i as u32));
        }
        cache.forget(Amnesia::Everything);
        assert!(cache.is_empty());
        assert!(cache.lookup(&sig(0), f).is_none());
    }

    #[test]
    fn forget_non_retained_keeps_blessed_entries() {
        let mut cache = SolutionCache::new();
        let f = Patience::Measure.search_flags();
        for i in 0..50 {
            let flags = if i % 5 == 0 {
                f | SearchFlags::BLESSING
            } else {
                f
            };
            cache.insert(sig(i), flags, Slot::Solver(i as u32));
        }
        cache.forget(Amnesia::NonRetained);
        assert_eq!(cache.len(), 10);
        for i in 0..50 {
            let hit = cache.lookup(&sig(i), f);
            assert_eq!(hit.is_some(), i % 5 == 0, "entry {i}");
        }
    }

    #[test]
    fn forget_transfers_blessing_from_dominated_duplicate() {
        let mut cache = SolutionCache::new();
        let quick = Patience::Estimate.search_flags();
        let meas = Patience::Measure.search_flags();
        // Same solver recorded at two comparable levels; only the weaker
        // one is blessed. The dominating record must inherit the marker.
        cache.insert(sig(21), meas, Slot::Solver(4));
        cache.insert(sig(21), quick | SearchFlags::BLESSING, Slot::Solver(4));
        assert_eq!(cache.len(), 1);
        cache.forget(Amnesia::NonRetained);
        let hit = cache.lookup(&sig(21), meas).expect("survived");
        assert_eq!(hit.slot, Slot::Solver(4));
    }

    #[test]
    fn consolidate_unblesses_shadowed_duplicates() {
        // Two unordered records, then a third that dominates both. The
        // forget pass must funnel the surviving blessing into the
        // dominating record before deleting anything.
        let f1 = SearchFlags::ESTIMATE | SearchFlags::NO_EXHAUSTIVE;
        let f2 = SearchFlags::NO_DEEP | SearchFlags::NO_EXHAUSTIVE;
        let top = SearchFlags::NO_EXHAUSTIVE;

        let mut cache = SolutionCache::new();
        cache.insert(sig(31), f1, Slot::Solver(1));
        cache.insert(sig(31), f2 | SearchFlags::BLESSING, Slot::Solver(2));
        cache.insert(sig(31), top, Slot::Solver(3));
        cache.forget(Amnesia::NonRetained);

        assert_eq!(cache.len(), 1);
        let hit = cache.lookup(&sig(31), top).expect("dominating entry retained");
        assert_eq!(hit.slot, Slot::Solver(3));
        assert!(hit.flags.contains(SearchFlags::BLESSING));
    }

    #[test]
    fn growth_keeps_every_entry_reachable() {
        let mut cache = SolutionCache::new();
        let f = Patience::Measure.search_flags();
        for i in 0..1000 {
            cache.insert(sig(i), f, Slot::Solver((i % 7) as u32));
        }
        assert_eq!(cache.len(), 1000);
        assert!(cache.capacity() > 1000);
        for i in 0..1000 {
            let hit = cache.lookup(&sig(i), f).expect("reachable after rehash");
            assert_eq!(hit.slot, Slot::Solver((i % 7) as u32));
        }
    }

    #[test]
    fn shrink_after_forget() {
        let mut cache = SolutionCache::new();
        let f = Patience::Measure.search_flags();
        for i in 0..1000 {
            cache.insert(sig(i), f, Slot::Solver(0));
        }
        let grown = cache.capacity();
        cache.forget(Amnesia::Everything);
        assert!(cache.capacity() < grown);
    }
}

//! Patience levels and the search-flag subsumption algebra.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// How hard the planner works for one request.
///
/// Levels escalate from cheap heuristics to an unrestricted search; each
/// level's search flags subsume those of every less thorough level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Patience {
    /// Rank candidates by operation counts only; never runs a measurement.
    Estimate,
    /// Measure the candidates a shallow search produces.
    #[default]
    Measure,
    /// Widen the decomposition search before measuring.
    Thorough,
    /// Try everything, including known-slow candidates.
    Exhaustive,
}

impl Patience {
    /// The escalation order used by the incremental-patience driver.
    pub const LADDER: [Patience; 4] = [
        Patience::Estimate,
        Patience::Measure,
        Patience::Thorough,
        Patience::Exhaustive,
    ];

    /// Search flags requesting exactly this level of effort.
    pub fn search_flags(self) -> SearchFlags {
        match self {
            Patience::Estimate => {
                SearchFlags::ESTIMATE
                    | SearchFlags::NO_DEEP
                    | SearchFlags::NO_SLOW
                    | SearchFlags::NO_EXHAUSTIVE
            }
            Patience::Measure => {
                SearchFlags::NO_DEEP | SearchFlags::NO_SLOW | SearchFlags::NO_EXHAUSTIVE
            }
            Patience::Thorough => SearchFlags::NO_SLOW | SearchFlags::NO_EXHAUSTIVE,
            Patience::Exhaustive => SearchFlags::empty(),
        }
    }
}

/// Planner search flags.
///
/// The low bits are *impatience* bits: each one set removes effort from the
/// search. `f1` subsumes `f2` when `f1`'s impatience bits are a subset of
/// `f2`'s, i.e. `f1` was computed at least as thoroughly. The remaining bits
/// are modifiers that ride along without affecting subsumption.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SearchFlags(u16);

impl SearchFlags {
    /// Cost candidates by operation counts instead of measuring.
    pub const ESTIMATE: SearchFlags = SearchFlags(1 << 0);
    /// Keep the decomposition search shallow.
    pub const NO_DEEP: SearchFlags = SearchFlags(1 << 1);
    /// Skip candidates the solver believes are suboptimal.
    pub const NO_SLOW: SearchFlags = SearchFlags(1 << 2);
    /// Set on every request below the exhaustive level.
    pub const NO_EXHAUSTIVE: SearchFlags = SearchFlags(1 << 3);

    /// Rebuild from a cached decision; do not search.
    pub const NO_SEARCH: SearchFlags = SearchFlags(1 << 4);
    /// Mark the resulting cache entry as retained ("blessed").
    pub const BLESSING: SearchFlags = SearchFlags(1 << 5);
    /// Cache-internal liveness bit; never observed outside the table.
    pub(crate) const VALID: SearchFlags = SearchFlags(1 << 6);

    const IMPATIENCE_MASK: u16 =
        Self::ESTIMATE.0 | Self::NO_DEEP.0 | Self::NO_SLOW.0 | Self::NO_EXHAUSTIVE.0;
    const WIRE_MASK: u16 = Self::IMPATIENCE_MASK | Self::BLESSING.0;

    pub const fn empty() -> SearchFlags {
        SearchFlags(0)
    }

    pub fn contains(self, other: SearchFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn remove(self, other: SearchFlags) -> SearchFlags {
        SearchFlags(self.0 & !other.0)
    }

    /// The impatience bits alone.
    pub fn impatience(self) -> SearchFlags {
        SearchFlags(self.0 & Self::IMPATIENCE_MASK)
    }

    /// The modifier bits alone.
    pub fn modifiers(self) -> SearchFlags {
        SearchFlags(self.0 & !Self::IMPATIENCE_MASK)
    }

    /// `self` was computed at least as thoroughly as `other` requires.
    pub fn subsumes(self, other: SearchFlags) -> bool {
        let imp = self.0 & Self::IMPATIENCE_MASK;
        imp & other.0 == imp
    }

    /// One of the two subsumes the other.
    pub fn ordered(self, other: SearchFlags) -> bool {
        self.subsumes(other) || other.subsumes(self)
    }

    /// Stable numeric form used by the wisdom codec.
    pub fn wire(self) -> u16 {
        self.0 & Self::WIRE_MASK
    }

    /// Decode a wisdom flags word, dropping any bit this version ignores.
    pub fn from_wire(bits: u16) -> SearchFlags {
        SearchFlags(bits & Self::WIRE_MASK)
    }
}

impl BitOr for SearchFlags {
    type Output = SearchFlags;

    fn bitor(self, rhs: SearchFlags) -> SearchFlags {
        SearchFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SearchFlags {
    fn bitor_assign(&mut self, rhs: SearchFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for SearchFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u16, &str); 7] = [
            (SearchFlags::ESTIMATE.0, "ESTIMATE"),
            (SearchFlags::NO_DEEP.0, "NO_DEEP"),
            (SearchFlags::NO_SLOW.0, "NO_SLOW"),
            (SearchFlags::NO_EXHAUSTIVE.0, "NO_EXHAUSTIVE"),
            (SearchFlags::NO_SEARCH.0, "NO_SEARCH"),
            (SearchFlags::BLESSING.0, "BLESSING"),
            (SearchFlags::VALID.0, "VALID"),
        ];
        let mut first = true;
        for (bit, name) in NAMES {
            if self.0 & bit != 0 {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "(none)")?;
        }
        Ok(())
    }
}

/// Feasibility-affecting problem flags; these are part of the fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProblemFlags(u32);

impl ProblemFlags {
    /// Solvers may scribble over the input buffer.
    pub const DESTROY_INPUT: ProblemFlags = ProblemFlags(1 << 0);
    /// Prefer plans with small scratch footprints.
    pub const CONSERVE_MEMORY: ProblemFlags = ProblemFlags(1 << 1);
    /// Buffers may not be aligned for the widest vector width.
    pub const POSSIBLY_UNALIGNED: ProblemFlags = ProblemFlags(1 << 2);

    pub const fn empty() -> ProblemFlags {
        ProblemFlags(0)
    }

    pub fn contains(self, other: ProblemFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for ProblemFlags {
    type Output = ProblemFlags;

    fn bitor(self, rhs: ProblemFlags) -> ProblemFlags {
        ProblemFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for ProblemFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProblemFlags({:#x})", self.0)
    }
}

/// How much the cache forgets during a bulk eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amnesia {
    /// Drop every entry.
    Everything,
    /// Drop entries without a retention marker.
    NonRetained,
}

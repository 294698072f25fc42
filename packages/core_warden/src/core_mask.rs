use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use crate::{CoreIndex, MAX_CORES};

/// A set of logical processor cores, stored as a bitmask.
///
/// Bit `i` is set if and only if core `i` is a member of the set. This is the same layout the
/// operating system uses for process affinity masks, so a `CoreMask` can be handed to the platform
/// without translation.
///
/// The mask is limited to [`MAX_CORES`] cores. Any attempt to address a core beyond that limit
/// is treated as addressing a core that is not in the set.
///
/// # Example
///
/// ```
/// use core_warden::CoreMask;
///
/// let mask: CoreMask = [0, 2, 3].into_iter().collect();
///
/// assert!(mask.contains(2));
/// assert!(!mask.contains(1));
/// assert_eq!(mask.bits(), 0b1101);
/// assert_eq!(mask.to_string(), "0xd");
/// ```
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CoreMask(u64);

impl CoreMask {
    /// A mask with no cores in it.
    pub const EMPTY: Self = Self(0);

    /// Creates a mask from its raw bit representation.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Creates a mask containing every core with an index below `count`.
    #[must_use]
    pub fn first_n(count: CoreIndex) -> Self {
        if count >= MAX_CORES {
            Self(u64::MAX)
        } else {
            Self(bit(count).map_or(u64::MAX, |b| b.wrapping_sub(1)))
        }
    }

    /// Creates a mask containing only the given core, or `None` if the index cannot be
    /// represented.
    #[must_use]
    pub fn single(core: CoreIndex) -> Option<Self> {
        bit(core).map(Self)
    }

    /// The raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether the mask contains no cores.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of cores in the mask.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Whether the given core is in the mask.
    #[must_use]
    pub fn contains(self, core: CoreIndex) -> bool {
        bit(core).is_some_and(|b| self.0 & b != 0)
    }

    /// Whether the two masks share at least one core.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Adds a core to the mask. Returns `false` if the index cannot be represented.
    pub fn insert(&mut self, core: CoreIndex) -> bool {
        match bit(core) {
            Some(b) => {
                self.0 |= b;
                true
            }
            None => false,
        }
    }

    /// Removes a core from the mask, if present.
    pub fn remove(&mut self, core: CoreIndex) {
        if let Some(b) = bit(core) {
            self.0 &= !b;
        }
    }

    /// The cores in `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// The lowest-indexed core in the mask.
    #[must_use]
    pub const fn lowest(self) -> Option<CoreIndex> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros())
        }
    }

    /// The highest-indexed core in the mask.
    #[must_use]
    pub const fn highest(self) -> Option<CoreIndex> {
        if self.0 == 0 {
            None
        } else {
            // Cannot underflow: a non-zero u64 has at most 63 leading zeros.
            Some(63 - self.0.leading_zeros())
        }
    }

    /// Iterates over the cores in the mask in ascending order.
    pub fn iter(self) -> Cores {
        Cores { remaining: self.0 }
    }
}

fn bit(core: CoreIndex) -> Option<u64> {
    1_u64.checked_shl(core)
}

/// Iterator over the cores of a [`CoreMask`], in ascending order.
#[derive(Clone, Debug)]
pub struct Cores {
    remaining: u64,
}

impl Iterator for Cores {
    type Item = CoreIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let core = self.remaining.trailing_zeros();

        // Clears the lowest set bit.
        self.remaining &= self.remaining.wrapping_sub(1);

        Some(core)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.remaining.count_ones() as usize;
        (count, Some(count))
    }
}

impl ExactSizeIterator for Cores {}

impl IntoIterator for CoreMask {
    type Item = CoreIndex;
    type IntoIter = Cores;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<CoreIndex> for CoreMask {
    /// Collects core indices into a mask. Indices that cannot be represented are ignored.
    fn from_iter<T: IntoIterator<Item = CoreIndex>>(iter: T) -> Self {
        let mut mask = Self::EMPTY;

        for core in iter {
            mask.insert(core);
        }

        mask
    }
}

impl BitOr for CoreMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for CoreMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl Not for CoreMask {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl From<u64> for CoreMask {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl From<CoreMask> for u64 {
    fn from(mask: CoreMask) -> Self {
        mask.0
    }
}

impl fmt::Display for CoreMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for CoreMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoreMask({:#b})", self.0)
    }
}

impl fmt::Binary for CoreMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn smoke_test() {
        let mut mask = CoreMask::EMPTY;
        assert!(mask.is_empty());
        assert_eq!(mask.len(), 0);

        assert!(mask.insert(3));
        assert!(mask.insert(0));
        assert!(mask.contains(3));
        assert!(mask.contains(0));
        assert!(!mask.contains(1));
        assert_eq!(mask.bits(), 0b1001);
        assert_eq!(mask.len(), 2);

        mask.remove(3);
        assert_eq!(mask.bits(), 0b0001);

        // Removing a core that is not present is a no-op.
        mask.remove(5);
        assert_eq!(mask.bits(), 0b0001);
    }

    #[test]
    fn out_of_range_cores_are_never_members() {
        let mut mask = CoreMask::from_bits(u64::MAX);

        assert!(mask.contains(63));
        assert!(!mask.contains(64));
        assert!(!mask.contains(1000));

        assert!(!mask.insert(64));
        assert!(CoreMask::single(64).is_none());

        mask.remove(64);
        assert_eq!(mask.bits(), u64::MAX);
    }

    #[test]
    fn first_n_covers_edges() {
        assert_eq!(CoreMask::first_n(0), CoreMask::EMPTY);
        assert_eq!(CoreMask::first_n(1).bits(), 0b1);
        assert_eq!(CoreMask::first_n(4).bits(), 0b1111);
        assert_eq!(CoreMask::first_n(63).bits(), u64::MAX >> 1);
        assert_eq!(CoreMask::first_n(64).bits(), u64::MAX);
        assert_eq!(CoreMask::first_n(200).bits(), u64::MAX);
    }

    #[test]
    fn lowest_and_highest() {
        assert_eq!(CoreMask::EMPTY.lowest(), None);
        assert_eq!(CoreMask::EMPTY.highest(), None);

        let mask = CoreMask::from_bits(0b0110_1000);
        assert_eq!(mask.lowest(), Some(3));
        assert_eq!(mask.highest(), Some(6));

        let top = CoreMask::single(63).unwrap();
        assert_eq!(top.lowest(), Some(63));
        assert_eq!(top.highest(), Some(63));
    }

    #[test]
    fn iterates_in_ascending_order() {
        let mask = CoreMask::from_bits(0b1010_0101);
        let cores: Vec<_> = mask.iter().collect();

        assert_eq!(cores, vec![0, 2, 5, 7]);
        assert_eq!(mask.iter().len(), 4);
    }

    #[test]
    fn collect_ignores_unrepresentable_cores() {
        let mask: CoreMask = [1, 64, 2, 1].into_iter().collect();

        assert_eq!(mask.bits(), 0b110);
    }

    #[test]
    fn set_operations() {
        let a = CoreMask::from_bits(0b1100);
        let b = CoreMask::from_bits(0b0110);

        assert_eq!((a | b).bits(), 0b1110);
        assert_eq!((a & b).bits(), 0b0100);
        assert_eq!(a.difference(b).bits(), 0b1000);
        assert!(a.intersects(b));
        assert!(!a.intersects(CoreMask::from_bits(0b0011)));
        assert_eq!((!CoreMask::EMPTY).bits(), u64::MAX);
    }

    #[test]
    fn formatting() {
        let mask = CoreMask::from_bits(0b1100);

        assert_eq!(format!("{mask}"), "0xc");
        assert_eq!(format!("{mask:?}"), "CoreMask(0b1100)");
        assert_eq!(format!("{mask:b}"), "1100");
    }
}
